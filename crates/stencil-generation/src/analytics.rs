//! Template usage analytics
//!
//! Per-template counters that feed the usage and performance score factors.
//! Records live in memory; an optional [`AnalyticsBackend`] seeds them at
//! startup and receives snapshots from a background flusher.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle, time};

use crate::error::{CompositionError, Result};

/// Usage counters for one template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub template_id: String,
    pub total: u64,
    pub successful: u64,
    /// Mean composition score over `total`
    pub avg_score: f64,
    /// Mean composition latency over `total`
    pub avg_latency_ms: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl AnalyticsRecord {
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            total: 0,
            successful: 0,
            avg_score: 0.0,
            avg_latency_ms: 0.0,
            last_used: None,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }

    fn apply(&mut self, sample: &UsageSample) {
        self.total += 1;
        if sample.success {
            self.successful += 1;
        }
        let n = self.total as f64;
        self.avg_score += (sample.score - self.avg_score) / n;
        self.avg_latency_ms += (sample.latency.as_secs_f64() * 1000.0 - self.avg_latency_ms) / n;
        self.last_used = Some(sample.at);
    }
}

/// One observed use of a template
#[derive(Debug, Clone)]
pub struct UsageSample {
    pub template_id: String,
    pub success: bool,
    pub score: f64,
    pub latency: Duration,
    pub at: DateTime<Utc>,
}

impl UsageSample {
    pub fn success(template_id: impl Into<String>, score: f64, latency: Duration) -> Self {
        Self {
            template_id: template_id.into(),
            success: true,
            score,
            latency,
            at: Utc::now(),
        }
    }
}

/// Aggregate view of all analytics records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_compositions: u64,
    pub successful_compositions: u64,
    pub success_rate: f64,
    /// Per-template rows, most used first then by id
    pub templates: Vec<AnalyticsRecord>,
}

/// Persistence for analytics records
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    /// Load previously persisted records
    async fn load(&self) -> Result<Vec<AnalyticsRecord>>;

    /// Persist a full snapshot of the records
    async fn persist(&self, records: &[AnalyticsRecord]) -> Result<()>;
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<Vec<AnalyticsRecord>>,
    persist_count: Mutex<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<AnalyticsRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            persist_count: Mutex::new(0),
        }
    }

    pub fn records(&self) -> Vec<AnalyticsRecord> {
        self.records.lock().clone()
    }

    /// Number of snapshots persisted so far
    pub fn persist_count(&self) -> usize {
        *self.persist_count.lock()
    }
}

#[async_trait]
impl AnalyticsBackend for MemoryBackend {
    async fn load(&self) -> Result<Vec<AnalyticsRecord>> {
        Ok(self.records.lock().clone())
    }

    async fn persist(&self, records: &[AnalyticsRecord]) -> Result<()> {
        *self.records.lock() = records.to_vec();
        *self.persist_count.lock() += 1;
        Ok(())
    }
}

/// JSON file backend; writes go through a temp file and a rename
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
    io_timeout: Duration,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>, io_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            io_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn bounded<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: std::future::Future<Output = std::io::Result<T>>,
    {
        time::timeout(self.io_timeout, future)
            .await
            .map_err(|_| CompositionError::Timeout {
                operation: format!("{} {}", operation, self.path.display()),
                timeout_ms: self.io_timeout.as_millis() as u64,
            })?
            .map_err(CompositionError::from)
    }
}

#[async_trait]
impl AnalyticsBackend for JsonFileBackend {
    async fn load(&self) -> Result<Vec<AnalyticsRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = self
            .bounded("read", tokio::fs::read_to_string(&self.path))
            .await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn persist(&self, records: &[AnalyticsRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.bounded("create dir", tokio::fs::create_dir_all(parent))
                .await?;
        }
        let temp = self.path.with_extension("json.tmp");
        self.bounded("write", tokio::fs::write(&temp, json)).await?;
        self.bounded("rename", tokio::fs::rename(&temp, &self.path))
            .await
    }
}

/// In-memory analytics with optional persistence
pub struct AnalyticsStore {
    records: DashMap<String, AnalyticsRecord>,
    dirty: Mutex<HashSet<String>>,
    backend: Option<Arc<dyn AnalyticsBackend>>,
}

impl std::fmt::Debug for AnalyticsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsStore")
            .field("records", &self.records.len())
            .field("dirty", &self.dirty.lock().len())
            .field("persistent", &self.backend.is_some())
            .finish()
    }
}

impl AnalyticsStore {
    /// Store without persistence
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            dirty: Mutex::new(HashSet::new()),
            backend: None,
        }
    }

    pub fn with_backend(backend: Arc<dyn AnalyticsBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::new()
        }
    }

    /// Load persisted records into memory, replacing same-id entries
    pub async fn seed(&self) -> Result<usize> {
        let Some(backend) = &self.backend else {
            return Ok(0);
        };
        let records = backend.load().await?;
        let count = records.len();
        for record in records {
            self.records.insert(record.template_id.clone(), record);
        }
        tracing::info!("Seeded {} analytics records", count);
        Ok(count)
    }

    pub fn record(&self, sample: UsageSample) {
        self.records
            .entry(sample.template_id.clone())
            .or_insert_with(|| AnalyticsRecord::new(sample.template_id.clone()))
            .apply(&sample);
        self.dirty.lock().insert(sample.template_id);
    }

    /// Report a downstream failure of a previously successful use
    ///
    /// Returns false when nothing was decremented.
    pub fn mark_failed(&self, template_id: &str) -> bool {
        let Some(mut record) = self.records.get_mut(template_id) else {
            return false;
        };
        if record.successful == 0 {
            return false;
        }
        record.successful -= 1;
        drop(record);
        self.dirty.lock().insert(template_id.to_string());
        true
    }

    pub fn get(&self, template_id: &str) -> Option<AnalyticsRecord> {
        self.records.get(template_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> AnalyticsSummary {
        let mut templates: Vec<AnalyticsRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        templates.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then_with(|| a.template_id.cmp(&b.template_id))
        });

        let total_compositions: u64 = templates.iter().map(|r| r.total).sum();
        let successful_compositions: u64 = templates.iter().map(|r| r.successful).sum();
        let success_rate = if total_compositions == 0 {
            0.0
        } else {
            successful_compositions as f64 / total_compositions as f64
        };

        AnalyticsSummary {
            total_compositions,
            successful_compositions,
            success_rate,
            templates,
        }
    }

    /// Persist a snapshot if anything changed since the last flush
    ///
    /// Returns the number of changed records written.
    pub async fn flush(&self) -> Result<usize> {
        let Some(backend) = &self.backend else {
            return Ok(0);
        };
        let dirty: HashSet<String> = std::mem::take(&mut *self.dirty.lock());
        if dirty.is_empty() {
            return Ok(0);
        }

        let mut snapshot: Vec<AnalyticsRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        snapshot.sort_by(|a, b| a.template_id.cmp(&b.template_id));

        if let Err(e) = backend.persist(&snapshot).await {
            self.dirty.lock().extend(dirty);
            return Err(e);
        }
        tracing::debug!("Flushed {} changed analytics records", dirty.len());
        Ok(dirty.len())
    }

    /// Spawn a task flushing every `interval` until stopped
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) -> AnalyticsFlusher {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let store = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush().await {
                            tracing::error!("Failed to flush analytics: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Analytics flusher shutting down");
                        break;
                    }
                }
            }
        });

        AnalyticsFlusher {
            shutdown_tx,
            task: Some(task),
        }
    }
}

impl Default for AnalyticsStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running background flusher
#[derive(Debug)]
pub struct AnalyticsFlusher {
    shutdown_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl AnalyticsFlusher {
    /// Stop the flusher and wait for it to exit
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
