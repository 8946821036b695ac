//! Template loading from YAML and JSON files

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    error::{CompositionError, Result},
    models::TemplateData,
};

/// Default timeout for a single template file read
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Loads template records from disk with a bounded read timeout
#[derive(Debug, Clone)]
pub struct TemplateLoader {
    io_timeout: Duration,
}

impl TemplateLoader {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_IO_TIMEOUT)
    }

    pub fn with_timeout(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    /// Whether a path looks like a template file
    pub fn is_template_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml") | Some("json")
        )
    }

    /// Parse a template record, picking the format from `path`
    pub fn parse(path: &Path, content: &str) -> Result<TemplateData> {
        let data: TemplateData = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(content)?,
            _ => serde_yaml::from_str(content)?,
        };
        if data.id.trim().is_empty() {
            return Err(CompositionError::Validation(format!(
                "Template file {} has no id",
                path.display()
            )));
        }
        Ok(data)
    }

    /// Load a single template file
    pub async fn load_from_file(&self, path: &Path) -> Result<TemplateData> {
        let content = tokio::time::timeout(self.io_timeout, tokio::fs::read_to_string(path))
            .await
            .map_err(|_| CompositionError::Timeout {
                operation: format!("read {}", path.display()),
                timeout_ms: self.io_timeout.as_millis() as u64,
            })??;
        Self::parse(path, &content)
    }

    /// Load every template file under `dir`, recursively, sorted by path
    ///
    /// Files that fail to load are logged and skipped. The directory walk
    /// as a whole is bounded by the loader timeout.
    pub async fn load_from_directory(&self, dir: &Path) -> Result<Vec<TemplateData>> {
        let scanned = tokio::time::timeout(self.io_timeout, Self::scan_directory(dir))
            .await
            .map_err(|_| CompositionError::Timeout {
                operation: format!("scan {}", dir.display()),
                timeout_ms: self.io_timeout.as_millis() as u64,
            })??;
        let Some(paths) = scanned else {
            tracing::debug!("Template directory {} does not exist", dir.display());
            return Ok(Vec::new());
        };

        let mut templates = Vec::with_capacity(paths.len());
        for path in paths {
            match self.load_from_file(&path).await {
                Ok(data) => templates.push(data),
                Err(e) => {
                    tracing::warn!("Failed to load template {}: {}", path.display(), e);
                }
            }
        }

        tracing::info!("Loaded {} templates from {}", templates.len(), dir.display());
        Ok(templates)
    }
}

impl TemplateLoader {
    /// Sorted template file paths under `dir`, or `None` if it is missing
    async fn scan_directory(dir: &Path) -> Result<Option<Vec<PathBuf>>> {
        match tokio::fs::metadata(dir).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut paths: Vec<PathBuf> = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if tokio::fs::metadata(&path).await?.is_dir() {
                    pending.push(path);
                } else if Self::is_template_file(&path) {
                    paths.push(path);
                }
            }
        }
        paths.sort();
        Ok(Some(paths))
    }
}

impl Default for TemplateLoader {
    fn default() -> Self {
        Self::new()
    }
}
