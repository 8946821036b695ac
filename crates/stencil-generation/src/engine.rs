//! Generation engine
//!
//! [`GenerationEngine`] is the per-process context object: it owns the
//! template store, resolver, theme manager, scoring engine, analytics store
//! and composition cache, and is passed around by cheap clones of one
//! shared handle.
//!
//! ```
//! use stencil_generation::{
//!     CompositionOptions, EngineConfig, GenerationContext, GenerationEngine, TemplateData,
//! };
//!
//! # tokio_test::block_on(async {
//! let engine = GenerationEngine::new(EngineConfig::default())?;
//! engine.register_template(
//!     TemplateData::new("greeting", "page")
//!         .with_framework("jest")
//!         .with_content("hello {{name}}"),
//! )?;
//!
//! let context = GenerationContext::new().with_framework("jest").with_name("world");
//! let composition = engine.compose_template(&context, &CompositionOptions::default())?;
//! assert_eq!(composition.content, "hello world");
//!
//! engine.shutdown().await?;
//! # Ok::<(), stencil_generation::CompositionError>(())
//! # }).unwrap();
//! ```

use std::{path::Path, sync::Arc, sync::Weak};

use parking_lot::Mutex;
use stencil_themes::{Theme, ThemeLoader, ThemeManager, ThemeResolver, ThemeSelection};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    analytics::{AnalyticsFlusher, AnalyticsStore, AnalyticsSummary, JsonFileBackend},
    composer::{CompositionCache, CompositionOptions, TemplateComposer},
    config::EngineConfig,
    error::Result,
    models::{Composition, GenerationContext, Template, TemplateData},
    scoring_system::ScoringEngine,
    templates::{
        HelperRegistry, InheritanceResolver, Registration, TemplateChangeEvent, TemplateCompiler,
        TemplateLoader, TemplateStore, TemplateWatcher,
    },
};

#[derive(Debug, Default)]
struct Background {
    flusher: Option<AnalyticsFlusher>,
    watcher: Option<TemplateWatcher>,
    reload_task: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct EngineInner {
    config: EngineConfig,
    store: Arc<TemplateStore>,
    resolver: Arc<InheritanceResolver>,
    themes: ThemeManager,
    analytics: Arc<AnalyticsStore>,
    composer: TemplateComposer,
    loader: TemplateLoader,
    theme_loader: ThemeLoader,
    background: Mutex<Background>,
}

/// Shared handle to the template composition engine
#[derive(Debug, Clone)]
pub struct GenerationEngine {
    inner: Arc<EngineInner>,
}

impl GenerationEngine {
    /// Build an engine with the built-in helpers; performs no I/O
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_helpers(config, HelperRegistry::default())
    }

    /// Build an engine whose compiler uses `helpers`
    pub fn with_helpers(config: EngineConfig, helpers: HelperRegistry) -> Result<Self> {
        config.validate()?;
        let io_timeout = config.io_timeout();

        let store = Arc::new(TemplateStore::with_limits(
            config.max_inheritance_depth,
            io_timeout,
        ));
        let compiler = Arc::new(TemplateCompiler::new(helpers));
        let resolver = Arc::new(InheritanceResolver::new(Arc::clone(&store), compiler));
        let themes = ThemeManager::new()
            .with_resolver(ThemeResolver::new().with_max_depth(config.max_inheritance_depth));
        let analytics = Arc::new(match &config.analytics.persist_path {
            Some(path) => AnalyticsStore::with_backend(Arc::new(JsonFileBackend::new(
                path.clone(),
                io_timeout,
            ))),
            None => AnalyticsStore::new(),
        });
        let scoring = Arc::new(ScoringEngine::with_weights(config.scoring.clone())?);
        let composer = TemplateComposer::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            themes.clone(),
            scoring,
            Arc::clone(&analytics),
            config.composition_cache_capacity,
            config.max_supplements,
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                loader: TemplateLoader::with_timeout(io_timeout),
                theme_loader: ThemeLoader::with_timeout(io_timeout),
                config,
                store,
                resolver,
                themes,
                analytics,
                composer,
                background: Mutex::new(Background::default()),
            }),
        })
    }

    /// Build an engine and bring it up from its configuration
    ///
    /// Seeds analytics, loads the configured theme and template
    /// directories, starts the analytics flusher and, if enabled, the
    /// template watcher.
    pub async fn from_config(config: EngineConfig) -> Result<Self> {
        let engine = Self::new(config)?;
        engine.inner.analytics.seed().await?;

        let config = &engine.inner.config;
        if let Some(dir) = &config.themes_dir {
            engine.load_themes_from(dir).await?;
        }
        if let Some(dir) = &config.templates_dir {
            engine.load_templates_from(dir).await?;
            if config.watch {
                engine.watch_templates(dir)?;
            }
        }
        engine.start_flusher();

        info!(
            templates = engine.inner.store.len()?,
            themes = engine.inner.themes.registry().len(),
            "Generation engine started"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.inner.store
    }

    pub fn themes(&self) -> &ThemeManager {
        &self.inner.themes
    }

    pub fn composition_cache(&self) -> &CompositionCache {
        self.inner.composer.cache()
    }

    pub fn analytics(&self) -> &Arc<AnalyticsStore> {
        &self.inner.analytics
    }

    /// Register a new template; fails on a duplicate id
    pub fn register_template(&self, data: TemplateData) -> Result<Arc<Template>> {
        let registration = self.inner.store.register(data)?;
        Ok(self.after_registration(registration))
    }

    /// Replace a template in place (or register it); on failure the
    /// previous version stays active
    pub fn reload_template(&self, data: TemplateData) -> Result<Arc<Template>> {
        let registration = self.inner.store.reload(data)?;
        Ok(self.after_registration(registration))
    }

    fn after_registration(&self, registration: Registration) -> Arc<Template> {
        if registration.replaced {
            let dropped = self
                .inner
                .composer
                .cache()
                .invalidate_templates(&registration.invalidated);
            if dropped > 0 {
                info!(
                    template_id = %registration.template.id,
                    dropped,
                    "Invalidated cached compositions"
                );
            }
        } else {
            // a new template can outrank cached picks
            self.inner.composer.cache().clear();
        }
        registration.template
    }

    pub fn template(&self, id: &str) -> Result<Arc<Template>> {
        self.inner.store.get(id)
    }

    /// Resolve a template's inheritance chain and render it for `context`
    pub fn resolve(&self, id: &str, context: &GenerationContext) -> Result<String> {
        let source = self.inner.resolver.resolve_source(id)?;
        let themed = self.inner.themes.apply_theme(
            &context.to_value(),
            ThemeSelection {
                theme: context.theme.as_deref(),
                framework: context.framework.as_deref(),
            },
        )?;
        self.inner.resolver.render(&source, &themed.data)
    }

    /// Pick, resolve, theme and compile templates for `context`
    pub fn compose_template(
        &self,
        context: &GenerationContext,
        options: &CompositionOptions,
    ) -> Result<Composition> {
        self.inner.composer.compose(context, options)
    }

    pub fn register_theme(&self, theme: Theme) -> Result<()> {
        self.inner.themes.register(theme)?;
        self.inner.composer.cache().clear();
        Ok(())
    }

    pub fn set_active_theme(&self, id: &str) -> Result<()> {
        self.inner.themes.set_active_theme(id)?;
        Ok(())
    }

    pub fn analytics_summary(&self) -> AnalyticsSummary {
        self.inner.analytics.summary()
    }

    /// Report that a composition built on `template_id` later failed
    pub fn mark_failed(&self, template_id: &str) -> bool {
        self.inner.analytics.mark_failed(template_id)
    }

    /// Load every template under `dir`; returns how many were registered
    pub async fn load_templates_from(&self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for data in self.inner.loader.load_from_directory(dir).await? {
            let id = data.id.clone();
            match self.reload_template(data) {
                Ok(_) => loaded += 1,
                Err(e) => warn!(template_id = %id, "Rejected template: {}", e),
            }
        }
        Ok(loaded)
    }

    /// Load every theme in `dir`; returns how many were registered
    pub async fn load_themes_from(&self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for theme in self.inner.theme_loader.load_from_directory(dir).await? {
            let id = theme.id.clone();
            match self.register_theme(theme) {
                Ok(()) => loaded += 1,
                Err(e) => warn!(theme_id = %id, "Rejected theme: {}", e),
            }
        }
        Ok(loaded)
    }

    /// Start the background analytics flusher if a backend is configured
    pub fn start_flusher(&self) {
        if self.inner.config.analytics.persist_path.is_none() {
            return;
        }
        let mut background = self.inner.background.lock();
        if background.flusher.is_none() {
            background.flusher = Some(
                self.inner
                    .analytics
                    .spawn_flusher(self.inner.config.flush_interval()),
            );
        }
    }

    /// Watch `dir` and hot-reload template files as they change
    pub fn watch_templates(&self, dir: &Path) -> Result<()> {
        let (watcher, events) = TemplateWatcher::watch(dir)?;
        let task = tokio::spawn(hot_reload(Arc::downgrade(&self.inner), events));

        let mut background = self.inner.background.lock();
        if let Some(previous) = background.reload_task.replace(task) {
            previous.abort();
        }
        if let Some(previous) = background.watcher.replace(watcher) {
            if let Err(e) = previous.stop() {
                warn!("Failed to stop previous watcher: {}", e);
            }
        }
        Ok(())
    }

    /// Stop background work and flush analytics
    pub async fn shutdown(&self) -> Result<()> {
        let background = std::mem::take(&mut *self.inner.background.lock());

        if let Some(watcher) = background.watcher {
            if let Err(e) = watcher.stop() {
                warn!("Failed to stop template watcher: {}", e);
            }
        }
        if let Some(task) = background.reload_task {
            task.abort();
        }
        if let Some(flusher) = background.flusher {
            flusher.stop().await;
        }

        match self.inner.analytics.flush().await {
            Ok(written) => {
                info!(written, "Generation engine shut down");
                Ok(())
            }
            Err(e) => {
                error!("Final analytics flush failed: {}", e);
                Err(e)
            }
        }
    }
}

async fn hot_reload(
    engine: Weak<EngineInner>,
    mut events: mpsc::UnboundedReceiver<TemplateChangeEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        let engine = GenerationEngine { inner };

        match event {
            TemplateChangeEvent::Modified(path) => {
                let data = match engine.inner.loader.load_from_file(&path).await {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(
                            "Hot reload of {} failed, keeping last known good: {}",
                            path.display(),
                            e
                        );
                        continue;
                    }
                };
                let id = data.id.clone();
                match engine.reload_template(data) {
                    Ok(_) => info!(template_id = %id, "Hot reloaded template"),
                    Err(e) => warn!(
                        template_id = %id,
                        "Hot reload rejected, keeping last known good: {}",
                        e
                    ),
                }
            }
            TemplateChangeEvent::Removed(path) => {
                info!(
                    "Template file {} removed; last loaded version stays active",
                    path.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositionError;
    use serde_json::json;
    use stencil_themes::ThemeType;

    fn engine() -> GenerationEngine {
        GenerationEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.scoring.type_match = 0.9;
        assert!(matches!(
            GenerationEngine::new(config),
            Err(CompositionError::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_applies_context_theme() {
        let engine = engine();
        engine
            .register_theme(
                Theme::new("clean", ThemeType::Structural)
                    .with_section("formatting", json!({"quotes": "single"})),
            )
            .unwrap();
        engine
            .register_template(
                TemplateData::new("t", "page")
                    .with_framework("jest")
                    .with_content("{{theme.formatting.quotes}} {{name}}"),
            )
            .unwrap();

        let context = GenerationContext::new().with_theme("clean").with_name("login form");
        assert_eq!(engine.resolve("t", &context).unwrap(), "single login form");
    }

    #[test]
    fn test_set_unknown_active_theme() {
        let engine = engine();
        assert!(matches!(
            engine.set_active_theme("ghost"),
            Err(CompositionError::ThemeNotFound(_))
        ));
    }

    #[test]
    fn test_reload_drops_cached_compositions() {
        let engine = engine();
        engine
            .register_template(
                TemplateData::new("t", "page")
                    .with_framework("jest")
                    .with_content("v1"),
            )
            .unwrap();
        let context = GenerationContext::new().with_framework("jest");
        let first = engine
            .compose_template(&context, &CompositionOptions::default())
            .unwrap();
        assert_eq!(first.content, "v1");

        engine
            .reload_template(
                TemplateData::new("t", "page")
                    .with_framework("jest")
                    .with_content("v2"),
            )
            .unwrap();
        let second = engine
            .compose_template(&context, &CompositionOptions::default())
            .unwrap();
        assert_eq!(second.content, "v2");
    }

    #[tokio::test]
    async fn test_shutdown_without_backend() {
        let engine = engine();
        engine.start_flusher();
        engine.shutdown().await.unwrap();
    }
}
