//! Theme management for generation contexts

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::{
    error::{Result, ThemeError},
    registry::ThemeRegistry,
    resolver::{ResolvedTheme, ThemeResolver},
    types::Theme,
};

/// Type alias for theme listeners
type ThemeListeners = Arc<Mutex<Vec<Box<dyn Fn(Option<&str>) + Send + Sync>>>>;

/// Which theme to apply and for which framework
#[derive(Debug, Clone, Copy, Default)]
pub struct ThemeSelection<'a> {
    /// Explicit theme id; falls back to the active theme when absent
    pub theme: Option<&'a str>,
    /// Framework overlay to apply
    pub framework: Option<&'a str>,
}

/// A generation context with theme conventions blended in
#[derive(Debug, Clone)]
pub struct ThemedContext {
    /// The theme that was applied, if any
    pub theme: Option<ResolvedTheme>,
    /// Convention-cased identifiers derived from the context `name`
    pub names: BTreeMap<String, String>,
    /// The original context with `theme` and `names` keys added
    pub data: Value,
}

/// Theme manager for runtime theme selection and application
#[derive(Clone)]
pub struct ThemeManager {
    registry: ThemeRegistry,
    resolver: ThemeResolver,
    active: Arc<RwLock<Option<String>>>,
    listeners: ThemeListeners,
}

impl std::fmt::Debug for ThemeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeManager")
            .field("active", &*self.active.read())
            .field("registry", &self.registry)
            .finish()
    }
}

impl ThemeManager {
    /// Create a theme manager with an empty registry
    pub fn new() -> Self {
        Self::with_registry(ThemeRegistry::new())
    }

    /// Create a theme manager with a custom registry
    pub fn with_registry(registry: ThemeRegistry) -> Self {
        Self {
            registry,
            resolver: ThemeResolver::new(),
            active: Arc::new(RwLock::new(None)),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Use a custom resolver
    pub fn with_resolver(mut self, resolver: ThemeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Underlying registry
    pub fn registry(&self) -> &ThemeRegistry {
        &self.registry
    }

    /// Register a theme
    pub fn register(&self, theme: Theme) -> Result<Arc<Theme>> {
        self.registry.register(theme)
    }

    /// Make a theme the default for contexts that do not request one
    pub fn set_active_theme(&self, id: &str) -> Result<()> {
        if !self.registry.exists(id) {
            return Err(ThemeError::NotFound(id.to_string()));
        }
        *self.active.write() = Some(id.to_string());
        tracing::info!(theme_id = %id, "Active theme changed");
        self.notify(Some(id));
        Ok(())
    }

    /// Clear the active theme
    pub fn clear_active_theme(&self) {
        *self.active.write() = None;
        self.notify(None);
    }

    /// Id of the active theme
    pub fn active_theme_id(&self) -> Option<String> {
        self.active.read().clone()
    }

    /// Add a listener called whenever the active theme changes
    pub fn on_active_change<F>(&self, listener: F)
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Resolve a theme chain with an optional framework overlay
    pub fn resolve(&self, id: &str, framework: Option<&str>) -> Result<ResolvedTheme> {
        self.resolver.resolve(&self.registry, id, framework)
    }

    /// Blend a theme into a generation context
    ///
    /// `context` should be a JSON object; its `name` string (if any) is the
    /// source for convention-derived identifiers. Without an explicit or
    /// active theme the context passes through unchanged.
    pub fn apply_theme(
        &self,
        context: &Value,
        selection: ThemeSelection<'_>,
    ) -> Result<ThemedContext> {
        let theme_id = match selection.theme {
            Some(id) => Some(id.to_string()),
            None => self.active_theme_id(),
        };

        let Some(theme_id) = theme_id else {
            return Ok(ThemedContext {
                theme: None,
                names: BTreeMap::new(),
                data: context.clone(),
            });
        };

        let resolved = self.resolve(&theme_id, selection.framework)?;
        let names = context
            .get("name")
            .and_then(Value::as_str)
            .map(|name| resolved.derive_names(name))
            .unwrap_or_default();

        let mut data = match context {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        data.insert("theme".to_string(), resolved.to_value());
        data.insert(
            "names".to_string(),
            Value::Object(
                names
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        );

        tracing::debug!(theme_id = %theme_id, framework = ?selection.framework, "Applied theme");

        Ok(ThemedContext {
            theme: Some(resolved),
            names,
            data: Value::Object(data),
        })
    }

    fn notify(&self, id: Option<&str>) {
        for listener in self.listeners.lock().iter() {
            listener(id);
        }
    }
}

impl Default for ThemeManager {
    fn default() -> Self {
        Self::new()
    }
}
