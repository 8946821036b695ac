//! Theme registry for managing registered themes
//!
//! Themes are keyed by id. A theme's `extends` may name a theme that is not
//! registered yet; it only has to exist once the theme is resolved.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::RwLock;

use crate::{
    error::{Result, ThemeError},
    types::Theme,
};

/// Theme registry for storing and managing themes
#[derive(Clone, Default)]
pub struct ThemeRegistry {
    themes: Arc<RwLock<HashMap<String, Arc<Theme>>>>,
}

impl ThemeRegistry {
    /// Create an empty theme registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a theme
    ///
    /// Fails without touching the registry when the theme's `extends` chain
    /// leads back to itself.
    pub fn register(&self, theme: Theme) -> Result<Arc<Theme>> {
        let mut themes = self.themes.write();
        Self::check_cycle(&themes, &theme)?;

        let theme = Arc::new(theme);
        let replaced = themes.insert(theme.id.clone(), Arc::clone(&theme)).is_some();
        tracing::debug!(theme_id = %theme.id, replaced, "Registered theme");
        Ok(theme)
    }

    /// Unregister a theme
    pub fn unregister(&self, id: &str) -> Result<Arc<Theme>> {
        self.themes
            .write()
            .remove(id)
            .ok_or_else(|| ThemeError::NotFound(id.to_string()))
    }

    /// Get a theme by id
    pub fn get(&self, id: &str) -> Result<Arc<Theme>> {
        self.themes
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ThemeError::NotFound(id.to_string()))
    }

    /// Check if a theme exists
    pub fn exists(&self, id: &str) -> bool {
        self.themes.read().contains_key(id)
    }

    /// List all theme ids, sorted
    pub fn list_all(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.themes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered themes
    pub fn len(&self) -> usize {
        self.themes.read().len()
    }

    /// Whether no theme is registered
    pub fn is_empty(&self) -> bool {
        self.themes.read().is_empty()
    }

    fn check_cycle(themes: &HashMap<String, Arc<Theme>>, theme: &Theme) -> Result<()> {
        let mut path = vec![theme.id.clone()];
        let mut in_progress: HashSet<&str> = HashSet::from([theme.id.as_str()]);
        let mut next = theme.extends.as_deref();

        while let Some(parent_id) = next {
            path.push(parent_id.to_string());
            if !in_progress.insert(parent_id) {
                return Err(ThemeError::CircularInheritance { path });
            }
            next = themes
                .get(parent_id)
                .and_then(|parent| parent.extends.as_deref());
        }

        Ok(())
    }
}

impl std::fmt::Debug for ThemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeRegistry")
            .field("themes", &self.list_all())
            .finish()
    }
}
