//! Theme inheritance resolution
//!
//! A theme's chain is walked through its single `extends` link and merged
//! root first, so every child overrides its parent. Objects merge key by key;
//! arrays and scalars replace the parent value wholesale. A framework overlay
//! (`frameworks.<name>`) collected along the chain is merged last.

use std::{collections::BTreeMap, collections::HashSet, sync::Arc};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::{Result, ThemeError},
    naming::CaseTransform,
    registry::ThemeRegistry,
    types::{Theme, THEME_SECTIONS},
};

/// Default maximum theme chain depth
pub const DEFAULT_MAX_THEME_DEPTH: usize = 10;

/// Deep-merge `overlay` into `base`
///
/// Objects recurse; any other overlay value replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// A theme with its whole chain and overlay folded in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTheme {
    /// Leaf theme id
    pub id: String,
    /// Chain from root ancestor to the leaf
    pub chain: Vec<String>,
    /// Framework overlay that was applied, if any
    pub framework: Option<String>,
    pub styles: Value,
    pub patterns: Value,
    pub conventions: Value,
    pub formatting: Value,
}

impl ResolvedTheme {
    /// Naming conventions declared under `conventions.naming`
    ///
    /// Entries whose value is not a known case kind are skipped.
    pub fn naming_conventions(&self) -> BTreeMap<String, CaseTransform> {
        let Some(naming) = self.conventions.get("naming").and_then(Value::as_object) else {
            return BTreeMap::new();
        };

        naming
            .iter()
            .filter_map(|(target, kind)| {
                let parsed = kind.as_str().map(str::parse::<CaseTransform>);
                match parsed {
                    Some(Ok(case)) => Some((target.clone(), case)),
                    _ => {
                        tracing::debug!(
                            theme_id = %self.id,
                            target = %target,
                            "Skipping unknown naming convention"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Derive convention-cased identifiers from a context-supplied name
    pub fn derive_names(&self, name: &str) -> BTreeMap<String, String> {
        self.naming_conventions()
            .into_iter()
            .map(|(target, case)| (target, case.apply(name)))
            .collect()
    }

    /// Sections as a single JSON object
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert("styles".to_string(), self.styles.clone());
        map.insert("patterns".to_string(), self.patterns.clone());
        map.insert("conventions".to_string(), self.conventions.clone());
        map.insert("formatting".to_string(), self.formatting.clone());
        Value::Object(map)
    }
}

/// Resolves theme inheritance chains against a registry
#[derive(Debug, Clone)]
pub struct ThemeResolver {
    max_depth: usize,
}

impl ThemeResolver {
    /// Create a resolver with the default depth limit
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_THEME_DEPTH,
        }
    }

    /// Set the maximum chain depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve a theme, optionally applying one framework overlay
    pub fn resolve(
        &self,
        registry: &ThemeRegistry,
        id: &str,
        framework: Option<&str>,
    ) -> Result<ResolvedTheme> {
        let chain = self.chain(registry, id)?;

        let mut merged = Value::Object(Map::new());
        for theme in chain.iter().rev() {
            deep_merge(&mut merged, &theme.body());
        }

        let mut applied_framework = None;
        if let Some(framework) = framework {
            let overlay = merged
                .get("frameworks")
                .and_then(|frameworks| frameworks.get(framework))
                .cloned();
            if let Some(overlay) = overlay {
                let mut sections = Map::new();
                for name in THEME_SECTIONS {
                    if let Some(value) = overlay.get(name) {
                        sections.insert(name.to_string(), value.clone());
                    }
                }
                deep_merge(&mut merged, &Value::Object(sections));
                applied_framework = Some(framework.to_string());
            }
        }

        let take = |name: &str| {
            merged
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()))
        };

        Ok(ResolvedTheme {
            id: id.to_string(),
            chain: chain.iter().rev().map(|theme| theme.id.clone()).collect(),
            framework: applied_framework,
            styles: take("styles"),
            patterns: take("patterns"),
            conventions: take("conventions"),
            formatting: take("formatting"),
        })
    }

    /// Chain from the leaf up to its root ancestor
    fn chain(&self, registry: &ThemeRegistry, id: &str) -> Result<Vec<Arc<Theme>>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        let mut next = Some(id.to_string());

        while let Some(current) = next {
            path.push(current.clone());
            if !visited.insert(current.clone()) {
                return Err(ThemeError::CircularInheritance { path });
            }
            if chain.len() >= self.max_depth + 1 {
                return Err(ThemeError::InheritanceTooDeep {
                    id: id.to_string(),
                    max_depth: self.max_depth,
                });
            }

            let theme = registry.get(&current)?;
            next = theme.extends.clone();
            chain.push(theme);
        }

        Ok(chain)
    }
}

impl Default for ThemeResolver {
    fn default() -> Self {
        Self::new()
    }
}
