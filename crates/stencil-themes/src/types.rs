//! Core theme types and data structures

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ThemeError};

/// Sections a theme may contribute to a generation context
pub const THEME_SECTIONS: [&str; 4] = ["styles", "patterns", "conventions", "formatting"];

/// Kind of theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeType {
    /// Look and feel (spacing, quotes, comment style)
    Visual,
    /// Code organisation (file layout, patterns)
    Structural,
    /// Framework-specific idioms
    Framework,
}

impl FromStr for ThemeType {
    type Err = ThemeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visual" => Ok(ThemeType::Visual),
            "structural" => Ok(ThemeType::Structural),
            "framework" => Ok(ThemeType::Framework),
            other => Err(ThemeError::ValidationError(format!(
                "Invalid theme type '{}', expected visual, structural or framework",
                other
            ))),
        }
    }
}

impl fmt::Display for ThemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThemeType::Visual => "visual",
            ThemeType::Structural => "structural",
            ThemeType::Framework => "framework",
        };
        f.write_str(name)
    }
}

/// Theme record as read from a theme source, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub theme_type: Option<String>,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub styles: Option<Value>,
    #[serde(default)]
    pub patterns: Option<Value>,
    #[serde(default)]
    pub conventions: Option<Value>,
    #[serde(default)]
    pub formatting: Option<Value>,
    /// Per-framework overlays, each shaped like a theme body
    #[serde(default)]
    pub frameworks: BTreeMap<String, Value>,
}

/// A validated theme definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Theme {
    /// Unique theme id
    pub id: String,
    /// Display name
    pub name: String,
    /// Theme kind
    pub theme_type: ThemeType,
    /// Single parent theme id
    pub extends: Option<String>,
    pub styles: Value,
    pub patterns: Value,
    pub conventions: Value,
    pub formatting: Value,
    pub frameworks: BTreeMap<String, Value>,
}

impl Theme {
    /// Create an empty theme with the given id and type
    pub fn new(id: impl Into<String>, theme_type: ThemeType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            theme_type,
            extends: None,
            styles: empty_object(),
            patterns: empty_object(),
            conventions: empty_object(),
            formatting: empty_object(),
            frameworks: BTreeMap::new(),
        }
    }

    /// Validate a raw theme record
    pub fn from_data(data: ThemeData) -> Result<Self> {
        if data.id.trim().is_empty() {
            return Err(ThemeError::ValidationError(
                "Theme id cannot be empty".to_string(),
            ));
        }

        let theme_type = match data.theme_type.as_deref() {
            Some(raw) => raw.parse::<ThemeType>()?,
            None => {
                return Err(ThemeError::ValidationError(format!(
                    "Theme '{}' is missing its type",
                    data.id
                )))
            }
        };

        if data.extends.as_deref() == Some(data.id.as_str()) {
            return Err(ThemeError::CircularInheritance {
                path: vec![data.id.clone(), data.id],
            });
        }

        for (framework, overlay) in &data.frameworks {
            if !overlay.is_object() {
                return Err(ThemeError::ValidationError(format!(
                    "Framework overlay '{}' of theme '{}' must be an object",
                    framework, data.id
                )));
            }
        }

        Ok(Self {
            name: data.name.unwrap_or_else(|| data.id.clone()),
            styles: section(&data.id, "styles", data.styles)?,
            patterns: section(&data.id, "patterns", data.patterns)?,
            conventions: section(&data.id, "conventions", data.conventions)?,
            formatting: section(&data.id, "formatting", data.formatting)?,
            id: data.id,
            theme_type,
            extends: data.extends.filter(|parent| !parent.trim().is_empty()),
            frameworks: data.frameworks,
        })
    }

    /// Set the parent theme
    pub fn extending(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Replace one of the four body sections
    ///
    /// An unknown section name is logged and ignored; use
    /// [`Theme::set_section`] to have it rejected.
    pub fn with_section(mut self, name: &str, value: Value) -> Self {
        if let Err(e) = self.set_section(name, value) {
            tracing::warn!(theme_id = %self.id, "Ignoring section: {}", e);
        }
        self
    }

    /// Replace one of the four body sections, failing on an unknown name
    pub fn set_section(&mut self, name: &str, value: Value) -> Result<()> {
        let section = match name {
            "styles" => &mut self.styles,
            "patterns" => &mut self.patterns,
            "conventions" => &mut self.conventions,
            "formatting" => &mut self.formatting,
            _ => {
                return Err(ThemeError::ValidationError(format!(
                    "Unknown theme section '{}'; expected one of {}",
                    name,
                    THEME_SECTIONS.join(", ")
                )))
            }
        };
        *section = value;
        Ok(())
    }

    /// Add a framework overlay
    pub fn with_framework_overlay(mut self, framework: impl Into<String>, overlay: Value) -> Self {
        self.frameworks.insert(framework.into(), overlay);
        self
    }

    /// The mergeable body of this theme as a single JSON object
    pub(crate) fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("styles".to_string(), self.styles.clone());
        body.insert("patterns".to_string(), self.patterns.clone());
        body.insert("conventions".to_string(), self.conventions.clone());
        body.insert("formatting".to_string(), self.formatting.clone());
        body.insert(
            "frameworks".to_string(),
            Value::Object(
                self.frameworks
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        );
        Value::Object(body)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn section(theme_id: &str, name: &str, value: Option<Value>) -> Result<Value> {
    match value {
        None | Some(Value::Null) => Ok(empty_object()),
        Some(value @ Value::Object(_)) => Ok(value),
        Some(_) => Err(ThemeError::ValidationError(format!(
            "Section '{}' of theme '{}' must be an object",
            name, theme_id
        ))),
    }
}
