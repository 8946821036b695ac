//! Data models for templates, generation requests and compositions

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    error::{CompositionError, Result},
    templates::parser::{BlockParser, ParsedBody},
};

/// Complexity level of a template or request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    /// Ordinal position on the low/medium/high scale
    pub fn rank(self) -> u8 {
        match self {
            Complexity::Low => 0,
            Complexity::Medium => 1,
            Complexity::High => 2,
        }
    }

    /// Ordinal distance between two levels
    pub fn distance(self, other: Complexity) -> u8 {
        self.rank().abs_diff(other.rank())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = CompositionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Complexity::Low),
            "medium" => Ok(Complexity::Medium),
            "high" => Ok(Complexity::High),
            other => Err(CompositionError::Validation(format!(
                "Invalid complexity '{}': expected low, medium or high",
                other
            ))),
        }
    }
}

/// Policy for combining a child block with its parent's same-named block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideRule {
    #[default]
    Replace,
    Extend,
    Prepend,
    Append,
    Merge,
}

impl OverrideRule {
    pub fn as_str(self) -> &'static str {
        match self {
            OverrideRule::Replace => "replace",
            OverrideRule::Extend => "extend",
            OverrideRule::Prepend => "prepend",
            OverrideRule::Append => "append",
            OverrideRule::Merge => "merge",
        }
    }
}

impl fmt::Display for OverrideRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideRule {
    type Err = CompositionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(OverrideRule::Replace),
            "extend" => Ok(OverrideRule::Extend),
            "prepend" => Ok(OverrideRule::Prepend),
            "append" => Ok(OverrideRule::Append),
            "merge" => Ok(OverrideRule::Merge),
            other => Err(CompositionError::Validation(format!(
                "Invalid override rule '{}'",
                other
            ))),
        }
    }
}

/// Kind of block, inferred from its name; drives the `merge` rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Imports,
    Methods,
    Properties,
    Setup,
    Teardown,
    Helpers,
    Content,
}

impl BlockType {
    /// Infer the block type from a block name
    pub fn infer(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("import") {
            BlockType::Imports
        } else if name.contains("method") {
            BlockType::Methods
        } else if name.contains("propert") || name.contains("field") || name.contains("attribute")
        {
            BlockType::Properties
        } else if name.contains("setup") || name.contains("before") {
            BlockType::Setup
        } else if name.contains("teardown") || name.contains("after") || name.contains("cleanup") {
            BlockType::Teardown
        } else if name.contains("helper") || name.contains("util") {
            BlockType::Helpers
        } else {
            BlockType::Content
        }
    }
}

/// A named, independently overridable section of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub content: String,
    pub block_type: BlockType,
    /// Marker attributes other than `rule`
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Rule declared inline on the marker
    #[serde(default)]
    pub rule: Option<OverrideRule>,
}

impl Block {
    /// Create a block, inferring its type from the name
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            block_type: BlockType::infer(&name),
            name,
            content: content.into(),
            metadata: BTreeMap::new(),
            rule: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_rule(mut self, rule: OverrideRule) -> Self {
        self.rule = Some(rule);
        self
    }
}

/// Template record as read from a template source file or built in code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub template_type: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub framework: Vec<String>,
    #[serde(default)]
    pub complexity: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub validation: Option<Value>,
    #[serde(default)]
    pub defaults: Option<Value>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, OverrideRule>,
    /// Abstract templates only exist to be extended and are never candidates
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
}

impl TemplateData {
    pub fn new(id: impl Into<String>, template_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template_type: Some(template_type.into()),
            ..Default::default()
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework.push(framework.into());
        self
    }

    pub fn with_complexity(mut self, complexity: impl Into<String>) -> Self {
        self.complexity = Some(complexity.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn extending(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn with_override(mut self, block: impl Into<String>, rule: OverrideRule) -> Self {
        self.overrides.insert(block.into(), rule);
        self
    }

    pub fn with_defaults(mut self, defaults: Value) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn as_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

/// Selection metadata of a template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateMetadata {
    pub frameworks: BTreeSet<String>,
    pub template_type: String,
    pub complexity: Complexity,
    pub features: BTreeSet<String>,
    pub theme: Option<String>,
    pub description: Option<String>,
    pub examples: Vec<String>,
    pub validation: Option<Value>,
    pub is_abstract: bool,
}

/// Inheritance directive of a template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InheritanceSpec {
    pub extends: Option<String>,
    pub overrides: BTreeMap<String, OverrideRule>,
}

/// A validated template with its body parsed into layout nodes and blocks
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub content: String,
    pub metadata: TemplateMetadata,
    pub inheritance: InheritanceSpec,
    /// Default variables, always a JSON object
    pub defaults: Value,
    pub(crate) body: ParsedBody,
}

impl Template {
    /// Validate a template record and parse its body
    ///
    /// Required: a non-empty id, a type and at least one framework. Names are
    /// lowercased; complexity defaults to medium.
    pub fn from_data(data: TemplateData) -> Result<Self> {
        let id = data.id.trim().to_string();
        if id.is_empty() {
            return Err(CompositionError::Validation(
                "Template id must not be empty".to_string(),
            ));
        }

        let template_type = data
            .template_type
            .as_deref()
            .map(normalize)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CompositionError::Validation(format!("Template '{}' is missing a type", id))
            })?;

        let frameworks: BTreeSet<String> = data
            .framework
            .iter()
            .map(|f| normalize(f))
            .filter(|f| !f.is_empty())
            .collect();
        if frameworks.is_empty() {
            return Err(CompositionError::Validation(format!(
                "Template '{}' must declare at least one framework",
                id
            )));
        }

        let complexity = match data.complexity.as_deref() {
            Some(value) => value.parse()?,
            None => Complexity::Medium,
        };

        let defaults = match data.defaults {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(Value::Object(map)) => Value::Object(map),
            Some(_) => {
                return Err(CompositionError::Validation(format!(
                    "Template '{}' defaults must be an object",
                    id
                )))
            }
        };

        let extends = data
            .extends
            .map(|parent| parent.trim().to_string())
            .filter(|parent| !parent.is_empty());
        if extends.as_deref() == Some(id.as_str()) {
            return Err(CompositionError::CircularInheritance {
                path: vec![id.clone(), id],
            });
        }

        let body = BlockParser::parse(&id, &data.content)?;

        Ok(Self {
            name: data.name.unwrap_or_else(|| id.clone()),
            content: data.content,
            metadata: TemplateMetadata {
                frameworks,
                template_type,
                complexity,
                features: data.features.iter().map(|f| normalize(f)).collect(),
                theme: data.theme.as_deref().map(normalize),
                description: data.description.filter(|d| !d.trim().is_empty()),
                examples: data.examples,
                validation: data.validation.filter(|v| !v.is_null()),
                is_abstract: data.is_abstract,
            },
            inheritance: InheritanceSpec {
                extends,
                overrides: data.overrides,
            },
            defaults,
            body,
            id,
        })
    }

    /// Blocks declared by this template, in declaration order
    pub fn blocks(&self) -> &[Block] {
        &self.body.blocks
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.body.blocks.iter().find(|b| b.name == name)
    }

    pub fn parent(&self) -> Option<&str> {
        self.inheritance.extends.as_deref()
    }

    /// Rule for combining one of this template's blocks with the parent's
    pub fn override_rule(&self, block: &Block) -> OverrideRule {
        self.inheritance
            .overrides
            .get(&block.name)
            .copied()
            .or(block.rule)
            .unwrap_or_default()
    }

    pub(crate) fn body(&self) -> &ParsedBody {
        &self.body
    }
}

pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// A generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(rename = "type", default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub complexity: Option<Complexity>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub theme: Option<String>,
    /// Feature or artifact name; source of convention-cased identifiers
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form template variables
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Render data for the compiler: the variables plus the request fields
    pub fn to_value(&self) -> Value {
        let mut data = self.variables.clone();
        let fields = [
            ("framework", self.framework.clone()),
            ("type", self.artifact_type.clone()),
            ("complexity", self.complexity.map(|c| c.to_string())),
            ("name", self.name.clone()),
            ("description", self.description.clone()),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                data.entry(key.to_string()).or_insert(Value::String(value));
            }
        }
        if !self.features.is_empty() {
            data.entry("features".to_string()).or_insert_with(|| {
                Value::Array(self.features.iter().cloned().map(Value::String).collect())
            });
        }
        Value::Object(data)
    }
}

/// How a composition was assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositionStrategy {
    SingleTemplate,
    MultiTemplate,
    Hybrid,
}

impl CompositionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            CompositionStrategy::SingleTemplate => "single-template",
            CompositionStrategy::MultiTemplate => "multi-template",
            CompositionStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for CompositionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A supplemental template folded into a composition for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplement {
    pub template_id: String,
    pub feature: String,
    pub score: f64,
}

/// The resolved, themed and compiled result of one generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub id: Uuid,
    pub primary_template_id: String,
    pub supplements: Vec<Supplement>,
    pub strategy: CompositionStrategy,
    pub content: String,
    pub context: GenerationContext,
    pub theme_id: Option<String>,
    pub score: f64,
    pub reasoning: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Composition {
    /// Ids of every template that contributed to this composition
    pub fn template_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_template_id.as_str())
            .chain(self.supplements.iter().map(|s| s.template_id.as_str()))
    }
}
