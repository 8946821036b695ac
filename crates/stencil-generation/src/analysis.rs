//! Request analysis
//!
//! Normalizes a [`GenerationContext`] into the form the scoring engine and
//! orchestrator work with, and pulls extra features out of the free-text
//! description.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::models::{normalize, Complexity, GenerationContext};

/// Features recognized in descriptions, with the words that signal them
static FEATURE_KEYWORDS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("forms", r"(?i)\b(forms?|inputs?|submit)\b"),
        ("api", r"(?i)\b(api|endpoints?|rest|graphql|requests?)\b"),
        ("validation", r"(?i)\bvalidat\w*\b"),
        ("error", r"(?i)\b(errors?|exceptions?|failures?)\b"),
        ("auth", r"(?i)\b(auth\w*|login|logout|sign[- ]?in)\b"),
        ("navigation", r"(?i)\b(navigat\w*|routing|routes?)\b"),
        ("upload", r"(?i)\buploads?\w*\b"),
        ("accessibility", r"(?i)\b(a11y|accessib\w*|aria)\b"),
    ]
    .into_iter()
    .map(|(feature, pattern)| {
        (
            feature,
            Regex::new(pattern).expect("feature keyword pattern is valid"),
        )
    })
    .collect()
});

/// Features mentioned in free text, in keyword table order
pub fn extract_features(text: &str) -> Vec<String> {
    FEATURE_KEYWORDS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(text))
        .map(|(feature, _)| feature.to_string())
        .collect()
}

/// A normalized generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextAnalysis {
    pub framework: Option<String>,
    pub artifact_type: Option<String>,
    pub complexity: Option<Complexity>,
    /// Explicit features first, then ones found in the description
    pub features: Vec<String>,
    /// Requested theme, or the active theme when the request names none
    pub theme: Option<String>,
}

impl ContextAnalysis {
    /// Analyze `context`; `theme` overrides the context's theme
    pub fn analyze(context: &GenerationContext, theme: Option<&str>) -> Self {
        let clean = |value: Option<&str>| value.map(normalize).filter(|v| !v.is_empty());

        let mut features: Vec<String> = Vec::new();
        let described = context
            .description
            .as_deref()
            .map(extract_features)
            .unwrap_or_default();
        for feature in context
            .features
            .iter()
            .map(|f| normalize(f))
            .chain(described)
        {
            if !feature.is_empty() && !features.contains(&feature) {
                features.push(feature);
            }
        }

        Self {
            framework: clean(context.framework.as_deref()),
            artifact_type: clean(context.artifact_type.as_deref()),
            complexity: context.complexity,
            features,
            theme: clean(theme.or(context.theme.as_deref())),
        }
    }

    /// Deterministic cache key over framework, type, sorted features,
    /// complexity and theme
    pub fn cache_key(&self) -> String {
        let mut features = self.features.clone();
        features.sort();
        let canonical = json!({
            "framework": self.framework,
            "type": self.artifact_type,
            "features": features,
            "complexity": self.complexity,
            "theme": self.theme,
        });
        hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
    }
}
