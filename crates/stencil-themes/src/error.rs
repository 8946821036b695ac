//! Error types for the themes module

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("Theme not found: {0}")]
    NotFound(String),

    #[error("Theme validation failed: {0}")]
    ValidationError(String),

    #[error("Circular theme inheritance: {}", .path.join(" -> "))]
    CircularInheritance { path: Vec<String> },

    #[error("Theme inheritance of '{id}' exceeds maximum depth {max_depth}")]
    InheritanceTooDeep { id: String, max_depth: usize },

    #[error("Timed out after {timeout_ms}ms reading {}", .path.display())]
    Timeout { path: PathBuf, timeout_ms: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ThemeError>;
