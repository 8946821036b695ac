//! Error types for template composition

use stencil_themes::ThemeError;
use thiserror::Error;

/// Result type alias for composition operations
pub type Result<T> = std::result::Result<T, CompositionError>;

/// Errors that can occur while registering, resolving or composing templates
#[derive(Debug, Error)]
pub enum CompositionError {
    /// Missing or malformed metadata, duplicate ids, invalid configuration
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An `extends` chain revisits a template already in progress
    #[error("Circular inheritance detected: {}", .path.join(" -> "))]
    CircularInheritance {
        /// Ids along the cycle, ending with the revisited id
        path: Vec<String>,
    },

    /// An `extends` chain is longer than the configured maximum
    #[error("Inheritance of '{id}' is {depth} levels deep, maximum is {max_depth}")]
    InheritanceTooDeep {
        /// Template whose chain is too deep
        id: String,
        /// Depth that was reached
        depth: usize,
        /// Configured limit
        max_depth: usize,
    },

    /// A child template extends a parent of an incompatible type
    #[error("Template '{child}' ({child_type}) cannot extend '{parent}' ({parent_type})")]
    IncompatibleTypes {
        /// Child template id
        child: String,
        /// Child template type
        child_type: String,
        /// Parent template id
        parent: String,
        /// Parent template type
        parent_type: String,
    },

    /// Template not found
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Theme not found
    #[error("Theme not found: {0}")]
    ThemeNotFound(String),

    /// No registered template matches the request
    #[error("No candidate templates for framework {framework:?} and type {artifact_type:?}")]
    NoCandidatesFound {
        /// Requested framework
        framework: Option<String>,
        /// Requested artifact type
        artifact_type: Option<String>,
    },

    /// Malformed block markers or handlebars syntax
    #[error("Compile error in '{template}': {message}")]
    Compile {
        /// Template (or compiled unit) name
        template: String,
        /// What went wrong
        message: String,
    },

    /// A bounded I/O or lock wait expired
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Timeout that applied
        timeout_ms: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration loading error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// File watcher error
    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Theme error other than a missing theme
    #[error(transparent)]
    Theme(ThemeError),
}

impl From<ThemeError> for CompositionError {
    fn from(error: ThemeError) -> Self {
        match error {
            ThemeError::NotFound(id) => CompositionError::ThemeNotFound(id),
            other => CompositionError::Theme(other),
        }
    }
}

/// Failure kind surfaced to callers alongside the reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    CircularInheritance,
    InheritanceTooDeep,
    IncompatibleTypes,
    TemplateNotFound,
    ThemeNotFound,
    NoCandidatesFound,
    Compile,
    Timeout,
    Io,
    Serialization,
}

impl CompositionError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompositionError::Validation(_) | CompositionError::Config(_) => ErrorKind::Validation,
            CompositionError::CircularInheritance { .. } => ErrorKind::CircularInheritance,
            CompositionError::InheritanceTooDeep { .. } => ErrorKind::InheritanceTooDeep,
            CompositionError::IncompatibleTypes { .. } => ErrorKind::IncompatibleTypes,
            CompositionError::TemplateNotFound(_) => ErrorKind::TemplateNotFound,
            CompositionError::ThemeNotFound(_) => ErrorKind::ThemeNotFound,
            CompositionError::NoCandidatesFound { .. } => ErrorKind::NoCandidatesFound,
            CompositionError::Compile { .. } => ErrorKind::Compile,
            CompositionError::Timeout { .. } => ErrorKind::Timeout,
            CompositionError::Io(_) | CompositionError::Watch(_) => ErrorKind::Io,
            CompositionError::Json(_) | CompositionError::Yaml(_) => ErrorKind::Serialization,
            CompositionError::Theme(theme) => match theme {
                ThemeError::NotFound(_) => ErrorKind::ThemeNotFound,
                ThemeError::ValidationError(_) => ErrorKind::Validation,
                ThemeError::CircularInheritance { .. } => ErrorKind::CircularInheritance,
                ThemeError::InheritanceTooDeep { .. } => ErrorKind::InheritanceTooDeep,
                ThemeError::Timeout { .. } => ErrorKind::Timeout,
                ThemeError::IoError(_) => ErrorKind::Io,
                ThemeError::SerializationError(_) | ThemeError::JsonError(_) => {
                    ErrorKind::Serialization
                }
            },
        }
    }

    pub(crate) fn compile(template: impl Into<String>, message: impl Into<String>) -> Self {
        CompositionError::Compile {
            template: template.into(),
            message: message.into(),
        }
    }
}
