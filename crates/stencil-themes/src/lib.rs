//! Stencil Theme System
//!
//! Themes carry the conventions blended into a generation context: styles,
//! patterns, naming conventions and formatting. Each theme may extend one
//! parent; chains are deep-merged child over parent, with optional
//! per-framework overlays merged on top.

pub mod error;
pub mod loader;
pub mod manager;
pub mod naming;
pub mod registry;
pub mod resolver;
pub mod types;

pub use error::{Result, ThemeError};
pub use loader::ThemeLoader;
pub use manager::{ThemeManager, ThemeSelection, ThemedContext};
pub use naming::CaseTransform;
pub use registry::ThemeRegistry;
pub use resolver::{deep_merge, ResolvedTheme, ThemeResolver};
pub use types::{Theme, ThemeData, ThemeType};
