//! Template parsing, storage, inheritance and compilation

pub mod compiler;
pub mod graph;
pub mod loader;
pub mod merge;
pub mod parser;
pub mod resolver;
pub mod store;
pub mod watcher;

pub use compiler::{CompiledTemplate, HelperRegistry, TemplateCompiler};
pub use graph::{InheritanceGraph, InheritanceNode, DEFAULT_MAX_DEPTH};
pub use loader::TemplateLoader;
pub use merge::BlockMerger;
pub use parser::{BlockParser, BodyNode, ParsedBody};
pub use resolver::{InheritanceResolver, ResolvedSource};
pub use store::{Registration, TemplateStore};
pub use watcher::{TemplateChangeEvent, TemplateWatcher};
