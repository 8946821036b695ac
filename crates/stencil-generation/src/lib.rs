//! Template composition engine for Stencil
//!
//! Picks the best templates for a generation request, resolves their
//! block-level inheritance chains, blends in theme conventions and compiles
//! the result. Usage analytics recorded per composition feed back into
//! later template scoring.

pub mod analysis;
pub mod analytics;
pub mod compatibility;
pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod scoring_system;
pub mod telemetry;
pub mod templates;

// Re-export public API
pub use analysis::{extract_features, ContextAnalysis};
pub use analytics::{
    AnalyticsBackend, AnalyticsFlusher, AnalyticsRecord, AnalyticsStore, AnalyticsSummary,
    JsonFileBackend, MemoryBackend, UsageSample,
};
pub use composer::{
    CompositionCache, CompositionOptions, PipelineStage, StrategySelector, TemplateComposer,
};
pub use config::{AnalyticsConfig, ConfigLoader, EngineConfig, LoggingConfig};
pub use engine::GenerationEngine;
pub use error::{CompositionError, ErrorKind, Result};
pub use models::{
    Block, BlockType, Complexity, Composition, CompositionStrategy, GenerationContext,
    InheritanceSpec, OverrideRule, Supplement, Template, TemplateData, TemplateMetadata,
};
pub use scoring_system::{
    FactorScore, RankedCandidate, ScoreComponent, ScoreFactor, ScoringEngine, ScoringWeights,
    TemplateScore, TemplateScorer,
};
pub use telemetry::init_tracing;
pub use templates::{
    BlockMerger, BlockParser, CompiledTemplate, HelperRegistry, InheritanceGraph,
    InheritanceResolver, TemplateChangeEvent, TemplateCompiler, TemplateLoader, TemplateStore,
    TemplateWatcher,
};
