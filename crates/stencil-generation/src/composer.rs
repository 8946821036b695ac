//! Composition orchestrator
//!
//! Drives one generation request through a fixed pipeline:
//!
//! ```text
//! Analyze -> FindCandidates -> Score -> SelectStrategy -> ResolveInheritance
//!         -> ApplyTheme -> Compile -> RecordAnalytics -> Done
//! ```
//!
//! A failing stage aborts the request before anything is cached or recorded.
//! Cache hits return the stored composition, carrying the caller's context,
//! without touching analytics.

use std::{fmt, num::NonZeroUsize, sync::Arc, time::Instant};

use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use stencil_themes::{deep_merge, ThemeManager, ThemeSelection};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    analysis::ContextAnalysis,
    analytics::{AnalyticsStore, UsageSample},
    compatibility,
    error::{CompositionError, Result},
    models::{
        Block, Composition, CompositionStrategy, GenerationContext, OverrideRule, Supplement,
        Template,
    },
    scoring_system::{RankedCandidate, ScoringEngine},
    templates::{InheritanceResolver, ResolvedSource, TemplateStore},
};

/// Pipeline stage of a composition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Analyze,
    FindCandidates,
    Score,
    SelectStrategy,
    ResolveInheritance,
    ApplyTheme,
    Compile,
    RecordAnalytics,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Analyze => "analyze",
            PipelineStage::FindCandidates => "find_candidates",
            PipelineStage::Score => "score",
            PipelineStage::SelectStrategy => "select_strategy",
            PipelineStage::ResolveInheritance => "resolve_inheritance",
            PipelineStage::ApplyTheme => "apply_theme",
            PipelineStage::Compile => "compile",
            PipelineStage::RecordAnalytics => "record_analytics",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Per-request composition options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionOptions {
    /// Always use a single template
    pub force_single: bool,
    /// Serve from and store into the composition cache
    pub use_cache: bool,
    /// Theme to apply; overrides the context's theme and the active theme
    pub theme: Option<String>,
}

impl Default for CompositionOptions {
    fn default() -> Self {
        Self {
            force_single: false,
            use_cache: true,
            theme: None,
        }
    }
}

impl CompositionOptions {
    pub fn single() -> Self {
        Self {
            force_single: true,
            ..Self::default()
        }
    }

    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }
}

/// Picks a composition strategy for an analyzed request
pub struct StrategySelector;

impl StrategySelector {
    pub fn select(analysis: &ContextAnalysis, options: &CompositionOptions) -> CompositionStrategy {
        use crate::models::Complexity::*;

        if options.force_single || analysis.complexity == Some(Low) {
            CompositionStrategy::SingleTemplate
        } else if analysis.features.len() > 3 || analysis.complexity == Some(High) {
            CompositionStrategy::MultiTemplate
        } else if analysis.complexity == Some(Medium) {
            CompositionStrategy::Hybrid
        } else {
            CompositionStrategy::SingleTemplate
        }
    }

    /// How many supplements `strategy` allows
    pub fn supplement_limit(strategy: CompositionStrategy, max_supplements: usize) -> usize {
        match strategy {
            CompositionStrategy::SingleTemplate => 0,
            CompositionStrategy::Hybrid => max_supplements.min(1),
            CompositionStrategy::MultiTemplate => max_supplements,
        }
    }
}

/// LRU cache of finished compositions keyed by request hash
///
/// Every clear or invalidation bumps an epoch. A composition computed
/// before the bump is refused on insert, so a request racing a reload never
/// repopulates the cache with the replaced version.
#[derive(Debug)]
pub struct CompositionCache {
    state: Mutex<CacheState>,
}

#[derive(Debug)]
struct CacheState {
    entries: LruCache<String, Arc<Composition>>,
    epoch: u64,
}

impl CompositionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                epoch: 0,
            }),
        }
    }

    /// Current epoch; capture it before computing a composition to insert
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    pub fn get(&self, key: &str) -> Option<Arc<Composition>> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Insert unless the cache was cleared or invalidated since
    /// `observed_epoch`; returns whether the entry was stored
    pub fn insert(
        &self,
        key: String,
        composition: Arc<Composition>,
        observed_epoch: u64,
    ) -> bool {
        let mut state = self.state.lock();
        if state.epoch != observed_epoch {
            return false;
        }
        state.entries.put(key, composition);
        true
    }

    /// Drop every entry that used one of `template_ids`
    pub fn invalidate_templates(&self, template_ids: &[String]) -> usize {
        let mut state = self.state.lock();
        state.epoch += 1;
        let stale: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, composition)| {
                composition
                    .template_ids()
                    .any(|id| template_ids.iter().any(|t| t == id))
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            state.entries.pop(key);
        }
        stale.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs composition requests against shared engine state
#[derive(Debug)]
pub struct TemplateComposer {
    store: Arc<TemplateStore>,
    resolver: Arc<InheritanceResolver>,
    themes: ThemeManager,
    scoring: Arc<ScoringEngine>,
    analytics: Arc<AnalyticsStore>,
    cache: CompositionCache,
    max_supplements: usize,
}

impl TemplateComposer {
    pub fn new(
        store: Arc<TemplateStore>,
        resolver: Arc<InheritanceResolver>,
        themes: ThemeManager,
        scoring: Arc<ScoringEngine>,
        analytics: Arc<AnalyticsStore>,
        cache_capacity: usize,
        max_supplements: usize,
    ) -> Self {
        Self {
            store,
            resolver,
            themes,
            scoring,
            analytics,
            cache: CompositionCache::new(cache_capacity),
            max_supplements,
        }
    }

    pub fn cache(&self) -> &CompositionCache {
        &self.cache
    }

    /// Compose an artifact for `context`
    pub fn compose(
        &self,
        context: &GenerationContext,
        options: &CompositionOptions,
    ) -> Result<Composition> {
        let started = Instant::now();
        let mut stage = PipelineStage::Analyze;

        match self.run(context, options, started, &mut stage) {
            Ok(composition) => Ok(composition),
            Err(e) => {
                warn!(
                    stage = %stage,
                    kind = ?e.kind(),
                    "Composition failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    fn run(
        &self,
        context: &GenerationContext,
        options: &CompositionOptions,
        started: Instant,
        stage: &mut PipelineStage,
    ) -> Result<Composition> {
        let active = self.themes.active_theme_id();
        let requested_theme = options
            .theme
            .as_deref()
            .or(context.theme.as_deref())
            .or(active.as_deref());
        let analysis = ContextAnalysis::analyze(context, requested_theme);
        let cache_key = analysis.cache_key();
        let cache_epoch = self.cache.epoch();
        if options.use_cache {
            if let Some(hit) = self.cache.get(&cache_key) {
                debug!(template_id = %hit.primary_template_id, "Composition cache hit");
                let mut composition = hit.as_ref().clone();
                composition.context = context.clone();
                return Ok(composition);
            }
        }

        advance(stage, PipelineStage::FindCandidates);
        let candidates = self.find_candidates(&analysis)?;

        advance(stage, PipelineStage::Score);
        let ranked = self.scoring.rank(&candidates, &analysis, &self.analytics);

        advance(stage, PipelineStage::SelectStrategy);
        let strategy = StrategySelector::select(&analysis, options);
        let primary = ranked.first().ok_or_else(|| no_candidates(&analysis))?;
        let supplements = self.select_supplements(&ranked, &analysis, strategy);
        debug!(
            template_id = %primary.template.id,
            score = primary.score.total,
            strategy = %strategy,
            supplements = supplements.len(),
            "Selected templates"
        );

        advance(stage, PipelineStage::ResolveInheritance);
        let mut source = self.resolver.resolve_source(&primary.template.id)?.as_ref().clone();
        for supplement in &supplements {
            let supplemental = self.resolver.resolve_source(&supplement.template_id)?;
            fold_supplement(&mut source, &supplemental, &supplement.feature);
        }

        advance(stage, PipelineStage::ApplyTheme);
        let mut data = source.defaults.clone();
        deep_merge(&mut data, &context.to_value());
        let themed = self.themes.apply_theme(
            &data,
            ThemeSelection {
                theme: requested_theme.map(str::trim),
                framework: analysis.framework.as_deref(),
            },
        )?;

        advance(stage, PipelineStage::Compile);
        let content = self
            .resolver
            .compiler()
            .compile(&primary.template.id, &source.assemble())?
            .render(&themed.data)?;

        let mut reasoning = vec![format!(
            "{} strategy for {} requested feature(s)",
            strategy,
            analysis.features.len()
        )];
        reasoning.extend(primary.score.reasoning());
        reasoning.extend(supplements.iter().map(|s| {
            format!("{} supplies feature '{}'", s.template_id, s.feature)
        }));

        let composition = Composition {
            id: Uuid::new_v4(),
            primary_template_id: primary.template.id.clone(),
            supplements,
            strategy,
            content,
            context: context.clone(),
            theme_id: themed.theme.as_ref().map(|t| t.id.clone()),
            score: primary.score.total,
            reasoning,
            created_at: Utc::now(),
        };

        advance(stage, PipelineStage::RecordAnalytics);
        let latency = started.elapsed();
        self.analytics.record(UsageSample::success(
            composition.primary_template_id.clone(),
            composition.score,
            latency,
        ));
        for supplement in &composition.supplements {
            self.analytics.record(UsageSample::success(
                supplement.template_id.clone(),
                supplement.score,
                latency,
            ));
        }
        if options.use_cache
            && !self
                .cache
                .insert(cache_key, Arc::new(composition.clone()), cache_epoch)
        {
            debug!(
                template_id = %composition.primary_template_id,
                "Templates changed during composition; result not cached"
            );
        }

        advance(stage, PipelineStage::Done);
        info!(
            template_id = %composition.primary_template_id,
            strategy = %composition.strategy,
            score = composition.score,
            latency_ms = latency.as_millis() as u64,
            "Composed template"
        );
        Ok(composition)
    }

    fn find_candidates(&self, analysis: &ContextAnalysis) -> Result<Vec<Arc<Template>>> {
        let candidates: Vec<Arc<Template>> = self
            .store
            .all()?
            .into_iter()
            .filter(|template| is_candidate(template, analysis))
            .collect();
        if candidates.is_empty() {
            return Err(no_candidates(analysis));
        }
        debug!(count = candidates.len(), "Found candidate templates");
        Ok(candidates)
    }

    /// One supplement per requested feature the primary lacks, each the
    /// best-ranked remaining candidate declaring it
    fn select_supplements(
        &self,
        ranked: &[RankedCandidate],
        analysis: &ContextAnalysis,
        strategy: CompositionStrategy,
    ) -> Vec<Supplement> {
        let limit = StrategySelector::supplement_limit(strategy, self.max_supplements);
        let Some(primary) = ranked.first() else {
            return Vec::new();
        };
        let mut supplements: Vec<Supplement> = Vec::new();

        for feature in &analysis.features {
            if supplements.len() >= limit {
                break;
            }
            if primary.template.metadata.features.contains(feature) {
                continue;
            }
            let candidate = ranked.iter().skip(1).find(|c| {
                c.template.metadata.features.contains(feature)
                    && !supplements.iter().any(|s| s.template_id == c.template.id)
            });
            if let Some(candidate) = candidate {
                supplements.push(Supplement {
                    template_id: candidate.template.id.clone(),
                    feature: feature.clone(),
                    score: candidate.score.total,
                });
            }
        }

        supplements
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    debug!(from = %stage, to = %next, "Pipeline stage");
    *stage = next;
}

fn no_candidates(analysis: &ContextAnalysis) -> CompositionError {
    CompositionError::NoCandidatesFound {
        framework: analysis.framework.clone(),
        artifact_type: analysis.artifact_type.clone(),
    }
}

/// Whether `template` may serve a request at all
fn is_candidate(template: &Template, analysis: &ContextAnalysis) -> bool {
    if template.metadata.is_abstract {
        return false;
    }

    let framework_ok = analysis.framework.as_deref().map_or(true, |requested| {
        template.metadata.frameworks.iter().any(|f| {
            f == requested
                || compatibility::is_universal_framework(f)
                || compatibility::same_framework_family(f, requested)
        })
    });

    let type_ok = analysis.artifact_type.as_deref().map_or(true, |requested| {
        let own = template.metadata.template_type.as_str();
        own == requested
            || compatibility::types_compatible(own, requested)
            || own == "general"
    });

    framework_ok && type_ok
}

/// Fold a supplement's blocks into the primary's resolved source
fn fold_supplement(source: &mut ResolvedSource, supplement: &ResolvedSource, feature: &str) {
    if supplement.blocks.is_empty() {
        let body = supplement.assemble();
        if !body.trim().is_empty() {
            source.merge_block(
                &Block::new(format!("feature-{}", feature), body),
                OverrideRule::Merge,
            );
        }
    } else {
        for block in &supplement.blocks {
            source.merge_block(block, OverrideRule::Merge);
        }
    }

    let mut defaults = supplement.defaults.clone();
    deep_merge(&mut defaults, &source.defaults);
    source.defaults = defaults;
}
