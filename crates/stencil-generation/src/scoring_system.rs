//! Scoring system for template selection
//!
//! Each candidate template gets one score in [0, 1] per factor from a
//! pluggable [`TemplateScorer`]; the total is the weighted sum. Weights are
//! validated to sum to 1.0 so the total also stays in [0, 1].

use std::{cmp::Ordering, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::ContextAnalysis,
    analytics::{AnalyticsRecord, AnalyticsStore},
    compatibility,
    error::{CompositionError, Result},
    models::Template,
};

/// Tolerance for the weight sum check
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// A scoring factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    FrameworkMatch,
    TypeMatch,
    ComplexityMatch,
    ThemeMatch,
    QualityScore,
    UsageHistory,
    Performance,
}

impl ScoreFactor {
    pub const ALL: [ScoreFactor; 7] = [
        ScoreFactor::FrameworkMatch,
        ScoreFactor::TypeMatch,
        ScoreFactor::ComplexityMatch,
        ScoreFactor::ThemeMatch,
        ScoreFactor::QualityScore,
        ScoreFactor::UsageHistory,
        ScoreFactor::Performance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScoreFactor::FrameworkMatch => "framework_match",
            ScoreFactor::TypeMatch => "type_match",
            ScoreFactor::ComplexityMatch => "complexity_match",
            ScoreFactor::ThemeMatch => "theme_match",
            ScoreFactor::QualityScore => "quality_score",
            ScoreFactor::UsageHistory => "usage_history",
            ScoreFactor::Performance => "performance",
        }
    }
}

impl fmt::Display for ScoreFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Weight for framework match
    pub framework_match: f64,
    /// Weight for artifact type match
    pub type_match: f64,
    /// Weight for complexity match
    pub complexity_match: f64,
    /// Weight for theme match
    pub theme_match: f64,
    /// Weight for template quality heuristics
    pub quality_score: f64,
    /// Weight for past success
    pub usage_history: f64,
    /// Weight for measured latency
    pub performance: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            framework_match: 0.25,
            type_match: 0.20,
            complexity_match: 0.15,
            theme_match: 0.10,
            quality_score: 0.15,
            usage_history: 0.10,
            performance: 0.05,
        }
    }
}

impl ScoringWeights {
    pub fn weight(&self, factor: ScoreFactor) -> f64 {
        match factor {
            ScoreFactor::FrameworkMatch => self.framework_match,
            ScoreFactor::TypeMatch => self.type_match,
            ScoreFactor::ComplexityMatch => self.complexity_match,
            ScoreFactor::ThemeMatch => self.theme_match,
            ScoreFactor::QualityScore => self.quality_score,
            ScoreFactor::UsageHistory => self.usage_history,
            ScoreFactor::Performance => self.performance,
        }
    }

    /// Weights must be within [0, 1] and sum to 1.0
    pub fn validate(&self) -> Result<()> {
        for factor in ScoreFactor::ALL {
            let weight = self.weight(factor);
            if !(0.0..=1.0).contains(&weight) {
                return Err(CompositionError::Validation(format!(
                    "Scoring weight {} must be within [0, 1], got {}",
                    factor, weight
                )));
            }
        }
        let sum: f64 = ScoreFactor::ALL.iter().map(|f| self.weight(*f)).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(CompositionError::Validation(format!(
                "Scoring weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Score of one factor with the reason behind it
#[derive(Debug, Clone, PartialEq)]
pub struct FactorScore {
    pub score: f64,
    pub reason: String,
}

impl FactorScore {
    pub fn new(score: f64, reason: impl Into<String>) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}

/// Computes one factor for a candidate template
pub trait TemplateScorer: Send + Sync {
    fn factor(&self) -> ScoreFactor;

    fn score(
        &self,
        template: &Template,
        analysis: &ContextAnalysis,
        history: Option<&AnalyticsRecord>,
    ) -> FactorScore;
}

/// A single score component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreComponent {
    pub factor: ScoreFactor,
    /// Score value (0.0 to 1.0)
    pub score: f64,
    pub weight: f64,
    pub reason: String,
}

/// Full score of one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateScore {
    pub template_id: String,
    pub total: f64,
    pub components: Vec<ScoreComponent>,
}

impl TemplateScore {
    pub fn component(&self, factor: ScoreFactor) -> Option<&ScoreComponent> {
        self.components.iter().find(|c| c.factor == factor)
    }

    /// Human-readable reasons, one per factor
    pub fn reasoning(&self) -> Vec<String> {
        self.components
            .iter()
            .map(|c| format!("{}: {:.2} ({})", c.factor, c.score, c.reason))
            .collect()
    }
}

/// A scored candidate
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub template: Arc<Template>,
    pub score: TemplateScore,
}

struct FrameworkScorer;

impl TemplateScorer for FrameworkScorer {
    fn factor(&self) -> ScoreFactor {
        ScoreFactor::FrameworkMatch
    }

    fn score(
        &self,
        template: &Template,
        analysis: &ContextAnalysis,
        _: Option<&AnalyticsRecord>,
    ) -> FactorScore {
        let Some(requested) = analysis.framework.as_deref() else {
            return FactorScore::new(0.5, "no framework requested");
        };
        let frameworks = &template.metadata.frameworks;
        if frameworks.contains(requested) {
            FactorScore::new(1.0, format!("supports {}", requested))
        } else if frameworks
            .iter()
            .any(|f| compatibility::is_universal_framework(f))
        {
            FactorScore::new(0.8, "universal template")
        } else if frameworks
            .iter()
            .any(|f| compatibility::same_framework_family(f, requested))
        {
            FactorScore::new(0.6, format!("same framework family as {}", requested))
        } else {
            FactorScore::new(0.2, format!("does not target {}", requested))
        }
    }
}

struct TypeScorer;

impl TemplateScorer for TypeScorer {
    fn factor(&self) -> ScoreFactor {
        ScoreFactor::TypeMatch
    }

    fn score(
        &self,
        template: &Template,
        analysis: &ContextAnalysis,
        _: Option<&AnalyticsRecord>,
    ) -> FactorScore {
        let Some(requested) = analysis.artifact_type.as_deref() else {
            return FactorScore::new(0.5, "no type requested");
        };
        let own = template.metadata.template_type.as_str();
        if own == requested {
            FactorScore::new(1.0, format!("is a {}", requested))
        } else if compatibility::types_compatible(own, requested) {
            FactorScore::new(0.7, format!("{} is compatible with {}", own, requested))
        } else if compatibility::is_general_type(own) || compatibility::is_general_type(requested) {
            FactorScore::new(0.6, "general purpose")
        } else {
            FactorScore::new(0.3, format!("{} does not match {}", own, requested))
        }
    }
}

struct ComplexityScorer;

impl TemplateScorer for ComplexityScorer {
    fn factor(&self) -> ScoreFactor {
        ScoreFactor::ComplexityMatch
    }

    fn score(
        &self,
        template: &Template,
        analysis: &ContextAnalysis,
        _: Option<&AnalyticsRecord>,
    ) -> FactorScore {
        let Some(requested) = analysis.complexity else {
            return FactorScore::new(0.5, "no complexity requested");
        };
        let own = template.metadata.complexity;
        let score = match own.distance(requested) {
            0 => 1.0,
            1 => 0.7,
            _ => 0.4,
        };
        FactorScore::new(score, format!("{} for a {} request", own, requested))
    }
}

struct ThemeScorer;

impl TemplateScorer for ThemeScorer {
    fn factor(&self) -> ScoreFactor {
        ScoreFactor::ThemeMatch
    }

    fn score(
        &self,
        template: &Template,
        analysis: &ContextAnalysis,
        _: Option<&AnalyticsRecord>,
    ) -> FactorScore {
        let Some(requested) = analysis.theme.as_deref() else {
            return FactorScore::new(0.5, "no theme requested");
        };
        match template.metadata.theme.as_deref() {
            Some(own) if own == requested => {
                FactorScore::new(1.0, format!("built for {}", requested))
            }
            Some(own) if compatibility::same_theme_family(own, requested) => {
                FactorScore::new(0.8, format!("{} is in the same family as {}", own, requested))
            }
            _ => FactorScore::new(0.4, format!("not built for {}", requested)),
        }
    }
}

struct QualityScorer;

impl TemplateScorer for QualityScorer {
    fn factor(&self) -> ScoreFactor {
        ScoreFactor::QualityScore
    }

    fn score(
        &self,
        template: &Template,
        _: &ContextAnalysis,
        _: Option<&AnalyticsRecord>,
    ) -> FactorScore {
        let checks = [
            (template.content.len() > 100, "substantial content"),
            (template.metadata.description.is_some(), "described"),
            (!template.metadata.examples.is_empty(), "has examples"),
            (!template.blocks().is_empty(), "has blocks"),
            (template.metadata.validation.is_some(), "has validation"),
        ];
        let passed: Vec<&str> = checks
            .iter()
            .filter(|(ok, _)| *ok)
            .map(|(_, label)| *label)
            .collect();
        let reason = if passed.is_empty() {
            "baseline".to_string()
        } else {
            passed.join(", ")
        };
        FactorScore::new(0.5 + 0.1 * passed.len() as f64, reason)
    }
}

struct UsageHistoryScorer;

impl TemplateScorer for UsageHistoryScorer {
    fn factor(&self) -> ScoreFactor {
        ScoreFactor::UsageHistory
    }

    fn score(
        &self,
        _: &Template,
        _: &ContextAnalysis,
        history: Option<&AnalyticsRecord>,
    ) -> FactorScore {
        match history.filter(|h| h.total > 0) {
            None => FactorScore::new(0.5, "no usage history"),
            Some(record) => {
                let bonus = (record.total as f64 / 100.0).min(0.2);
                FactorScore::new(
                    (record.success_rate() + bonus).min(1.0),
                    format!(
                        "{} of {} uses succeeded",
                        record.successful, record.total
                    ),
                )
            }
        }
    }
}

struct PerformanceScorer;

impl TemplateScorer for PerformanceScorer {
    fn factor(&self) -> ScoreFactor {
        ScoreFactor::Performance
    }

    fn score(
        &self,
        _: &Template,
        _: &ContextAnalysis,
        history: Option<&AnalyticsRecord>,
    ) -> FactorScore {
        let Some(record) = history.filter(|h| h.total > 0) else {
            return FactorScore::new(0.7, "not measured");
        };
        let latency = record.avg_latency_ms;
        let score = if latency > 1000.0 {
            0.5
        } else if latency > 500.0 {
            0.7
        } else if latency > 100.0 {
            0.9
        } else {
            1.0
        };
        FactorScore::new(score, format!("averages {:.0}ms", latency))
    }
}

/// Weighted multi-factor scoring engine
pub struct ScoringEngine {
    weights: ScoringWeights,
    scorers: Vec<Box<dyn TemplateScorer>>,
}

impl fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("weights", &self.weights)
            .field(
                "factors",
                &self.scorers.iter().map(|s| s.factor()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ScoringEngine {
    /// Engine with default weights and the built-in scorers
    pub fn new() -> Self {
        Self {
            weights: ScoringWeights::default(),
            scorers: vec![
                Box::new(FrameworkScorer),
                Box::new(TypeScorer),
                Box::new(ComplexityScorer),
                Box::new(ThemeScorer),
                Box::new(QualityScorer),
                Box::new(UsageHistoryScorer),
                Box::new(PerformanceScorer),
            ],
        }
    }

    pub fn with_weights(weights: ScoringWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self {
            weights,
            ..Self::new()
        })
    }

    /// Replace the scorer for the factor `scorer` computes
    pub fn with_scorer(mut self, scorer: Box<dyn TemplateScorer>) -> Self {
        let factor = scorer.factor();
        match self.scorers.iter().position(|s| s.factor() == factor) {
            Some(index) => self.scorers[index] = scorer,
            None => self.scorers.push(scorer),
        }
        self
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score(
        &self,
        template: &Template,
        analysis: &ContextAnalysis,
        history: Option<&AnalyticsRecord>,
    ) -> TemplateScore {
        let components: Vec<ScoreComponent> = self
            .scorers
            .iter()
            .map(|scorer| {
                let factor = scorer.factor();
                let FactorScore { score, reason } = scorer.score(template, analysis, history);
                ScoreComponent {
                    factor,
                    score: score.clamp(0.0, 1.0),
                    weight: self.weights.weight(factor),
                    reason,
                }
            })
            .collect();
        let total = components
            .iter()
            .map(|c| c.weight * c.score)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        TemplateScore {
            template_id: template.id.clone(),
            total,
            components,
        }
    }

    /// Score and rank candidates, best first; ties keep input order
    pub fn rank(
        &self,
        candidates: &[Arc<Template>],
        analysis: &ContextAnalysis,
        analytics: &AnalyticsStore,
    ) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .map(|template| {
                let history = analytics.get(&template.id);
                RankedCandidate {
                    score: self.score(template, analysis, history.as_ref()),
                    template: Arc::clone(template),
                }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .total
                .partial_cmp(&a.score.total)
                .unwrap_or(Ordering::Equal)
        });
        ranked
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}
