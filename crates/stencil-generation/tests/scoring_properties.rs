//! Property-based tests for template scoring
//! **Feature: stencil-generation, Property: bounded deterministic scoring**

use std::{sync::Arc, time::Duration};

use proptest::prelude::*;
use stencil_generation::{
    AnalyticsStore, Complexity, ContextAnalysis, GenerationContext, ScoreFactor, ScoringEngine,
    Template, TemplateData, UsageSample,
};

const FRAMEWORKS: &[&str] = &["playwright", "cypress", "jest", "react", "universal", "django"];
const TYPES: &[&str] = &["page", "component", "test", "api", "base", "utility"];
const FEATURES: &[&str] = &["forms", "api", "validation", "auth", "navigation", "upload"];
const THEMES: &[&str] = &["minimal", "clean", "enterprise", "playful", "custom"];
const COMPLEXITIES: &[&str] = &["low", "medium", "high"];

fn pick(values: &'static [&'static str]) -> impl Strategy<Value = &'static str> {
    prop::sample::select(values)
}

fn template_strategy() -> impl Strategy<Value = Template> {
    (
        "[a-z]{1,6}",
        pick(TYPES),
        prop::collection::vec(pick(FRAMEWORKS), 1..3),
        proptest::option::of(pick(COMPLEXITIES)),
        prop::collection::vec(pick(FEATURES), 0..4),
        proptest::option::of(pick(THEMES)),
        proptest::option::of("[a-z ]{0,20}"),
        any::<bool>(),
    )
        .prop_map(
            |(id, artifact_type, frameworks, complexity, features, theme, description, examples)| {
                let mut data = TemplateData::new(id, artifact_type).with_content("{{name}}");
                for framework in frameworks {
                    data = data.with_framework(framework);
                }
                if let Some(complexity) = complexity {
                    data = data.with_complexity(complexity);
                }
                for feature in features {
                    data = data.with_feature(feature);
                }
                if let Some(theme) = theme {
                    data = data.with_theme(theme);
                }
                if let Some(description) = description {
                    data = data.with_description(description);
                }
                if examples {
                    data.examples = vec!["login page example".to_string()];
                }
                Template::from_data(data).unwrap()
            },
        )
}

fn context_strategy() -> impl Strategy<Value = ContextAnalysis> {
    (
        proptest::option::of(pick(FRAMEWORKS)),
        proptest::option::of(pick(TYPES)),
        proptest::option::of(prop_oneof![
            Just(Complexity::Low),
            Just(Complexity::Medium),
            Just(Complexity::High),
        ]),
        prop::collection::vec(pick(FEATURES), 0..5),
        proptest::option::of(pick(THEMES)),
    )
        .prop_map(|(framework, artifact_type, complexity, features, theme)| {
            let mut context = GenerationContext::new().with_features(features);
            if let Some(framework) = framework {
                context = context.with_framework(framework);
            }
            if let Some(artifact_type) = artifact_type {
                context = context.with_type(artifact_type);
            }
            if let Some(complexity) = complexity {
                context = context.with_complexity(complexity);
            }
            ContextAnalysis::analyze(&context, theme)
        })
}

/// Strategy for a usage history: (successes, failures, latency ms)
fn history_strategy() -> impl Strategy<Value = Option<(u8, u8, u64)>> {
    proptest::option::of((0u8..20, 0u8..20, 0u64..2_000))
}

fn analytics_for(template_id: &str, history: Option<(u8, u8, u64)>) -> AnalyticsStore {
    let analytics = AnalyticsStore::new();
    if let Some((successes, failures, latency)) = history {
        for _ in 0..successes.max(failures) {
            analytics.record(UsageSample::success(
                template_id,
                0.8,
                Duration::from_millis(latency),
            ));
        }
        for _ in 0..failures {
            analytics.mark_failed(template_id);
        }
    }
    analytics
}

proptest! {
    /// Property: every factor and the weighted total stay within [0, 1],
    /// and the total equals the weighted sum of its components
    #[test]
    fn prop_scores_bounded(
        template in template_strategy(),
        analysis in context_strategy(),
        history in history_strategy(),
    ) {
        let engine = ScoringEngine::new();
        let analytics = analytics_for(&template.id, history);
        let record = analytics.get(&template.id);
        let score = engine.score(&template, &analysis, record.as_ref());

        prop_assert!((0.0..=1.0).contains(&score.total));
        prop_assert_eq!(score.components.len(), ScoreFactor::ALL.len());
        let mut weighted = 0.0;
        for component in &score.components {
            prop_assert!((0.0..=1.0).contains(&component.score));
            prop_assert!(!component.reason.is_empty());
            weighted += component.score * component.weight;
        }
        prop_assert!((weighted.clamp(0.0, 1.0) - score.total).abs() < 1e-9);
    }

    /// Property: scoring is deterministic
    #[test]
    fn prop_scoring_deterministic(
        template in template_strategy(),
        analysis in context_strategy(),
    ) {
        let engine = ScoringEngine::new();
        let first = engine.score(&template, &analysis, None);
        let second = engine.score(&template, &analysis, None);
        prop_assert_eq!(first, second);
    }

    /// Property: ranking is sorted best first and equal totals keep
    /// discovery order
    #[test]
    fn prop_ranking_sorted_and_stable(
        templates in prop::collection::vec(template_strategy(), 1..8),
        analysis in context_strategy(),
    ) {
        let candidates: Vec<Arc<Template>> = templates
            .into_iter()
            .enumerate()
            .map(|(index, mut template)| {
                template.id = format!("{}-{}", template.id, index);
                Arc::new(template)
            })
            .collect();
        let engine = ScoringEngine::new();
        let ranked = engine.rank(&candidates, &analysis, &AnalyticsStore::new());

        prop_assert_eq!(ranked.len(), candidates.len());
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].score.total >= pair[1].score.total);
            if pair[0].score.total == pair[1].score.total {
                let position = |id: &str| candidates.iter().position(|c| c.id == id).unwrap();
                prop_assert!(position(&pair[0].template.id) < position(&pair[1].template.id));
            }
        }
    }
}
