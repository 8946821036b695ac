//! Integration tests for the composition pipeline

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

use handlebars::{Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext};
use serde_json::json;
use stencil_generation::{
    Complexity, CompositionError, CompositionOptions, CompositionStrategy, EngineConfig,
    GenerationContext, GenerationEngine, HelperRegistry, OverrideRule, TemplateData,
};
use stencil_themes::{Theme, ThemeType};
use tempfile::TempDir;

fn engine() -> GenerationEngine {
    GenerationEngine::new(EngineConfig::default()).unwrap()
}

fn playwright_page(id: &str, feature: &str, content: &str) -> TemplateData {
    TemplateData::new(id, "page")
        .with_framework("playwright")
        .with_feature(feature)
        .with_content(content)
}

fn feature_library(engine: &GenerationEngine) {
    engine
        .register_template(
            playwright_page("login-page", "forms", "class {{name}}Page {}")
                .with_complexity("low")
                .with_description("Login form page object"),
        )
        .unwrap();
    engine
        .register_template(playwright_page("api-helpers", "api", "// api helpers"))
        .unwrap();
    engine
        .register_template(playwright_page("field-checks", "validation", "// validation helpers"))
        .unwrap();
    engine
        .register_template(playwright_page("error-banner", "error", "// error handling"))
        .unwrap();
}

#[test]
fn test_low_complexity_single_template() {
    let engine = engine();
    feature_library(&engine);

    let context = GenerationContext::new()
        .with_framework("playwright")
        .with_type("page")
        .with_complexity(Complexity::Low)
        .with_feature("forms")
        .with_name("Login");
    let composition = engine
        .compose_template(&context, &CompositionOptions::default())
        .unwrap();

    assert_eq!(composition.strategy, CompositionStrategy::SingleTemplate);
    assert_eq!(composition.primary_template_id, "login-page");
    assert!(composition.supplements.is_empty());
    assert_eq!(composition.content, "class LoginPage {}");
    assert!((0.0..=1.0).contains(&composition.score));
    assert!(!composition.reasoning.is_empty());
}

#[test]
fn test_many_features_multi_template() {
    let engine = engine();
    feature_library(&engine);

    let context = GenerationContext::new()
        .with_framework("playwright")
        .with_type("page")
        .with_complexity(Complexity::Medium)
        .with_features(["forms", "api", "validation", "error"]);
    let composition = engine
        .compose_template(&context, &CompositionOptions::default())
        .unwrap();

    assert_eq!(composition.strategy, CompositionStrategy::MultiTemplate);
    assert_eq!(composition.supplements.len(), 3);

    let primary = engine.template(&composition.primary_template_id).unwrap();
    let mut covered = Vec::new();
    for supplement in &composition.supplements {
        assert_ne!(supplement.template_id, composition.primary_template_id);
        assert!(!primary.metadata.features.contains(&supplement.feature));
        assert!(!covered.contains(&supplement.feature));
        covered.push(supplement.feature.clone());

        let template = engine.template(&supplement.template_id).unwrap();
        assert!(template.metadata.features.contains(&supplement.feature));
    }
    assert_eq!(composition.template_ids().count(), 4);
    for fragment in ["// api helpers", "// validation helpers", "// error handling", "Page {}"] {
        assert!(composition.content.contains(fragment), "missing {fragment}");
    }

    let summary = engine.analytics_summary();
    assert_eq!(summary.templates.len(), 4);
}

#[test]
fn test_medium_complexity_hybrid_single_supplement() {
    let engine = engine();
    feature_library(&engine);

    let context = GenerationContext::new()
        .with_framework("playwright")
        .with_type("page")
        .with_complexity(Complexity::Medium)
        .with_features(["forms", "api"]);
    let composition = engine
        .compose_template(&context, &CompositionOptions::default())
        .unwrap();

    assert_eq!(composition.strategy, CompositionStrategy::Hybrid);
    assert!(composition.supplements.len() <= 1);
}

#[test]
fn test_cache_hit_is_transparent() {
    let engine = engine();
    feature_library(&engine);

    let context = GenerationContext::new()
        .with_framework("playwright")
        .with_type("page")
        .with_complexity(Complexity::Low)
        .with_feature("forms")
        .with_name("Login");
    let first = engine
        .compose_template(&context, &CompositionOptions::default())
        .unwrap();
    let uses = engine.analytics().get("login-page").unwrap().total;

    let second = engine
        .compose_template(&context, &CompositionOptions::default())
        .unwrap();
    assert_eq!(second.content, first.content);
    assert_eq!(second.primary_template_id, first.primary_template_id);
    assert_eq!(engine.analytics().get("login-page").unwrap().total, uses);

    // a hit carries the caller's own context, not the one that filled the cache
    let renamed = context.clone().with_name("Signup");
    let hit = engine
        .compose_template(&renamed, &CompositionOptions::default())
        .unwrap();
    assert_eq!(hit.primary_template_id, first.primary_template_id);
    assert_eq!(hit.context, renamed);
    assert_eq!(engine.analytics().get("login-page").unwrap().total, uses);

    engine
        .compose_template(&context, &CompositionOptions::uncached())
        .unwrap();
    assert_eq!(engine.analytics().get("login-page").unwrap().total, uses + 1);
}

#[test]
fn test_no_candidates_leaves_analytics_untouched() {
    let engine = engine();
    feature_library(&engine);

    let context = GenerationContext::new()
        .with_framework("django")
        .with_type("page");
    let result = engine.compose_template(&context, &CompositionOptions::default());

    assert!(matches!(
        result,
        Err(CompositionError::NoCandidatesFound { .. })
    ));
    assert_eq!(engine.analytics_summary().total_compositions, 0);
}

#[test]
fn test_inherited_template_composes_with_parent_blocks() {
    let engine = engine();
    engine
        .register_template(
            TemplateData::new("base-page", "base")
                .with_framework("playwright")
                .with_content(
                    "<block imports>import { Page } from '@playwright/test';</block>\n\
                     export class {{name}} {\n<block methods>  async open() {}</block>\n}",
                )
                .as_abstract(),
        )
        .unwrap();
    engine
        .register_template(
            TemplateData::new("search-page", "page")
                .with_framework("playwright")
                .with_feature("navigation")
                .extending("base-page")
                .with_override("imports", OverrideRule::Merge)
                .with_override("methods", OverrideRule::Append)
                .with_content(
                    "<block imports>import { expect } from '@playwright/test';</block>\
                     <block methods>  async search() {}</block>",
                ),
        )
        .unwrap();

    let context = GenerationContext::new()
        .with_framework("playwright")
        .with_type("page")
        .with_name("SearchPage");
    let composition = engine
        .compose_template(&context, &CompositionOptions::default())
        .unwrap();

    assert_eq!(composition.primary_template_id, "search-page");
    assert_eq!(
        composition.content,
        "import { Page } from '@playwright/test';\n\
         import { expect } from '@playwright/test';\n\
         export class SearchPage {\n  async open() {}\n  async search() {}\n}"
    );
}

#[test]
fn test_theme_conventions_applied() {
    let engine = engine();
    engine
        .register_theme(
            Theme::new("corporate", ThemeType::Structural)
                .with_section(
                    "conventions",
                    json!({"naming": {"class": "PascalCase", "file": "kebab-case"}}),
                )
                .with_section("formatting", json!({"quotes": "double"})),
        )
        .unwrap();
    engine
        .register_template(
            TemplateData::new("named-page", "page")
                .with_framework("playwright")
                .with_theme("corporate")
                .with_content(concat!(
                    "// {{names.file}}.ts quotes={{theme.formatting.quotes}}\n",
                    "class {{names.class}} {}",
                )),
        )
        .unwrap();

    let context = GenerationContext::new()
        .with_framework("playwright")
        .with_type("page")
        .with_name("checkout summary");
    let composition = engine
        .compose_template(&context, &CompositionOptions::default().with_theme("corporate"))
        .unwrap();

    assert_eq!(composition.theme_id.as_deref(), Some("corporate"));
    assert_eq!(
        composition.content,
        "// checkout-summary.ts quotes=double\nclass CheckoutSummary {}"
    );

    let unknown = engine.compose_template(
        &context,
        &CompositionOptions::default().with_theme("missing-theme"),
    );
    assert!(matches!(unknown, Err(CompositionError::ThemeNotFound(_))));
}

#[test]
fn test_compile_failure_records_nothing() {
    let engine = engine();
    engine
        .register_template(
            TemplateData::new("broken", "page")
                .with_framework("playwright")
                .with_content("{{#if name}}unclosed"),
        )
        .unwrap();

    let context = GenerationContext::new().with_framework("playwright");
    let result = engine.compose_template(&context, &CompositionOptions::default());
    assert!(matches!(result, Err(CompositionError::Compile { .. })));
    assert!(engine.analytics().get("broken").is_none());
}

/// Blocks the first render that reaches it until the test releases it
struct GateHelper {
    armed: AtomicBool,
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl HelperDef for GateHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        let value = h
            .param(0)
            .and_then(|p| p.value().as_str())
            .unwrap_or_default();
        out.write(value)?;
        Ok(())
    }
}

#[test]
fn test_reload_during_compose_does_not_cache_replaced_version() {
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let mut helpers = HelperRegistry::default();
    helpers.register_helper(
        "gate",
        Box::new(GateHelper {
            armed: AtomicBool::new(true),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        }),
    );
    let engine = GenerationEngine::with_helpers(EngineConfig::default(), helpers).unwrap();
    engine
        .register_template(playwright_page("checkout", "forms", "{{gate \"v1\"}}"))
        .unwrap();

    let context = GenerationContext::new()
        .with_framework("playwright")
        .with_type("page");
    let in_flight = {
        let engine = engine.clone();
        let context = context.clone();
        thread::spawn(move || {
            engine.compose_template(&context, &CompositionOptions::default())
        })
    };

    // the composition is mid-render on v1 when the reload lands
    entered.wait();
    engine
        .reload_template(playwright_page("checkout", "forms", "v2"))
        .unwrap();
    release.wait();

    let raced = in_flight.join().unwrap().unwrap();
    assert_eq!(raced.content, "v1");
    assert!(engine.composition_cache().is_empty());

    let fresh = engine
        .compose_template(&context, &CompositionOptions::default())
        .unwrap();
    assert_eq!(fresh.content, "v2");
    assert_eq!(engine.resolve("checkout", &context).unwrap(), "v2");

    let cached = engine
        .compose_template(&context, &CompositionOptions::default())
        .unwrap();
    assert_eq!(cached.content, "v2");
}

#[tokio::test]
async fn test_hot_reload_replaces_template() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("greeting.yaml");
    std::fs::write(
        &path,
        "id: greeting\ntype: page\nframework: jest\ncontent: \"hello v1\"\n",
    )
    .unwrap();

    let engine = engine();
    assert_eq!(engine.load_templates_from(dir.path()).await.unwrap(), 1);
    engine.watch_templates(dir.path()).unwrap();

    let context = GenerationContext::new();
    assert_eq!(engine.resolve("greeting", &context).unwrap(), "hello v1");

    std::fs::write(
        &path,
        "id: greeting\ntype: page\nframework: jest\ncontent: \"hello v2\"\n",
    )
    .unwrap();

    let mut reloaded = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if engine.resolve("greeting", &context).unwrap() == "hello v2" {
            reloaded = true;
            break;
        }
    }
    assert!(reloaded, "template was not hot reloaded");

    // a broken edit keeps the last good version
    std::fs::write(&path, "id: greeting\ntype: page\ncontent: [unclosed\n").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.resolve("greeting", &context).unwrap(), "hello v2");

    engine.shutdown().await.unwrap();
}
