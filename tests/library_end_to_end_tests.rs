//! End-to-End Test Suite: the bundled template library
//!
//! Brings an engine up from configuration against `templates/`, composes
//! artifacts with inheritance, supplements and themes, and checks that usage
//! analytics survive a restart.

use std::path::{Path, PathBuf};

use stencil_generation::{
    AnalyticsRecord, Complexity, CompositionOptions, CompositionStrategy, ConfigLoader,
    EngineConfig, GenerationContext, GenerationEngine,
};
use tempfile::TempDir;

fn library_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")
}

fn config(analytics_dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.templates_dir = Some(library_root().join("library"));
    config.themes_dir = Some(library_root().join("themes"));
    config.analytics.persist_path = Some(analytics_dir.join("analytics.json"));
    config.analytics.flush_interval_ms = 50;
    config
}

fn login_context() -> GenerationContext {
    GenerationContext::new()
        .with_framework("playwright")
        .with_type("page")
        .with_complexity(Complexity::Low)
        .with_feature("forms")
        .with_name("login")
}

#[tokio::test]
async fn test_login_page_from_library() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let engine = GenerationEngine::from_config(config(temp_dir.path()))
        .await
        .expect("Failed to start engine");

    assert!(engine.store().contains("playwright-base-page").unwrap());
    assert!(engine.themes().registry().exists("enterprise"));

    let composition = engine
        .compose_template(&login_context(), &CompositionOptions::default().with_theme("minimal"))
        .expect("Failed to compose login page");

    assert_eq!(composition.strategy, CompositionStrategy::SingleTemplate);
    assert_eq!(composition.primary_template_id, "playwright-login-page");
    assert_eq!(composition.theme_id.as_deref(), Some("minimal"));

    let content = &composition.content;
    assert!(content.starts_with(
        "import { Page, Locator } from '@playwright/test';\nimport { expect } from '@playwright/test';"
    ));
    assert!(content.contains("export class LoginPage {"));
    assert!(content.contains("await this.page.goto('/login');"));
    assert!(content.contains("readonly username = this.page.getByLabel('Username');"));
    assert!(content.contains("async login(user: string, secret: string) {"));
    assert!(!content.contains("<block"));

    engine.shutdown().await.expect("Failed to shut down");
}

#[tokio::test]
async fn test_multi_feature_request_pulls_supplements() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let engine = GenerationEngine::from_config(config(temp_dir.path()))
        .await
        .expect("Failed to start engine");

    let context = GenerationContext::new()
        .with_framework("playwright")
        .with_type("page")
        .with_complexity(Complexity::Medium)
        .with_features(["forms", "api", "validation", "error"])
        .with_name("checkout");
    let composition = engine
        .compose_template(&context, &CompositionOptions::default().with_theme("enterprise"))
        .expect("Failed to compose");

    assert_eq!(composition.strategy, CompositionStrategy::MultiTemplate);
    assert!(!composition.supplements.is_empty());
    assert!(composition.supplements.len() <= 3);

    let primary = engine.template(&composition.primary_template_id).unwrap();
    for supplement in &composition.supplements {
        assert_ne!(supplement.template_id, primary.id);
        assert!(!primary.metadata.features.contains(&supplement.feature));
        assert!(engine
            .template(&supplement.template_id)
            .unwrap()
            .metadata
            .features
            .contains(&supplement.feature));
    }
    assert!(!composition.content.contains("<block"));

    engine.shutdown().await.expect("Failed to shut down");
}

#[tokio::test]
async fn test_unit_test_template_for_family_framework() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let engine = GenerationEngine::from_config(config(temp_dir.path()))
        .await
        .expect("Failed to start engine");
    engine.set_active_theme("minimal").expect("Failed to set theme");

    let context = GenerationContext::new()
        .with_framework("vitest")
        .with_type("test")
        .with_name("format date");
    let composition = engine
        .compose_template(&context, &CompositionOptions::default())
        .expect("Failed to compose");

    assert_eq!(composition.primary_template_id, "jest-unit-test");
    assert!(composition
        .content
        .starts_with("import { formatDate } from './format-date';"));
    assert!(composition.content.contains("describe('formatDate', () => {"));

    engine.shutdown().await.expect("Failed to shut down");
}

#[tokio::test]
async fn test_analytics_survive_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let analytics_path = temp_dir.path().join("analytics.json");

    let engine = GenerationEngine::from_config(config(temp_dir.path()))
        .await
        .expect("Failed to start engine");
    for _ in 0..3 {
        engine
            .compose_template(&login_context(), &CompositionOptions::uncached())
            .expect("Failed to compose");
    }
    assert!(engine.mark_failed("playwright-login-page"));
    engine.shutdown().await.expect("Failed to shut down");

    let persisted: Vec<AnalyticsRecord> =
        serde_json::from_str(&std::fs::read_to_string(&analytics_path).unwrap()).unwrap();
    let record = persisted
        .iter()
        .find(|r| r.template_id == "playwright-login-page")
        .expect("login page record persisted");
    assert_eq!(record.total, 3);
    assert_eq!(record.successful, 2);

    let restarted = GenerationEngine::from_config(config(temp_dir.path()))
        .await
        .expect("Failed to restart engine");
    let seeded = restarted
        .analytics()
        .get("playwright-login-page")
        .expect("record seeded on restart");
    assert_eq!(seeded.total, 3);
    assert!((seeded.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    restarted.shutdown().await.expect("Failed to shut down");
}

#[tokio::test]
async fn test_engine_from_config_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("stencil.yaml");
    std::fs::write(
        &config_path,
        format!(
            "templates_dir: \"{}\"\nthemes_dir: \"{}\"\nmax_supplements: 1\ncomposition_cache_capacity: 8\n",
            library_root().join("library").display(),
            library_root().join("themes").display(),
        ),
    )
    .unwrap();

    let config = ConfigLoader::with_path(&config_path)
        .with_env_prefix("STENCIL_E2E")
        .load()
        .expect("Failed to load config");
    assert_eq!(config.max_supplements, 1);

    let engine = GenerationEngine::from_config(config)
        .await
        .expect("Failed to start engine");
    assert_eq!(engine.store().len().unwrap(), 5);
    assert_eq!(engine.themes().registry().len(), 2);

    let context = GenerationContext::new()
        .with_framework("playwright")
        .with_type("page")
        .with_complexity(Complexity::High)
        .with_features(["forms", "api", "validation"]);
    let composition = engine
        .compose_template(&context, &CompositionOptions::default())
        .expect("Failed to compose");
    assert_eq!(composition.strategy, CompositionStrategy::MultiTemplate);
    assert!(composition.supplements.len() <= 1);

    engine.shutdown().await.expect("Failed to shut down");
}
