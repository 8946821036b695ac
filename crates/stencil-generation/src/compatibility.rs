//! Fixed compatibility tables for artifact types, frameworks and themes

/// Artifact types each type may build on
const TYPE_COMPATIBILITY: &[(&str, &[&str])] = &[
    ("page", &["component", "test", "base"]),
    ("component", &["base", "page", "test"]),
    ("test", &["page", "component", "fixture", "base"]),
    ("fixture", &["test", "base"]),
    ("api", &["service", "test", "base"]),
    ("service", &["api", "base"]),
    ("utility", &["helper", "base"]),
    ("helper", &["utility", "base"]),
    ("config", &["base"]),
];

/// Framework families
const FRAMEWORK_FAMILIES: &[(&str, &[&str])] = &[
    ("e2e", &["playwright", "cypress", "selenium", "puppeteer", "webdriverio"]),
    ("unit", &["jest", "vitest", "mocha", "jasmine"]),
    ("frontend", &["react", "vue", "angular", "svelte"]),
    ("backend", &["express", "fastify", "nestjs", "koa"]),
];

/// Theme families
const THEME_FAMILIES: &[(&str, &[&str])] = &[
    ("minimal", &["minimal", "clean", "simple"]),
    ("enterprise", &["enterprise", "corporate", "formal"]),
    ("playful", &["playful", "creative", "vibrant"]),
];

/// Types any other type may match loosely
pub const GENERAL_TYPES: &[&str] = &["general", "base"];

/// Framework names that apply to every framework
pub const UNIVERSAL_FRAMEWORKS: &[&str] = &["universal", "*"];

fn compatible_with(artifact_type: &str) -> &'static [&'static str] {
    TYPE_COMPATIBILITY
        .iter()
        .find(|(name, _)| *name == artifact_type)
        .map(|(_, types)| *types)
        .unwrap_or(&[])
}

/// Whether a child of `child_type` may extend a parent of `parent_type`
pub fn can_extend(child_type: &str, parent_type: &str) -> bool {
    child_type == parent_type
        || GENERAL_TYPES.contains(&parent_type)
        || compatible_with(child_type).contains(&parent_type)
}

/// Whether two types appear together in the compatibility table
pub fn types_compatible(a: &str, b: &str) -> bool {
    compatible_with(a).contains(&b) || compatible_with(b).contains(&a)
}

pub fn is_general_type(artifact_type: &str) -> bool {
    GENERAL_TYPES.contains(&artifact_type)
}

pub fn is_universal_framework(framework: &str) -> bool {
    UNIVERSAL_FRAMEWORKS.contains(&framework)
}

fn family_of(families: &[(&'static str, &[&str])], member: &str) -> Option<&'static str> {
    families
        .iter()
        .find(|(_, members)| members.contains(&member))
        .map(|(family, _)| *family)
}

pub fn framework_family(framework: &str) -> Option<&'static str> {
    family_of(FRAMEWORK_FAMILIES, framework)
}

pub fn same_framework_family(a: &str, b: &str) -> bool {
    matches!((framework_family(a), framework_family(b)), (Some(x), Some(y)) if x == y)
}

pub fn theme_family(theme: &str) -> Option<&'static str> {
    family_of(THEME_FAMILIES, theme)
}

pub fn same_theme_family(a: &str, b: &str) -> bool {
    matches!((theme_family(a), theme_family(b)), (Some(x), Some(y)) if x == y)
}
