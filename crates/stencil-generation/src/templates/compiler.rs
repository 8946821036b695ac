//! Handlebars-backed template compiler
//!
//! The compiler owns its own helper registry, built once at construction;
//! compiled templates share it read-only.

use std::sync::Arc;

use handlebars::{handlebars_helper, no_escape, Handlebars, HelperDef};
use serde_json::Value;
use stencil_themes::CaseTransform;

use crate::error::{CompositionError, Result};

handlebars_helper!(camel_case_helper: |s: str| CaseTransform::CamelCase.apply(s));
handlebars_helper!(pascal_case_helper: |s: str| CaseTransform::PascalCase.apply(s));
handlebars_helper!(kebab_case_helper: |s: str| CaseTransform::KebabCase.apply(s));
handlebars_helper!(snake_case_helper: |s: str| CaseTransform::SnakeCase.apply(s));
handlebars_helper!(upper_case_helper: |s: str| CaseTransform::UpperCase.apply(s));

/// Helpers and partials handed to a [`TemplateCompiler`]
#[derive(Debug, Clone)]
pub struct HelperRegistry {
    handlebars: Handlebars<'static>,
    helpers: Vec<String>,
    partials: Vec<String>,
}

impl HelperRegistry {
    /// Registry without any helpers
    pub fn empty() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(no_escape);
        handlebars.set_strict_mode(false);
        Self {
            handlebars,
            helpers: Vec::new(),
            partials: Vec::new(),
        }
    }

    /// Registry with the built-in case helpers
    pub fn with_case_helpers() -> Self {
        let mut registry = Self::empty();
        registry.register_helper("camelCase", Box::new(camel_case_helper));
        registry.register_helper("pascalCase", Box::new(pascal_case_helper));
        registry.register_helper("kebabCase", Box::new(kebab_case_helper));
        registry.register_helper("snakeCase", Box::new(snake_case_helper));
        registry.register_helper("upperCase", Box::new(upper_case_helper));
        registry
    }

    pub fn register_helper(
        &mut self,
        name: &str,
        helper: Box<dyn HelperDef + Send + Sync + 'static>,
    ) -> &mut Self {
        self.handlebars.register_helper(name, helper);
        if !self.helpers.iter().any(|h| h == name) {
            self.helpers.push(name.to_string());
        }
        self
    }

    pub fn register_partial(&mut self, name: &str, source: &str) -> Result<&mut Self> {
        self.handlebars
            .register_partial(name, source)
            .map_err(|e| CompositionError::compile(name, e.to_string()))?;
        if !self.partials.iter().any(|p| p == name) {
            self.partials.push(name.to_string());
        }
        Ok(self)
    }

    pub fn helper_names(&self) -> &[String] {
        &self.helpers
    }

    pub fn partial_names(&self) -> &[String] {
        &self.partials
    }
}

impl Default for HelperRegistry {
    fn default() -> Self {
        Self::with_case_helpers()
    }
}

/// Compiles assembled template text against a fixed helper registry
#[derive(Debug, Clone)]
pub struct TemplateCompiler {
    registry: HelperRegistry,
}

impl TemplateCompiler {
    pub fn new(registry: HelperRegistry) -> Self {
        Self { registry }
    }

    pub fn helpers(&self) -> &HelperRegistry {
        &self.registry
    }

    /// Compile `source` under `name`; fails with `Compile` on bad syntax
    pub fn compile(&self, name: &str, source: &str) -> Result<CompiledTemplate> {
        let mut handlebars = self.registry.handlebars.clone();
        handlebars
            .register_template_string(name, source)
            .map_err(|e| CompositionError::compile(name, e.to_string()))?;
        Ok(CompiledTemplate {
            name: name.to_string(),
            handlebars: Arc::new(handlebars),
        })
    }
}

/// A compiled template ready to render
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    name: String,
    handlebars: Arc<Handlebars<'static>>,
}

impl CompiledTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, data: &Value) -> Result<String> {
        self.handlebars
            .render(&self.name, data)
            .map_err(|e| CompositionError::compile(&self.name, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_helpers() {
        let compiler = TemplateCompiler::new(HelperRegistry::default());
        let compiled = compiler
            .compile(
                "t",
                concat!(
                    "{{pascalCase name}} {{camelCase name}} {{kebabCase name}} ",
                    "{{snakeCase name}} {{upperCase name}}",
                ),
            )
            .unwrap();
        let output = compiled.render(&json!({"name": "login form"})).unwrap();
        assert_eq!(output, "LoginForm loginForm login-form login_form LOGIN_FORM");
    }

    #[test]
    fn test_no_html_escaping_and_lenient_missing() {
        let compiler = TemplateCompiler::new(HelperRegistry::default());
        let output = compiler
            .compile("t", "{{code}}|{{missing}}")
            .unwrap()
            .render(&json!({"code": "a < b && c"}))
            .unwrap();
        assert_eq!(output, "a < b && c|");
    }

    #[test]
    fn test_malformed_syntax_is_compile_error() {
        let compiler = TemplateCompiler::new(HelperRegistry::default());
        assert!(matches!(
            compiler.compile("broken", "{{#if x}}never closed"),
            Err(CompositionError::Compile { ref template, .. }) if template == "broken"
        ));
    }

    #[test]
    fn test_partials_and_custom_helpers() {
        handlebars_helper!(shout: |s: str| format!("{}!", s));

        let mut registry = HelperRegistry::empty();
        registry.register_helper("shout", Box::new(shout));
        registry
            .register_partial("header", "// {{shout title}}")
            .unwrap();
        assert_eq!(registry.helper_names().to_vec(), vec!["shout".to_string()]);

        let compiler = TemplateCompiler::new(registry);
        let output = compiler
            .compile("t", "start {{> header}} end")
            .unwrap()
            .render(&json!({"title": "hi"}))
            .unwrap();
        assert_eq!(output, "start // hi! end");
    }

    #[test]
    fn test_empty_registry_has_no_case_helpers() {
        let compiler = TemplateCompiler::new(HelperRegistry::empty());
        let result = compiler
            .compile("t", "{{pascalCase name}}")
            .unwrap()
            .render(&json!({"name": "x"}));
        assert!(result.is_err());
    }
}
