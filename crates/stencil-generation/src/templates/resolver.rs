//! Inheritance resolution
//!
//! Walks a template's `extends` chain root to leaf, merging blocks with each
//! child's override rule and deep-merging defaults, then reassembles the
//! layout by substituting block references.

use std::{collections::HashSet, sync::Arc};

use serde_json::{Map, Value};
use stencil_themes::deep_merge;
use tracing::debug;

use crate::{
    error::Result,
    models::{Block, OverrideRule},
    templates::{
        compiler::TemplateCompiler,
        merge::BlockMerger,
        parser::BodyNode,
        store::TemplateStore,
    },
};

/// A template with its whole inheritance chain folded in
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub template_id: String,
    /// Ids from root to leaf
    pub chain: Vec<String>,
    /// Layout of the first template in the chain with a non-blank body
    pub layout: Vec<BodyNode>,
    /// Merged blocks in first-declaration order
    pub blocks: Vec<Block>,
    /// Merged default variables
    pub defaults: Value,
}

impl ResolvedSource {
    pub(crate) fn empty(template_id: &str) -> Self {
        Self {
            template_id: template_id.to_string(),
            chain: vec![template_id.to_string()],
            layout: Vec::new(),
            blocks: Vec::new(),
            defaults: Value::Object(Map::new()),
        }
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.name.as_str())
    }

    /// Fold `block` in under `rule`; new names are appended
    pub fn merge_block(&mut self, block: &Block, rule: OverrideRule) {
        match self.blocks.iter().position(|b| b.name == block.name) {
            Some(index) => {
                let merged = BlockMerger::merge(Some(&self.blocks[index]), block, rule);
                self.blocks[index] = merged;
            }
            None => self.blocks.push(block.clone()),
        }
    }

    /// Assemble the final template text
    ///
    /// Block references in the layout are replaced by their merged content;
    /// blocks the layout never references follow in declaration order.
    pub fn assemble(&self) -> String {
        let mut output = String::new();
        let mut referenced = HashSet::new();

        for node in &self.layout {
            match node {
                BodyNode::Literal(text) => output.push_str(text),
                BodyNode::BlockRef(name) => {
                    if let Some(block) = self.block(name) {
                        output.push_str(&block.content);
                    }
                    referenced.insert(name.as_str());
                }
            }
        }

        for block in &self.blocks {
            if referenced.contains(block.name.as_str()) || block.content.is_empty() {
                continue;
            }
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&block.content);
        }

        output
    }
}

/// Resolves inheritance chains and renders the result
#[derive(Debug, Clone)]
pub struct InheritanceResolver {
    store: Arc<TemplateStore>,
    compiler: Arc<TemplateCompiler>,
}

impl InheritanceResolver {
    pub fn new(store: Arc<TemplateStore>, compiler: Arc<TemplateCompiler>) -> Self {
        Self { store, compiler }
    }

    pub fn compiler(&self) -> &Arc<TemplateCompiler> {
        &self.compiler
    }

    /// Resolve the chain of `id`, using the per-id cache
    pub fn resolve_source(&self, id: &str) -> Result<Arc<ResolvedSource>> {
        if let Some(cached) = self.store.cached_resolution(id) {
            debug!(template_id = %id, "Resolution cache hit");
            return Ok(cached);
        }

        let observed = self.store.generation();
        let source = Arc::new(self.build(id)?);
        self.store.cache_resolution(Arc::clone(&source), observed);
        Ok(source)
    }

    /// Resolve `id` and render it with `context` over the merged defaults
    pub fn resolve(&self, id: &str, context: &Value) -> Result<String> {
        let source = self.resolve_source(id)?;
        self.render(&source, context)
    }

    /// Render a resolved source with `context` over its defaults
    pub fn render(&self, source: &ResolvedSource, context: &Value) -> Result<String> {
        let mut data = source.defaults.clone();
        deep_merge(&mut data, context);
        self.compiler
            .compile(&source.template_id, &source.assemble())?
            .render(&data)
    }

    fn build(&self, id: &str) -> Result<ResolvedSource> {
        let mut chain = self.store.chain(id)?;
        chain.reverse();

        let mut resolved = ResolvedSource::empty(id);
        resolved.chain = chain.iter().map(|t| t.id.clone()).collect();
        let mut layout: Option<Vec<BodyNode>> = None;

        for template in &chain {
            for block in template.blocks() {
                resolved.merge_block(block, template.override_rule(block));
            }
            if layout.is_none() && !template.body().is_blank() {
                layout = Some(template.body().nodes.clone());
            }
            deep_merge(&mut resolved.defaults, &template.defaults);
        }

        resolved.layout = layout.unwrap_or_default();
        debug!(
            template_id = %id,
            depth = resolved.chain.len(),
            blocks = resolved.blocks.len(),
            "Resolved inheritance chain"
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::CompositionError,
        models::TemplateData,
        templates::compiler::HelperRegistry,
    };
    use serde_json::json;

    fn resolver() -> (Arc<TemplateStore>, InheritanceResolver) {
        let store = Arc::new(TemplateStore::new());
        let compiler = Arc::new(TemplateCompiler::new(HelperRegistry::default()));
        let resolver = InheritanceResolver::new(Arc::clone(&store), compiler);
        (store, resolver)
    }

    fn page(id: &str, content: &str) -> TemplateData {
        TemplateData::new(id, "page")
            .with_framework("playwright")
            .with_content(content)
    }

    #[test]
    fn test_child_overrides_parent_blocks() {
        let (store, resolver) = resolver();
        store
            .register(page(
                "base",
                "<block imports>import a</block>\nclass {{name}} {\n<block body>base</block>\n}",
            ))
            .unwrap();
        store
            .register(
                page(
                    "login",
                    "<block imports>import b</block><block body>login</block>",
                )
                .extending("base")
                .with_override("imports", OverrideRule::Merge),
            )
            .unwrap();

        let output = resolver
            .resolve("login", &json!({"name": "LoginPage"}))
            .unwrap();
        assert_eq!(output, "import a\nimport b\nclass LoginPage {\nlogin\n}");
    }

    #[test]
    fn test_unreferenced_blocks_are_appended() {
        let (store, resolver) = resolver();
        store.register(page("base", "head\n<block body>b</block>")).unwrap();
        store
            .register(page("child", "<block extra>tail</block>").extending("base"))
            .unwrap();

        let source = resolver.resolve_source("child").unwrap();
        assert_eq!(source.chain, vec!["base", "child"]);
        assert_eq!(source.assemble(), "head\nb\ntail");
    }

    #[test]
    fn test_defaults_merge_child_over_parent() {
        let (store, resolver) = resolver();
        store
            .register(
                page("base", "{{greeting}} {{target}}")
                    .with_defaults(json!({"greeting": "hello", "target": "world"})),
            )
            .unwrap();
        store
            .register(
                page("child", "")
                    .extending("base")
                    .with_defaults(json!({"target": "team"})),
            )
            .unwrap();

        assert_eq!(resolver.resolve("child", &json!({})).unwrap(), "hello team");
        assert_eq!(
            resolver.resolve("child", &json!({"greeting": "hi"})).unwrap(),
            "hi team"
        );
    }

    #[test]
    fn test_missing_parent_fails_at_resolution() {
        let (store, resolver) = resolver();
        store.register(page("child", "x").extending("later")).unwrap();
        assert!(matches!(
            resolver.resolve_source("child"),
            Err(CompositionError::TemplateNotFound(ref id)) if id == "later"
        ));

        store.register(page("later", "y")).unwrap();
        assert_eq!(resolver.resolve("child", &json!({})).unwrap(), "y");
    }

    #[test]
    fn test_reload_invalidates_descendant_resolution() {
        let (store, resolver) = resolver();
        store.register(page("base", "<block body>v1</block>")).unwrap();
        store.register(page("child", "").extending("base")).unwrap();
        assert_eq!(resolver.resolve("child", &json!({})).unwrap(), "v1");

        store.reload(page("base", "<block body>v2</block>")).unwrap();
        assert_eq!(resolver.resolve("child", &json!({})).unwrap(), "v2");
    }

    #[test]
    fn test_resolution_is_cached() {
        let (store, resolver) = resolver();
        store.register(page("a", "<block body>x</block>")).unwrap();
        let first = resolver.resolve_source("a").unwrap();
        let second = resolver.resolve_source("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
