//! Block merge engine
//!
//! Combines a child block with its parent's same-named block according to an
//! [`OverrideRule`]. A child block without a parent counterpart passes
//! through unchanged whatever the rule.

use std::collections::BTreeSet;

use crate::models::{Block, BlockType, OverrideRule};

/// Merges blocks along an inheritance chain
pub struct BlockMerger;

impl BlockMerger {
    /// Merge `child` into `parent` under `rule`
    pub fn merge(parent: Option<&Block>, child: &Block, rule: OverrideRule) -> Block {
        let Some(parent) = parent else {
            return child.clone();
        };

        match rule {
            OverrideRule::Replace => child.clone(),
            OverrideRule::Prepend => Block {
                content: join(&child.content, &parent.content),
                ..parent.clone()
            },
            OverrideRule::Append => Block {
                content: join(&parent.content, &child.content),
                ..parent.clone()
            },
            OverrideRule::Extend => Self::extend(parent, child),
            OverrideRule::Merge => Self::merge_by_type(parent, child),
        }
    }

    /// Deduplicated, sorted union of the non-empty lines of two import blocks
    pub fn merge_imports(parent: &str, child: &str) -> String {
        parent
            .lines()
            .chain(child.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn extend(parent: &Block, child: &Block) -> Block {
        let mut metadata = parent.metadata.clone();
        metadata.extend(child.metadata.clone());
        Block {
            name: child.name.clone(),
            content: join(&parent.content, &child.content),
            block_type: parent.block_type,
            metadata,
            rule: child.rule,
        }
    }

    fn merge_by_type(parent: &Block, child: &Block) -> Block {
        match parent.block_type {
            BlockType::Imports => Block {
                content: Self::merge_imports(&parent.content, &child.content),
                ..parent.clone()
            },
            BlockType::Methods | BlockType::Properties => Block {
                content: join(&parent.content, &child.content),
                ..parent.clone()
            },
            _ => Self::extend(parent, child),
        }
    }
}

fn join(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_string(),
        (_, true) => first.to_string(),
        _ => format!("{}\n{}", first, second),
    }
}
