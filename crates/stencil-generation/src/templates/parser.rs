//! Block marker parser
//!
//! Splits a template body into an ordered list of literal text and block
//! references. Each `<block NAME attr="v">…</block>` marker becomes a
//! [`BodyNode::BlockRef`] plus a [`Block`] carrying the marker's content.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    error::{CompositionError, Result},
    models::{Block, OverrideRule},
};

const OPEN_TAG: &str = "<block";
const CLOSE_TAG: &str = "</block>";

static BLOCK_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("block name pattern is valid")
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_\-]*)\s*=\s*"([^"]*)""#).expect("attribute pattern is valid")
});

/// One node of a parsed body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyNode {
    /// Literal text copied as-is
    Literal(String),
    /// Placeholder for the resolved block of this name
    BlockRef(String),
}

/// A template body parsed once into layout nodes and declared blocks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBody {
    pub nodes: Vec<BodyNode>,
    /// Blocks in declaration order
    pub blocks: Vec<Block>,
}

impl ParsedBody {
    /// Whether the body carries anything other than whitespace
    pub fn is_blank(&self) -> bool {
        self.nodes.iter().all(|node| match node {
            BodyNode::Literal(text) => text.trim().is_empty(),
            BodyNode::BlockRef(_) => false,
        })
    }
}

/// Parser for block markers
pub struct BlockParser;

impl BlockParser {
    /// Parse a template body
    ///
    /// Fails with `Compile` on unterminated, nested, duplicated or stray
    /// markers and on invalid block names or rules.
    pub fn parse(template_id: &str, content: &str) -> Result<ParsedBody> {
        let mut body = ParsedBody::default();
        let mut pos = 0;

        while let Some(start) = find_open_tag(content, pos) {
            push_literal(template_id, content, &content[pos..start], pos, &mut body)?;

            let tag_end = content[start..]
                .find('>')
                .map(|offset| start + offset)
                .ok_or_else(|| {
                    error_at(template_id, content, start, "unterminated block marker")
                })?;
            let (name, rule, metadata) =
                parse_tag(template_id, content, start, &content[start + OPEN_TAG.len()..tag_end])?;

            let inner_start = tag_end + 1;
            let close = content[inner_start..]
                .find(CLOSE_TAG)
                .map(|offset| inner_start + offset)
                .ok_or_else(|| {
                    error_at(
                        template_id,
                        content,
                        start,
                        &format!("block '{}' is never closed", name),
                    )
                })?;
            if let Some(nested) = find_open_tag(&content[..close], inner_start) {
                return Err(error_at(
                    template_id,
                    content,
                    nested,
                    &format!("blocks cannot be nested inside '{}'", name),
                ));
            }

            if body.blocks.iter().any(|b| b.name == name) {
                return Err(error_at(
                    template_id,
                    content,
                    start,
                    &format!("block '{}' is declared twice", name),
                ));
            }

            let mut block = Block::new(name.clone(), trim_newlines(&content[inner_start..close]));
            block.rule = rule;
            block.metadata = metadata;
            body.blocks.push(block);
            body.nodes.push(BodyNode::BlockRef(name));

            pos = close + CLOSE_TAG.len();
        }

        push_literal(template_id, content, &content[pos..], pos, &mut body)?;
        Ok(body)
    }
}

/// Find the next `<block` that is followed by whitespace or `>`
fn find_open_tag(content: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(offset) = content[search..].find(OPEN_TAG) {
        let start = search + offset;
        let next = content[start + OPEN_TAG.len()..].chars().next();
        match next {
            Some(c) if c.is_whitespace() || c == '>' => return Some(start),
            _ => search = start + OPEN_TAG.len(),
        }
    }
    None
}

fn push_literal(
    template_id: &str,
    content: &str,
    text: &str,
    offset: usize,
    body: &mut ParsedBody,
) -> Result<()> {
    if let Some(stray) = text.find(CLOSE_TAG) {
        return Err(error_at(
            template_id,
            content,
            offset + stray,
            "closing marker without a matching block",
        ));
    }
    if !text.is_empty() {
        body.nodes.push(BodyNode::Literal(text.to_string()));
    }
    Ok(())
}

type TagParts = (String, Option<OverrideRule>, BTreeMap<String, String>);

fn parse_tag(template_id: &str, content: &str, start: usize, tag: &str) -> Result<TagParts> {
    let tag = tag.trim();
    let (name, attributes) = match tag.find(char::is_whitespace) {
        Some(split) => (&tag[..split], tag[split..].trim()),
        None => (tag, ""),
    };

    if !BLOCK_NAME.is_match(name) {
        return Err(error_at(
            template_id,
            content,
            start,
            &format!("invalid block name '{}'", name),
        ));
    }

    if !ATTRIBUTE.replace_all(attributes, "").trim().is_empty() {
        return Err(error_at(
            template_id,
            content,
            start,
            &format!("malformed attributes on block '{}'", name),
        ));
    }

    let mut rule = None;
    let mut metadata = BTreeMap::new();
    for caps in ATTRIBUTE.captures_iter(attributes) {
        let key = caps[1].to_string();
        let value = caps[2].to_string();
        if key == "rule" {
            rule = Some(value.parse().map_err(|_| {
                error_at(
                    template_id,
                    content,
                    start,
                    &format!("invalid override rule '{}' on block '{}'", value, name),
                )
            })?);
        } else {
            metadata.insert(key, value);
        }
    }

    Ok((name.to_string(), rule, metadata))
}

fn trim_newlines(text: &str) -> &str {
    text.trim_matches(|c| c == '\n' || c == '\r')
}

fn error_at(template_id: &str, content: &str, offset: usize, message: &str) -> CompositionError {
    let line = content[..offset].matches('\n').count() + 1;
    CompositionError::compile(template_id, format!("line {}: {}", line, message))
}
