//! Blocks and their attributes

use crate::kind::BlockKind;
use folio_asset::ContentHash;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

static BLOCK_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("block id pattern is a valid regex")
});

/// Whether `id` is a well-formed block id
///
/// Ids start with a letter or underscore, followed by letters, digits,
/// underscores or hyphens.
#[must_use]
pub fn is_valid_block_id(id: &str) -> bool {
    BLOCK_ID.is_match(id)
}

/// Scalar attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Attribute value type, for schema checks and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    Bool,
    Int,
    Float,
    Str,
}

impl AttrValue {
    #[must_use]
    pub const fn attr_type(&self) -> AttrType {
        match self {
            Self::Bool(_) => AttrType::Bool,
            Self::Int(_) => AttrType::Int,
            Self::Float(_) => AttrType::Float,
            Self::Str(_) => AttrType::Str,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats must be finite to have a canonical encoding
    #[must_use]
    pub fn is_encodable(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
        })
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Attribute mapping; `BTreeMap` keeps keys in sorted order
pub type Attributes = BTreeMap<String, AttrValue>;

/// A finalized block
///
/// Immutable and shared through `Arc`, so one subtree can appear in several
/// documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    kind: BlockKind,
    id: String,
    attributes: Attributes,
    caption: Option<String>,
    asset: Option<ContentHash>,
    children: Vec<Arc<Block>>,
}

impl Block {
    /// Assemble a block from already-resolved parts
    ///
    /// Performs no checks; used by decoders and tests. Documents built this
    /// way must go through the schema validator before use.
    #[must_use]
    pub fn from_parts(
        kind: BlockKind,
        id: impl Into<String>,
        attributes: Attributes,
        caption: Option<String>,
        asset: Option<ContentHash>,
        children: Vec<Arc<Block>>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            attributes,
            caption,
            asset,
            children,
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    #[inline]
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    #[inline]
    #[must_use]
    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn asset(&self) -> Option<&ContentHash> {
        self.asset.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[Arc<Block>] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Height of the subtree rooted here (a leaf has height 1)
    #[must_use]
    pub fn height(&self) -> usize {
        1 + self.children.iter().map(|c| c.height()).max().unwrap_or(0)
    }

    /// Number of blocks in the subtree, including this one
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(|c| c.subtree_len()).sum::<usize>()
    }
}

/// Authoring-time description of a block
///
/// Host code fills these in and hands them to
/// [`TreeBuilder::add_block`](crate::TreeBuilder::add_block).
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSpec {
    pub kind: BlockKind,
    pub id: Option<String>,
    pub attributes: Attributes,
    pub caption: Option<String>,
    pub asset: Option<ContentHash>,
}

impl BlockSpec {
    #[must_use]
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            id: None,
            attributes: Attributes::new(),
            caption: None,
            asset: None,
        }
    }

    /// Markdown text block
    #[must_use]
    pub fn text(markdown: impl Into<String>) -> Self {
        Self::new(BlockKind::Text).with_attr("text", markdown.into())
    }

    #[must_use]
    pub fn table(asset: ContentHash) -> Self {
        Self::new(BlockKind::Table).with_asset(asset)
    }

    #[must_use]
    pub fn plot(asset: ContentHash) -> Self {
        Self::new(BlockKind::Plot).with_asset(asset)
    }

    #[must_use]
    pub fn media(asset: ContentHash) -> Self {
        Self::new(BlockKind::Media).with_asset(asset)
    }

    #[must_use]
    pub fn file(asset: ContentHash, filename: impl Into<String>) -> Self {
        Self::new(BlockKind::File)
            .with_asset(asset)
            .with_attr("filename", filename.into())
    }

    #[must_use]
    pub fn embed(url: impl Into<String>) -> Self {
        Self::new(BlockKind::Embed).with_attr("url", url.into())
    }

    #[must_use]
    pub fn group(columns: u32) -> Self {
        Self::new(BlockKind::Group).with_attr("columns", columns)
    }

    /// Select shown as tabs
    #[must_use]
    pub fn select() -> Self {
        Self::new(BlockKind::Select).with_attr("select_type", "tabs")
    }

    #[must_use]
    pub fn page(title: impl Into<String>) -> Self {
        Self::new(BlockKind::Page).with_attr("title", title.into())
    }

    #[must_use]
    pub fn toggle(label: impl Into<String>) -> Self {
        Self::new(BlockKind::Toggle).with_attr("label", label.into())
    }

    #[must_use]
    pub fn divider() -> Self {
        Self::new(BlockKind::Divider)
    }

    #[must_use]
    pub fn data_table(asset: ContentHash) -> Self {
        Self::new(BlockKind::DataTable).with_asset(asset)
    }

    /// Raw HTML fragment, shown as-is
    #[must_use]
    pub fn html(fragment: impl Into<String>) -> Self {
        Self::new(BlockKind::Html).with_attr("html", fragment.into())
    }

    #[must_use]
    pub fn code(source: impl Into<String>, language: impl Into<String>) -> Self {
        Self::new(BlockKind::Code)
            .with_attr("code", source.into())
            .with_attr("language", language.into())
    }

    #[must_use]
    pub fn formula(tex: impl Into<String>) -> Self {
        Self::new(BlockKind::Formula).with_attr("formula", tex.into())
    }

    /// Headline figure; `value` is kept as display text
    #[must_use]
    pub fn big_number(heading: impl Into<String>, value: impl ToString) -> Self {
        Self::new(BlockKind::BigNumber)
            .with_attr("heading", heading.into())
            .with_attr("value", value.to_string())
    }

    /// Change shown under a big number and whether it points up
    #[must_use]
    pub fn with_change(self, change: impl ToString, upward: bool) -> Self {
        self.with_attr("change", change.to_string())
            .with_attr("is_upward_change", upward)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(BlockKind::Empty)
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    #[must_use]
    pub fn with_asset(mut self, asset: ContentHash) -> Self {
        self.asset = Some(asset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_grammar() {
        for good in ["a", "_x", "text-1", "Table_2", "a-b_c"] {
            assert!(is_valid_block_id(good), "{good}");
        }
        for bad in ["", "3-invalid-name", "-a", "has space", "ü"] {
            assert!(!is_valid_block_id(bad), "{bad}");
        }
    }

    #[test]
    fn attr_value_json_shapes() {
        let attrs: Attributes = [
            ("b".to_string(), AttrValue::Bool(true)),
            ("f".to_string(), AttrValue::Float(2.0)),
            ("i".to_string(), AttrValue::Int(2)),
            ("s".to_string(), AttrValue::from("x")),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"b":true,"f":2.0,"i":2,"s":"x"}"#);

        let back: Attributes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }

    #[test]
    fn non_finite_floats_are_not_encodable() {
        assert!(!AttrValue::Float(f64::NAN).is_encodable());
        assert!(!AttrValue::Float(f64::INFINITY).is_encodable());
        assert!(AttrValue::Float(0.5).is_encodable());
    }

    #[test]
    fn height_and_len() {
        let leaf = Arc::new(Block::from_parts(
            BlockKind::Text,
            "t",
            Attributes::new(),
            None,
            None,
            vec![],
        ));
        let group = Block::from_parts(
            BlockKind::Group,
            "g",
            Attributes::new(),
            None,
            None,
            vec![Arc::clone(&leaf), leaf],
        );
        assert_eq!(group.height(), 2);
        assert_eq!(group.subtree_len(), 3);
    }
}
