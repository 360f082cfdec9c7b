//! Closed set of block kinds
//!
//! Blocks are a tagged-variant set rather than an open class hierarchy.
//! Behaviour that depends on the kind is expressed as capability checks on
//! [`BlockKind`] so callers never match on names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Block type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Top-level page; only valid at the root of a document
    Page,
    /// Layout container, children shown together
    Group,
    /// Mutually exclusive alternatives (tabs or dropdown)
    Select,
    /// Collapsible container
    Toggle,
    /// Tabular dataset
    Table,
    /// Large dataset shown with paging and filtering
    DataTable,
    /// Chart spec
    Plot,
    /// Markdown text
    Text,
    /// Image, audio or video
    Media,
    /// Downloadable attachment
    File,
    /// External content by URL or HTML snippet
    Embed,
    /// Horizontal rule
    Divider,
    /// Raw HTML fragment
    Html,
    /// Source listing
    Code,
    /// TeX formula
    Formula,
    /// Headline figure with an optional change indicator
    BigNumber,
    /// Placeholder with no content
    Empty,
}

impl BlockKind {
    /// All kinds, in declaration order
    pub const ALL: [BlockKind; 17] = [
        Self::Page,
        Self::Group,
        Self::Select,
        Self::Toggle,
        Self::Table,
        Self::DataTable,
        Self::Plot,
        Self::Text,
        Self::Media,
        Self::File,
        Self::Embed,
        Self::Divider,
        Self::Html,
        Self::Code,
        Self::Formula,
        Self::BigNumber,
        Self::Empty,
    ];

    /// Stable wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Group => "group",
            Self::Select => "select",
            Self::Toggle => "toggle",
            Self::Table => "table",
            Self::DataTable => "datatable",
            Self::Plot => "plot",
            Self::Text => "text",
            Self::Media => "media",
            Self::File => "file",
            Self::Embed => "embed",
            Self::Divider => "divider",
            Self::Html => "html",
            Self::Code => "code",
            Self::Formula => "formula",
            Self::BigNumber => "bignumber",
            Self::Empty => "empty",
        }
    }

    /// Kinds that may hold children
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Page | Self::Group | Self::Select | Self::Toggle)
    }

    /// Kinds whose content lives in the asset store
    #[must_use]
    pub const fn carries_asset(self) -> bool {
        matches!(
            self,
            Self::Table | Self::DataTable | Self::Plot | Self::Media | Self::File
        )
    }

    /// Containers whose children are alternatives, shown one at a time
    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Select)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised block type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown block type: '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for BlockKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}
