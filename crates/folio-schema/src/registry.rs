//! Schema registry
//!
//! Schemas are keyed by [`SchemaVersion`]. Registration is append-only and
//! monotonic: a schema can only be added if it is newer than every schema
//! already present.

use crate::error::RegistryError;
use folio_block::{AttrType, AttrValue, BlockKind, SchemaVersion};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Value constraint on top of an attribute's type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttrCheck {
    #[default]
    Any,
    /// String must contain a non-whitespace character
    NonBlank,
    /// String must be one of the listed values
    OneOf(&'static [&'static str]),
    /// Integer must be at least this value
    AtLeast(i64),
}

impl AttrCheck {
    /// Failure description, or `None` if `value` passes
    #[must_use]
    pub fn violation(&self, value: &AttrValue) -> Option<String> {
        match (self, value) {
            (Self::NonBlank, AttrValue::Str(s)) if s.trim().is_empty() => {
                Some("must not be blank".to_string())
            }
            (Self::OneOf(allowed), AttrValue::Str(s)) if !allowed.contains(&s.as_str()) => {
                Some(format!("must be one of {}", allowed.join(", ")))
            }
            (Self::AtLeast(min), AttrValue::Int(i)) if i < min => {
                Some(format!("must be at least {min}"))
            }
            _ => None,
        }
    }
}

/// Rule for one known attribute key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrRule {
    pub ty: AttrType,
    pub required: bool,
    pub check: AttrCheck,
}

impl AttrRule {
    #[must_use]
    pub const fn required(ty: AttrType) -> Self {
        Self {
            ty,
            required: true,
            check: AttrCheck::Any,
        }
    }

    #[must_use]
    pub const fn optional(ty: AttrType) -> Self {
        Self {
            ty,
            required: false,
            check: AttrCheck::Any,
        }
    }

    #[must_use]
    pub const fn with_check(mut self, check: AttrCheck) -> Self {
        self.check = check;
        self
    }
}

/// Structural and attribute rules for one block kind
///
/// Attribute keys without a rule are accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindRule {
    attributes: BTreeMap<&'static str, AttrRule>,
    min_children: usize,
    max_children: Option<usize>,
    requires_asset: bool,
}

impl KindRule {
    /// Kind without children
    #[must_use]
    pub fn leaf() -> Self {
        Self {
            attributes: BTreeMap::new(),
            min_children: 0,
            max_children: Some(0),
            requires_asset: false,
        }
    }

    /// Container kind needing at least `min_children` children
    #[must_use]
    pub fn container(min_children: usize) -> Self {
        Self {
            attributes: BTreeMap::new(),
            min_children,
            max_children: None,
            requires_asset: false,
        }
    }

    #[must_use]
    pub fn with_attr(mut self, key: &'static str, rule: AttrRule) -> Self {
        self.attributes.insert(key, rule);
        self
    }

    #[must_use]
    pub fn with_asset(mut self) -> Self {
        self.requires_asset = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<&'static str, AttrRule> {
        &self.attributes
    }

    #[inline]
    #[must_use]
    pub fn min_children(&self) -> usize {
        self.min_children
    }

    #[inline]
    #[must_use]
    pub fn max_children(&self) -> Option<usize> {
        self.max_children
    }

    #[inline]
    #[must_use]
    pub fn requires_asset(&self) -> bool {
        self.requires_asset
    }
}

/// One released schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    version: SchemaVersion,
    kinds: BTreeMap<BlockKind, KindRule>,
}

impl Schema {
    #[must_use]
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            kinds: BTreeMap::new(),
        }
    }

    /// Start a new version from this schema's rules
    #[must_use]
    pub fn extend(&self, version: SchemaVersion) -> Self {
        Self {
            version,
            kinds: self.kinds.clone(),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: BlockKind, rule: KindRule) -> Self {
        self.kinds.insert(kind, rule);
        self
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn rule(&self, kind: BlockKind) -> Option<&KindRule> {
        self.kinds.get(&kind)
    }

    /// Kinds defined by this schema, in declaration order
    pub fn kinds(&self) -> impl Iterator<Item = BlockKind> + '_ {
        self.kinds.keys().copied()
    }

    /// Schema 1.0: the nine core block kinds
    #[must_use]
    pub fn v1_0() -> Self {
        use AttrType::{Bool, Int, Str};

        Self::new(SchemaVersion::V1_0)
            .with_kind(
                BlockKind::Page,
                KindRule::container(1).with_attr("title", AttrRule::optional(Str)),
            )
            .with_kind(
                BlockKind::Group,
                KindRule::container(0)
                    .with_attr(
                        "columns",
                        AttrRule::optional(Int).with_check(AttrCheck::AtLeast(1)),
                    )
                    .with_attr("label", AttrRule::optional(Str)),
            )
            .with_kind(
                BlockKind::Select,
                KindRule::container(1)
                    .with_attr(
                        "select_type",
                        AttrRule::optional(Str)
                            .with_check(AttrCheck::OneOf(&["tabs", "dropdown"])),
                    )
                    .with_attr("label", AttrRule::optional(Str)),
            )
            .with_kind(BlockKind::Table, KindRule::leaf().with_asset())
            .with_kind(
                BlockKind::Plot,
                KindRule::leaf()
                    .with_asset()
                    .with_attr("responsive", AttrRule::optional(Bool)),
            )
            .with_kind(
                BlockKind::Text,
                KindRule::leaf().with_attr(
                    "text",
                    AttrRule::required(Str).with_check(AttrCheck::NonBlank),
                ),
            )
            .with_kind(BlockKind::Media, KindRule::leaf().with_asset())
            .with_kind(
                BlockKind::File,
                KindRule::leaf().with_asset().with_attr(
                    "filename",
                    AttrRule::required(Str).with_check(AttrCheck::NonBlank),
                ),
            )
            .with_kind(
                BlockKind::Embed,
                KindRule::leaf().with_attr(
                    "url",
                    AttrRule::required(Str).with_check(AttrCheck::NonBlank),
                ),
            )
    }

    /// Schema 1.1: adds `toggle` and `divider`
    #[must_use]
    pub fn v1_1() -> Self {
        Self::v1_0()
            .extend(SchemaVersion::V1_1)
            .with_kind(
                BlockKind::Toggle,
                KindRule::container(0).with_attr("label", AttrRule::optional(AttrType::Str)),
            )
            .with_kind(BlockKind::Divider, KindRule::leaf())
    }

    /// Schema 1.2: adds the content kinds `html`, `code`, `formula`,
    /// `bignumber`, `empty` and `datatable`
    #[must_use]
    pub fn v1_2() -> Self {
        use AttrType::{Bool, Str};

        let non_blank = AttrRule::required(Str).with_check(AttrCheck::NonBlank);
        Self::v1_1()
            .extend(SchemaVersion::V1_2)
            .with_kind(BlockKind::Html, KindRule::leaf().with_attr("html", non_blank))
            .with_kind(
                BlockKind::Code,
                KindRule::leaf()
                    .with_attr("code", AttrRule::required(Str))
                    .with_attr("language", AttrRule::optional(Str)),
            )
            .with_kind(BlockKind::Formula, KindRule::leaf().with_attr("formula", non_blank))
            .with_kind(
                BlockKind::BigNumber,
                KindRule::leaf()
                    .with_attr("heading", non_blank)
                    .with_attr("value", AttrRule::required(Str))
                    .with_attr("change", AttrRule::optional(Str))
                    .with_attr("is_upward_change", AttrRule::optional(Bool)),
            )
            .with_kind(BlockKind::Empty, KindRule::leaf())
            .with_kind(BlockKind::DataTable, KindRule::leaf().with_asset())
    }
}

/// Versioned set of schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<SchemaVersion, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Registry holding every released schema
    #[must_use]
    pub fn builtin() -> Self {
        let schemas = [Schema::v1_0(), Schema::v1_1(), Schema::v1_2()]
            .into_iter()
            .map(|schema| (schema.version(), Arc::new(schema)))
            .collect();
        Self { schemas }
    }

    /// Register a schema newer than every registered one
    ///
    /// # Errors
    /// `RegistryError::NotMonotonic` if `schema` is not the newest
    pub fn register(&mut self, schema: Schema) -> Result<(), RegistryError> {
        if let Some(latest) = self.latest() {
            if schema.version() <= latest {
                return Err(RegistryError::NotMonotonic {
                    version: schema.version(),
                    latest,
                });
            }
        }
        self.schemas.insert(schema.version(), Arc::new(schema));
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn get(&self, version: SchemaVersion) -> Option<&Arc<Schema>> {
        self.schemas.get(&version)
    }

    #[inline]
    #[must_use]
    pub fn supports(&self, version: SchemaVersion) -> bool {
        self.schemas.contains_key(&version)
    }

    /// Newest registered version
    #[must_use]
    pub fn latest(&self) -> Option<SchemaVersion> {
        self.schemas.keys().next_back().copied()
    }

    /// Registered versions, oldest first
    #[must_use]
    pub fn versions(&self) -> Vec<SchemaVersion> {
        self.schemas.keys().copied().collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_every_release() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(
            registry.versions(),
            vec![SchemaVersion::V1_0, SchemaVersion::V1_1, SchemaVersion::V1_2]
        );
        assert_eq!(registry.latest(), Some(SchemaVersion::CURRENT));
    }

    #[test]
    fn v1_0_lacks_toggle_and_divider() {
        let v10 = Schema::v1_0();
        assert_eq!(v10.kinds().count(), 9);
        assert!(v10.rule(BlockKind::Toggle).is_none());
        assert!(v10.rule(BlockKind::Divider).is_none());

        let v11 = Schema::v1_1();
        assert_eq!(v11.kinds().count(), 11);
        assert!(v11.rule(BlockKind::BigNumber).is_none());
    }

    #[test]
    fn v1_2_covers_every_kind() {
        let v12 = Schema::v1_2();
        for kind in BlockKind::ALL {
            assert!(v12.rule(kind).is_some(), "{kind}");
        }
        assert!(v12.rule(BlockKind::DataTable).unwrap().requires_asset());
        assert!(!v12.rule(BlockKind::Code).unwrap().attributes()["language"].required);
    }

    #[test]
    fn register_is_monotonic() {
        let mut registry = SchemaRegistry::builtin();
        let err = registry
            .register(Schema::v1_0().extend(SchemaVersion::V1_0))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::NotMonotonic {
                version: SchemaVersion::V1_0,
                latest: SchemaVersion::V1_2
            }
        );

        registry
            .register(Schema::v1_2().extend(SchemaVersion::new(1, 3)))
            .unwrap();
        assert_eq!(registry.latest(), Some(SchemaVersion::new(1, 3)));
    }

    #[test]
    fn attr_checks() {
        let one_of = AttrCheck::OneOf(&["tabs", "dropdown"]);
        assert!(one_of.violation(&AttrValue::from("tabs")).is_none());
        assert!(one_of.violation(&AttrValue::from("carousel")).is_some());
        assert!(AttrCheck::NonBlank.violation(&AttrValue::from("  ")).is_some());
        assert!(AttrCheck::AtLeast(1).violation(&AttrValue::Int(0)).is_some());
        assert!(AttrCheck::AtLeast(1).violation(&AttrValue::Int(3)).is_none());
    }
}
