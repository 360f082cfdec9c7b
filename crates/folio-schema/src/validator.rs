//! Document validation
//!
//! Validation is pure and total: every document either passes or yields the
//! first violation found in pre-order. [`Validator::report`] keeps going and
//! lists every violation instead.

use crate::error::ValidationError;
use crate::registry::{KindRule, Schema, SchemaRegistry};
use folio_block::{
    is_valid_block_id, walk, AttrValue, Block, BlockKind, BlockVisitor, Document, SchemaVersion,
    VisitContext,
};
use once_cell::sync::Lazy;
use std::collections::HashSet;

static BUILTIN: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::builtin);

/// Validate `document` against the built-in schema `version`
///
/// # Errors
/// The first violation in pre-order
pub fn validate(document: &Document, version: SchemaVersion) -> Result<(), ValidationError> {
    Validator::builtin().validate(document, version)
}

/// Every violation of `document` against the built-in schema `version`
#[must_use]
pub fn report(document: &Document, version: SchemaVersion) -> ValidationReport {
    Validator::builtin().report(document, version)
}

/// Outcome of a full validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub version: SchemaVersion,
    pub blocks_checked: usize,
    pub violations: Vec<ValidationError>,
}

impl ValidationReport {
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// First violation, as [`validate`] would return it
    ///
    /// # Errors
    /// The first recorded violation
    pub fn into_result(self) -> Result<(), ValidationError> {
        match self.violations.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Validator bound to a schema registry
///
/// Depth is checked against the bound the document was finalized under
/// unless [`with_max_depth`](Self::with_max_depth) overrides it.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'r> {
    registry: &'r SchemaRegistry,
    max_depth: Option<usize>,
}

impl Validator<'static> {
    /// Validator over the built-in schemas
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(&BUILTIN)
    }
}

impl<'r> Validator<'r> {
    #[must_use]
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            max_depth: None,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Check `document` against schema `version`
    ///
    /// # Errors
    /// The first violation in pre-order
    pub fn validate(
        &self,
        document: &Document,
        version: SchemaVersion,
    ) -> Result<(), ValidationError> {
        let mut check = self.start(document, version, true)?;
        match walk(document.pages(), &mut check) {
            Ok(()) => Ok(()),
            Err(Stop) => check.into_first(),
        }
    }

    /// Check `document` against schema `version`, collecting every violation
    #[must_use]
    pub fn report(&self, document: &Document, version: SchemaVersion) -> ValidationReport {
        let mut check = match self.start(document, version, false) {
            Ok(check) => check,
            Err(err) => {
                return ValidationReport {
                    version,
                    blocks_checked: 0,
                    violations: vec![err],
                }
            }
        };
        match walk(document.pages(), &mut check) {
            // Without fail-fast the visitor never stops early.
            Ok(()) | Err(Stop) => {}
        }

        tracing::debug!(
            version = %version,
            blocks = check.blocks_checked,
            violations = check.violations.len(),
            "validated document"
        );
        ValidationReport {
            version,
            blocks_checked: check.blocks_checked,
            violations: check.violations,
        }
    }

    fn start(
        &self,
        document: &Document,
        version: SchemaVersion,
        fail_fast: bool,
    ) -> Result<Check<'_>, ValidationError> {
        let schema = self.registry.get(version).ok_or_else(|| {
            ValidationError::SchemaVersionUnsupported {
                version,
                detail: "version is not registered".to_string(),
            }
        })?;
        if document.schema_version() != version {
            return Err(ValidationError::SchemaVersionUnsupported {
                version,
                detail: format!("document declares {}", document.schema_version()),
            });
        }
        if document.pages().is_empty() {
            return Err(ValidationError::EmptyDocument);
        }
        Ok(Check {
            schema,
            max_depth: self.max_depth.unwrap_or_else(|| document.max_depth()),
            fail_fast,
            seen: HashSet::new(),
            violations: Vec::new(),
            blocks_checked: 0,
        })
    }
}

struct Stop;

struct Check<'s> {
    schema: &'s Schema,
    max_depth: usize,
    fail_fast: bool,
    seen: HashSet<String>,
    violations: Vec<ValidationError>,
    blocks_checked: usize,
}

impl Check<'_> {
    fn record(&mut self, err: ValidationError) -> Result<(), Stop> {
        self.violations.push(err);
        if self.fail_fast {
            Err(Stop)
        } else {
            Ok(())
        }
    }

    fn into_first(self) -> Result<(), ValidationError> {
        match self.violations.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_attributes(
        &mut self,
        block: &Block,
        rule: &KindRule,
    ) -> Result<(), Stop> {
        let id = block.id();
        for (key, attr) in rule.attributes() {
            match block.attribute(key) {
                None if attr.required => self.record(ValidationError::MissingAttribute {
                    id: id.to_string(),
                    key: (*key).to_string(),
                })?,
                None => {}
                Some(value) if value.attr_type() != attr.ty => {
                    self.record(ValidationError::AttributeTypeMismatch {
                        id: id.to_string(),
                        key: (*key).to_string(),
                        expected: attr.ty,
                        found: value.attr_type(),
                    })?;
                }
                Some(value) => {
                    if let Some(reason) = attr.check.violation(value) {
                        self.record(ValidationError::InvalidAttribute {
                            id: id.to_string(),
                            key: (*key).to_string(),
                            reason,
                        })?;
                    }
                }
            }
        }

        for (key, value) in block.attributes() {
            if let AttrValue::Float(f) = value {
                if !f.is_finite() {
                    self.record(ValidationError::InvalidAttribute {
                        id: id.to_string(),
                        key: key.clone(),
                        reason: "must be a finite number".to_string(),
                    })?;
                }
            }
        }
        Ok(())
    }
}

impl BlockVisitor for Check<'_> {
    type Error = Stop;

    fn visit(&mut self, block: &Block, cx: &VisitContext<'_>) -> Result<(), Stop> {
        self.blocks_checked += 1;
        let id = block.id();
        let kind = block.kind();

        if !is_valid_block_id(id) {
            self.record(ValidationError::InvalidBlockId(id.to_string()))?;
        } else if !self.seen.insert(id.to_string()) {
            self.record(ValidationError::DuplicateBlockId(id.to_string()))?;
        }

        let schema = self.schema;
        let Some(rule) = schema.rule(kind) else {
            return self.record(ValidationError::UnknownBlockType {
                id: id.to_string(),
                kind,
                version: schema.version(),
            });
        };

        if cx.depth > self.max_depth {
            self.record(ValidationError::DepthExceeded {
                id: id.to_string(),
                max: self.max_depth,
            })?;
        }

        if cx.is_top_level() && kind != BlockKind::Page {
            self.record(ValidationError::NestingViolation {
                id: id.to_string(),
                detail: format!("{kind} block at top level; top-level blocks must be pages"),
            })?;
        }
        if let Some(parent) = cx.parent.filter(|_| kind == BlockKind::Page) {
            self.record(ValidationError::NestingViolation {
                id: id.to_string(),
                detail: format!("page nested inside {} '{}'", parent.kind(), parent.id()),
            })?;
        }

        let count = block.children().len();
        if rule.max_children() == Some(0) && count > 0 {
            self.record(ValidationError::NestingViolation {
                id: id.to_string(),
                detail: format!("{kind} blocks cannot have children, found {count}"),
            })?;
        } else if let Some(max) = rule.max_children().filter(|&max| count > max) {
            self.record(ValidationError::NestingViolation {
                id: id.to_string(),
                detail: format!("{kind} allows at most {max} children, found {count}"),
            })?;
        }
        if count < rule.min_children() {
            let min = rule.min_children();
            let noun = if min == 1 { "child" } else { "children" };
            self.record(ValidationError::NestingViolation {
                id: id.to_string(),
                detail: format!("{kind} requires at least {min} {noun}, found {count}"),
            })?;
        }

        match (rule.requires_asset(), block.asset().is_some()) {
            (true, false) => {
                self.record(ValidationError::MissingAssetRef { id: id.to_string() })?;
            }
            (false, true) => self.record(ValidationError::UnexpectedAssetRef {
                id: id.to_string(),
                kind,
            })?,
            _ => {}
        }

        self.check_attributes(block, rule)
    }
}
