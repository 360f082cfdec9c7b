use chrono::{TimeZone, Utc};
use folio_asset::ContentHash;
use folio_block::{
    AttrType, AttrValue, Attributes, Block, BlockKind, BlockSpec, Context, Document, DocumentMeta,
    SchemaVersion, TreeBuilder,
};
use folio_schema::{
    report, validate, Schema, SchemaRegistry, ValidationError, Validator,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn meta(version: SchemaVersion) -> DocumentMeta {
    DocumentMeta {
        title: "t".to_string(),
        author: None,
        description: None,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        schema_version: version,
    }
}

fn block(kind: BlockKind, id: &str, children: Vec<Arc<Block>>) -> Arc<Block> {
    Arc::new(Block::from_parts(kind, id, Attributes::new(), None, None, children))
}

fn text(id: &str) -> Arc<Block> {
    let attrs: Attributes = [("text".to_string(), AttrValue::from("hello"))]
        .into_iter()
        .collect();
    Arc::new(Block::from_parts(BlockKind::Text, id, attrs, None, None, vec![]))
}

fn doc(pages: Vec<Arc<Block>>) -> Document {
    Document::from_parts(meta(SchemaVersion::V1_1), pages)
}

#[test]
fn built_document_validates() {
    let mut b = TreeBuilder::new();
    let table = b
        .add_block(BlockSpec::table(ContentHash::compute(b"rows")))
        .unwrap();
    let body = b.add_block(BlockSpec::text("# Summary")).unwrap();
    let select = b.add_block(BlockSpec::select()).unwrap();
    let toggle = b.add_block(BlockSpec::toggle("details")).unwrap();
    let inner = b.add_block(BlockSpec::text("hidden")).unwrap();
    b.add_child(select, body).unwrap();
    b.add_child(toggle, inner).unwrap();
    let document = b
        .finalize(&[table, select, toggle], &Context::new("ok"))
        .unwrap();

    validate(&document, SchemaVersion::CURRENT).unwrap();
    let r = report(&document, SchemaVersion::CURRENT);
    assert!(r.is_valid());
    assert_eq!(r.blocks_checked, 6);
}

#[test]
fn empty_select_is_nesting_violation() {
    let d = doc(vec![block(
        BlockKind::Page,
        "page-1",
        vec![block(BlockKind::Select, "select-1", vec![])],
    )]);
    let err = validate(&d, SchemaVersion::V1_1).unwrap_err();
    assert!(
        matches!(&err, ValidationError::NestingViolation { id, .. } if id == "select-1"),
        "{err}"
    );
}

#[test]
fn toggle_is_unknown_in_v1_0() {
    let d = Document::from_parts(
        meta(SchemaVersion::V1_0),
        vec![block(
            BlockKind::Page,
            "page-1",
            vec![block(BlockKind::Toggle, "toggle-1", vec![text("text-1")])],
        )],
    );
    assert_eq!(
        validate(&d, SchemaVersion::V1_0),
        Err(ValidationError::UnknownBlockType {
            id: "toggle-1".to_string(),
            kind: BlockKind::Toggle,
            version: SchemaVersion::V1_0,
        })
    );
}

#[test]
fn version_must_be_registered_and_declared() {
    let d = doc(vec![block(BlockKind::Page, "p", vec![text("t")])]);

    let err = validate(&d, SchemaVersion::new(2, 0)).unwrap_err();
    assert_eq!(err.reason(), "schema_version_unsupported");

    let err = validate(&d, SchemaVersion::V1_0).unwrap_err();
    assert!(err.to_string().contains("document declares 1.1"), "{err}");
}

#[test]
fn nested_page_and_loose_top_level_rejected() {
    let nested = doc(vec![block(
        BlockKind::Page,
        "outer",
        vec![block(
            BlockKind::Group,
            "g",
            vec![block(BlockKind::Page, "inner", vec![text("t")])],
        )],
    )]);
    let err = validate(&nested, SchemaVersion::V1_1).unwrap_err();
    assert!(matches!(&err, ValidationError::NestingViolation { id, .. } if id == "inner"));

    let loose = doc(vec![text("t")]);
    let err = validate(&loose, SchemaVersion::V1_1).unwrap_err();
    assert!(matches!(&err, ValidationError::NestingViolation { id, .. } if id == "t"));
}

#[test]
fn empty_page_rejected() {
    let d = doc(vec![block(BlockKind::Page, "p", vec![])]);
    assert!(matches!(
        validate(&d, SchemaVersion::V1_1),
        Err(ValidationError::NestingViolation { .. })
    ));
    assert_eq!(
        validate(&doc(vec![]), SchemaVersion::V1_1),
        Err(ValidationError::EmptyDocument)
    );
}

#[test]
fn attribute_rules() {
    let group_attrs: Attributes = [("columns".to_string(), AttrValue::from("two"))]
        .into_iter()
        .collect();
    let blank: Attributes = [("text".to_string(), AttrValue::from("   "))]
        .into_iter()
        .collect();
    let group = Arc::new(Block::from_parts(
        BlockKind::Group,
        "g",
        group_attrs,
        None,
        None,
        vec![text("t")],
    ));
    let blank_text = Arc::new(Block::from_parts(BlockKind::Text, "b", blank, None, None, vec![]));
    let missing = block(BlockKind::Embed, "e", vec![]);
    let d = doc(vec![block(
        BlockKind::Page,
        "p",
        vec![group, blank_text, missing],
    )]);

    let r = report(&d, SchemaVersion::V1_1);
    assert_eq!(
        r.violations,
        vec![
            ValidationError::AttributeTypeMismatch {
                id: "g".to_string(),
                key: "columns".to_string(),
                expected: AttrType::Int,
                found: AttrType::Str,
            },
            ValidationError::InvalidAttribute {
                id: "b".to_string(),
                key: "text".to_string(),
                reason: "must not be blank".to_string(),
            },
            ValidationError::MissingAttribute {
                id: "e".to_string(),
                key: "url".to_string(),
            },
        ]
    );
    // validate stops at the first of them
    assert_eq!(
        validate(&d, SchemaVersion::V1_1),
        Err(r.violations[0].clone())
    );
}

#[test]
fn unknown_attribute_keys_pass() {
    let attrs: Attributes = [
        ("text".to_string(), AttrValue::from("body")),
        ("x-custom".to_string(), AttrValue::Int(7)),
    ]
    .into_iter()
    .collect();
    let t = Arc::new(Block::from_parts(BlockKind::Text, "t", attrs, None, None, vec![]));
    let d = doc(vec![block(BlockKind::Page, "p", vec![t])]);
    validate(&d, SchemaVersion::V1_1).unwrap();
}

#[test]
fn asset_refs_checked_per_kind() {
    let missing = block(BlockKind::Table, "table-1", vec![]);
    let d = doc(vec![block(BlockKind::Page, "p", vec![missing])]);
    assert_eq!(
        validate(&d, SchemaVersion::V1_1),
        Err(ValidationError::MissingAssetRef {
            id: "table-1".to_string()
        })
    );

    let attrs: Attributes = [("text".to_string(), AttrValue::from("x"))]
        .into_iter()
        .collect();
    let stray = Arc::new(Block::from_parts(
        BlockKind::Text,
        "text-1",
        attrs,
        None,
        Some(ContentHash::compute(b"x")),
        vec![],
    ));
    let d = doc(vec![block(BlockKind::Page, "p", vec![stray])]);
    assert!(matches!(
        validate(&d, SchemaVersion::V1_1),
        Err(ValidationError::UnexpectedAssetRef { .. })
    ));
}

#[test]
fn ids_checked_for_grammar_and_uniqueness() {
    let d = doc(vec![block(
        BlockKind::Page,
        "p",
        vec![text("same"), text("same"), text("9lives")],
    )]);
    let r = report(&d, SchemaVersion::V1_1);
    assert_eq!(
        r.violations,
        vec![
            ValidationError::DuplicateBlockId("same".to_string()),
            ValidationError::InvalidBlockId("9lives".to_string()),
        ]
    );
}

#[test]
fn depth_bound_applies() {
    let deep = block(
        BlockKind::Page,
        "p",
        vec![block(
            BlockKind::Group,
            "g1",
            vec![block(BlockKind::Group, "g2", vec![text("t")])],
        )],
    );
    let d = doc(vec![deep]);
    let registry = SchemaRegistry::builtin();
    let validator = Validator::new(&registry).with_max_depth(3);
    assert_eq!(
        validator.validate(&d, SchemaVersion::V1_1),
        Err(ValidationError::DepthExceeded {
            id: "t".to_string(),
            max: 3
        })
    );
    Validator::new(&registry)
        .with_max_depth(4)
        .validate(&d, SchemaVersion::V1_1)
        .unwrap();
}

#[test]
fn custom_registry_version() {
    let mut registry = SchemaRegistry::builtin();
    let next = SchemaVersion::new(1, 3);
    registry.register(Schema::v1_2().extend(next)).unwrap();

    let d = Document::from_parts(
        meta(next),
        vec![block(BlockKind::Page, "p", vec![text("t")])],
    );
    Validator::new(&registry).validate(&d, next).unwrap();
    assert!(validate(&d, next).is_err());
}

#[test]
fn depth_follows_the_finalizing_context() {
    let depth = Context::DEFAULT_MAX_DEPTH + 8;
    let mut b = TreeBuilder::with_max_depth(depth);
    let top = b.add_block(BlockSpec::group(1)).unwrap();
    let mut parent = top;
    // Page plus this chain sits well past the default bound.
    for _ in 0..Context::DEFAULT_MAX_DEPTH + 2 {
        let next = b.add_block(BlockSpec::group(1)).unwrap();
        b.add_child(parent, next).unwrap();
        parent = next;
    }
    let document = b
        .finalize(&[top], &Context::new("deep").with_max_depth(depth))
        .unwrap();

    validate(&document, SchemaVersion::CURRENT).unwrap();
    let registry = SchemaRegistry::builtin();
    assert!(matches!(
        Validator::new(&registry)
            .with_max_depth(Context::DEFAULT_MAX_DEPTH)
            .validate(&document, SchemaVersion::CURRENT),
        Err(ValidationError::DepthExceeded { .. })
    ));
}

fn content_blocks() -> (TreeBuilder, Vec<folio_block::BlockHandle>) {
    let mut b = TreeBuilder::new();
    let specs = [
        BlockSpec::html("<h1>Hello World</h1>"),
        BlockSpec::code("print('hello')", "python"),
        BlockSpec::formula(r"\frac{1}{\sqrt{x^2 + 1}}"),
        BlockSpec::big_number("Tests written", 1234),
        BlockSpec::big_number("Real tests", 11).with_change(2, true),
        BlockSpec::empty().with_id("empty-block"),
        BlockSpec::data_table(ContentHash::compute(b"big table")),
    ];
    let handles = specs.into_iter().map(|s| b.add_block(s).unwrap()).collect();
    (b, handles)
}

#[test]
fn content_kinds_need_schema_1_2() {
    let (b, roots) = content_blocks();
    let document = b.finalize(&roots, &Context::new("kinds")).unwrap();
    assert_eq!(document.schema_version(), SchemaVersion::V1_2);
    validate(&document, SchemaVersion::V1_2).unwrap();

    let (b, roots) = content_blocks();
    let legacy = b
        .finalize(
            &roots,
            &Context::new("kinds").with_schema_version(SchemaVersion::V1_1),
        )
        .unwrap();
    let r = report(&legacy, SchemaVersion::V1_1);
    let unknown: Vec<BlockKind> = r
        .violations
        .iter()
        .filter_map(|v| match v {
            ValidationError::UnknownBlockType { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        unknown,
        vec![
            BlockKind::Html,
            BlockKind::Code,
            BlockKind::Formula,
            BlockKind::BigNumber,
            BlockKind::BigNumber,
            BlockKind::Empty,
            BlockKind::DataTable,
        ]
    );
}

fn single(spec: BlockSpec) -> Result<(), ValidationError> {
    let mut b = TreeBuilder::new();
    let h = b.add_block(spec).unwrap();
    let document = b.finalize(&[h], &Context::new("one")).unwrap();
    validate(&document, SchemaVersion::V1_2)
}

#[test]
fn content_kind_attribute_rules() {
    assert!(matches!(
        single(BlockSpec::html("   ")),
        Err(ValidationError::InvalidAttribute { key, .. }) if key == "html"
    ));
    assert!(matches!(
        single(BlockSpec::new(BlockKind::Code)),
        Err(ValidationError::MissingAttribute { key, .. }) if key == "code"
    ));
    single(BlockSpec::new(BlockKind::Code).with_attr("code", "x = 1")).unwrap();
    assert!(matches!(
        single(BlockSpec::new(BlockKind::Formula)),
        Err(ValidationError::MissingAttribute { key, .. }) if key == "formula"
    ));
    assert!(matches!(
        single(BlockSpec::new(BlockKind::BigNumber).with_attr("value", "3")),
        Err(ValidationError::MissingAttribute { key, .. }) if key == "heading"
    ));
    assert!(matches!(
        single(BlockSpec::big_number("Up", 3).with_attr("is_upward_change", "yes")),
        Err(ValidationError::AttributeTypeMismatch { key, expected: AttrType::Bool, .. })
            if key == "is_upward_change"
    ));
    assert!(matches!(
        single(BlockSpec::new(BlockKind::DataTable)),
        Err(ValidationError::MissingAssetRef { .. })
    ));
    assert!(matches!(
        single(BlockSpec::empty().with_asset(ContentHash::compute(b"x"))),
        Err(ValidationError::UnexpectedAssetRef { .. })
    ));
}
