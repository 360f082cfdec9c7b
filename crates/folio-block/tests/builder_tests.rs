use folio_block::{
    walk, AttrValue, AuthoringError, Block, BlockKind, BlockSpec, BlockVisitor, Context,
    SchemaVersion, TreeBuilder, VisitContext,
};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;

fn fixed_context() -> Context {
    Context::new("Fixed")
        .with_author("analyst")
        .with_created_at(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
}

struct Ids(Vec<String>);

impl BlockVisitor for Ids {
    type Error = ();

    fn visit(&mut self, block: &Block, _cx: &VisitContext<'_>) -> Result<(), ()> {
        self.0.push(block.id().to_string());
        Ok(())
    }
}

proptest! {
    #[test]
    fn prop_random_edges_keep_a_forest(
        kinds in proptest::collection::vec(0..3u8, 2..16),
        edges in proptest::collection::vec((0..16usize, 0..16usize), 0..60)
    ) {
        let mut builder = TreeBuilder::new();
        let handles: Vec<_> = kinds
            .iter()
            .map(|k| {
                let spec = match k {
                    0 => BlockSpec::group(1),
                    1 => BlockSpec::toggle("more"),
                    _ => BlockSpec::text("leaf"),
                };
                builder.add_block(spec).unwrap()
            })
            .collect();

        for (p, c) in edges {
            if p < handles.len() && c < handles.len() {
                let _ = builder.add_child(handles[p], handles[c]);
            }
        }

        // Every accepted edge left each block with at most one parent, and
        // following parents always terminates at a root.
        let roots: Vec<_> = handles
            .iter()
            .copied()
            .filter(|h| builder.parent(*h).is_none())
            .collect();
        prop_assert!(!roots.is_empty());
        for h in &handles {
            let mut seen = HashSet::new();
            let mut cur = Some(*h);
            while let Some(x) = cur {
                prop_assert!(seen.insert(x));
                cur = builder.parent(x);
            }
        }

        let doc = builder.finalize(&roots, &fixed_context()).unwrap();
        prop_assert_eq!(doc.block_count(), handles.len() + 1);

        let mut ids = Ids(Vec::new());
        walk(doc.pages(), &mut ids).unwrap();
        let unique: HashSet<_> = ids.0.iter().collect();
        prop_assert_eq!(unique.len(), ids.0.len());
    }

    #[test]
    fn prop_attribute_insertion_order_is_irrelevant(
        pairs in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
    ) {
        let build = |reverse: bool| {
            let mut spec = BlockSpec::text("body");
            let mut entries: Vec<_> = pairs.iter().collect();
            if reverse {
                entries.reverse();
            }
            for (k, v) in entries {
                spec = spec.with_attr(k.clone(), *v);
            }
            let mut b = TreeBuilder::new();
            let h = b.add_block(spec).unwrap();
            b.finalize(&[h], &fixed_context()).unwrap()
        };
        prop_assert_eq!(build(false), build(true));
    }
}

#[test]
fn same_authoring_twice_gives_equal_documents() {
    let build = || {
        let mut b = TreeBuilder::new();
        let page = b.add_block(BlockSpec::page("Overview")).unwrap();
        let select = b.add_block(BlockSpec::select()).unwrap();
        let a = b.add_block(BlockSpec::text("tab a").with_caption("A")).unwrap();
        let c = b.add_block(BlockSpec::text("tab b").with_caption("B")).unwrap();
        b.add_child(page, select).unwrap();
        b.add_child(select, a).unwrap();
        b.add_child(select, c).unwrap();
        b.finalize(&[page], &fixed_context()).unwrap()
    };
    let first = build();
    assert_eq!(first, build());
    assert_eq!(first.author(), Some("analyst"));
    assert_eq!(first.schema_version(), SchemaVersion::CURRENT);
    assert_eq!(first.find("text-2").and_then(Block::caption), Some("B"));
}

#[test]
fn multiple_pages_keep_their_order() {
    let mut b = TreeBuilder::new();
    let p1 = b.add_block(BlockSpec::page("One")).unwrap();
    let p2 = b.add_block(BlockSpec::page("Two").with_id("second")).unwrap();
    for p in [p1, p2] {
        let t = b.add_block(BlockSpec::text("body")).unwrap();
        b.add_child(p, t).unwrap();
    }
    let doc = b.finalize(&[p2, p1], &fixed_context()).unwrap();

    let ids: Vec<_> = doc.pages().iter().map(|p| p.id().to_string()).collect();
    assert_eq!(ids, vec!["second", "page-1"]);
    assert_eq!(
        doc.pages()[0].attribute("title"),
        Some(&AttrValue::from("Two"))
    );
}

#[test]
fn failed_edit_leaves_builder_unchanged() {
    let mut b = TreeBuilder::new();
    let g = b.add_block(BlockSpec::group(1)).unwrap();
    let t = b.add_block(BlockSpec::text("x")).unwrap();
    assert_eq!(
        b.add_child(t, g),
        Err(AuthoringError::LeafCannotHaveChildren {
            kind: BlockKind::Text
        })
    );
    assert_eq!(b.parent(g), None);
    b.add_child(g, t).unwrap();
    assert_eq!(b.parent(t), Some(g));
    assert_eq!(b.len(), 2);
}

#[test]
fn empty_roots_rejected() {
    let b = TreeBuilder::new();
    assert_eq!(
        b.finalize(&[], &fixed_context()),
        Err(AuthoringError::EmptyDocument)
    );
}
