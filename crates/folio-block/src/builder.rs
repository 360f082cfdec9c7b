//! Tree Builder
//!
//! The authoring interface. Host code adds blocks, wires parent/child edges,
//! then finalizes the tree into an immutable [`Document`].
//!
//! Usage:
//! ```rust
//! use folio_block::{BlockSpec, Context, TreeBuilder};
//!
//! let mut builder = TreeBuilder::new();
//! let group = builder.add_block(BlockSpec::group(2)).unwrap();
//! let a = builder.add_block(BlockSpec::text("left")).unwrap();
//! let b = builder.add_block(BlockSpec::text("right")).unwrap();
//! builder.add_child(group, a).unwrap();
//! builder.add_child(group, b).unwrap();
//!
//! let doc = builder.finalize(&[group], &Context::new("Quarterly")).unwrap();
//! assert_eq!(doc.pages().len(), 1);
//! assert_eq!(doc.pages()[0].children()[0].id(), "group-1");
//! ```

use crate::block::{is_valid_block_id, Attributes, Block, BlockSpec};
use crate::document::{Context, Document, DocumentMeta};
use crate::error::AuthoringError;
use crate::kind::BlockKind;
use folio_asset::{AssetStore, ContentHash};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_BUILDER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a block inside one [`TreeBuilder`]
///
/// Handles from another builder are rejected with
/// [`AuthoringError::UnknownHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    builder: u64,
    index: usize,
}

#[derive(Debug)]
enum Child {
    Local(usize),
    Shared(Arc<Block>),
}

#[derive(Debug)]
struct Node {
    spec: BlockSpec,
    children: Vec<Child>,
    parent: Option<usize>,
}

/// Arena-backed builder for block trees
#[derive(Debug)]
pub struct TreeBuilder {
    id: u64,
    nodes: Vec<Node>,
    max_depth: usize,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    /// Create a new, empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_depth(Context::DEFAULT_MAX_DEPTH)
    }

    /// Create a builder that rejects edits nesting deeper than `max_depth`
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            id: NEXT_BUILDER_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            max_depth,
        }
    }

    /// Number of blocks added so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Spec a block was added with
    #[must_use]
    pub fn spec(&self, handle: BlockHandle) -> Option<&BlockSpec> {
        self.index(handle).ok().map(|i| &self.nodes[i].spec)
    }

    /// Parent of a block, if attached
    #[must_use]
    pub fn parent(&self, handle: BlockHandle) -> Option<BlockHandle> {
        let i = self.index(handle).ok()?;
        self.nodes[i].parent.map(|p| self.handle(p))
    }

    /// Add a detached block
    ///
    /// # Errors
    /// - `AuthoringError::InvalidId` if a user id is malformed
    /// - `AuthoringError::InvalidAttribute` for empty keys or non-finite floats
    pub fn add_block(&mut self, spec: BlockSpec) -> Result<BlockHandle, AuthoringError> {
        if let Some(id) = &spec.id {
            if !is_valid_block_id(id) {
                return Err(AuthoringError::InvalidId(id.clone()));
            }
        }
        for (key, value) in &spec.attributes {
            if key.is_empty() {
                return Err(AuthoringError::InvalidAttribute {
                    key: key.clone(),
                    reason: "attribute keys must be non-empty".to_string(),
                });
            }
            if !value.is_encodable() {
                return Err(AuthoringError::InvalidAttribute {
                    key: key.clone(),
                    reason: "float values must be finite".to_string(),
                });
            }
        }

        let index = self.nodes.len();
        self.nodes.push(Node {
            spec,
            children: Vec::new(),
            parent: None,
        });
        Ok(self.handle(index))
    }

    /// Append `child` to `parent`'s children
    ///
    /// # Errors
    /// - `AuthoringError::UnknownHandle` for foreign handles
    /// - `AuthoringError::LeafCannotHaveChildren` if `parent` is a leaf kind
    /// - `AuthoringError::Cycle` if `child` is `parent` or one of its ancestors
    /// - `AuthoringError::AlreadyAttached` if `child` already has a parent
    /// - `AuthoringError::DepthExceeded` if the result would nest too deep
    pub fn add_child(
        &mut self,
        parent: BlockHandle,
        child: BlockHandle,
    ) -> Result<(), AuthoringError> {
        let p = self.index(parent)?;
        let c = self.index(child)?;

        let kind = self.nodes[p].spec.kind;
        if !kind.is_container() {
            return Err(AuthoringError::LeafCannotHaveChildren { kind });
        }
        if p == c || self.is_ancestor(c, p) {
            return Err(AuthoringError::Cycle);
        }
        if self.nodes[c].parent.is_some() {
            return Err(AuthoringError::AlreadyAttached);
        }
        if self.depth_of(p) + self.height_of(c) > self.max_depth {
            return Err(AuthoringError::DepthExceeded {
                max: self.max_depth,
            });
        }

        self.nodes[c].parent = Some(p);
        self.nodes[p].children.push(Child::Local(c));
        Ok(())
    }

    /// Graft an already-finalized subtree under `parent`
    ///
    /// The subtree is shared, not copied; its ids are kept as they are. One
    /// reference is taken in `store` for every asset the subtree points at,
    /// so the new document owns its own hold and can release it
    /// independently of the document the subtree came from.
    ///
    /// # Errors
    /// - `AuthoringError::UnknownHandle` for foreign handles
    /// - `AuthoringError::LeafCannotHaveChildren` if `parent` is a leaf kind
    /// - `AuthoringError::DepthExceeded` if the result would nest too deep
    /// - `AuthoringError::SharedAsset` if `store` lacks a referenced asset
    pub fn attach_shared(
        &mut self,
        parent: BlockHandle,
        subtree: Arc<Block>,
        store: &AssetStore,
    ) -> Result<(), AuthoringError> {
        let p = self.index(parent)?;
        let kind = self.nodes[p].spec.kind;
        if !kind.is_container() {
            return Err(AuthoringError::LeafCannotHaveChildren { kind });
        }
        if self.depth_of(p) + subtree.height() > self.max_depth {
            return Err(AuthoringError::DepthExceeded {
                max: self.max_depth,
            });
        }

        let mut refs = Vec::new();
        collect_assets(&subtree, &mut refs);
        store
            .retain_all(refs)
            .map_err(|err| AuthoringError::SharedAsset(err.to_string()))?;

        self.nodes[p].children.push(Child::Shared(subtree));
        Ok(())
    }

    /// Freeze the trees under `roots` into a [`Document`]
    ///
    /// Loose (non-page) roots are wrapped into a single page. Blocks without
    /// an id get `"{kind}-{n}"`, numbered per kind in pre-order, skipping ids
    /// already in use. Blocks not reachable from `roots` are dropped.
    ///
    /// # Errors
    /// - `AuthoringError::EmptyDocument` if `roots` is empty
    /// - `AuthoringError::NotARoot` if a root has a parent
    /// - `AuthoringError::MixedRoots` if roots mix pages and other blocks
    /// - `AuthoringError::DuplicateId` if two reachable blocks share an id
    /// - `AuthoringError::Arity` if a select has no children
    /// - `AuthoringError::DepthExceeded` if nesting exceeds `cx.max_depth`
    pub fn finalize(
        self,
        roots: &[BlockHandle],
        cx: &Context,
    ) -> Result<Document, AuthoringError> {
        if roots.is_empty() {
            return Err(AuthoringError::EmptyDocument);
        }

        let mut indices = Vec::with_capacity(roots.len());
        for &root in roots {
            let i = self.index(root)?;
            if self.nodes[i].parent.is_some() || indices.contains(&i) {
                return Err(AuthoringError::NotARoot(self.describe(i)));
            }
            indices.push(i);
        }

        let page_roots = indices
            .iter()
            .filter(|&&i| self.nodes[i].spec.kind == BlockKind::Page)
            .count();
        if page_roots != 0 && page_roots != indices.len() {
            return Err(AuthoringError::MixedRoots);
        }

        let mut ids = IdAllocator::new(self.claimed_ids(&indices)?);

        let pages = if page_roots == 0 {
            let page_id = ids.next(BlockKind::Page);
            let children = indices
                .iter()
                .map(|&i| self.freeze(i, 2, &mut ids, cx.max_depth))
                .collect::<Result<Vec<_>, _>>()?;
            vec![Arc::new(Block::from_parts(
                BlockKind::Page,
                page_id,
                Attributes::new(),
                None,
                None,
                children,
            ))]
        } else {
            indices
                .iter()
                .map(|&i| self.freeze(i, 1, &mut ids, cx.max_depth))
                .collect::<Result<Vec<_>, _>>()?
        };

        let meta = DocumentMeta {
            title: cx.title.clone(),
            author: cx.author.clone(),
            description: cx.description.clone(),
            created_at: cx.timestamp(),
            schema_version: cx.schema_version,
        };
        Ok(Document::from_parts(meta, pages).with_max_depth(cx.max_depth))
    }

    fn freeze(
        &self,
        i: usize,
        depth: usize,
        ids: &mut IdAllocator,
        max_depth: usize,
    ) -> Result<Arc<Block>, AuthoringError> {
        if depth > max_depth {
            return Err(AuthoringError::DepthExceeded { max: max_depth });
        }
        let node = &self.nodes[i];
        let kind = node.spec.kind;
        // Assign before descending so numbering follows pre-order.
        let id = match &node.spec.id {
            Some(id) => id.clone(),
            None => ids.next(kind),
        };

        if kind.is_exclusive() && node.children.is_empty() {
            return Err(AuthoringError::Arity {
                kind,
                id,
                detail: "requires at least one child".to_string(),
            });
        }

        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            match child {
                Child::Local(j) => children.push(self.freeze(*j, depth + 1, ids, max_depth)?),
                Child::Shared(block) => {
                    if depth + block.height() > max_depth {
                        return Err(AuthoringError::DepthExceeded { max: max_depth });
                    }
                    children.push(Arc::clone(block));
                }
            }
        }

        Ok(Arc::new(Block::from_parts(
            kind,
            id,
            node.spec.attributes.clone(),
            node.spec.caption.clone(),
            node.spec.asset,
            children,
        )))
    }

    /// Ids set by the author or carried by shared subtrees, reachable from roots
    fn claimed_ids(&self, roots: &[usize]) -> Result<HashSet<String>, AuthoringError> {
        fn claim(taken: &mut HashSet<String>, id: &str) -> Result<(), AuthoringError> {
            if taken.insert(id.to_string()) {
                Ok(())
            } else {
                Err(AuthoringError::DuplicateId(id.to_string()))
            }
        }

        fn claim_shared(taken: &mut HashSet<String>, block: &Block) -> Result<(), AuthoringError> {
            claim(taken, block.id())?;
            for child in block.children() {
                claim_shared(taken, child)?;
            }
            Ok(())
        }

        let mut taken = HashSet::new();
        let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if let Some(id) = &node.spec.id {
                claim(&mut taken, id)?;
            }
            for child in node.children.iter().rev() {
                match child {
                    Child::Local(j) => stack.push(*j),
                    Child::Shared(block) => claim_shared(&mut taken, block)?,
                }
            }
        }
        Ok(taken)
    }

    fn handle(&self, index: usize) -> BlockHandle {
        BlockHandle {
            builder: self.id,
            index,
        }
    }

    fn index(&self, handle: BlockHandle) -> Result<usize, AuthoringError> {
        if handle.builder != self.id || handle.index >= self.nodes.len() {
            return Err(AuthoringError::UnknownHandle);
        }
        Ok(handle.index)
    }

    /// Whether `ancestor` lies on the parent chain of `node`
    fn is_ancestor(&self, ancestor: usize, node: usize) -> bool {
        let mut current = self.nodes[node].parent;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.nodes[p].parent;
        }
        false
    }

    /// Depth of a node counting itself (a detached node has depth 1)
    fn depth_of(&self, node: usize) -> usize {
        let mut depth = 1;
        let mut current = self.nodes[node].parent;
        while let Some(p) = current {
            depth += 1;
            current = self.nodes[p].parent;
        }
        depth
    }

    fn height_of(&self, node: usize) -> usize {
        1 + self.nodes[node]
            .children
            .iter()
            .map(|child| match child {
                Child::Local(j) => self.height_of(*j),
                Child::Shared(block) => block.height(),
            })
            .max()
            .unwrap_or(0)
    }

    fn describe(&self, i: usize) -> String {
        let spec = &self.nodes[i].spec;
        spec.id
            .clone()
            .unwrap_or_else(|| format!("<unnamed {}>", spec.kind))
    }
}

fn collect_assets(block: &Block, out: &mut Vec<ContentHash>) {
    if let Some(hash) = block.asset() {
        out.push(*hash);
    }
    for child in block.children() {
        collect_assets(child, out);
    }
}

struct IdAllocator {
    taken: HashSet<String>,
    counters: HashMap<BlockKind, usize>,
}

impl IdAllocator {
    fn new(taken: HashSet<String>) -> Self {
        Self {
            taken,
            counters: HashMap::new(),
        }
    }

    fn next(&mut self, kind: BlockKind) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{kind}-{counter}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(doc: &Document) -> Vec<String> {
        fn collect(block: &Block, out: &mut Vec<String>) {
            out.push(block.id().to_string());
            for c in block.children() {
                collect(c, out);
            }
        }
        let mut out = Vec::new();
        for page in doc.pages() {
            collect(page, &mut out);
        }
        out
    }

    #[test]
    fn loose_blocks_are_wrapped_in_one_page() {
        let mut b = TreeBuilder::new();
        let t1 = b.add_block(BlockSpec::text("one")).unwrap();
        let t2 = b.add_block(BlockSpec::text("two")).unwrap();
        let doc = b.finalize(&[t1, t2], &Context::new("r")).unwrap();

        assert_eq!(doc.pages().len(), 1);
        assert_eq!(doc.pages()[0].kind(), BlockKind::Page);
        assert_eq!(ids(&doc), vec!["page-1", "text-1", "text-2"]);
    }

    #[test]
    fn generated_ids_skip_user_ids() {
        let mut b = TreeBuilder::new();
        let g = b.add_block(BlockSpec::group(1)).unwrap();
        let named = b.add_block(BlockSpec::text("x").with_id("text-1")).unwrap();
        let anon = b.add_block(BlockSpec::text("y")).unwrap();
        b.add_child(g, anon).unwrap();
        b.add_child(g, named).unwrap();

        let doc = b.finalize(&[g], &Context::new("r")).unwrap();
        assert_eq!(ids(&doc), vec!["page-1", "group-1", "text-2", "text-1"]);
    }

    #[test]
    fn leaf_cannot_take_children() {
        let mut b = TreeBuilder::new();
        let t = b.add_block(BlockSpec::text("x")).unwrap();
        let u = b.add_block(BlockSpec::text("y")).unwrap();
        assert_eq!(
            b.add_child(t, u),
            Err(AuthoringError::LeafCannotHaveChildren {
                kind: BlockKind::Text
            })
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let mut b = TreeBuilder::new();
        let g1 = b.add_block(BlockSpec::group(1)).unwrap();
        let g2 = b.add_block(BlockSpec::group(1)).unwrap();
        let g3 = b.add_block(BlockSpec::group(1)).unwrap();
        b.add_child(g1, g2).unwrap();
        b.add_child(g2, g3).unwrap();

        assert_eq!(b.add_child(g3, g1), Err(AuthoringError::Cycle));
        assert_eq!(b.add_child(g2, g2), Err(AuthoringError::Cycle));
    }

    #[test]
    fn second_parent_is_rejected() {
        let mut b = TreeBuilder::new();
        let g1 = b.add_block(BlockSpec::group(1)).unwrap();
        let g2 = b.add_block(BlockSpec::group(1)).unwrap();
        let t = b.add_block(BlockSpec::text("x")).unwrap();
        b.add_child(g1, t).unwrap();
        assert_eq!(b.add_child(g2, t), Err(AuthoringError::AlreadyAttached));
        assert_eq!(b.parent(t), Some(g1));
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut a = TreeBuilder::new();
        let mut b = TreeBuilder::new();
        let ha = a.add_block(BlockSpec::group(1)).unwrap();
        let hb = b.add_block(BlockSpec::text("x")).unwrap();
        assert_eq!(a.add_child(ha, hb), Err(AuthoringError::UnknownHandle));
    }

    #[test]
    fn depth_is_bounded_at_edit_time() {
        let mut b = TreeBuilder::with_max_depth(3);
        let g1 = b.add_block(BlockSpec::group(1)).unwrap();
        let g2 = b.add_block(BlockSpec::group(1)).unwrap();
        let g3 = b.add_block(BlockSpec::group(1)).unwrap();
        let t = b.add_block(BlockSpec::text("deep")).unwrap();
        b.add_child(g1, g2).unwrap();
        b.add_child(g2, g3).unwrap();
        assert_eq!(
            b.add_child(g3, t),
            Err(AuthoringError::DepthExceeded { max: 3 })
        );
    }

    #[test]
    fn depth_counts_implicit_page_at_finalize() {
        let mut b = TreeBuilder::new();
        let g1 = b.add_block(BlockSpec::group(1)).unwrap();
        let t = b.add_block(BlockSpec::text("x")).unwrap();
        b.add_child(g1, t).unwrap();
        let cx = Context::new("r").with_max_depth(2);
        assert_eq!(
            b.finalize(&[g1], &cx),
            Err(AuthoringError::DepthExceeded { max: 2 })
        );
    }

    #[test]
    fn empty_select_fails_finalize() {
        let mut b = TreeBuilder::new();
        let s = b.add_block(BlockSpec::select()).unwrap();
        let err = b.finalize(&[s], &Context::new("r")).unwrap_err();
        assert!(matches!(
            err,
            AuthoringError::Arity {
                kind: BlockKind::Select,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_user_ids_fail_finalize() {
        let mut b = TreeBuilder::new();
        let a = b.add_block(BlockSpec::text("a").with_id("my-name")).unwrap();
        let c = b.add_block(BlockSpec::text("a").with_id("my-name")).unwrap();
        assert_eq!(
            b.finalize(&[a, c], &Context::new("r")),
            Err(AuthoringError::DuplicateId("my-name".to_string()))
        );
    }

    #[test]
    fn invalid_ids_and_attributes_fail_add() {
        let mut b = TreeBuilder::new();
        assert_eq!(
            b.add_block(BlockSpec::text("a").with_id("3-invalid-name")),
            Err(AuthoringError::InvalidId("3-invalid-name".to_string()))
        );
        assert!(matches!(
            b.add_block(BlockSpec::text("a").with_attr("ratio", f64::NAN)),
            Err(AuthoringError::InvalidAttribute { .. })
        ));
        assert!(b.is_empty());
    }

    #[test]
    fn mixed_roots_rejected() {
        let mut b = TreeBuilder::new();
        let p = b.add_block(BlockSpec::page("one")).unwrap();
        let t = b.add_block(BlockSpec::text("loose")).unwrap();
        assert_eq!(
            b.finalize(&[p, t], &Context::new("r")),
            Err(AuthoringError::MixedRoots)
        );
    }

    #[test]
    fn attached_block_is_not_a_root() {
        let mut b = TreeBuilder::new();
        let g = b.add_block(BlockSpec::group(1)).unwrap();
        let t = b.add_block(BlockSpec::text("x")).unwrap();
        b.add_child(g, t).unwrap();
        assert!(matches!(
            b.finalize(&[t], &Context::new("r")),
            Err(AuthoringError::NotARoot(_))
        ));
    }

    #[test]
    fn shared_subtree_is_reused_by_pointer() {
        let mut first = TreeBuilder::new();
        let g = first.add_block(BlockSpec::group(2).with_id("shared")).unwrap();
        let t = first.add_block(BlockSpec::text("x").with_id("shared-text")).unwrap();
        first.add_child(g, t).unwrap();
        let doc1 = first.finalize(&[g], &Context::new("one")).unwrap();
        let subtree = Arc::clone(&doc1.pages()[0].children()[0]);

        let mut second = TreeBuilder::new();
        let page = second.add_block(BlockSpec::page("two")).unwrap();
        second
            .attach_shared(page, Arc::clone(&subtree), &AssetStore::new())
            .unwrap();
        let doc2 = second.finalize(&[page], &Context::new("two")).unwrap();

        assert!(Arc::ptr_eq(&doc2.pages()[0].children()[0], &subtree));
        assert_eq!(ids(&doc2), vec!["page-1", "shared", "shared-text"]);
    }

    #[test]
    fn shared_subtree_twice_is_duplicate() {
        let mut first = TreeBuilder::new();
        let t = first.add_block(BlockSpec::text("x")).unwrap();
        let doc = first.finalize(&[t], &Context::new("one")).unwrap();
        let subtree = Arc::clone(&doc.pages()[0].children()[0]);

        let store = AssetStore::new();
        let mut second = TreeBuilder::new();
        let g = second.add_block(BlockSpec::group(2)).unwrap();
        second.attach_shared(g, Arc::clone(&subtree), &store).unwrap();
        second.attach_shared(g, subtree, &store).unwrap();
        assert_eq!(
            second.finalize(&[g], &Context::new("two")),
            Err(AuthoringError::DuplicateId("text-1".to_string()))
        );
    }

    #[test]
    fn shared_subtree_keeps_assets_alive_for_its_first_owner() {
        let store = AssetStore::new();
        let csv = store.intern(b"a,b\n1,2\n", "text/csv").unwrap();

        let mut first = TreeBuilder::new();
        let g = first.add_block(BlockSpec::group(1)).unwrap();
        let t = first.add_block(BlockSpec::table(csv)).unwrap();
        first.add_child(g, t).unwrap();
        let doc1 = first.finalize(&[g], &Context::new("one")).unwrap();
        let subtree = Arc::clone(&doc1.pages()[0].children()[0]);

        let mut second = TreeBuilder::new();
        let page = second.add_block(BlockSpec::page("two")).unwrap();
        second.attach_shared(page, subtree, &store).unwrap();
        let doc2 = second.finalize(&[page], &Context::new("two")).unwrap();
        assert_eq!(store.ref_count(&csv), Some(2));

        doc2.release_assets(&store).unwrap();
        assert_eq!(store.collect_garbage().reclaimed, 0);
        assert!(store.contains(&csv));

        doc1.release_assets(&store).unwrap();
        assert_eq!(store.collect_garbage().reclaimed, 1);
        assert!(!store.contains(&csv));
    }

    #[test]
    fn shared_subtree_with_missing_asset_is_rejected() {
        let orphan = ContentHash::compute(b"not interned");
        let mut first = TreeBuilder::new();
        let t = first.add_block(BlockSpec::table(orphan)).unwrap();
        let doc = first.finalize(&[t], &Context::new("one")).unwrap();
        let subtree = Arc::clone(&doc.pages()[0].children()[0]);

        let mut second = TreeBuilder::new();
        let g = second.add_block(BlockSpec::group(1)).unwrap();
        assert!(matches!(
            second.attach_shared(g, subtree, &AssetStore::new()),
            Err(AuthoringError::SharedAsset(_))
        ));
        let doc2 = second.finalize(&[g], &Context::new("two"));
        assert_eq!(doc2.unwrap().pages()[0].children()[0].children().len(), 0);
    }

    #[test]
    fn asset_refs_follow_pre_order() {
        let h1 = ContentHash::compute(b"one");
        let h2 = ContentHash::compute(b"two");
        let mut b = TreeBuilder::new();
        let t = b.add_block(BlockSpec::table(h2)).unwrap();
        let p = b.add_block(BlockSpec::plot(h1)).unwrap();
        let again = b.add_block(BlockSpec::table(h2)).unwrap();
        let doc = b.finalize(&[t, p, again], &Context::new("r")).unwrap();

        assert_eq!(doc.asset_refs(), vec![h2, h1, h2]);
        assert_eq!(doc.unique_assets().len(), 2);
        assert_eq!(doc.block_count(), 4);
    }
}
