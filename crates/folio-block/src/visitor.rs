//! Pre-order traversal over block trees

use crate::block::Block;
use std::sync::Arc;

/// Position of a visited block
#[derive(Debug, Clone, Copy)]
pub struct VisitContext<'a> {
    /// 1 for top-level blocks
    pub depth: usize,
    /// Enclosing block, `None` at top level
    pub parent: Option<&'a Block>,
    /// Index among the parent's children
    pub index: usize,
}

impl VisitContext<'_> {
    #[inline]
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }
}

/// Visitor invoked once per block, parents before children
pub trait BlockVisitor {
    type Error;

    /// Visit one block
    ///
    /// # Errors
    /// Returning an error stops the walk
    fn visit(&mut self, block: &Block, cx: &VisitContext<'_>) -> Result<(), Self::Error>;
}

/// Walk `roots` in pre-order, stopping at the first visitor error
///
/// # Errors
/// The first error returned by the visitor
pub fn walk<V: BlockVisitor>(roots: &[Arc<Block>], visitor: &mut V) -> Result<(), V::Error> {
    fn go<V: BlockVisitor>(
        block: &Block,
        cx: &VisitContext<'_>,
        visitor: &mut V,
    ) -> Result<(), V::Error> {
        visitor.visit(block, cx)?;
        for (index, child) in block.children().iter().enumerate() {
            let child_cx = VisitContext {
                depth: cx.depth + 1,
                parent: Some(block),
                index,
            };
            go(child, &child_cx, visitor)?;
        }
        Ok(())
    }

    for (index, root) in roots.iter().enumerate() {
        let cx = VisitContext {
            depth: 1,
            parent: None,
            index,
        };
        go(root, &cx, visitor)?;
    }
    Ok(())
}
