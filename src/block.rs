//! Template blocks delimited by a pair of block markers.
//!
//! A block spans from an opening marker text node to the matching closing
//! marker text node. Both markers may sit at different depths, so the block
//! is modeled as the common ancestor of the two markers, the branch leading
//! down to each marker, and the sibling content in between.

use crate::tree::{Document, NodeId};
use crate::{Error, Result};

/// The chain of nodes from a block's common ancestor down to a marker text
/// node. `chain[0]` is the common ancestor, the last entry is the marker.
#[derive(Debug, Clone)]
pub(crate) struct Branch {
    base: NodeId,
    chain: Vec<NodeId>,
}

impl Branch {
    pub fn new(doc: &Document, base: NodeId, leaf: NodeId) -> Self {
        let mut chain = doc.ancestors(leaf, Some(base));
        chain.reverse();
        Self { base, chain }
    }

    /// The direct child of the base on this branch.
    pub fn anchor(&self) -> Option<NodeId> {
        self.chain.get(1).copied()
    }

    /// Removes the marker leaf, then climbs towards the base removing
    /// ancestors left without visible text.
    ///
    /// The leaf may already have been detached as part of an adjacent block
    /// (the `{:else}` marker belongs to both halves of a conditional), so
    /// the chain is first re-anchored on its deepest still-attached node.
    pub fn remove_leaf_and_prune(&mut self, doc: &mut Document) {
        // The base itself stays in the chain even when detached from its
        // own parent, which happens while filling cloned loop content.
        if let Some(i) = self.chain[1..].iter().position(|&n| doc.parent(n).is_none()) {
            self.chain.truncate(i + 1);
        }

        let mut leaf = match self.chain.last().copied() {
            Some(leaf) => leaf,
            None => return,
        };

        if leaf != self.base {
            let parent = doc.parent(leaf).unwrap_or(self.base);
            doc.detach(leaf);
            leaf = parent;
        }

        while leaf != self.base && doc.text_content(leaf).trim().is_empty() {
            let parent = doc.parent(leaf);
            doc.detach(leaf);
            leaf = match parent {
                Some(parent) => parent,
                None => break,
            };
        }

        *self = Branch::new(doc, self.base, leaf);
    }

    /// Detaches everything to the right of the branch, for chain nodes from
    /// index `from` down to the leaf.
    pub fn remove_right_content(&self, doc: &mut Document, from: usize) {
        for &node in self.chain.iter().skip(from) {
            while let Some(sibling) = doc.next_sibling(node) {
                doc.detach(sibling);
            }
        }
    }

    /// Detaches everything to the left of the branch, for chain nodes from
    /// index `from` down to the leaf.
    pub fn remove_left_content(&self, doc: &mut Document, from: usize) {
        for &node in self.chain.iter().skip(from) {
            while let Some(sibling) = doc.prev_sibling(node) {
                doc.detach(sibling);
            }
        }
    }

    /// Child indexes leading from the anchor down to the leaf, used to find
    /// the leaf again in a cloned copy of the anchor.
    pub fn path_below_anchor(&self, doc: &Document) -> Result<Vec<usize>> {
        self.chain
            .iter()
            .skip(2)
            .map(|&node| doc.child_index(node))
            .collect()
    }
}

/// A region delimited by two marker text nodes.
#[derive(Debug, Clone)]
pub(crate) struct Block {
    pub common: NodeId,
    pub start: Branch,
    pub end: Branch,
    /// Children of the common ancestor strictly between the two anchors.
    pub middle: Vec<NodeId>,
}

impl Block {
    pub fn new(doc: &Document, start_leaf: NodeId, end_leaf: NodeId) -> Result<Self> {
        let common = doc.common_ancestor(start_leaf, end_leaf)?;
        let start = Branch::new(doc, common, start_leaf);
        let end = Branch::new(doc, common, end_leaf);

        let start_anchor = start
            .anchor()
            .ok_or_else(|| Error::internal("block start marker has no branch to walk"))?;
        let end_anchor = end
            .anchor()
            .ok_or_else(|| Error::internal("block end marker has no branch to walk"))?;

        let mut middle = Vec::new();
        let mut cursor = doc.next_sibling(start_anchor);
        loop {
            match cursor {
                Some(node) if node == end_anchor => break,
                Some(node) => {
                    middle.push(node);
                    cursor = doc.next_sibling(node);
                }
                None => {
                    return Err(Error::internal(
                        "block end marker does not follow its start marker",
                    ));
                }
            }
        }

        Ok(Self {
            common,
            start,
            end,
            middle,
        })
    }

    /// Removes both marker text nodes and prunes emptied ancestors.
    pub fn remove_markers_and_prune(&mut self, doc: &mut Document) {
        self.start.remove_leaf_and_prune(doc);
        self.end.remove_leaf_and_prune(doc);
    }

    /// Removes everything between the two markers, leaving the markers and
    /// the content outside the block untouched.
    pub fn remove_content(&self, doc: &mut Document) {
        self.start.remove_right_content(doc, 2);
        for &node in &self.middle {
            doc.detach(node);
        }
        self.end.remove_left_content(doc, 2);
    }

    /// Deep-copies the block content (both anchors and the middle) and
    /// inserts the copy right after this block under the same common
    /// ancestor. Returns the block delimited by the cloned markers.
    pub fn clone_after(&self, doc: &mut Document) -> Result<Block> {
        let start_anchor = self
            .start
            .anchor()
            .ok_or_else(|| Error::internal("cannot clone a block whose start branch is gone"))?;
        let end_anchor = self
            .end
            .anchor()
            .ok_or_else(|| Error::internal("cannot clone a block whose end branch is gone"))?;

        let start_path = self.start.path_below_anchor(doc)?;
        let end_path = self.end.path_below_anchor(doc)?;

        let start_clone = doc.clone_subtree(start_anchor);
        let mut pieces = vec![start_clone];
        for &node in &self.middle {
            pieces.push(doc.clone_subtree(node));
        }
        let end_clone = doc.clone_subtree(end_anchor);
        pieces.push(end_clone);

        match doc.next_sibling(end_anchor) {
            Some(reference) => {
                for &piece in &pieces {
                    doc.insert_before(piece, reference);
                }
            }
            None => {
                for &piece in &pieces {
                    doc.append(self.common, piece);
                }
            }
        }

        let mut start_leaf = start_clone;
        for index in start_path {
            start_leaf = doc.child_at(start_leaf, index)?;
        }
        let mut end_leaf = end_clone;
        for index in end_path {
            end_leaf = doc.child_at(end_leaf, index)?;
        }

        Block::new(doc, start_leaf, end_leaf)
    }
}
