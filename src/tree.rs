//! A mutable, arena backed document tree.
//!
//! The filling passes need parent/child/sibling navigation, node detach and
//! reinsert, deep cloning and text splitting, all while holding stable node
//! handles across mutations. Nodes live in a `Vec` arena owned by the
//! [`Document`] and are addressed by [`NodeId`], so handles stay valid even
//! for nodes that have been detached from the tree.

use crate::{Error, Result};

/// A handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

/// The payload of a node.
#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    /// The document root. Exactly one per document, never detached.
    Root,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub name: String,
    pub attrs: Vec<Attr>,
}

#[derive(Debug, Clone)]
pub(crate) struct Attr {
    pub name: String,
    pub value: String,
}

#[derive(Debug)]
struct NodeData {
    parent: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    kind: NodeKind,
}

/// An ordered tree of elements and text nodes.
///
/// Detached subtrees remain allocated in the arena until the document is
/// dropped; documents are short lived (one per fill) so this is fine.
#[derive(Debug)]
pub(crate) struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                parent: None,
                prev: None,
                next: None,
                first_child: None,
                last_child: None,
                kind: NodeKind::Root,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element(Element {
            name: name.into(),
            attrs: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(content.into()))
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent: None,
            prev: None,
            next: None,
            first_child: None,
            last_child: None,
            kind,
        });
        id
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].next
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].prev
    }

    /// A snapshot of the node's children, safe to iterate across mutations.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes[node.0].first_child;
        while let Some(c) = cur {
            out.push(c);
            cur = self.nodes[c.0].next;
        }
        out
    }

    /// Removes the node from its parent. The subtree stays intact and can be
    /// reinserted elsewhere. No-op if the node is already detached.
    pub fn detach(&mut self, node: NodeId) {
        let NodeData {
            parent, prev, next, ..
        } = self.nodes[node.0];

        if let Some(p) = prev {
            self.nodes[p.0].next = next;
        } else if let Some(par) = parent {
            self.nodes[par.0].first_child = next;
        }
        if let Some(n) = next {
            self.nodes[n.0].prev = prev;
        } else if let Some(par) = parent {
            self.nodes[par.0].last_child = prev;
        }

        self.nodes[node.0].parent = None;
        self.nodes[node.0].prev = None;
        self.nodes[node.0].next = None;
    }

    /// Appends a detached node as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, node: NodeId) {
        debug_assert!(self.nodes[node.0].parent.is_none(), "node must be detached");
        let last = self.nodes[parent.0].last_child;
        self.nodes[node.0].parent = Some(parent);
        self.nodes[node.0].prev = last;
        match last {
            Some(l) => self.nodes[l.0].next = Some(node),
            None => self.nodes[parent.0].first_child = Some(node),
        }
        self.nodes[parent.0].last_child = Some(node);
    }

    /// Inserts a detached node as the previous sibling of `reference`.
    pub fn insert_before(&mut self, node: NodeId, reference: NodeId) {
        debug_assert!(self.nodes[node.0].parent.is_none(), "node must be detached");
        let parent = self.nodes[reference.0]
            .parent
            .expect("reference node must be attached");
        let prev = self.nodes[reference.0].prev;
        self.nodes[node.0].parent = Some(parent);
        self.nodes[node.0].prev = prev;
        self.nodes[node.0].next = Some(reference);
        self.nodes[reference.0].prev = Some(node);
        match prev {
            Some(p) => self.nodes[p.0].next = Some(node),
            None => self.nodes[parent.0].first_child = Some(node),
        }
    }

    /// Inserts a detached node as the next sibling of `reference`.
    pub fn insert_after(&mut self, node: NodeId, reference: NodeId) {
        match self.next_sibling(reference) {
            Some(next) => self.insert_before(node, next),
            None => {
                let parent = self.nodes[reference.0]
                    .parent
                    .expect("reference node must be attached");
                self.append(parent, node);
            }
        }
    }

    /// Deep-copies the subtree rooted at `node`, returning the detached copy.
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        let kind = self.nodes[node.0].kind.clone();
        let copy = self.alloc(kind);
        for child in self.children(node) {
            let child_copy = self.clone_subtree(child);
            self.append(copy, child_copy);
        }
        copy
    }

    /// Splits the text node at the given byte offset. The node keeps the
    /// text before the offset; a new text node holding the rest is inserted
    /// as its next sibling and returned.
    pub fn split_text(&mut self, node: NodeId, offset: usize) -> NodeId {
        let tail = match &mut self.nodes[node.0].kind {
            NodeKind::Text(s) => s.split_off(offset),
            _ => panic!("split_text on a non-text node"),
        };
        let new = self.create_text(tail);
        if self.parent(node).is_some() {
            self.insert_after(new, node);
        }
        new
    }

    /// The chain from `node` (inclusive) towards the root, nearest first,
    /// stopping at `stop_at` (inclusive) when given.
    pub fn ancestors(&self, node: NodeId, stop_at: Option<NodeId>) -> Vec<NodeId> {
        let mut out = vec![node];
        let mut cur = node;
        while Some(cur) != stop_at {
            match self.parent(cur) {
                Some(p) => {
                    out.push(p);
                    cur = p;
                }
                None => break,
            }
        }
        out
    }

    /// The nearest node present in both ancestor chains.
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let ancestors_b = self.ancestors(b, None);
        for candidate in self.ancestors(a, None) {
            if ancestors_b.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::internal("nodes do not share a common ancestor"))
    }

    /// Depth-first traversal visiting children before their parent. The
    /// child list is snapshotted before descending so the visitor may mutate
    /// the tree; nodes inserted during the walk are not visited.
    pub fn traverse<F>(&mut self, node: NodeId, visit: &mut F) -> Result<()>
    where
        F: FnMut(&mut Document, NodeId) -> Result<()>,
    {
        for child in self.children(node) {
            self.traverse(child, visit)?;
        }
        visit(self, node)
    }

    /// All text node descendants of `node` in document order.
    pub fn text_descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if self.text(node).is_some() {
            out.push(node);
        }
        let mut cur = self.nodes[node.0].first_child;
        while let Some(c) = cur {
            self.collect_text(c, out);
            cur = self.nodes[c.0].next;
        }
    }

    /// Concatenated text content of the subtree rooted at `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        for t in self.text_descendants(node) {
            out.push_str(self.text(t).unwrap_or(""));
        }
        out
    }

    /// All descendant elements with the given name, in document order.
    pub fn elements_by_name(&self, node: NodeId, name: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements(node, name, &mut out);
        out
    }

    fn collect_elements(&self, node: NodeId, name: &str, out: &mut Vec<NodeId>) {
        if self.element(node).is_some_and(|el| el.name == name) {
            out.push(node);
        }
        let mut cur = self.nodes[node.0].first_child;
        while let Some(c) = cur {
            self.collect_elements(c, name, out);
            cur = self.nodes[c.0].next;
        }
    }

    /// The position of `node` among its parent's children.
    pub fn child_index(&self, node: NodeId) -> Result<usize> {
        let parent = self
            .parent(node)
            .ok_or_else(|| Error::internal("detached node has no child index"))?;
        self.children(parent)
            .iter()
            .position(|&c| c == node)
            .ok_or_else(|| Error::internal("node not found among its parent's children"))
    }

    /// The `index`-th child of `node`.
    pub fn child_at(&self, node: NodeId, index: usize) -> Result<NodeId> {
        self.children(node)
            .get(index)
            .copied()
            .ok_or_else(|| Error::internal("child index out of bounds"))
    }
}
