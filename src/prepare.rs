//! Preparation passes run on the document before filling.
//!
//! Formatting applied to part of a marker in the source document splits the
//! marker text across several text nodes. Consolidation merges each such
//! marker back into a single text node, dropping the formatting that split
//! it. Isolation then splits text nodes so that every block marker sits
//! alone in its own text node.
//!
//! After both passes every marker lives in exactly one text node, which is
//! what the fill pass relies on.

use crate::marker::{self, Found};
use crate::tree::{Document, NodeId};
use crate::{Error, Result};

pub(crate) fn prepare(doc: &mut Document, root: NodeId) -> Result<()> {
    let mut containers = doc.elements_by_name(root, "text:p");
    containers.extend(doc.elements_by_name(root, "text:h"));
    for container in containers {
        consolidate(doc, container)?;
    }
    isolate(doc, root);
    Ok(())
}

/// Merges every marker split across several text nodes of `container` into
/// a single text node.
fn consolidate(doc: &mut Document, container: NodeId) -> Result<()> {
    // Node ranges and markers are recomputed after every merge. A merge
    // keeps the concatenated text content of the container unchanged, so
    // previously computed marker offsets would stay valid, but the node
    // boundaries do move.
    'merge: loop {
        let ranges = text_ranges(doc, container);
        let full: String = ranges
            .iter()
            .map(|r| doc.text(r.node).unwrap_or(""))
            .collect();

        for m in marker::find_markers(&full) {
            let start = locate_start(&ranges, m.start).ok_or_else(|| {
                Error::internal(format!(
                    "could not find the text node where marker `{}` starts",
                    &full[m.start..m.end]
                ))
            })?;
            let end = locate_end(&ranges, m.end).ok_or_else(|| {
                Error::internal(format!(
                    "could not find the text node where marker `{}` ends",
                    &full[m.start..m.end]
                ))
            })?;

            if start.node == end.node {
                continue;
            }

            merge_marker(doc, &m, &full[m.start..m.end], start, end)?;
            continue 'merge;
        }

        return Ok(());
    }
}

#[derive(Debug, Clone, Copy)]
struct TextRange {
    node: NodeId,
    /// Byte offset of this node's text within the container's text content.
    start: usize,
    end: usize,
}

fn text_ranges(doc: &Document, container: NodeId) -> Vec<TextRange> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    for node in doc.text_descendants(container) {
        let len = doc.text(node).map(str::len).unwrap_or(0);
        ranges.push(TextRange {
            node,
            start: offset,
            end: offset + len,
        });
        offset += len;
    }
    ranges
}

fn locate_start(ranges: &[TextRange], offset: usize) -> Option<TextRange> {
    ranges
        .iter()
        .find(|r| offset >= r.start && offset < r.end)
        .copied()
}

fn locate_end(ranges: &[TextRange], offset: usize) -> Option<TextRange> {
    ranges
        .iter()
        .find(|r| offset > r.start && offset <= r.end)
        .copied()
}

/// Rebuilds a marker spanning from `start.node` to `end.node` as a single
/// text node directly under their common ancestor. Text before and after
/// the marker keeps its formatting; the formatting elements in between are
/// dropped.
fn merge_marker(
    doc: &mut Document,
    m: &Found,
    marker_text: &str,
    start: TextRange,
    end: TextRange,
) -> Result<()> {
    let common = doc.common_ancestor(start.node, end.node)?;
    let start_child = child_below(doc, start.node, common)?;
    let end_child = child_below(doc, end.node, common)?;

    let pos_in_start = m.start - start.start;
    let pos_in_end = m.end - end.start;

    // Split off any text preceding the marker and hoist the part of the
    // marker found in the start node up to the common ancestor.
    let mut marker_start = start.node;
    if pos_in_start > 0 {
        marker_start = doc.split_text(start.node, pos_in_start);
        doc.detach(marker_start);
        doc.insert_after(marker_start, start_child);
    }

    // Split off any text following the marker; the end node then holds only
    // the tail of the marker and moves up in front of its old branch.
    let end_len = doc.text(end.node).map(str::len).unwrap_or(0);
    if pos_in_end < end_len {
        doc.split_text(end.node, pos_in_end);
        if end.node != end_child {
            doc.detach(end.node);
            doc.insert_before(end.node, end_child);
        }
    }

    replace_between_with_text(doc, common, marker_start, end.node, marker_text)
}

/// The node on the path from `node` up to `ancestor` that is a direct child
/// of `ancestor`.
fn child_below(doc: &Document, node: NodeId, ancestor: NodeId) -> Result<NodeId> {
    let mut current = node;
    while doc.parent(current) != Some(ancestor) {
        current = doc
            .parent(current)
            .ok_or_else(|| Error::internal("node is not a descendant of the given ancestor"))?;
    }
    Ok(current)
}

/// Removes the children of `common` from the one containing `start` through
/// the one containing `end` and puts a single text node in their place.
fn replace_between_with_text(
    doc: &mut Document,
    common: NodeId,
    start: NodeId,
    end: NodeId,
    text: &str,
) -> Result<()> {
    let start_branch = doc.ancestors(start, Some(common));
    let end_branch = doc.ancestors(end, Some(common));

    let mut removing = false;
    let mut to_remove = Vec::new();
    let mut insertion_point = None;

    for child in doc.children(common) {
        if start_branch.contains(&child) {
            removing = true;
        }
        if removing {
            to_remove.push(child);
            if end_branch.contains(&child) {
                insertion_point = doc.next_sibling(child);
                break;
            }
        }
    }

    for node in to_remove {
        doc.detach(node);
    }

    let text_node = doc.create_text(text);
    match insertion_point {
        Some(reference) => doc.insert_before(text_node, reference),
        None => doc.append(common, text_node),
    }
    Ok(())
}

/// Splits text nodes so that every block marker ends up alone in its own
/// text node. Inline markers stay embedded in their surrounding text.
fn isolate(doc: &mut Document, root: NodeId) {
    for node in doc.text_descendants(root) {
        isolate_node(doc, node);
    }
}

fn isolate_node(doc: &mut Document, start: NodeId) {
    let mut node = start;
    loop {
        let text = match doc.text(node) {
            Some(t) => t.to_owned(),
            None => return,
        };
        let Some(m) = marker::first_block_marker(&text) else {
            return;
        };
        if m.start == 0 && m.end == text.len() {
            return;
        }

        // Split the tail off first so the start offset stays valid.
        let after = if m.end < text.len() {
            Some(doc.split_text(node, m.end))
        } else {
            None
        };
        if m.start > 0 {
            doc.split_text(node, m.start);
        }

        match after {
            Some(next) => node = next,
            None => return,
        }
    }
}
