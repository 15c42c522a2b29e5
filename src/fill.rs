//! The fill pass: walks the prepared document, expands blocks and
//! substitutes inline markers.
//!
//! The walk visits children before their parent and snapshots child lists,
//! so a visitor may restructure the tree. Block expansion happens when the
//! closing marker of an outermost block is reached; everything inside that
//! block is then filled by recursive passes with their own marker stacks,
//! and the outer walk skips nodes sitting inside an open block.

use crate::block::Block;
use crate::eval::{Evaluator, Scope};
use crate::marker::{self, Marker};
use crate::odf::Attachments;
use crate::prepare;
use crate::tree::{Attr, Document, NodeId};
use crate::value::Image;
use crate::{Error, Result, Value};

/// Prepares and fills a parsed `content.xml` document.
pub(crate) fn fill_document<E: Evaluator>(
    doc: &mut Document,
    data: &Value,
    evaluator: &E,
    attachments: &mut Attachments,
) -> Result<()> {
    let root = doc.root();
    prepare::prepare(doc, root)?;
    let scope = Scope::new(data);
    fill_nodes(doc, &[root], &scope, evaluator, attachments)
}

/// Fills the subtrees rooted at `roots` with a fresh marker stack shared
/// across all of them.
pub(crate) fn fill_nodes<E: Evaluator>(
    doc: &mut Document,
    roots: &[NodeId],
    scope: &Scope<'_>,
    evaluator: &E,
    attachments: &mut Attachments,
) -> Result<()> {
    let mut pass = Pass {
        evaluator,
        attachments,
        scope,
        open: Vec::new(),
        each: None,
        if_open: None,
        if_else: None,
        if_condition: None,
    };
    for &root in roots {
        doc.traverse(root, &mut |doc, node| pass.visit(doc, node))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Each,
    If,
}

#[derive(Debug)]
struct EachState {
    node: NodeId,
    iterable: String,
    binding: String,
}

struct Pass<'a, 'v, E> {
    evaluator: &'a E,
    attachments: &'a mut Attachments,
    scope: &'a Scope<'v>,
    /// Kinds of the blocks currently open at this nesting level. Only the
    /// outermost block is expanded here; inner ones are expanded by the
    /// recursive passes over the expanded content.
    open: Vec<BlockKind>,
    each: Option<EachState>,
    if_open: Option<NodeId>,
    if_else: Option<NodeId>,
    if_condition: Option<String>,
}

impl<E: Evaluator> Pass<'_, '_, E> {
    fn visit(&mut self, doc: &mut Document, node: NodeId) -> Result<()> {
        let inside_open = !self.open.is_empty();

        if let Some(text) = doc.text(node).map(str::to_owned) {
            if let Some(found) = marker::first_block_marker(&text) {
                return self.visit_block_marker(doc, node, found.marker, inside_open);
            }
            if !inside_open {
                self.substitute_text(doc, node, &text)?;
            }
            return Ok(());
        }

        if doc.element(node).is_some() && !inside_open {
            self.substitute_attrs(doc, node)?;
        }
        Ok(())
    }

    fn visit_block_marker(
        &mut self,
        doc: &mut Document,
        node: NodeId,
        marker: Marker,
        inside_open: bool,
    ) -> Result<()> {
        match marker {
            Marker::EachOpen { iterable, binding } => {
                self.open.push(BlockKind::Each);
                if !inside_open {
                    self.each = Some(EachState {
                        node,
                        iterable,
                        binding,
                    });
                }
            }
            Marker::EachClose => {
                if !inside_open {
                    return Err(Error::template(
                        "{/each} found without corresponding opening {#each x as y}",
                    ));
                }
                if self.open.last() != Some(&BlockKind::Each) {
                    return Err(Error::template(
                        "{/each} found while the last opened block was not an opening {#each x as y}",
                    ));
                }
                if self.open.len() == 1 {
                    let state = self
                        .each
                        .take()
                        .ok_or_else(|| Error::internal("missing state for an opened {#each}"))?;
                    self.fill_each(doc, state, node)?;
                }
                self.open.pop();
            }
            Marker::IfOpen { condition } => {
                self.open.push(BlockKind::If);
                if !inside_open {
                    self.if_open = Some(node);
                    self.if_condition = Some(condition);
                }
            }
            Marker::Else => {
                if !inside_open {
                    return Err(Error::template("{:else} without a corresponding {#if}"));
                }
                if self.open.len() == 1 {
                    if self.open[0] == BlockKind::If {
                        self.if_else = Some(node);
                    } else {
                        return Err(Error::template(
                            "{:else} inside an {#each} but without a corresponding {#if}",
                        ));
                    }
                }
            }
            Marker::IfClose => {
                if !inside_open {
                    return Err(Error::template("{/if} without a corresponding {#if}"));
                }
                if self.open.len() == 1 {
                    if self.open[0] == BlockKind::If {
                        let open = self
                            .if_open
                            .take()
                            .ok_or_else(|| Error::internal("missing state for an opened {#if}"))?;
                        let condition = self
                            .if_condition
                            .take()
                            .ok_or_else(|| Error::internal("missing condition for an opened {#if}"))?;
                        let else_node = self.if_else.take();
                        self.fill_if(doc, open, else_node, node, &condition)?;
                    } else {
                        return Err(Error::template(
                            "{/if} inside an {#each} but without a corresponding {#if}",
                        ));
                    }
                }
                self.open.pop();
            }
            Marker::Image { .. } | Marker::Variable { .. } => {}
        }
        Ok(())
    }

    /// Expands a `{#each iterable as binding}` ... `{/each}` block.
    ///
    /// The block is cloned ahead of filling: before filling iteration `i`
    /// the pristine block (markers included) is duplicated for iteration
    /// `i + 1`, then the current copy is trimmed and filled with the item
    /// bound in a child scope. Content left of the opening marker is kept
    /// only for the first iteration, content right of the closing marker
    /// only for the last, so surrounding text appears exactly once.
    fn fill_each(&mut self, doc: &mut Document, state: EachState, close: NodeId) -> Result<()> {
        let block = Block::new(doc, state.node, close)?;

        let items = match self.evaluator.evaluate(&state.iterable, self.scope)? {
            Value::List(items) => items,
            // anything not iterable loops zero times
            _ => Vec::new(),
        };

        if items.is_empty() {
            let mut block = block;
            block.remove_markers_and_prune(doc);
            block.remove_content(doc);
            return Ok(());
        }

        let count = items.len();
        let mut current = block;
        for (i, item) in items.iter().enumerate() {
            let first = i == 0;
            let last = i + 1 == count;

            let next = if last {
                None
            } else {
                Some(current.clone_after(doc)?)
            };

            let child_scope = self.scope.with(&state.binding, item);

            if !first {
                current.start.remove_left_content(doc, 2);
            }
            if !last {
                current.end.remove_right_content(doc, 2);
            }
            current.remove_markers_and_prune(doc);
            fill_block_content(doc, &current, &child_scope, self.evaluator, self.attachments)?;

            if let Some(next) = next {
                current = next;
            }
        }
        Ok(())
    }

    /// Resolves an `{#if condition}` ... `{:else}` ... `{/if}` block,
    /// keeping one branch and removing the other.
    fn fill_if(
        &mut self,
        doc: &mut Document,
        open: NodeId,
        else_node: Option<NodeId>,
        close: NodeId,
        condition: &str,
    ) -> Result<()> {
        let truthy = self
            .evaluator
            .evaluate(condition, self.scope)?
            .is_truthy();

        let (mut then_block, mut else_block) = match else_node {
            Some(else_node) => (
                Block::new(doc, open, else_node)?,
                Some(Block::new(doc, else_node, close)?),
            ),
            None => (Block::new(doc, open, close)?, None),
        };

        if truthy {
            if let Some(block) = else_block.as_mut() {
                block.remove_content(doc);
            }
            then_block.remove_markers_and_prune(doc);
            if let Some(block) = else_block.as_mut() {
                block.remove_markers_and_prune(doc);
            }
            fill_block_content(doc, &then_block, self.scope, self.evaluator, self.attachments)
        } else {
            // content first, so that nothing shields siblings from removal
            // once the marker branches are pruned
            then_block.remove_content(doc);
            then_block.remove_markers_and_prune(doc);
            match else_block.as_mut() {
                Some(block) => {
                    block.remove_markers_and_prune(doc);
                    fill_block_content(doc, block, self.scope, self.evaluator, self.attachments)
                }
                None => Ok(()),
            }
        }
    }

    /// Replaces the inline markers of a text node. The node itself is
    /// replaced so an enclosing walk never processes its content twice.
    fn substitute_text(&mut self, doc: &mut Document, node: NodeId, text: &str) -> Result<()> {
        if doc.parent(node).is_none() {
            // already detached by a block expansion
            return Ok(());
        }
        let found = marker::find_inline(text);
        if found.is_empty() {
            return Ok(());
        }

        enum Segment {
            Text(String),
            Image(Image),
        }

        let mut segments = Vec::new();
        let mut last = 0;
        for f in &found {
            if f.start > last {
                segments.push(Segment::Text(text[last..f.start].to_owned()));
            }
            match &f.marker {
                Marker::Variable { expr } => {
                    match self.evaluator.evaluate(expr, self.scope)? {
                        Value::Image(image) => segments.push(Segment::Image(image)),
                        value => segments.push(Segment::Text(render_value(&value, expr)?)),
                    }
                }
                Marker::Image { expr } => {
                    match self.evaluator.evaluate(expr, self.scope)? {
                        Value::Image(image) => segments.push(Segment::Image(image)),
                        value => {
                            return Err(Error::render(format!(
                                "expected an image for `{expr}`, found {}",
                                value.human()
                            )));
                        }
                    }
                }
                _ => {}
            }
            last = f.end;
        }
        if last < text.len() {
            segments.push(Segment::Text(text[last..].to_owned()));
        }

        let any_image = segments.iter().any(|s| matches!(s, Segment::Image(_)));
        if any_image {
            for segment in segments {
                match segment {
                    Segment::Text(s) => {
                        if !s.is_empty() {
                            let t = doc.create_text(s);
                            doc.insert_before(t, node);
                        }
                    }
                    Segment::Image(image) => {
                        let frame = self.image_frame(doc, &image);
                        doc.insert_before(frame, node);
                    }
                }
            }
        } else {
            let joined: String = segments
                .iter()
                .map(|s| match s {
                    Segment::Text(t) => t.as_str(),
                    Segment::Image(_) => "",
                })
                .collect();
            let t = doc.create_text(joined);
            doc.insert_before(t, node);
        }
        doc.detach(node);
        Ok(())
    }

    /// Registers the image for inclusion in the output package and builds
    /// the frame referencing it.
    fn image_frame(&mut self, doc: &mut Document, image: &Image) -> NodeId {
        let href = self.attachments.add(image);

        let frame = doc.create_element("draw:frame");
        if let Some(el) = doc.element_mut(frame) {
            el.attrs = vec![
                Attr {
                    name: String::from("draw:name"),
                    value: image.name.clone(),
                },
                Attr {
                    name: String::from("text:anchor-type"),
                    value: String::from("as-char"),
                },
            ];
        }

        let draw_image = doc.create_element("draw:image");
        if let Some(el) = doc.element_mut(draw_image) {
            el.attrs = vec![
                Attr {
                    name: String::from("xlink:href"),
                    value: href,
                },
                Attr {
                    name: String::from("xlink:type"),
                    value: String::from("simple"),
                },
                Attr {
                    name: String::from("xlink:show"),
                    value: String::from("embed"),
                },
                Attr {
                    name: String::from("xlink:actuate"),
                    value: String::from("onLoad"),
                },
                Attr {
                    name: String::from("draw:mime-type"),
                    value: image.media_type.clone(),
                },
            ];
        }
        doc.append(frame, draw_image);
        frame
    }

    fn substitute_attrs(&mut self, doc: &mut Document, node: NodeId) -> Result<()> {
        let values: Vec<String> = match doc.element(node) {
            Some(el) => el.attrs.iter().map(|a| a.value.clone()).collect(),
            None => return Ok(()),
        };
        for (i, value) in values.iter().enumerate() {
            if let Some(new_value) = self.substitute_in_string(value)? {
                if let Some(attr) = doc.element_mut(node).and_then(|el| el.attrs.get_mut(i)) {
                    attr.value = new_value;
                }
            }
        }
        Ok(())
    }

    fn substitute_in_string(&self, text: &str) -> Result<Option<String>> {
        let found = marker::find_inline(text);
        if found.is_empty() {
            return Ok(None);
        }
        let mut out = String::new();
        let mut last = 0;
        for f in &found {
            out.push_str(&text[last..f.start]);
            let expr = match &f.marker {
                Marker::Variable { expr } | Marker::Image { expr } => expr,
                _ => continue,
            };
            let value = self.evaluator.evaluate(expr, self.scope)?;
            out.push_str(&render_value(&value, expr)?);
            last = f.end;
        }
        out.push_str(&text[last..]);
        Ok(Some(out))
    }
}

fn fill_block_content<E: Evaluator>(
    doc: &mut Document,
    block: &Block,
    scope: &Scope<'_>,
    evaluator: &E,
    attachments: &mut Attachments,
) -> Result<()> {
    // anchors can be gone when marker removal pruned a whole branch
    if let Some(anchor) = block.start.anchor() {
        fill_nodes(doc, &[anchor], scope, evaluator, attachments)?;
    }
    fill_nodes(doc, &block.middle, scope, evaluator, attachments)?;
    if let Some(anchor) = block.end.anchor() {
        fill_nodes(doc, &[anchor], scope, evaluator, attachments)?;
    }
    Ok(())
}

fn render_value(value: &Value, expr: &str) -> Result<String> {
    match value {
        Value::None => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Integer(n) => Ok(n.to_string()),
        Value::Float(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::List(_) | Value::Map(_) | Value::Image(_) => Err(Error::render(format!(
            "`{expr}` cannot be rendered as text (found {})",
            value.human()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::ExprEvaluator;
    use crate::{value, ErrorKind};

    fn fill(doc: &mut Document, data: &Value) -> Result<Attachments> {
        let mut attachments = Attachments::new();
        fill_document(doc, data, &ExprEvaluator, &mut attachments)?;
        Ok(attachments)
    }

    fn add_paragraph(doc: &mut Document, body: NodeId, text: &str) -> NodeId {
        let p = doc.create_element("text:p");
        let t = doc.create_text(text);
        doc.append(body, p);
        doc.append(p, t);
        p
    }

    fn body_with_paragraphs(texts: &[&str]) -> (Document, NodeId) {
        let mut doc = Document::new();
        let body = doc.create_element("office:text");
        let root = doc.root();
        doc.append(root, body);
        for text in texts {
            add_paragraph(&mut doc, body, text);
        }
        (doc, body)
    }

    fn paragraph_texts(doc: &Document, body: NodeId) -> Vec<String> {
        doc.children(body)
            .into_iter()
            .map(|p| doc.text_content(p))
            .collect()
    }

    #[test]
    fn substitutes_variables() {
        let (mut doc, body) = body_with_paragraphs(&["Yo {nom} !"]);
        let data = value! {{ nom: "David Bruant" }};
        fill(&mut doc, &data).unwrap();
        assert_eq!(doc.text_content(body), "Yo David Bruant !");
    }

    #[test]
    fn missing_variable_renders_empty() {
        let (mut doc, body) = body_with_paragraphs(&["Yo {inconnu} !"]);
        fill(&mut doc, &value!({})).unwrap();
        assert_eq!(doc.text_content(body), "Yo  !");
    }

    #[test]
    fn list_value_in_variable_position_is_an_error() {
        let (mut doc, _) = body_with_paragraphs(&["{courses}"]);
        let data = value! {{ courses: ["Radis"] }};
        let err = fill(&mut doc, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
    }

    #[test]
    fn expands_each_block() {
        let (mut doc, body) =
            body_with_paragraphs(&["{#each courses as course}", "- {course}", "{/each}"]);
        let data = value! {{ courses: ["Radis", "Pâtes", "Café"] }};
        fill(&mut doc, &data).unwrap();
        assert_eq!(
            paragraph_texts(&doc, body),
            vec!["- Radis", "- Pâtes", "- Café"]
        );
    }

    #[test]
    fn empty_each_block_leaves_nothing() {
        let (mut doc, body) =
            body_with_paragraphs(&["avant", "{#each courses as course}", "- {course}", "{/each}", "après"]);
        let data = value! {{ courses: [] }};
        fill(&mut doc, &data).unwrap();
        assert_eq!(paragraph_texts(&doc, body), vec!["avant", "après"]);
    }

    #[test]
    fn non_iterable_loops_zero_times() {
        let (mut doc, body) =
            body_with_paragraphs(&["{#each courses as course}", "- {course}", "{/each}"]);
        let data = value! {{ courses: "houlala" }};
        fill(&mut doc, &data).unwrap();
        assert_eq!(doc.text_content(body), "");
    }

    #[test]
    fn each_keeps_surrounding_text_once() {
        // markers share their paragraphs with other text
        let (mut doc, body) =
            body_with_paragraphs(&["liste : {#each courses as course}", "{course}", "{/each} (fin)"]);
        let root = doc.root();
        prepare::prepare(&mut doc, root).unwrap();

        let data = value! {{ courses: ["a", "b"] }};
        let scope = Scope::new(&data);
        let mut attachments = Attachments::new();
        fill_nodes(&mut doc, &[root], &scope, &ExprEvaluator, &mut attachments).unwrap();

        assert_eq!(doc.text_content(body), "liste : ab (fin)");
    }

    #[test]
    fn if_block_keeps_then_branch() {
        let (mut doc, body) = body_with_paragraphs(&[
            "{#if n < 5}",
            "petit",
            "{:else}",
            "grand",
            "{/if}",
        ]);
        fill(&mut doc, &value! {{ n: 3 }}).unwrap();
        assert_eq!(paragraph_texts(&doc, body), vec!["petit"]);
    }

    #[test]
    fn if_block_keeps_else_branch() {
        let (mut doc, body) = body_with_paragraphs(&[
            "{#if n < 5}",
            "petit",
            "{:else}",
            "grand",
            "{/if}",
        ]);
        fill(&mut doc, &value! {{ n: 8 }}).unwrap();
        assert_eq!(paragraph_texts(&doc, body), vec!["grand"]);
    }

    #[test]
    fn if_block_without_else_removes_content_when_false() {
        let (mut doc, body) = body_with_paragraphs(&["{#if ok}", "contenu", "{/if}"]);
        fill(&mut doc, &value! {{ ok: false }}).unwrap();
        assert_eq!(doc.text_content(body), "");
        assert!(doc.children(body).is_empty());
    }

    #[test]
    fn nested_each_blocks() {
        let (mut doc, body) = body_with_paragraphs(&[
            "{#each commandes as commande}",
            "{commande.client}",
            "{#each commande.articles as article}",
            "{article}",
            "{/each}",
            "{/each}",
        ]);
        let data = value! {{
            commandes: [
                { client: "Ada", articles: ["x", "y"] },
                { client: "Grace", articles: ["z"] },
            ],
        }};
        fill(&mut doc, &data).unwrap();
        assert_eq!(doc.text_content(body), "AdaxyGracez");
    }

    #[test]
    fn nested_empty_each_leaves_no_artifacts() {
        let (mut doc, body) = body_with_paragraphs(&[
            "{#each commandes as commande}",
            "{commande.client}",
            "{#each commande.articles as article}",
            "{article}",
            "{/each}",
            "{/each}",
        ]);
        let data = value! {{
            commandes: [{ client: "Ada", articles: [] }],
        }};
        fill(&mut doc, &data).unwrap();
        assert_eq!(doc.text_content(body), "Ada");
    }

    #[test]
    fn if_inside_each() {
        let (mut doc, body) = body_with_paragraphs(&[
            "{#each ns as n}",
            "{#if n < 5}",
            "petit",
            "{:else}",
            "grand",
            "{/if}",
            "{/each}",
        ]);
        let data = value! {{ ns: [3, 8] }};
        fill(&mut doc, &data).unwrap();
        assert_eq!(paragraph_texts(&doc, body), vec!["petit", "grand"]);
    }

    #[test]
    fn unbalanced_each_close_is_a_template_error() {
        let (mut doc, _) = body_with_paragraphs(&["{/each}"]);
        let err = fill(&mut doc, &value!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Template);
    }

    #[test]
    fn else_without_if_is_a_template_error() {
        let (mut doc, _) = body_with_paragraphs(&["{:else}"]);
        let err = fill(&mut doc, &value!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Template);
    }

    #[test]
    fn each_close_after_if_open_is_a_template_error() {
        let (mut doc, _) = body_with_paragraphs(&["{#if ok}", "{/each}"]);
        let err = fill(&mut doc, &value! {{ ok: true }}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Template);
    }

    #[test]
    fn substitutes_attribute_values() {
        let mut doc = Document::new();
        let body = doc.create_element("office:text");
        let root = doc.root();
        doc.append(root, body);
        let p = doc.create_element("text:p");
        doc.append(body, p);
        if let Some(el) = doc.element_mut(p) {
            el.attrs.push(Attr {
                name: String::from("xlink:href"),
                value: String::from("https://exemple.fr/{page}"),
            });
        }
        fill(&mut doc, &value! {{ page: "accueil" }}).unwrap();
        assert_eq!(
            doc.element(p).unwrap().attrs[0].value,
            "https://exemple.fr/accueil"
        );
    }

    #[test]
    fn image_marker_inserts_frame_and_registers_content() {
        let (mut doc, body) = body_with_paragraphs(&["photo : {#image photo}"]);
        let image = Image {
            name: String::from("chat.png"),
            media_type: String::from("image/png"),
            content: vec![0x89, 0x50, 0x4e, 0x47],
        };
        let data = value! {{ photo: (image.clone()) }};
        let attachments = fill(&mut doc, &data).unwrap();

        assert_eq!(attachments.images().len(), 1);
        assert_eq!(attachments.images()[0].full_path, "Pictures/chat.png");
        assert_eq!(attachments.images()[0].media_type, "image/png");

        let frames = doc.elements_by_name(body, "draw:frame");
        assert_eq!(frames.len(), 1);
        let images = doc.elements_by_name(frames[0], "draw:image");
        let href = images
            .first()
            .and_then(|&n| doc.element(n))
            .and_then(|el| el.attrs.iter().find(|a| a.name == "xlink:href"))
            .map(|a| a.value.clone());
        assert_eq!(href.as_deref(), Some("Pictures/chat.png"));
        assert_eq!(doc.text_content(body), "photo : ");
    }

    #[test]
    fn image_value_in_variable_position_inserts_frame() {
        let (mut doc, body) = body_with_paragraphs(&["{photo}"]);
        let image = Image {
            name: String::from("logo.png"),
            media_type: String::from("image/png"),
            content: vec![1, 2, 3],
        };
        let data = value! {{ photo: image }};
        let attachments = fill(&mut doc, &data).unwrap();
        assert_eq!(attachments.images().len(), 1);
        assert_eq!(doc.elements_by_name(body, "draw:frame").len(), 1);
    }

    #[test]
    fn non_image_for_image_marker_is_an_error() {
        let (mut doc, _) = body_with_paragraphs(&["{#image photo}"]);
        let err = fill(&mut doc, &value! {{ photo: "pas une image" }}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
    }
}
