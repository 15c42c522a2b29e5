//! Reading and writing XML documents with `quick-xml`.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::tree::{Attr, Document, NodeId};
use crate::{Error, Result};

/// Parses an XML document into a [`Document`] tree.
///
/// Comments, processing instructions and the XML declaration are dropped;
/// namespace prefixes are kept as part of the element and attribute names.
pub(crate) fn parse(xml: &str) -> Result<Document> {
    let mut reader = Reader::from_str(xml);
    let mut doc = Document::new();
    let mut stack = vec![doc.root()];

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let node = element_from_event(&mut doc, &e)?;
                let parent = current(&stack)?;
                doc.append(parent, node);
                stack.push(node);
            }
            Event::Empty(e) => {
                let node = element_from_event(&mut doc, &e)?;
                let parent = current(&stack)?;
                doc.append(parent, node);
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                if !text.is_empty() {
                    let node = doc.create_text(text.into_owned());
                    let parent = current(&stack)?;
                    doc.append(parent, node);
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                let node = doc.create_text(text);
                let parent = current(&stack)?;
                doc.append(parent, node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(doc)
}

fn current(stack: &[NodeId]) -> Result<NodeId> {
    stack
        .last()
        .copied()
        .ok_or_else(|| Error::internal("unbalanced element stack while parsing"))
}

fn element_from_event(doc: &mut Document, e: &BytesStart<'_>) -> Result<NodeId> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        attrs.push(Attr {
            name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value: attr.unescape_value()?.into_owned(),
        });
    }
    let node = doc.create_element(name);
    if let Some(el) = doc.element_mut(node) {
        el.attrs = attrs;
    }
    Ok(node)
}

/// Serializes the document back to XML, with an XML declaration and all
/// text and attribute values escaped.
pub(crate) fn serialize(doc: &Document) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    for child in doc.children(doc.root()) {
        write_node(doc, child, &mut writer)?;
    }
    Ok(writer.into_inner())
}

fn write_node(doc: &Document, node: NodeId, writer: &mut Writer<Vec<u8>>) -> Result<()> {
    if let Some(text) = doc.text(node) {
        writer.write_event(Event::Text(BytesText::new(text)))?;
        return Ok(());
    }
    let Some(el) = doc.element(node) else {
        return Ok(());
    };

    let mut start = BytesStart::new(el.name.as_str());
    for attr in &el.attrs {
        start.push_attribute((attr.name.as_str(), attr.value.as_str()));
    }

    let children = doc.children(node);
    if children.is_empty() {
        writer.write_event(Event::Empty(start))?;
    } else {
        let name = el.name.clone();
        writer.write_event(Event::Start(start))?;
        for child in children {
            write_node(doc, child, writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(name)))?;
    }
    Ok(())
}
