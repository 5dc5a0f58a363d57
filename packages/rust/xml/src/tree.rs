//! A small mutable element tree for the spans that need structural edits.
//!
//! Start tags are kept as written (`start` holds the raw tag body) and text
//! is kept in its escaped form, so a parse + serialize round trip is
//! byte-identical for anything the merge does not touch.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use docweave_shared::{DocweaveError, Result};

use crate::markers;

/// One node of a parsed span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Escaped character data.
    Text(String),
    CData(String),
    Comment(String),
    /// Processing instruction body (`target data`).
    Pi(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }
}

/// An element with its raw start tag and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified element name.
    pub name: String,
    /// Raw tag body: name plus attributes, exactly as written.
    pub start: String,
    pub children: Vec<Node>,
    /// Written as `<x/>` when it still has no children.
    pub self_closing: bool,
}

impl Element {
    /// An element with a single `class` attribute.
    pub fn with_class(name: &str, class: &str) -> Self {
        let class = quick_xml::escape::escape(class);
        Self {
            name: name.to_string(),
            start: format!("{name} class=\"{class}\""),
            children: Vec::new(),
            self_closing: false,
        }
    }

    /// A bare element with no attributes.
    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: name.to_string(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        let start = BytesStart::from_content(self.start.as_str(), self.name.len());
        markers::attribute(&start, key)
    }

    /// Rename in place, keeping the attributes as written.
    pub fn rename(&mut self, name: &str) {
        let attrs = self.start[self.name.len()..].to_string();
        self.start = format!("{name}{attrs}");
        self.name = name.to_string();
    }

    pub fn class(&self) -> Option<String> {
        self.attribute("class")
    }

    /// Child elements only.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.start);
        if self.children.is_empty() && self.self_closing {
            out.push_str("/>");
            return;
        }
        out.push('>');
        write_nodes(&self.children, out);
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }
}

// ---------------------------------------------------------------------------
// Parse / serialize
// ---------------------------------------------------------------------------

/// Parse a well-formed span that may have several top-level nodes.
pub fn parse_fragment(markup: &str) -> Result<Vec<Node>> {
    let mut reader = Reader::from_str(markup);
    let mut stack: Vec<Element> = Vec::new();
    let mut top: Vec<Node> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DocweaveError::xml(reader.buffer_position(), e))?;
        let node = match event {
            Event::Start(e) => {
                stack.push(element_from(&e, false)?);
                continue;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DocweaveError::parse("unbalanced end tag in fragment"))?;
                Node::Element(element)
            }
            Event::Empty(e) => Node::Element(element_from(&e, true)?),
            Event::Text(e) => Node::Text(decode(e.into_inner())?),
            Event::CData(e) => Node::CData(decode(e.into_inner())?),
            Event::Comment(e) => Node::Comment(decode(e.into_inner())?),
            Event::PI(e) => Node::Pi(decode(e.into_inner())?),
            Event::Decl(_) | Event::DocType(_) => continue,
            Event::Eof => break,
        };
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => top.push(node),
        }
    }

    if let Some(open) = stack.last() {
        return Err(DocweaveError::parse(format!(
            "unclosed element <{}> in fragment",
            open.name
        )));
    }
    Ok(top)
}

/// Serialize nodes back to markup.
pub fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(e) => e.write_into(out),
            Node::Text(t) => out.push_str(t),
            Node::CData(t) => {
                out.push_str("<![CDATA[");
                out.push_str(t);
                out.push_str("]]>");
            }
            Node::Comment(t) => {
                out.push_str("<!--");
                out.push_str(t);
                out.push_str("-->");
            }
            Node::Pi(t) => {
                out.push_str("<?");
                out.push_str(t);
                out.push_str("?>");
            }
        }
    }
}

pub fn to_markup(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes(nodes, &mut out);
    out
}

fn element_from(e: &BytesStart<'_>, self_closing: bool) -> Result<Element> {
    let raw: &[u8] = e;
    Ok(Element {
        name: markers::element_name(e)?,
        start: decode(Cow::Borrowed(raw))?,
        children: Vec::new(),
        self_closing,
    })
}

fn decode(bytes: Cow<'_, [u8]>) -> Result<String> {
    String::from_utf8(bytes.into_owned())
        .map_err(|e| DocweaveError::parse(format!("invalid UTF-8 in fragment: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_byte_identical() {
        let markup = concat!(
            "<topicmeta class=\"- map/topicmeta \">\n",
            "  <author  type='creator'>A &amp; B</author>\n",
            "  <data name=\"x\"/><!-- note --><?pi data?>",
            "<![CDATA[<raw>]]>\n",
            "</topicmeta>"
        );
        let nodes = parse_fragment(markup).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(to_markup(&nodes), markup);
    }

    #[test]
    fn multiple_top_level_nodes() {
        let nodes = parse_fragment("<a/> <b>x</b>").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[2].as_element().unwrap().name, "b");
    }

    #[test]
    fn unclosed_fragment_is_an_error() {
        let err = parse_fragment("<a><b></b>").unwrap_err();
        assert!(err.to_string().contains("unclosed element <a>"));
    }

    #[test]
    fn attributes_read_from_raw_start() {
        let nodes = parse_fragment(r#"<author class="- map/author " id="a1">x</author>"#).unwrap();
        let author = nodes[0].as_element().unwrap();
        assert_eq!(author.class().as_deref(), Some("- map/author "));
        assert_eq!(author.attribute("id").as_deref(), Some("a1"));
    }

    #[test]
    fn rename_keeps_attributes() {
        let mut nodes = parse_fragment(r#"<title outputclass="x">T</title>"#).unwrap();
        let title = nodes[0].as_element_mut().unwrap();
        title.rename("searchtitle");
        assert_eq!(title.to_markup(), r#"<searchtitle outputclass="x">T</searchtitle>"#);
    }

    #[test]
    fn synthetic_elements_serialize() {
        let mut meta = Element::with_class("topicmeta", "- map/topicmeta ");
        assert_eq!(meta.to_markup(), r#"<topicmeta class="- map/topicmeta "></topicmeta>"#);
        meta.children.push(Node::Element(Element::bare("keywords")));
        assert_eq!(
            meta.to_markup(),
            r#"<topicmeta class="- map/topicmeta "><keywords></keywords></topicmeta>"#
        );
    }
}
