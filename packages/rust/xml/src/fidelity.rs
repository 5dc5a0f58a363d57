//! Serialization fidelity policy shared by the harvest and rewrite passes.
//!
//! Tags, CDATA and declarations are copied byte-for-byte. Text is the only
//! thing that is rewritten: raw `>` becomes `&gt;`, built-in entities and
//! character references stay literal, and entities declared in the DOCTYPE
//! internal subset expand to their replacement text.

use std::collections::HashMap;
use std::sync::LazyLock;

use quick_xml::events::Event;
use regex::Regex;
use tracing::debug;

use docweave_shared::{DocweaveError, Result};

use crate::sink::Sink;

/// Entities that are never expanded.
const BUILTIN_ENTITIES: [&str; 5] = ["amp", "lt", "gt", "quot", "apos"];

/// Nested entity expansion stops (and passes the reference through) past this depth.
const MAX_EXPANSION_DEPTH: usize = 8;

/// Matches `<!ENTITY name "value">` / `<!ENTITY name 'value'>` (no parameter entities).
static ENTITY_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!ENTITY\s+([A-Za-z_:][A-Za-z0-9_.:\-]*)\s+(?:"([^"]*)"|'([^']*)')\s*>"#)
        .expect("entity declaration regex")
});

// ---------------------------------------------------------------------------
// Entity table
// ---------------------------------------------------------------------------

/// Internal-subset general entities of one document.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    entities: HashMap<String, String>,
}

impl EntityTable {
    /// Collect declarations from the raw body of a `<!DOCTYPE ...>`.
    pub fn from_doctype(doctype: &str) -> Self {
        let mut table = Self::default();
        table.extend_from_doctype(doctype);
        table
    }

    /// Add declarations from a DOCTYPE body; the first declaration of a name wins.
    pub fn extend_from_doctype(&mut self, doctype: &str) {
        for caps in ENTITY_DECL_RE.captures_iter(doctype) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            self.entities
                .entry(caps[1].to_string())
                .or_insert_with(|| value.to_string());
        }
    }

    /// Replacement text for `name`, if declared.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entities.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Text normalization
// ---------------------------------------------------------------------------

/// Rewrite raw (still-escaped) text content according to the entity policy.
pub fn normalize_text(raw: &str, entities: &EntityTable) -> String {
    let mut out = String::with_capacity(raw.len());
    normalize_into(raw, entities, 0, &mut out);
    out
}

fn normalize_into(raw: &str, entities: &EntityTable, depth: usize, out: &mut String) {
    let mut rest = raw;
    while let Some(pos) = rest.find(['&', '<', '>']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match tail.as_bytes()[0] {
            b'<' => {
                out.push_str("&lt;");
                rest = &tail[1..];
            }
            b'>' => {
                out.push_str("&gt;");
                rest = &tail[1..];
            }
            _ => match reference_name(tail) {
                Some(name) => {
                    let reference = &tail[..name.len() + 2];
                    if name.starts_with('#') || BUILTIN_ENTITIES.contains(&name) {
                        out.push_str(reference);
                    } else if let Some(value) =
                        entities.get(name).filter(|_| depth < MAX_EXPANSION_DEPTH)
                    {
                        normalize_into(value, entities, depth + 1, out);
                    } else {
                        debug!(entity = name, "undeclared entity passed through");
                        out.push_str(reference);
                    }
                    rest = &tail[reference.len()..];
                }
                None => {
                    out.push_str("&amp;");
                    rest = &tail[1..];
                }
            },
        }
    }
    out.push_str(rest);
}

/// Name of the reference at the start of `s` (which begins with `&`).
fn reference_name(s: &str) -> Option<&str> {
    let end = s.find(';')?;
    let name = &s[1..end];
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '#' | '_' | '-' | '.' | ':'));
    valid.then_some(name)
}

/// Escape `&`, `<` and `>` in plain character data.
pub fn escape_text(text: &str) -> String {
    quick_xml::escape::partial_escape(text).into_owned()
}

// ---------------------------------------------------------------------------
// Event serializer
// ---------------------------------------------------------------------------

/// What the serializer is producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Whole document: everything is kept, including the prolog and comments.
    Document,
    /// Captured fragment: comments and the document prolog are dropped and
    /// processing instructions are re-escaped.
    Fragment,
}

/// Writes reader events back out under the fidelity policy.
#[derive(Debug, Clone)]
pub struct Serializer {
    mode: Mode,
    entities: EntityTable,
}

impl Serializer {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            entities: EntityTable::default(),
        }
    }

    pub fn document() -> Self {
        Self::new(Mode::Document)
    }

    pub fn fragment() -> Self {
        Self::new(Mode::Fragment)
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    /// Pick up entity declarations from a DOCTYPE event body.
    pub fn learn_doctype(&mut self, raw: &[u8]) -> Result<()> {
        self.entities.extend_from_doctype(utf8(raw)?);
        Ok(())
    }

    /// Serialize one event into `sink`.
    pub fn write(&self, sink: &mut dyn Sink, event: &Event<'_>) -> Result<()> {
        match event {
            Event::Start(e) => {
                sink.write_bytes(b"<")?;
                sink.write_bytes(e)?;
                sink.write_bytes(b">")
            }
            Event::Empty(e) => {
                sink.write_bytes(b"<")?;
                sink.write_bytes(e)?;
                sink.write_bytes(b"/>")
            }
            Event::End(e) => {
                sink.write_bytes(b"</")?;
                sink.write_bytes(e)?;
                sink.write_bytes(b">")
            }
            Event::Text(e) => sink.write_str(&normalize_text(utf8(e)?, &self.entities)),
            Event::CData(e) => {
                sink.write_bytes(b"<![CDATA[")?;
                sink.write_bytes(e)?;
                sink.write_bytes(b"]]>")
            }
            Event::PI(e) => {
                sink.write_bytes(b"<?")?;
                match self.mode {
                    Mode::Document => sink.write_bytes(e)?,
                    Mode::Fragment => sink.write_str(&escape_text(utf8(e)?))?,
                }
                sink.write_bytes(b"?>")
            }
            Event::Comment(e) if self.mode == Mode::Document => {
                sink.write_bytes(b"<!--")?;
                sink.write_bytes(e)?;
                sink.write_bytes(b"-->")
            }
            Event::Decl(e) if self.mode == Mode::Document => {
                sink.write_bytes(b"<?")?;
                sink.write_bytes(e)?;
                sink.write_bytes(b"?>")
            }
            Event::DocType(e) => self.write_doctype(sink, b"<!DOCTYPE ", e),
            _ => Ok(()),
        }
    }

    /// Write a DOCTYPE with the keyword spelled as `prefix` (document mode only).
    pub fn write_doctype(&self, sink: &mut dyn Sink, prefix: &[u8], body: &[u8]) -> Result<()> {
        if self.mode != Mode::Document {
            return Ok(());
        }
        sink.write_bytes(prefix)?;
        sink.write_bytes(body)?;
        sink.write_bytes(b">")
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| DocweaveError::parse(format!("invalid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferSink;
    use quick_xml::Reader;

    fn entities() -> EntityTable {
        EntityTable::from_doctype(
            r#"topic [
  <!ENTITY prod "Widget&#174;">
  <!ENTITY co 'Acme &amp; Sons'>
  <!ENTITY % param "ignored">
  <!ENTITY nested "&prod; Pro">
]"#,
        )
    }

    #[test]
    fn doctype_declarations_are_collected() {
        let table = entities();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("co"), Some("Acme &amp; Sons"));
        assert_eq!(table.get("param"), None);
    }

    #[test]
    fn builtin_and_char_refs_stay_literal() {
        let out = normalize_text("a &amp; b &lt;c&gt; &quot;&apos; &#169; &#xA9;", &entities());
        assert_eq!(out, "a &amp; b &lt;c&gt; &quot;&apos; &#169; &#xA9;");
    }

    #[test]
    fn declared_entities_expand_recursively() {
        let out = normalize_text("Buy &nested; from &co;.", &entities());
        assert_eq!(out, "Buy Widget&#174; Pro from Acme &amp; Sons.");
    }

    #[test]
    fn raw_gt_and_stray_amp_are_normalized() {
        let out = normalize_text("x > y & z", &EntityTable::default());
        assert_eq!(out, "x &gt; y &amp; z");
    }

    #[test]
    fn undeclared_entity_passes_through() {
        let out = normalize_text("see &external;", &EntityTable::default());
        assert_eq!(out, "see &external;");
    }

    #[test]
    fn self_referencing_entity_terminates() {
        let table = EntityTable::from_doctype(r#"<!ENTITY loop "x&loop;">"#);
        let out = normalize_text("&loop;", &table);
        assert!(out.starts_with("xxxxxxxx"));
        assert!(out.ends_with("&loop;"));
    }

    #[test]
    fn fragment_mode_drops_comments_and_escapes_pis() {
        let xml = r#"<a><!-- gone --><?pi x<y?><![CDATA[<raw> & ]]></a>"#;
        let mut reader = Reader::from_str(xml);
        let serializer = Serializer::fragment();
        let mut sink = BufferSink::new();
        loop {
            let event = reader.read_event().expect("read");
            if matches!(event, Event::Eof) {
                break;
            }
            serializer.write(&mut sink, &event).expect("write");
        }
        assert_eq!(sink.as_str(), "<a><?pi x&lt;y?><![CDATA[<raw> & ]]></a>");
    }
}
