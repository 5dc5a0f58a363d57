//! The streaming rewrite pass.
//!
//! Events are copied to the output under the document fidelity policy until
//! the scope is armed. From then on the anchor rules for the target kind are
//! checked on every element boundary; the first rule that fires writes the
//! injection and latches the pass into `Injected`.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, trace};

use docweave_matcher::IdentityMatcher;
use docweave_merge::{MetadataTable, merge, merge_into_empty};
use docweave_shared::{DocweaveError, Result};
use docweave_xml::markers::{
    AFTER_METADATA_IN_PROLOG, MAP_ANCHOR, MAP_NAVREF, MAP_RELTABLE, MAP_TOPICMETA, MAP_TOPICREF,
    TOPIC_BODY, TOPIC_METADATA, TOPIC_PROLOG, TOPIC_RELATED_LINKS, TOPIC_TOPIC,
};
use docweave_xml::{
    BufferSink, Element, Node, PrologTap, Serializer, Sink, attribute, doctype_prefix,
    element_name, end_name, parse_fragment, to_markup,
};

use crate::injection::{Anchor, Injection, TargetKind};

/// Phase of one rewrite pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteState {
    /// Scope not reached yet.
    Idle,
    /// Inside (or past) the scope, looking for an anchor.
    Armed,
    /// Diverting the scope's `topicmeta` into a buffer; `depth` is its level.
    Buffering { depth: usize },
    /// Injection written; the rest of the document is copied.
    Injected(Anchor),
}

/// Injection content resolved for the target kind.
#[derive(Debug, Clone)]
enum Payload {
    Markup(String),
    Table(MetadataTable),
}

/// One forward pass over a target document.
pub struct Rewriter {
    kind: TargetKind,
    payload: Payload,
    identity: IdentityMatcher,
    serializer: Serializer,
    state: RewriteState,
    depth: usize,
    scope_depth: usize,
    prolog_seen: bool,
    /// Level of the currently open prolog inside the scope.
    prolog_depth: Option<usize>,
    buffer: BufferSink,
}

impl Rewriter {
    /// `scope` is the identity path that arms injection (`None`: first element).
    pub fn new(kind: TargetKind, scope: Option<Vec<String>>, injection: &Injection) -> Result<Self> {
        let payload = match kind {
            TargetKind::Topic => Payload::Markup(injection.to_markup()),
            TargetKind::Map => Payload::Table(injection.to_table()?),
        };
        Ok(Self {
            kind,
            payload,
            identity: IdentityMatcher::new(scope),
            serializer: Serializer::document(),
            state: RewriteState::Idle,
            depth: 0,
            scope_depth: 0,
            prolog_seen: false,
            prolog_depth: None,
            buffer: BufferSink::new(),
        })
    }

    pub fn state(&self) -> RewriteState {
        self.state
    }

    /// Where the injection landed, if it did.
    pub fn anchor(&self) -> Option<Anchor> {
        match self.state {
            RewriteState::Injected(anchor) => Some(anchor),
            _ => None,
        }
    }

    /// Copy `input` to `out`, injecting at the first anchor.
    pub fn run<R: BufRead>(mut self, input: R, out: &mut dyn Sink) -> Result<Option<Anchor>> {
        let mut reader = Reader::from_reader(PrologTap::new(input));
        let mut buf = Vec::new();
        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| DocweaveError::xml(reader.buffer_position(), e))?;
            match &event {
                Event::Start(e) => {
                    reader.get_mut().stop();
                    self.start(e, &event, false, out)?;
                }
                Event::Empty(e) => {
                    reader.get_mut().stop();
                    self.start(e, &event, true, out)?;
                }
                Event::End(e) => {
                    let name = end_name(e)?;
                    self.end(&name, &event, out)?;
                }
                Event::DocType(e) => {
                    self.serializer.learn_doctype(e)?;
                    let raw = reader.get_mut().take_recorded();
                    let prefix = doctype_prefix(&raw).unwrap_or(&b"<!DOCTYPE "[..]);
                    self.serializer.write_doctype(out, prefix, e)?;
                }
                Event::Eof => break,
                _ => self.emit(&event, out)?,
            }
            buf.clear();
        }

        if let RewriteState::Buffering { .. } = self.state {
            return Err(DocweaveError::parse("document ended inside topicmeta"));
        }
        if self.anchor().is_none() {
            debug!(state = ?self.state, "no injection point reached");
        }
        Ok(self.anchor())
    }

    // -----------------------------------------------------------------------
    // Element boundaries
    // -----------------------------------------------------------------------

    fn start(
        &mut self,
        e: &BytesStart<'_>,
        event: &Event<'_>,
        empty: bool,
        out: &mut dyn Sink,
    ) -> Result<()> {
        let name = element_name(e)?;
        self.depth += 1;

        let id = attribute(e, "id");
        if self.identity.open(&name, id.as_deref()) && self.state == RewriteState::Idle {
            self.state = RewriteState::Armed;
            self.scope_depth = self.depth;
            debug!(element = %name, depth = self.depth, "scope armed");
        }

        if self.state == RewriteState::Armed {
            let class = attribute(e, "class");
            match self.kind {
                TargetKind::Topic => self.topic_start(&name, class.as_deref(), e, event, empty, out)?,
                TargetKind::Map => self.map_start(&name, class.as_deref(), e, event, empty, out)?,
            }
        } else {
            self.emit(event, out)?;
        }

        if empty {
            self.leave(&name);
        }
        Ok(())
    }

    fn end(&mut self, name: &str, event: &Event<'_>, out: &mut dyn Sink) -> Result<()> {
        match (self.state, self.kind) {
            (RewriteState::Buffering { depth }, _) if depth == self.depth => {
                self.emit(event, out)?;
                self.flush_topicmeta(out)?;
            }
            (RewriteState::Armed, TargetKind::Topic) => {
                if self.prolog_depth == Some(self.depth) {
                    self.prolog_depth = None;
                    self.write_metadata(out)?;
                    self.inject(Anchor::PrologEnd);
                } else if self.depth == self.scope_depth && !self.prolog_seen {
                    self.write_prolog(out)?;
                    self.inject(Anchor::NewProlog);
                }
                self.emit(event, out)?;
            }
            (RewriteState::Armed, TargetKind::Map) => {
                if self.depth == self.scope_depth {
                    self.write_new_topicmeta(out)?;
                    self.inject(Anchor::NewTopicmeta);
                }
                self.emit(event, out)?;
            }
            _ => self.emit(event, out)?,
        }
        self.leave(name);
        Ok(())
    }

    fn leave(&mut self, name: &str) {
        self.identity.close(name);
        self.depth = self.depth.saturating_sub(1);
    }

    // -----------------------------------------------------------------------
    // Topic anchors
    // -----------------------------------------------------------------------

    fn topic_start(
        &mut self,
        name: &str,
        class: Option<&str>,
        e: &BytesStart<'_>,
        event: &Event<'_>,
        empty: bool,
        out: &mut dyn Sink,
    ) -> Result<()> {
        let is_scope = self.depth == self.scope_depth;

        if is_scope {
            if empty {
                // Nothing to anchor on inside; open it up.
                write_open(e, out)?;
                self.write_prolog(out)?;
                self.inject(Anchor::NewProlog);
                return write_close(name, out);
            }
            return self.emit(event, out);
        }

        if TOPIC_METADATA.matches(name, class) {
            write_open(e, out)?;
            self.write_payload(out)?;
            self.inject(Anchor::ExistingMetadata);
            return if empty { write_close(name, out) } else { Ok(()) };
        }

        if let Some(prolog_depth) = self.prolog_depth {
            if self.depth == prolog_depth + 1
                && AFTER_METADATA_IN_PROLOG.iter().any(|m| m.matches(name, class))
            {
                self.write_metadata(out)?;
                self.inject(Anchor::BeforePrologChild);
            }
            return self.emit(event, out);
        }

        if !self.prolog_seen && TOPIC_PROLOG.matches(name, class) {
            self.prolog_seen = true;
            if empty {
                write_open(e, out)?;
                self.write_metadata(out)?;
                self.inject(Anchor::PrologEnd);
                return write_close(name, out);
            }
            self.prolog_depth = Some(self.depth);
            return self.emit(event, out);
        }

        if !self.prolog_seen
            && (TOPIC_BODY.matches(name, class)
                || TOPIC_RELATED_LINKS.matches(name, class)
                || TOPIC_TOPIC.matches(name, class))
        {
            self.write_prolog(out)?;
            self.inject(Anchor::NewProlog);
        }
        self.emit(event, out)
    }

    fn write_payload(&self, out: &mut dyn Sink) -> Result<()> {
        match &self.payload {
            Payload::Markup(markup) => out.write_str(markup),
            Payload::Table(table) => out.write_str(&table.metadata_markup()),
        }
    }

    fn write_metadata(&self, out: &mut dyn Sink) -> Result<()> {
        out.write_str("<metadata>")?;
        self.write_payload(out)?;
        out.write_str("</metadata>")
    }

    fn write_prolog(&self, out: &mut dyn Sink) -> Result<()> {
        out.write_str("<prolog>")?;
        self.write_metadata(out)?;
        out.write_str("</prolog>")
    }

    // -----------------------------------------------------------------------
    // Map anchors
    // -----------------------------------------------------------------------

    fn map_start(
        &mut self,
        name: &str,
        class: Option<&str>,
        e: &BytesStart<'_>,
        event: &Event<'_>,
        empty: bool,
        out: &mut dyn Sink,
    ) -> Result<()> {
        let is_scope = self.depth == self.scope_depth;

        if is_scope {
            if empty {
                write_open(e, out)?;
                self.write_new_topicmeta(out)?;
                self.inject(Anchor::NewTopicmeta);
                return write_close(name, out);
            }
            return self.emit(event, out);
        }

        if MAP_TOPICMETA.matches(name, class) {
            if empty {
                let mut root = Element {
                    name: name.to_string(),
                    start: utf8(e)?.to_string(),
                    children: Vec::new(),
                    self_closing: true,
                };
                merge(&mut root, self.table());
                out.write_str(&root.to_markup())?;
                self.inject(Anchor::ExistingTopicmeta);
                return Ok(());
            }
            self.buffer.clear();
            self.state = RewriteState::Buffering { depth: self.depth };
            trace!(depth = self.depth, "buffering topicmeta");
            return self.emit(event, out);
        }

        if [MAP_TOPICREF, MAP_NAVREF, MAP_ANCHOR, MAP_RELTABLE]
            .iter()
            .any(|m| m.matches(name, class))
        {
            self.write_new_topicmeta(out)?;
            self.inject(Anchor::NewTopicmeta);
        }
        self.emit(event, out)
    }

    fn table(&self) -> &MetadataTable {
        static EMPTY: std::sync::LazyLock<MetadataTable> = std::sync::LazyLock::new(MetadataTable::new);
        match &self.payload {
            Payload::Table(table) => table,
            Payload::Markup(_) => &EMPTY,
        }
    }

    fn write_new_topicmeta(&self, out: &mut dyn Sink) -> Result<()> {
        out.write_str(&merge_into_empty(self.table()).to_markup())
    }

    /// Parse the buffered `topicmeta`, merge into it and write the result.
    fn flush_topicmeta(&mut self, out: &mut dyn Sink) -> Result<()> {
        let markup = std::mem::take(&mut self.buffer).into_string()?;
        let mut nodes = parse_fragment(&markup)?;
        let root = nodes
            .iter_mut()
            .find_map(Node::as_element_mut)
            .ok_or_else(|| DocweaveError::parse("buffered topicmeta has no element"))?;
        merge(root, self.table());
        out.write_str(&to_markup(&nodes))?;
        self.inject(Anchor::ExistingTopicmeta);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// Serialize to the buffer while buffering, otherwise to the stream.
    fn emit(&mut self, event: &Event<'_>, out: &mut dyn Sink) -> Result<()> {
        match self.state {
            RewriteState::Buffering { .. } => self.serializer.write(&mut self.buffer, event),
            _ => self.serializer.write(out, event),
        }
    }

    fn inject(&mut self, anchor: Anchor) {
        debug!(?anchor, depth = self.depth, "injection written");
        self.state = RewriteState::Injected(anchor);
    }
}

/// `<name attrs>` for a start or empty tag.
fn write_open(e: &BytesStart<'_>, out: &mut dyn Sink) -> Result<()> {
    out.write_bytes(b"<")?;
    out.write_bytes(e)?;
    out.write_bytes(b">")
}

fn write_close(name: &str, out: &mut dyn Sink) -> Result<()> {
    out.write_str("</")?;
    out.write_str(name)?;
    out.write_str(">")
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| DocweaveError::parse(format!("invalid UTF-8: {e}")))
}

/// Rewrite an in-memory document.
pub fn rewrite_str(
    xml: &str,
    kind: TargetKind,
    scope: Option<Vec<String>>,
    injection: &Injection,
) -> Result<(String, Option<Anchor>)> {
    let mut out = BufferSink::new();
    let anchor = Rewriter::new(kind, scope, injection)?.run(xml.as_bytes(), &mut out)?;
    Ok((out.into_string()?, anchor))
}
