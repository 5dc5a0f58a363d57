//! The harvest pass.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, info, instrument};

use docweave_matcher::{PathPattern, ProximityMatcher, Transition};
use docweave_shared::{DocweaveError, FragmentKey, Result};
use docweave_xml::{BufferSink, Serializer, element_name, end_name};

use crate::reference;
use crate::table::FragmentTable;

/// Harvests captured spans from any number of source documents.
///
/// Entries from one document are staged and only land in the table once that
/// document parsed completely, so a malformed source contributes nothing.
#[derive(Debug)]
pub struct FragmentCollector {
    pattern: PathPattern,
    table: FragmentTable,
}

impl FragmentCollector {
    pub fn new(pattern: PathPattern) -> Self {
        Self {
            pattern,
            table: FragmentTable::default(),
        }
    }

    /// Convenience constructor from a `trigger/terminal` string.
    pub fn from_pattern(pattern: &str) -> Result<Self> {
        Ok(Self::new(PathPattern::parse(pattern)?))
    }

    /// Harvest one document from disk. Returns the number of spans filed.
    #[instrument(skip_all, fields(source = %path.display()))]
    pub fn collect_file(&mut self, path: &Path) -> Result<usize> {
        let file = File::open(path).map_err(|e| DocweaveError::io(path, e))?;
        self.collect_reader(path, BufReader::new(file))
    }

    /// Harvest one document read from `input`; `source` is used to resolve
    /// relative references.
    pub fn collect_reader<R: BufRead>(&mut self, source: &Path, input: R) -> Result<usize> {
        let mut pass = Pass::new(&self.pattern, source);
        pass.run(Reader::from_reader(input))?;

        let filed = pass.filed.len();
        for (key, markup) in pass.filed {
            debug!(key = %key, bytes = markup.len(), "fragment filed");
            self.table.append(key, &markup);
        }
        info!(source = %source.display(), filed, "harvested document");
        Ok(filed)
    }

    /// Harvest from an in-memory document.
    pub fn collect_str(&mut self, source: &Path, xml: &str) -> Result<usize> {
        self.collect_reader(source, xml.as_bytes())
    }

    /// Entries gathered so far.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Finish harvesting and hand out the read-only table.
    pub fn into_table(self) -> FragmentTable {
        self.table
    }
}

/// Capture phase of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Capturing,
}

/// Transient state for a single document.
struct Pass<'a> {
    source: &'a Path,
    matcher: ProximityMatcher,
    serializer: Serializer,
    phase: Phase,
    buffer: BufferSink,
    /// Key of the enclosing trigger, if its reference passed the gate.
    target: Option<FragmentKey>,
    filed: Vec<(FragmentKey, String)>,
}

impl<'a> Pass<'a> {
    fn new(pattern: &PathPattern, source: &'a Path) -> Self {
        Self {
            source,
            matcher: ProximityMatcher::new(pattern.clone()),
            serializer: Serializer::fragment(),
            phase: Phase::Idle,
            buffer: BufferSink::new(),
            target: None,
            filed: Vec::new(),
        }
    }

    fn run<R: BufRead>(&mut self, mut reader: Reader<R>) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| DocweaveError::xml(reader.buffer_position(), e))?;
            match &event {
                Event::Start(e) => {
                    let name = element_name(e)?;
                    self.open(&name, e);
                    let t = self.matcher.open(&name);
                    self.capture(t, &event)?;
                }
                Event::Empty(e) => {
                    let name = element_name(e)?;
                    self.open(&name, e);
                    let opened = self.matcher.open(&name);
                    let closed = self.matcher.close(&name);
                    if opened.captured() {
                        self.capture(opened, &event)?;
                    }
                    self.track(closed);
                    self.close(&name);
                }
                Event::End(e) => {
                    let name = end_name(e)?;
                    let t = self.matcher.close(&name);
                    self.capture(t, &event)?;
                    self.close(&name);
                }
                Event::DocType(e) => self.serializer.learn_doctype(e)?,
                Event::Eof => break,
                _ => {
                    let t = self.matcher.content();
                    self.capture(t, &event)?;
                }
            }
            buf.clear();
        }

        if self.phase == Phase::Capturing {
            return Err(DocweaveError::parse(format!(
                "{}: document ended inside a captured element",
                self.source.display()
            )));
        }
        Ok(())
    }

    /// Trigger bookkeeping on element open: file what the previous trigger
    /// gathered, then gate the new reference.
    fn open(&mut self, name: &str, start: &BytesStart<'_>) {
        if self.matcher.pattern().is_trigger(name) && self.phase == Phase::Idle {
            self.file_pending();
            self.target = reference::gate(start, self.source);
            if self.target.is_none() {
                debug!(trigger = name, "reference not harvested");
            }
        }
    }

    /// Trigger bookkeeping on element close.
    fn close(&mut self, name: &str) {
        if self.matcher.pattern().is_trigger(name) && self.phase == Phase::Idle {
            self.file_pending();
            self.target = None;
        }
    }

    /// Serialize `event` into the buffer if it belongs to a capture under a
    /// gated reference.
    fn capture(&mut self, transition: Transition, event: &Event<'_>) -> Result<()> {
        if transition.captured() && self.target.is_some() {
            self.serializer.write(&mut self.buffer, event)?;
        }
        self.track(transition);
        Ok(())
    }

    fn track(&mut self, transition: Transition) {
        match transition {
            Transition::Activated => self.phase = Phase::Capturing,
            Transition::Deactivated => self.phase = Phase::Idle,
            Transition::Inside | Transition::Outside => {}
        }
    }

    fn file_pending(&mut self) {
        if let Some(key) = &self.target {
            if has_content(self.buffer.as_str()) {
                self.filed.push((key.clone(), self.buffer.as_str().to_string()));
            }
        }
        self.buffer.clear();
    }
}

/// A buffer is worth filing only if something other than whitespace sits
/// between the end of its first tag and the start of its last tag.
pub fn has_content(markup: &str) -> bool {
    match (markup.find('>'), markup.rfind('<')) {
        (Some(start), Some(end)) if start < end => !markup[start + 1..end].trim().is_empty(),
        _ => false,
    }
}
