//! Pull-based translation of `quick-xml` events into [`MarkupEvent`]s.

use std::io::{self, BufRead};

use osmload_core::{Attributes, ElementKind, MarkupEvent};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::IngestError;

/// Streams the OSM-relevant elements of a UTF-8 XML document.
///
/// Self-closing tags are reported as a `Start` immediately followed by an
/// `End`. Text, comments and unknown elements are skipped.
pub struct XmlEvents<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    pending_end: Option<ElementKind>,
}

impl<R: BufRead> XmlEvents<R> {
    /// Start reading from `source`.
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            pending_end: None,
        }
    }

    /// Decoded byte offset reached by the parser.
    #[must_use]
    pub fn position(&self) -> u64 {
        u64::try_from(self.reader.buffer_position()).unwrap_or(u64::MAX)
    }

    /// Pull the next relevant event, or `None` at end of document.
    ///
    /// # Errors
    /// Returns [`IngestError::Markup`] for malformed XML and
    /// [`IngestError::Read`] when the underlying stream fails.
    pub fn next_event(&mut self) -> Result<Option<MarkupEvent>, IngestError> {
        if let Some(kind) = self.pending_end.take() {
            return Ok(Some(MarkupEvent::End(kind)));
        }
        loop {
            self.buf.clear();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(start)) => Step::open(&start, false),
                Ok(Event::Empty(start)) => Step::open(&start, true),
                Ok(Event::End(end)) => {
                    ElementKind::from_name(end.local_name().as_ref()).map_or(Step::Skip, Step::Close)
                }
                Ok(Event::Eof) => Step::Eof,
                Ok(_) => Step::Skip,
                Err(err) => Step::Failed(err),
            };
            match step {
                Step::Skip => {}
                Step::Open {
                    kind,
                    attributes,
                    empty,
                } => {
                    if empty {
                        self.pending_end = Some(kind);
                    }
                    return Ok(Some(MarkupEvent::Start(kind, attributes)));
                }
                Step::Close(kind) => return Ok(Some(MarkupEvent::End(kind))),
                Step::Eof => return Ok(None),
                Step::Failed(err) => return Err(self.failure(err)),
            }
        }
    }

    fn failure(&self, err: quick_xml::Error) -> IngestError {
        let position = self.position();
        match err {
            quick_xml::Error::Io(source) => IngestError::Read {
                position,
                source: io::Error::new(source.kind(), source),
            },
            source => IngestError::Markup { position, source },
        }
    }
}

enum Step {
    Skip,
    Open {
        kind: ElementKind,
        attributes: Attributes,
        empty: bool,
    },
    Close(ElementKind),
    Eof,
    Failed(quick_xml::Error),
}

impl Step {
    fn open(start: &BytesStart<'_>, empty: bool) -> Self {
        let Some(kind) = ElementKind::from_name(start.local_name().as_ref()) else {
            return Self::Skip;
        };
        match collect_attributes(start) {
            Ok(attributes) => Self::Open {
                kind,
                attributes,
                empty,
            },
            Err(err) => Self::Failed(err),
        }
    }
}

fn collect_attributes(start: &BytesStart<'_>) -> Result<Attributes, quick_xml::Error> {
    let mut attributes = Attributes::default();
    for attribute in start.attributes() {
        let attribute = attribute?;
        let name = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.push(name, value);
    }
    Ok(attributes)
}
