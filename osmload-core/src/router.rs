//! State machine that routes markup events into features and rows.
//!
//! The router holds at most one feature under construction. Child elements
//! (`tag`, `nd`, `member`) are attached to that feature, and closing it hands
//! the finished rows to a [`RowSink`]. Members are enqueued the moment they
//! are seen so a relation with many members never has to be buffered.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::element::{
    FeatureKind, MemberKind, Metadata, PathFeature, PointFeature, RelationFeature, TagInsert, Tags,
};
use crate::error::{FeatureContext, MalformedInputError};
use crate::event::{Attributes, ElementKind, MarkupEvent};
use crate::row::{MemberRow, Row, RowSink, SinkKind};

/// First sequence number handed to a relation member.
pub const MEMBER_SEQUENCE_BASE: i32 = 1;

/// Which feature kind, if any, is currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouterState {
    /// A node is open.
    Node,
    /// A way is open.
    Way,
    /// A relation is open.
    Relation,
    /// Between top-level elements.
    #[default]
    None,
}

impl fmt::Display for RouterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Node => "Node",
            Self::Way => "Way",
            Self::Relation => "Relation",
            Self::None => "None",
        })
    }
}

/// What a single [`TagRouter::dispatch`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The event carried nothing the router cares about.
    Ignored,
    /// The open feature was extended, or a member row was enqueued.
    Updated,
    /// A top-level feature was opened.
    Opened(FeatureKind),
    /// A top-level feature was closed and its rows enqueued.
    Closed(FeatureKind),
}

/// Running totals of what the router has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementCounts {
    /// Nodes finalized.
    pub nodes: u64,
    /// Ways finalized.
    pub ways: u64,
    /// Relations finalized.
    pub relations: u64,
    /// Tags accepted onto a feature.
    pub tags: u64,
    /// Tags dropped because their key was already present on the feature.
    pub duplicate_tags: u64,
    /// Way node references accepted.
    pub node_refs: u64,
    /// Relation members enqueued.
    pub members: u64,
}

impl ElementCounts {
    /// Total number of finalized top-level features.
    #[must_use]
    pub const fn features(&self) -> u64 {
        self.nodes + self.ways + self.relations
    }

    fn record_close(&mut self, kind: FeatureKind) {
        match kind {
            FeatureKind::Node => self.nodes += 1,
            FeatureKind::Way => self.ways += 1,
            FeatureKind::Relation => self.relations += 1,
        }
    }
}

#[derive(Debug)]
enum OpenFeature {
    Node(PointFeature),
    Way(PathFeature),
    Relation(RelationFeature),
}

impl OpenFeature {
    const fn kind(&self) -> FeatureKind {
        match self {
            Self::Node(_) => FeatureKind::Node,
            Self::Way(_) => FeatureKind::Way,
            Self::Relation(_) => FeatureKind::Relation,
        }
    }

    const fn metadata(&self) -> &Metadata {
        match self {
            Self::Node(node) => &node.metadata,
            Self::Way(way) => &way.metadata,
            Self::Relation(relation) => &relation.metadata,
        }
    }

    const fn tags_mut(&mut self) -> &mut Tags {
        match self {
            Self::Node(node) => &mut node.tags,
            Self::Way(way) => &mut way.tags,
            Self::Relation(relation) => &mut relation.tags,
        }
    }

    fn context(&self) -> FeatureContext {
        FeatureContext::of(self.kind(), self.metadata().id)
    }

    fn emit<S: RowSink + ?Sized>(self, sink: &mut S) {
        match self {
            Self::Node(node) => node.emit(sink),
            Self::Way(way) => way.emit(sink),
            Self::Relation(relation) => relation.emit(sink),
        }
    }
}

/// Routes [`MarkupEvent`]s into features and finished rows.
///
/// # Examples
/// ```
/// use osmload_core::{Dispatch, ElementKind, FeatureKind, MarkupEvent, Row, SinkKind, TagRouter};
///
/// let mut router = TagRouter::new();
/// let mut rows: Vec<(SinkKind, Row)> = Vec::new();
/// let open = MarkupEvent::start(
///     ElementKind::Node,
///     [("id", "1"), ("lat", "45.0"), ("lon", "3.0")],
/// );
/// assert_eq!(router.dispatch(open, &mut rows)?, Dispatch::Opened(FeatureKind::Node));
/// let close = MarkupEvent::End(ElementKind::Node);
/// assert_eq!(router.dispatch(close, &mut rows)?, Dispatch::Closed(FeatureKind::Node));
/// assert_eq!(rows.len(), 1);
/// router.finish()?;
/// # Ok::<(), osmload_core::MalformedInputError>(())
/// ```
#[derive(Debug)]
pub struct TagRouter {
    slot: Option<OpenFeature>,
    member_sequence: i32,
    counts: ElementCounts,
}

impl Default for TagRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl TagRouter {
    /// Create a router in the [`RouterState::None`] state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: None,
            member_sequence: MEMBER_SEQUENCE_BASE,
            counts: ElementCounts {
                nodes: 0,
                ways: 0,
                relations: 0,
                tags: 0,
                duplicate_tags: 0,
                node_refs: 0,
                members: 0,
            },
        }
    }

    /// Current state, derived from the open feature.
    #[must_use]
    pub const fn state(&self) -> RouterState {
        match &self.slot {
            Some(OpenFeature::Node(_)) => RouterState::Node,
            Some(OpenFeature::Way(_)) => RouterState::Way,
            Some(OpenFeature::Relation(_)) => RouterState::Relation,
            None => RouterState::None,
        }
    }

    /// Totals accumulated so far.
    #[must_use]
    pub const fn counts(&self) -> ElementCounts {
        self.counts
    }

    /// Sequence number the next relation member will receive.
    #[must_use]
    pub const fn next_member_sequence(&self) -> i32 {
        self.member_sequence
    }

    /// Apply one event, enqueueing any rows it completes into `sink`.
    ///
    /// # Errors
    /// Returns [`MalformedInputError`] when the event cannot belong to a
    /// well-formed document in the current state.
    pub fn dispatch<S: RowSink + ?Sized>(
        &mut self,
        event: MarkupEvent,
        sink: &mut S,
    ) -> Result<Dispatch, MalformedInputError> {
        match event {
            MarkupEvent::Start(kind, attributes) => self.start(kind, &attributes, sink),
            MarkupEvent::End(kind) => self.end(kind, sink),
        }
    }

    /// Confirm the stream ended between top-level elements.
    ///
    /// # Errors
    /// Returns [`MalformedInputError::Unterminated`] when a feature is still
    /// open.
    pub fn finish(&self) -> Result<ElementCounts, MalformedInputError> {
        match &self.slot {
            Some(open) => Err(MalformedInputError::Unterminated {
                kind: open.kind(),
                id: open.metadata().id,
            }),
            None => Ok(self.counts),
        }
    }

    fn context(&self) -> FeatureContext {
        self.slot
            .as_ref()
            .map_or(FeatureContext::NONE, OpenFeature::context)
    }

    fn start<S: RowSink + ?Sized>(
        &mut self,
        kind: ElementKind,
        attributes: &Attributes,
        sink: &mut S,
    ) -> Result<Dispatch, MalformedInputError> {
        match kind {
            ElementKind::Node => {
                let metadata = parse_metadata(kind, attributes)?;
                let context = FeatureContext::of(FeatureKind::Node, metadata.id);
                let lat: f64 = parse_required(kind, attributes, "lat", context)?;
                let lon: f64 = parse_required(kind, attributes, "lon", context)?;
                let node = PointFeature::new(metadata, lat, lon)?;
                Ok(self.open(OpenFeature::Node(node)))
            }
            ElementKind::Way => {
                let metadata = parse_metadata(kind, attributes)?;
                Ok(self.open(OpenFeature::Way(PathFeature::new(metadata))))
            }
            ElementKind::Relation => {
                let metadata = parse_metadata(kind, attributes)?;
                Ok(self.open(OpenFeature::Relation(RelationFeature::new(metadata))))
            }
            ElementKind::Tag => self.add_tag(attributes),
            ElementKind::NodeRef => self.add_node_ref(attributes),
            ElementKind::Member => self.add_member(attributes, sink),
        }
    }

    fn open(&mut self, feature: OpenFeature) -> Dispatch {
        let kind = feature.kind();
        if let Some(previous) = self.slot.replace(feature) {
            warn!(
                "discarding unclosed {} {} because a new {kind} was opened",
                previous.kind(),
                previous.metadata().id
            );
            self.member_sequence = MEMBER_SEQUENCE_BASE;
        }
        Dispatch::Opened(kind)
    }

    fn add_tag(&mut self, attributes: &Attributes) -> Result<Dispatch, MalformedInputError> {
        let context = self.context();
        let key = required(ElementKind::Tag, attributes, "k", context)?;
        let value = required(ElementKind::Tag, attributes, "v", context)?;
        let state = self.state();
        let Some(open) = self.slot.as_mut() else {
            return Err(MalformedInputError::Misplaced {
                element: ElementKind::Tag,
                expected: "node, way or relation",
                state,
                context,
            });
        };
        match open.tags_mut().insert(key, value) {
            TagInsert::Inserted => self.counts.tags += 1,
            TagInsert::DuplicateKey => {
                debug!("ignoring duplicate tag key {key:?}{context}");
                self.counts.duplicate_tags += 1;
            }
        }
        Ok(Dispatch::Updated)
    }

    fn add_node_ref(&mut self, attributes: &Attributes) -> Result<Dispatch, MalformedInputError> {
        let context = self.context();
        let state = self.state();
        let Some(OpenFeature::Way(way)) = self.slot.as_mut() else {
            return Err(MalformedInputError::Misplaced {
                element: ElementKind::NodeRef,
                expected: "way",
                state,
                context,
            });
        };
        let node_id: i64 = parse_required(ElementKind::NodeRef, attributes, "ref", context)?;
        way.node_refs.push(node_id);
        self.counts.node_refs += 1;
        Ok(Dispatch::Updated)
    }

    fn add_member<S: RowSink + ?Sized>(
        &mut self,
        attributes: &Attributes,
        sink: &mut S,
    ) -> Result<Dispatch, MalformedInputError> {
        let context = self.context();
        let state = self.state();
        let Some(OpenFeature::Relation(relation)) = self.slot.as_ref() else {
            return Err(MalformedInputError::Misplaced {
                element: ElementKind::Member,
                expected: "relation",
                state,
                context,
            });
        };
        let relation_id = relation.metadata.id;
        let raw_kind = required(ElementKind::Member, attributes, "type", context)?;
        let kind = MemberKind::from_attribute(raw_kind).ok_or_else(|| {
            MalformedInputError::UnknownMemberKind {
                relation_id,
                value: raw_kind.to_owned(),
            }
        })?;
        let member_ref: i64 = parse_required(ElementKind::Member, attributes, "ref", context)?;
        let role = attributes.get("role").map(str::to_owned);

        sink.enqueue(
            SinkKind::members_of(kind),
            Row::Member(MemberRow {
                relation_id,
                member_ref,
                kind,
                role,
                sequence: self.member_sequence,
            }),
        );
        self.member_sequence += 1;
        self.counts.members += 1;
        Ok(Dispatch::Updated)
    }

    fn end<S: RowSink + ?Sized>(
        &mut self,
        kind: ElementKind,
        sink: &mut S,
    ) -> Result<Dispatch, MalformedInputError> {
        let Some(closing) = kind.feature() else {
            return Ok(Dispatch::Ignored);
        };
        match self.slot.take() {
            Some(open) if open.kind() == closing => {
                open.emit(sink);
                self.counts.record_close(closing);
                if closing == FeatureKind::Relation {
                    self.member_sequence = MEMBER_SEQUENCE_BASE;
                }
                Ok(Dispatch::Closed(closing))
            }
            other => {
                let context = other
                    .as_ref()
                    .map_or(FeatureContext::NONE, OpenFeature::context);
                self.slot = other;
                Err(MalformedInputError::UnbalancedClose {
                    element: kind,
                    state: self.state(),
                    context,
                })
            }
        }
    }
}

fn required<'a>(
    element: ElementKind,
    attributes: &'a Attributes,
    attribute: &'static str,
    context: FeatureContext,
) -> Result<&'a str, MalformedInputError> {
    attributes
        .get(attribute)
        .ok_or(MalformedInputError::MissingAttribute {
            element,
            attribute,
            context,
        })
}

fn parse_required<T: FromStr>(
    element: ElementKind,
    attributes: &Attributes,
    attribute: &'static str,
    context: FeatureContext,
) -> Result<T, MalformedInputError> {
    let raw = required(element, attributes, attribute, context)?;
    parse_value(element, attribute, raw, context)
}

fn parse_optional<T: FromStr>(
    element: ElementKind,
    attributes: &Attributes,
    attribute: &'static str,
    context: FeatureContext,
) -> Result<Option<T>, MalformedInputError> {
    attributes
        .get(attribute)
        .map(|raw| parse_value(element, attribute, raw, context))
        .transpose()
}

fn parse_value<T: FromStr>(
    element: ElementKind,
    attribute: &'static str,
    raw: &str,
    context: FeatureContext,
) -> Result<T, MalformedInputError> {
    raw.trim()
        .parse()
        .map_err(|_| MalformedInputError::InvalidAttribute {
            element,
            attribute,
            value: raw.to_owned(),
            context,
        })
}

fn parse_timestamp(
    element: ElementKind,
    attributes: &Attributes,
    context: FeatureContext,
) -> Result<Option<DateTime<Utc>>, MalformedInputError> {
    let Some(raw) = attributes.get("timestamp") else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|timestamp| Some(timestamp.with_timezone(&Utc)))
        .map_err(|_| MalformedInputError::InvalidAttribute {
            element,
            attribute: "timestamp",
            value: raw.to_owned(),
            context,
        })
}

fn parse_metadata(
    element: ElementKind,
    attributes: &Attributes,
) -> Result<Metadata, MalformedInputError> {
    let id: i64 = parse_required(element, attributes, "id", FeatureContext::NONE)?;
    let context = element
        .feature()
        .map_or(FeatureContext::NONE, |kind| FeatureContext::of(kind, id));
    Ok(Metadata {
        id,
        user: attributes.get("user").map(str::to_owned),
        uid: parse_optional(element, attributes, "uid", context)?,
        visible: parse_optional(element, attributes, "visible", context)?,
        version: parse_optional(element, attributes, "version", context)?,
        changeset: parse_optional(element, attributes, "changeset", context)?,
        timestamp: parse_timestamp(element, attributes, context)?,
    })
}
