//! Row model for the ten destination tables.
//!
//! A finished feature is converted into one row for its own table plus child
//! rows for tags and way nodes. Relation members are emitted by the router as
//! they stream past and never pass through a feature.

use std::fmt;

use chrono::{DateTime, Utc};
use geo::Point;

use crate::element::{
    FeatureKind, MemberKind, Metadata, PathFeature, PointFeature, RelationFeature, Tags,
    WGS84_SRID,
};

/// One of the ten destination tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SinkKind {
    /// Node rows.
    Node,
    /// Node tag rows.
    NodeTag,
    /// Way rows.
    Way,
    /// Way tag rows.
    WayTag,
    /// Ordered way node references.
    WayNode,
    /// Relation rows.
    Relation,
    /// Relation tag rows.
    RelationTag,
    /// Relation members that are nodes.
    NodeMember,
    /// Relation members that are ways.
    WayMember,
    /// Relation members that are relations.
    RelationMember,
}

impl SinkKind {
    /// Every sink in canonical table order.
    pub const ALL: [Self; 10] = [
        Self::Node,
        Self::NodeTag,
        Self::Way,
        Self::WayTag,
        Self::WayNode,
        Self::Relation,
        Self::RelationTag,
        Self::NodeMember,
        Self::WayMember,
        Self::RelationMember,
    ];

    /// Suffix appended to the base table name.
    ///
    /// # Examples
    /// ```
    /// use osmload_core::SinkKind;
    ///
    /// let names: Vec<String> = SinkKind::ALL
    ///     .iter()
    ///     .map(|kind| format!("map{}", kind.table_suffix()))
    ///     .collect();
    /// assert_eq!(names[0], "map_node");
    /// assert_eq!(names[9], "map_relation_member");
    /// ```
    #[must_use]
    pub const fn table_suffix(self) -> &'static str {
        match self {
            Self::Node => "_node",
            Self::NodeTag => "_node_tag",
            Self::Way => "_way",
            Self::WayTag => "_way_tag",
            Self::WayNode => "_way_node",
            Self::Relation => "_relation",
            Self::RelationTag => "_relation_tag",
            Self::NodeMember => "_node_member",
            Self::WayMember => "_way_member",
            Self::RelationMember => "_relation_member",
        }
    }

    /// Position in [`SinkKind::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Node => 0,
            Self::NodeTag => 1,
            Self::Way => 2,
            Self::WayTag => 3,
            Self::WayNode => 4,
            Self::Relation => 5,
            Self::RelationTag => 6,
            Self::NodeMember => 7,
            Self::WayMember => 8,
            Self::RelationMember => 9,
        }
    }

    /// Whether rows of this sink are tags, which tolerate duplicate keys.
    #[must_use]
    pub const fn is_tag_table(self) -> bool {
        matches!(self, Self::NodeTag | Self::WayTag | Self::RelationTag)
    }

    /// Tag sink belonging to a feature kind.
    #[must_use]
    pub const fn tags_of(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::Node => Self::NodeTag,
            FeatureKind::Way => Self::WayTag,
            FeatureKind::Relation => Self::RelationTag,
        }
    }

    /// Member sink for a member kind.
    #[must_use]
    pub const fn members_of(kind: MemberKind) -> Self {
        match kind {
            MemberKind::Node => Self::NodeMember,
            MemberKind::Way => Self::WayMember,
            MemberKind::Relation => Self::RelationMember,
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_suffix().trim_start_matches('_'))
    }
}

/// Edit metadata copied onto every feature row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditInfo {
    /// Last editor's display name.
    pub user: Option<String>,
    /// Last editor's numeric id.
    pub uid: Option<i64>,
    /// Visibility flag.
    pub visible: Option<bool>,
    /// Edit version.
    pub version: Option<i32>,
    /// Changeset id.
    pub changeset: Option<i64>,
    /// Time of the last edit.
    pub timestamp: Option<DateTime<Utc>>,
}

impl EditInfo {
    fn split(metadata: Metadata) -> (i64, Self) {
        let Metadata {
            id,
            user,
            uid,
            visible,
            version,
            changeset,
            timestamp,
        } = metadata;
        (
            id,
            Self {
                user,
                uid,
                visible,
                version,
                changeset,
                timestamp,
            },
        )
    }
}

/// Row of the node table.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    /// Node id.
    pub id: i64,
    /// Location, `x = longitude`, `y = latitude`.
    pub geometry: Point<f64>,
    /// Spatial reference of `geometry`.
    pub srid: i32,
    /// Elevation from the `ele` tag.
    pub elevation: Option<f64>,
    /// Edit metadata.
    pub edit: EditInfo,
    /// Value of the `name` tag.
    pub name: Option<String>,
}

/// Row of the way table.
#[derive(Debug, Clone, PartialEq)]
pub struct WayRow {
    /// Way id.
    pub id: i64,
    /// Edit metadata.
    pub edit: EditInfo,
    /// Value of the `name` tag.
    pub name: Option<String>,
}

/// Row of the relation table.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRow {
    /// Relation id.
    pub id: i64,
    /// Edit metadata.
    pub edit: EditInfo,
}

/// Row of one of the three tag tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    /// Id of the tagged feature.
    pub owner_id: i64,
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// Row of the way node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WayNodeRow {
    /// Owning way.
    pub way_id: i64,
    /// Referenced node.
    pub node_id: i64,
    /// 1-based position along the way.
    pub position: i32,
}

/// Row of one of the three member tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRow {
    /// Owning relation.
    pub relation_id: i64,
    /// Referenced feature id.
    pub member_ref: i64,
    /// Kind of the referenced feature.
    pub kind: MemberKind,
    /// Role label, if any.
    pub role: Option<String>,
    /// 1-based appearance order within the relation.
    pub sequence: i32,
}

/// Any row destined for a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Node table row.
    Node(NodeRow),
    /// Way table row.
    Way(WayRow),
    /// Relation table row.
    Relation(RelationRow),
    /// Tag table row.
    Tag(TagRow),
    /// Way node table row.
    WayNode(WayNodeRow),
    /// Member table row.
    Member(MemberRow),
}

/// Receiver for rows produced by the router.
///
/// Implementations buffer rows; they must not fail or block.
pub trait RowSink {
    /// Append `row` to the buffer of `kind`.
    fn enqueue(&mut self, kind: SinkKind, row: Row);
}

impl RowSink for Vec<(SinkKind, Row)> {
    fn enqueue(&mut self, kind: SinkKind, row: Row) {
        self.push((kind, row));
    }
}

fn emit_tags<S: RowSink + ?Sized>(sink: &mut S, kind: SinkKind, owner_id: i64, tags: Tags) {
    for (key, value) in tags {
        sink.enqueue(
            kind,
            Row::Tag(TagRow {
                owner_id,
                key,
                value,
            }),
        );
    }
}

impl PointFeature {
    /// Convert the finished node into its node row and tag rows.
    pub fn emit<S: RowSink + ?Sized>(self, sink: &mut S) {
        let name = self.tags.name().map(str::to_owned);
        let elevation = self.elevation();
        let geometry = self.geometry();
        let (id, edit) = EditInfo::split(self.metadata);
        sink.enqueue(
            SinkKind::Node,
            Row::Node(NodeRow {
                id,
                geometry,
                srid: WGS84_SRID,
                elevation,
                edit,
                name,
            }),
        );
        emit_tags(sink, SinkKind::NodeTag, id, self.tags);
    }
}

impl PathFeature {
    /// Convert the finished way into its way row, tag rows and way node rows.
    pub fn emit<S: RowSink + ?Sized>(self, sink: &mut S) {
        let name = self.tags.name().map(str::to_owned);
        let (id, edit) = EditInfo::split(self.metadata);
        sink.enqueue(SinkKind::Way, Row::Way(WayRow { id, edit, name }));
        emit_tags(sink, SinkKind::WayTag, id, self.tags);
        for (position, node_id) in (1..).zip(self.node_refs) {
            sink.enqueue(
                SinkKind::WayNode,
                Row::WayNode(WayNodeRow {
                    way_id: id,
                    node_id,
                    position,
                }),
            );
        }
    }
}

impl RelationFeature {
    /// Convert the finished relation into its relation row and tag rows.
    pub fn emit<S: RowSink + ?Sized>(self, sink: &mut S) {
        let (id, edit) = EditInfo::split(self.metadata);
        sink.enqueue(SinkKind::Relation, Row::Relation(RelationRow { id, edit }));
        emit_tags(sink, SinkKind::RelationTag, id, self.tags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn sink_indices_follow_canonical_order() {
        for (position, kind) in SinkKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position, "{kind} out of order");
        }
    }

    #[rstest]
    fn node_emits_feature_row_then_tags() {
        let mut node = PointFeature::new(Metadata::with_id(1), 45.0, 3.0).expect("valid node");
        let _name = node.tags.insert("name", "Stop");
        let _highway = node.tags.insert("highway", "stop");
        let mut rows: Vec<(SinkKind, Row)> = Vec::new();
        node.emit(&mut rows);

        let kinds: Vec<SinkKind> = rows.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![SinkKind::Node, SinkKind::NodeTag, SinkKind::NodeTag]
        );
        match rows.first() {
            Some((_, Row::Node(row))) => {
                assert_eq!(row.id, 1);
                assert_eq!(row.geometry, Point::new(3.0, 45.0));
                assert_eq!(row.srid, WGS84_SRID);
                assert_eq!(row.name.as_deref(), Some("Stop"));
            }
            other => panic!("expected node row first, got {other:?}"),
        }
    }

    #[rstest]
    fn way_nodes_are_numbered_from_one() {
        let mut way = PathFeature::new(Metadata::with_id(10));
        way.node_refs.extend([5, 6, 5]);
        let mut rows: Vec<(SinkKind, Row)> = Vec::new();
        way.emit(&mut rows);

        let positions: Vec<(i64, i32)> = rows
            .iter()
            .filter_map(|(_, row)| match row {
                Row::WayNode(way_node) => Some((way_node.node_id, way_node.position)),
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![(5, 1), (6, 2), (5, 3)]);
    }

    #[rstest]
    fn relation_row_has_no_name_column() {
        let mut relation = RelationFeature::new(Metadata::with_id(3));
        let _type = relation.tags.insert("type", "route");
        let mut rows: Vec<(SinkKind, Row)> = Vec::new();
        relation.emit(&mut rows);
        assert_eq!(rows.len(), 2);
        assert!(matches!(rows.first(), Some((SinkKind::Relation, Row::Relation(row))) if row.id == 3));
    }
}
