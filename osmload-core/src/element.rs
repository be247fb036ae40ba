//! In-memory representations of the three OSM feature kinds.
//!
//! Features are assembled incrementally by the router and discarded as soon as
//! they have been converted into rows. Nothing here performs I/O.

use std::fmt;

use chrono::{DateTime, Utc};
use geo::Point;

use crate::error::MalformedInputError;

/// Spatial reference identifier applied to every node geometry (WGS 84).
pub const WGS84_SRID: i32 = 4326;

/// Tag key whose value becomes the feature name.
pub const NAME_TAG: &str = "name";

/// Tag key holding a node elevation in metres.
pub const ELEVATION_TAG: &str = "ele";

/// The three top-level entity kinds found in an OSM document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// A point feature (`<node>`).
    Node,
    /// A path feature (`<way>`).
    Way,
    /// A relation feature (`<relation>`).
    Relation,
}

impl FeatureKind {
    /// Lower-case element name used in the XML vocabulary.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes shared by nodes, ways and relations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    /// Identifier, unique within its feature kind.
    pub id: i64,
    /// Display name of the last editor.
    pub user: Option<String>,
    /// Numeric id of the last editor.
    pub uid: Option<i64>,
    /// Visibility flag carried by history dumps.
    pub visible: Option<bool>,
    /// Edit version.
    pub version: Option<i32>,
    /// Changeset that produced this version.
    pub changeset: Option<i64>,
    /// Time of the last edit.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Metadata carrying only an identifier.
    #[must_use]
    pub fn with_id(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Outcome of inserting a tag into a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum TagInsert {
    /// The key was new and the tag was stored.
    Inserted,
    /// The key already existed; the first value was kept.
    DuplicateKey,
}

/// Insertion-ordered tag map with unique keys.
///
/// Features rarely carry more than a few dozen tags, so a vector with a linear
/// key check keeps the stream order without hashing.
///
/// # Examples
/// ```
/// use osmload_core::{TagInsert, Tags};
///
/// let mut tags = Tags::default();
/// assert_eq!(tags.insert("highway", "stop"), TagInsert::Inserted);
/// assert_eq!(tags.insert("highway", "give_way"), TagInsert::DuplicateKey);
/// assert_eq!(tags.get("highway"), Some("stop"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tags {
    entries: Vec<(String, String)>,
}

impl Tags {
    /// Insert a tag, keeping the first value when the key is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> TagInsert {
        let key = key.into();
        if self.contains_key(&key) {
            return TagInsert::DuplicateKey;
        }
        self.entries.push((key, value.into()));
        TagInsert::Inserted
    }

    /// Look up the value stored for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    /// Whether a tag with `key` exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(candidate, _)| candidate == key)
    }

    /// Number of stored tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tags are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Value of the conventional `name` tag.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get(NAME_TAG)
    }
}

impl IntoIterator for Tags {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A node under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    /// Shared attributes.
    pub metadata: Metadata,
    /// Tags collected so far.
    pub tags: Tags,
    geometry: Point<f64>,
}

impl PointFeature {
    /// Create a node at `(lon, lat)`, rejecting non-finite coordinates.
    ///
    /// # Examples
    /// ```
    /// use osmload_core::{Metadata, PointFeature};
    ///
    /// let node = PointFeature::new(Metadata::with_id(1), 45.0, 3.0)?;
    /// assert_eq!(node.geometry().x(), 3.0);
    /// assert!(PointFeature::new(Metadata::with_id(2), f64::NAN, 3.0).is_err());
    /// # Ok::<(), osmload_core::MalformedInputError>(())
    /// ```
    pub fn new(metadata: Metadata, lat: f64, lon: f64) -> Result<Self, MalformedInputError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(MalformedInputError::NonFiniteCoordinate {
                id: metadata.id,
                lat,
                lon,
            });
        }
        Ok(Self {
            metadata,
            tags: Tags::default(),
            geometry: Point::new(lon, lat),
        })
    }

    /// Point geometry with `x = longitude`, `y = latitude`.
    #[must_use]
    pub const fn geometry(&self) -> Point<f64> {
        self.geometry
    }

    /// Elevation parsed from the `ele` tag, when present and numeric.
    #[must_use]
    pub fn elevation(&self) -> Option<f64> {
        let raw = self.tags.get(ELEVATION_TAG)?;
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
    }
}

/// A way under construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathFeature {
    /// Shared attributes.
    pub metadata: Metadata,
    /// Tags collected so far.
    pub tags: Tags,
    /// Referenced node ids in document order.
    pub node_refs: Vec<i64>,
}

impl PathFeature {
    /// Create an empty way.
    #[must_use]
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            tags: Tags::default(),
            node_refs: Vec::new(),
        }
    }
}

/// A relation under construction. Members are streamed, not stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationFeature {
    /// Shared attributes.
    pub metadata: Metadata,
    /// Tags collected so far.
    pub tags: Tags,
}

impl RelationFeature {
    /// Create an empty relation.
    #[must_use]
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            tags: Tags::default(),
        }
    }
}

/// Kind of feature referenced by a relation member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Member is a node.
    Node,
    /// Member is a way.
    Way,
    /// Member is another relation.
    Relation,
}

impl MemberKind {
    /// Parse the `type` attribute of a `<member>`, ignoring ASCII case.
    ///
    /// # Examples
    /// ```
    /// use osmload_core::MemberKind;
    ///
    /// assert_eq!(MemberKind::from_attribute("WAY"), Some(MemberKind::Way));
    /// assert_eq!(MemberKind::from_attribute("area"), None);
    /// ```
    #[must_use]
    pub fn from_attribute(value: &str) -> Option<Self> {
        [Self::Node, Self::Way, Self::Relation]
            .into_iter()
            .find(|kind| value.eq_ignore_ascii_case(kind.as_str()))
    }

    /// Lower-case name as written in the `type` attribute.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
