//! Parser-independent markup events consumed by the router.
//!
//! The XML reader in `osmload-data` translates its own events into this
//! vocabulary, so the router never sees a parser library type.

use std::fmt;

use crate::element::FeatureKind;

/// Element names the router understands. Anything else is skipped by the
/// event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `<node>`
    Node,
    /// `<way>`
    Way,
    /// `<relation>`
    Relation,
    /// `<tag k=".." v="..">`
    Tag,
    /// `<nd ref="..">` inside a way.
    NodeRef,
    /// `<member type=".." ref=".." role="..">` inside a relation.
    Member,
}

impl ElementKind {
    /// Map an element's local name onto a kind, ignoring ASCII case.
    ///
    /// # Examples
    /// ```
    /// use osmload_core::ElementKind;
    ///
    /// assert_eq!(ElementKind::from_name(b"NODE"), Some(ElementKind::Node));
    /// assert_eq!(ElementKind::from_name(b"nd"), Some(ElementKind::NodeRef));
    /// assert_eq!(ElementKind::from_name(b"bounds"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &[u8]) -> Option<Self> {
        [
            Self::Node,
            Self::Way,
            Self::Relation,
            Self::Tag,
            Self::NodeRef,
            Self::Member,
        ]
        .into_iter()
        .find(|kind| name.eq_ignore_ascii_case(kind.as_str().as_bytes()))
    }

    /// Element name as written in OSM XML.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
            Self::Tag => "tag",
            Self::NodeRef => "nd",
            Self::Member => "member",
        }
    }

    /// The feature kind when this element is top-level.
    #[must_use]
    pub const fn feature(self) -> Option<FeatureKind> {
        match self {
            Self::Node => Some(FeatureKind::Node),
            Self::Way => Some(FeatureKind::Way),
            Self::Relation => Some(FeatureKind::Relation),
            Self::Tag | Self::NodeRef | Self::Member => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unescaped attribute list of a single start tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    /// Value of the attribute called `name`. Names are case-sensitive.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Append an attribute.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tag carried no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// One routed markup event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    /// An opening (or self-closing) tag with its attributes.
    Start(ElementKind, Attributes),
    /// A closing tag. Self-closing tags produce a `Start` followed by an `End`.
    End(ElementKind),
}

impl MarkupEvent {
    /// Convenience constructor for tests and adapters.
    pub fn start<I, K, V>(kind: ElementKind, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Start(kind, attributes.into_iter().collect())
    }

    /// The element this event belongs to.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::Start(kind, _) | Self::End(kind) => *kind,
        }
    }

    /// Whether the event opens a node, way or relation.
    #[must_use]
    pub const fn opens_feature(&self) -> bool {
        matches!(self, Self::Start(kind, _) if kind.feature().is_some())
    }
}
