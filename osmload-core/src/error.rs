//! Structural errors raised while routing markup events.

use std::fmt;

use thiserror::Error;

use crate::element::FeatureKind;
use crate::event::ElementKind;
use crate::router::RouterState;

/// The feature being built when an error occurred, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureContext(Option<(FeatureKind, i64)>);

impl FeatureContext {
    /// No feature was open.
    pub const NONE: Self = Self(None);

    /// Context naming an open feature.
    #[must_use]
    pub const fn of(kind: FeatureKind, id: i64) -> Self {
        Self(Some((kind, id)))
    }

    /// Kind and id of the open feature.
    #[must_use]
    pub const fn feature(&self) -> Option<(FeatureKind, i64)> {
        self.0
    }
}

impl fmt::Display for FeatureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some((kind, id)) => write!(f, " (in {kind} {id})"),
            None => Ok(()),
        }
    }
}

/// The event sequence does not describe a well-formed OSM document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedInputError {
    /// A required attribute was absent.
    #[error("<{element}> is missing required attribute `{attribute}`{context}")]
    MissingAttribute {
        /// Element carrying the attribute.
        element: ElementKind,
        /// Attribute name.
        attribute: &'static str,
        /// Feature being built.
        context: FeatureContext,
    },
    /// An attribute could not be parsed into its expected type.
    #[error("<{element}> attribute `{attribute}` has invalid value {value:?}{context}")]
    InvalidAttribute {
        /// Element carrying the attribute.
        element: ElementKind,
        /// Attribute name.
        attribute: &'static str,
        /// Raw attribute text.
        value: String,
        /// Feature being built.
        context: FeatureContext,
    },
    /// A node declared NaN or infinite coordinates.
    #[error("node {id} has non-finite coordinates (lat={lat}, lon={lon})")]
    NonFiniteCoordinate {
        /// Node id.
        id: i64,
        /// Parsed latitude.
        lat: f64,
        /// Parsed longitude.
        lon: f64,
    },
    /// A child element appeared while no suitable feature was open.
    #[error("<{element}> must appear inside an open {expected}, but the router was in state {state}{context}")]
    Misplaced {
        /// Offending element.
        element: ElementKind,
        /// Feature kind the element belongs to.
        expected: &'static str,
        /// Router state when the element arrived.
        state: RouterState,
        /// Feature being built.
        context: FeatureContext,
    },
    /// A relation member named an unsupported feature type.
    #[error("member of relation {relation_id} has unknown type {value:?}")]
    UnknownMemberKind {
        /// Owning relation.
        relation_id: i64,
        /// Raw `type` attribute.
        value: String,
    },
    /// A closing tag did not match the open feature.
    #[error("</{element}> does not close the open feature (router state {state}){context}")]
    UnbalancedClose {
        /// Closing element.
        element: ElementKind,
        /// Router state when the close arrived.
        state: RouterState,
        /// Feature being built.
        context: FeatureContext,
    },
    /// The stream ended while a feature was still open.
    #[error("stream ended before {kind} {id} was closed")]
    Unterminated {
        /// Kind of the open feature.
        kind: FeatureKind,
        /// Id of the open feature.
        id: i64,
    },
}
