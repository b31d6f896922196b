// Petri Net Places and Transition identifiers - the topology vocabulary
//
// ## Petri Net Overview
//
// The track pipeline is a **bipartite token-flow graph**:
//
// **Places (PlaceId)**: single-token slots. A place holds at most one token per
// run. Its token is produced by exactly one transition (or seeded externally
// when the place is a source) and read by any number of consumer transitions.
//
// **Transitions (TransitionId)**: nodes wrapping one opaque job. A transition
// reads all of its input places and writes exactly one output place.
//
// ### Example Pipeline:
//
// ```text
//   [location] --fetch--> [reads] --coverage--> [coverage] --render--> [image]
//                            |                                 ^
//                            +-----features--> [features] -----+
// ```
//
// `render` only fires once both `coverage` and `features` hold tokens.
//
// ### Implementation Notes:
//
// - PlaceId and TransitionId are string wrappers; names are unique within a net
// - Identity is stable across runs, token occupancy lives in the run context
// - Consumers/producer links are computed once when the net is built

use serde::{Deserialize, Serialize};

/// **Petri Net Place** identifier - names a single-token slot
///
/// ## Examples by Track Type:
///
/// **Coverage Track**: "reads", "coverage", "coverage_image"
/// **Annotation Track**: "genes", "transcripts", "gene_boxes"
/// **Sequence Track**: "sequence", "sequence_image"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceId(pub String);

impl PlaceId {
    /// Get the place identifier as a string slice
    ///
    /// ```rust
    /// # use track_pipeline::PlaceId;
    /// let place = PlaceId::from("coverage");
    /// assert_eq!(place.as_str(), "coverage");
    /// ```
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create a new place from any string-like input
    pub fn new<S: Into<String>>(name: S) -> Self {
        PlaceId(name.into())
    }
}

impl From<&str> for PlaceId {
    fn from(s: &str) -> Self {
        PlaceId(s.to_string())
    }
}

impl From<String> for PlaceId {
    fn from(s: String) -> Self {
        PlaceId(s)
    }
}

impl From<&PlaceId> for PlaceId {
    fn from(p: &PlaceId) -> Self {
        p.clone()
    }
}

impl std::fmt::Display for PlaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// **Petri Net Transition** identifier - names one unit of work
///
/// ## Firing Rules:
///
/// 1. **Preconditions**: every input place holds a token in the current run
/// 2. **Action**: the wrapped job executes with the input tokens
/// 3. **Postcondition**: the job's result becomes the output place's token
/// 4. **At most once**: a transition fires at most once per run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionId(pub String);

impl TransitionId {
    /// Get the transition identifier as a string slice
    ///
    /// ```rust
    /// # use track_pipeline::TransitionId;
    /// let transition = TransitionId::from("render");
    /// assert_eq!(transition.as_str(), "render");
    /// ```
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create a new transition identifier from any string-like input
    pub fn new<S: Into<String>>(name: S) -> Self {
        TransitionId(name.into())
    }
}

impl From<&str> for TransitionId {
    fn from(s: &str) -> Self {
        TransitionId(s.to_string())
    }
}

impl From<String> for TransitionId {
    fn from(s: String) -> Self {
        TransitionId(s)
    }
}

impl From<&TransitionId> for TransitionId {
    fn from(t: &TransitionId) -> Self {
        t.clone()
    }
}

impl std::fmt::Display for TransitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A place inside a built [`PetriNet`](super::net::PetriNet)
///
/// Places are created by the net builder and never change afterwards. The
/// consumer list and producer link are derived from the transitions.
#[derive(Debug, Clone)]
pub struct Place {
    pub(crate) id: PlaceId,
    pub(crate) consumers: Vec<TransitionId>,
    pub(crate) producer: Option<TransitionId>,
}

impl Place {
    pub(crate) fn new(id: PlaceId) -> Self {
        Place {
            id,
            consumers: Vec::new(),
            producer: None,
        }
    }

    pub fn id(&self) -> &PlaceId {
        &self.id
    }

    /// Transitions that read from this place
    pub fn consumers(&self) -> &[TransitionId] {
        &self.consumers
    }

    /// The transition writing this place, `None` for sources
    pub fn producer(&self) -> Option<&TransitionId> {
        self.producer.as_ref()
    }

    /// Sources are seeded externally at run start
    pub fn is_source(&self) -> bool {
        self.producer.is_none()
    }

    pub fn is_sink(&self) -> bool {
        self.consumers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_id_creation() {
        let place1 = PlaceId::from("reads");
        let place2 = PlaceId::from("reads".to_string());
        let place3 = PlaceId("reads".to_string());
        let place4 = PlaceId::new("reads");

        assert_eq!(place1, place2);
        assert_eq!(place2, place3);
        assert_eq!(place3, place4);
        assert_eq!(place1.as_str(), "reads");
        assert_eq!(place1.to_string(), "reads");
    }

    #[test]
    fn test_transition_id_creation() {
        let trans1 = TransitionId::from("coverage");
        let trans2 = TransitionId::from("coverage".to_string());
        let trans3 = TransitionId::new("coverage");

        assert_eq!(trans1, trans2);
        assert_eq!(trans2, trans3);
        assert_eq!(format!("{}", trans1), "coverage");
    }

    #[test]
    fn test_place_source_and_sink() {
        let mut place = Place::new(PlaceId::from("reads"));
        assert!(place.is_source());
        assert!(place.is_sink());

        place.producer = Some(TransitionId::from("fetch"));
        place.consumers.push(TransitionId::from("coverage"));
        assert!(!place.is_source());
        assert!(!place.is_sink());
        assert_eq!(place.consumers(), &[TransitionId::from("coverage")]);
    }
}
