// Transition definitions - one job plus its input/output places

//! # Transitions
//!
//! A `Transition` wraps one opaque [`Job`] and declares:
//! - the input places it reads (all must hold tokens before it may fire)
//! - the single output place it writes
//! - a static "disabled" flag, set once when the net is built
//!
//! ## Petri Net Theory
//!
//! In Petri Net terminology:
//! - **Input Places**: preconditions, every one must be marked
//! - **Output Place**: postcondition, receives the job's result
//!
//! Unlike a classic net, firing does not consume input tokens: a place keeps
//! its token for the whole run so any number of consumers can read it.

use std::fmt;
use std::sync::Arc;

use super::job::Job;
use super::place::{PlaceId, TransitionId};

/// A node of the pipeline graph
#[derive(Clone)]
pub struct Transition {
    pub(crate) id: TransitionId,
    pub(crate) inputs: Vec<PlaceId>,
    pub(crate) output: PlaceId,
    pub(crate) job: Arc<dyn Job>,
    pub(crate) disabled: bool,
}

impl Transition {
    pub(crate) fn new(
        id: TransitionId,
        inputs: Vec<PlaceId>,
        output: PlaceId,
        job: Arc<dyn Job>,
        disabled: bool,
    ) -> Self {
        Transition {
            id,
            inputs,
            output,
            job,
            disabled,
        }
    }

    pub fn id(&self) -> &TransitionId {
        &self.id
    }

    /// Places that must all hold a token before this transition is ready
    pub fn inputs(&self) -> &[PlaceId] {
        &self.inputs
    }

    pub fn output(&self) -> &PlaceId {
        &self.output
    }

    pub fn job(&self) -> &Arc<dyn Job> {
        &self.job
    }

    /// Disabled at build time, or because the wrapped job reports itself
    /// inapplicable
    pub fn is_statically_disabled(&self) -> bool {
        self.disabled || self.job.is_disabled()
    }

    /// Whether this transition reads the given place
    pub fn reads(&self, place: &PlaceId) -> bool {
        self.inputs.contains(place)
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .field("disabled", &self.disabled)
            .finish()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<&str> = self.inputs.iter().map(|p| p.as_str()).collect();
        write!(f, "{}: [{}] -> {}", self.id, inputs.join(", "), self.output)
    }
}
