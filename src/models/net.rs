// Petri net definition - the immutable dependency topology

//! # Petri Net
//!
//! A `PetriNet` is built once at startup and shared read-only (behind an `Arc`)
//! by every run. It answers the topology questions the scheduler asks:
//! - which transitions consume a place
//! - which transition produces a place
//! - which places are sources (seeded externally) and sinks
//!
//! ## Building
//!
//! ```rust
//! # use std::sync::Arc;
//! # use track_pipeline::{FnJob, PetriNetBuilder, TokenValue};
//! let net = PetriNetBuilder::new()
//!     .place("location")
//!     .place("reads")
//!     .place("coverage")
//!     .transition("fetch", FnJob::new(|_, _| Ok(TokenValue::new(vec![1u32, 2, 3]))), ["location"], "reads")
//!     .transition("coverage", FnJob::new(|_, inputs| Ok(inputs[0].clone())), ["reads"], "coverage")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(net.sources().count(), 1);
//! assert_eq!(net.transitions().len(), 2);
//! ```
//!
//! ## Validation
//!
//! `build()` rejects duplicate names, references to undeclared places, and a
//! place with more than one producer: a place holds at most one token per run,
//! so two writers would overwrite each other. Acyclicity is *not* enforced;
//! [`PetriNet::find_cycle`] is available as a diagnostic.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::job::Job;
use super::place::{Place, PlaceId, TransitionId};
use super::transition::Transition;
use crate::{PipelineError, Result};

/// Immutable pipeline topology
#[derive(Debug)]
pub struct PetriNet {
    places: Vec<Place>,
    place_index: HashMap<PlaceId, usize>,
    transitions: Vec<Transition>,
    transition_index: HashMap<TransitionId, usize>,
}

impl PetriNet {
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn place(&self, id: &PlaceId) -> Option<&Place> {
        self.place_index.get(id).map(|&i| &self.places[i])
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn transition(&self, id: &TransitionId) -> Option<&Transition> {
        self.transition_index.get(id).map(|&i| &self.transitions[i])
    }

    /// Places with no producer; they are seeded at run start
    pub fn sources(&self) -> impl Iterator<Item = &Place> {
        self.places.iter().filter(|p| p.is_source())
    }

    /// Places nobody reads; these are the pipeline's results
    pub fn sinks(&self) -> impl Iterator<Item = &Place> {
        self.places.iter().filter(|p| p.is_sink())
    }

    /// Transitions reading `place`; empty for unknown places
    pub fn consumers(&self, place: &PlaceId) -> &[TransitionId] {
        self.place(place).map(|p| p.consumers()).unwrap_or(&[])
    }

    pub fn producer(&self, place: &PlaceId) -> Option<&TransitionId> {
        self.place(place).and_then(|p| p.producer())
    }

    /// Transitions with no input places at all
    pub fn unconditioned(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(|t| t.inputs.is_empty())
    }

    /// Find a dependency cycle, returned as the transitions along it
    ///
    /// Edges run from a transition to the consumers of its output place. A net
    /// with a cycle never finishes: the transitions on it wait for each other.
    pub fn find_cycle(&self) -> Option<Vec<TransitionId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.transitions.len()];

        for root in 0..self.transitions.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            // (transition index, next consumer to look at)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            marks[root] = Mark::OnStack;

            while let Some(&(current, next)) = stack.last() {
                let consumers = self.consumers(&self.transitions[current].output);
                if next < consumers.len() {
                    let child = self.transition_index[&consumers[next]];
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    match marks[child] {
                        Mark::Unvisited => {
                            marks[child] = Mark::OnStack;
                            stack.push((child, 0));
                        }
                        Mark::OnStack => {
                            let start = stack.iter().position(|&(i, _)| i == child).unwrap_or(0);
                            return Some(
                                stack[start..]
                                    .iter()
                                    .map(|&(i, _)| self.transitions[i].id.clone())
                                    .collect(),
                            );
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[current] = Mark::Done;
                    stack.pop();
                }
            }
        }
        None
    }
}

impl fmt::Display for PetriNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, transition) in self.transitions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", transition)?;
        }
        Ok(())
    }
}

struct PendingTransition {
    id: TransitionId,
    job: Arc<dyn Job>,
    inputs: Vec<PlaceId>,
    output: PlaceId,
    disabled: bool,
}

/// Step-by-step construction of a [`PetriNet`]
///
/// Errors are collected and reported by [`build`](PetriNetBuilder::build), so
/// calls can be chained without intermediate `?`.
#[derive(Default)]
pub struct PetriNetBuilder {
    places: Vec<PlaceId>,
    transitions: Vec<PendingTransition>,
}

impl PetriNetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place<P: Into<PlaceId>>(mut self, id: P) -> Self {
        self.places.push(id.into());
        self
    }

    /// Add a transition wrapping `job`, reading `inputs` and writing `output`
    pub fn transition<I, J, P, O>(self, id: I, job: J, inputs: P, output: O) -> Self
    where
        I: Into<TransitionId>,
        J: Job,
        P: IntoIterator,
        P::Item: Into<PlaceId>,
        O: Into<PlaceId>,
    {
        self.push_transition(id.into(), Arc::new(job), inputs, output.into(), false)
    }

    /// Same as [`transition`](Self::transition) for an already shared job
    pub fn shared_transition<I, P, O>(self, id: I, job: Arc<dyn Job>, inputs: P, output: O) -> Self
    where
        I: Into<TransitionId>,
        P: IntoIterator,
        P::Item: Into<PlaceId>,
        O: Into<PlaceId>,
    {
        self.push_transition(id.into(), job, inputs, output.into(), false)
    }

    /// Add a transition whose static disabled flag is set
    pub fn disabled_transition<I, J, P, O>(self, id: I, job: J, inputs: P, output: O) -> Self
    where
        I: Into<TransitionId>,
        J: Job,
        P: IntoIterator,
        P::Item: Into<PlaceId>,
        O: Into<PlaceId>,
    {
        self.push_transition(id.into(), Arc::new(job), inputs, output.into(), true)
    }

    fn push_transition<P>(
        mut self,
        id: TransitionId,
        job: Arc<dyn Job>,
        inputs: P,
        output: PlaceId,
        disabled: bool,
    ) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PlaceId>,
    {
        self.transitions.push(PendingTransition {
            id,
            job,
            inputs: inputs.into_iter().map(Into::into).collect(),
            output,
            disabled,
        });
        self
    }

    /// Validate and freeze the topology
    pub fn build(self) -> Result<PetriNet> {
        let mut places = Vec::with_capacity(self.places.len());
        let mut place_index = HashMap::with_capacity(self.places.len());
        for id in self.places {
            if place_index.contains_key(&id) {
                return Err(PipelineError::DuplicatePlace { id: id.to_string() });
            }
            place_index.insert(id.clone(), places.len());
            places.push(Place::new(id));
        }

        let mut transitions = Vec::with_capacity(self.transitions.len());
        let mut transition_index = HashMap::with_capacity(self.transitions.len());
        for pending in self.transitions {
            if transition_index.contains_key(&pending.id) {
                return Err(PipelineError::DuplicateTransition {
                    id: pending.id.to_string(),
                });
            }

            let mut seen = HashSet::new();
            for input in &pending.inputs {
                let &i = place_index
                    .get(input)
                    .ok_or_else(|| PipelineError::UnknownPlace { id: input.to_string() })?;
                if seen.insert(input.clone()) {
                    places[i].consumers.push(pending.id.clone());
                }
            }

            let &o = place_index.get(&pending.output).ok_or_else(|| {
                PipelineError::UnknownPlace {
                    id: pending.output.to_string(),
                }
            })?;
            if let Some(existing) = &places[o].producer {
                return Err(PipelineError::PlaceAlreadyProduced {
                    place: pending.output.to_string(),
                    producer: existing.to_string(),
                });
            }
            places[o].producer = Some(pending.id.clone());

            // Repeated inputs add nothing to readiness
            let inputs: Vec<PlaceId> = seen_in_order(pending.inputs);

            transition_index.insert(pending.id.clone(), transitions.len());
            transitions.push(Transition::new(
                pending.id,
                inputs,
                pending.output,
                pending.job,
                pending.disabled,
            ));
        }

        Ok(PetriNet {
            places,
            place_index,
            transitions,
            transition_index,
        })
    }
}

fn seen_in_order(places: Vec<PlaceId>) -> Vec<PlaceId> {
    let mut seen = HashSet::new();
    places.into_iter().filter(|p| seen.insert(p.clone())).collect()
}
