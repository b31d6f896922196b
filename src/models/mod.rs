// Core graph model for the track pipeline
// Immutable once built; per-run state lives in the engine

//! # Graph Model Module
//!
//! This module contains the static side of the pipeline: the Petri net that
//! describes which jobs exist and how their results feed each other.
//!
//! Nothing here changes during a run. A [`PetriNet`] is built once, wrapped in
//! an `Arc`, and shared by every [`ExecutionContext`](crate::ExecutionContext)
//! that executes it.
//!
//! ## Rust Learning Notes:
//!
//! ### Module Organization
//! This `mod.rs` file is the **module root** for the `models` directory. Each
//! `pub mod` declaration pulls in the sibling file of the same name.
//!
//! ### Re-exports for Clean APIs
//! The `pub use` statements at the bottom flatten the API, so callers write
//! `use track_pipeline::models::PetriNet` instead of
//! `use track_pipeline::models::net::PetriNet`.

// PlaceId, TransitionId and Place - the named nodes of the net
pub mod place;

// Token and TokenValue - opaque results flowing between jobs
pub mod token;

// Job trait and the closure-backed FnJob
pub mod job;

// Transition - one job with its input places and output place
pub mod transition;

// PetriNet and PetriNetBuilder - the validated topology
pub mod net;

pub use place::{Place, PlaceId, TransitionId};

pub use token::{Token, TokenValue};

pub use job::{FnJob, Job};

pub use transition::Transition;

pub use net::{PetriNet, PetriNetBuilder};
