// Track Pipeline - Rust Edition
// A concurrent, dependency-driven job engine powered by Petri Nets
// Recomputes a graph of data-transformation jobs whenever the visible region changes

//! # Track Pipeline Library
//!
//! This is the main library crate for the track pipeline, an execution engine
//! that recomputes a directed graph of data-transformation jobs whenever an
//! upstream "view state" (for example the visible genomic interval) changes.
//! When a newer request supersedes an older one, in-flight work is cancelled
//! cheaply and the graph is recomputed for the new state.
//!
//! ## Core Components
//!
//! ### Graph Model (`models`)
//! - [`PetriNet`] / [`PetriNetBuilder`]: the immutable dependency topology
//! - [`PlaceId`] / [`TransitionId`]: names of single-token slots and of jobs
//! - [`Transition`]: one opaque [`Job`] with its input places and output place
//! - [`Token`] / [`TokenValue`]: the opaque values flowing between jobs
//!
//! ### Engine (`engine`)
//! - [`ExecutionContext`]: per-run tokens, disabled set, parameters, run id
//! - [`FireTransition`]: wraps one job firing, capturing faults and timing
//! - [`PetriNetScheduler`]: drives one run to `Finished` or `Cancelled`
//! - [`TracksDataManager`]: debounces location updates and supersedes runs
//! - [`PetriNetListener`] / [`EventBus`]: lifecycle notifications
//!
//! ## Data Flow
//!
//! ```text
//! set_location()
//!   ↓ cancels superseded runs, waits out the hysteresis window
//! ExecutionContext (one per reference/region)
//!   ↓ handed to
//! PetriNetScheduler
//!   ↓ fires ready transitions on the WorkerPool
//! FireTransition → token → newly ready consumers → ... → finished
//! ```
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports
//! `pub use` statements create shortcuts so users don't need to know the
//! internal module structure: `track_pipeline::PetriNetScheduler` instead of
//! `track_pipeline::engine::scheduler::PetriNetScheduler`.

// Configuration layered from defaults and TRACKS_* environment variables
pub mod config;

// Immutable graph model: places, transitions, jobs, tokens, the net itself
pub mod models;

// Runtime: run context, firing units, scheduler, manager, events, worker pool
pub mod engine;

pub use config::EngineConfig;

pub use models::{
    FnJob,           // Closure-backed job
    Job,             // Opaque unit of work
    PetriNet,        // Immutable topology
    PetriNetBuilder, // Topology construction
    Place,           // Single-token slot
    PlaceId,         // Place name
    Token,           // Deposited value + provenance
    TokenValue,      // Type-erased payload
    Transition,      // Job + input/output places
    TransitionId,    // Transition name
};

pub use engine::{
    context::{ExecutionContext, UID},
    events::{EventBus, EventKind, PetriNetEvent, PetriNetListener},
    firing::{FireTransition, FiringOutcome, FiringResult},
    manager::{LocationMapper, TracksDataManager, PIXEL_MAPPING, REFERENCE, REGION},
    pool::WorkerPool,
    scheduler::{FinishAction, PetriNetScheduler, RunReport, RunStatus},
};

// Core error types
use thiserror::Error;

/// Errors raised by the track pipeline
///
/// Job faults are *not* represented here: they are `anyhow::Error`s captured
/// by the firing unit and never propagate out of a run. The one exception is
/// [`PipelineError::Cancelled`], which jobs may return to report that they
/// stopped because their run was superseded.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A place name that is not part of the net
    #[error("Unknown place: {id}")]
    UnknownPlace { id: String },

    /// A transition name that is not part of the net
    #[error("Unknown transition: {id}")]
    UnknownTransition { id: String },

    #[error("Duplicate place: {id}")]
    DuplicatePlace { id: String },

    #[error("Duplicate transition: {id}")]
    DuplicateTransition { id: String },

    /// A place may only be written by a single transition
    #[error("Place {place} is already produced by {producer}")]
    PlaceAlreadyProduced { place: String, producer: String },

    /// Tokens are never overwritten within a run
    #[error("Place {place} already holds a token")]
    PlaceOccupied { place: String },

    /// Setting or reading a parameter that was never declared
    #[error("Undeclared parameter: {name}")]
    UndeclaredParameter { name: String },

    /// Reading a declared parameter before a value was set
    #[error("Parameter not set: {name}")]
    ParameterNotSet { name: String },

    #[error("Parameter {name} has type {expected}, got {actual}")]
    ParameterType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A token or readiness operation for a run that is no longer current
    #[error("Execution {execution_id} is no longer current")]
    StaleRun { execution_id: u64 },

    /// Work stopped because its run was cancelled or superseded
    #[error("Execution cancelled")]
    Cancelled,

    /// Fatal misconfiguration detected at run start
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A malformed request (e.g. mismatched reference/region lists)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<::config::ConfigError> for PipelineError {
    fn from(err: ::config::ConfigError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

impl PipelineError {
    /// Whether `err` (or anything in its cause chain) is a cancellation
    ///
    /// Faults caused by cancellation are logged at a lower severity and are
    /// not counted as failures.
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<PipelineError>(),
                Some(PipelineError::Cancelled)
            )
        })
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, PipelineError>;
