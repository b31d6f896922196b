// Track pipeline engine
// Everything that happens while a pipeline runs

//! # Engine Module
//!
//! The engine executes the immutable graph from `models/`. From the bottom up:
//!
//! ### Run Context (`context` module)
//! - One [`ExecutionContext`](context::ExecutionContext) per run
//! - Token store, disabled set and readiness under a single run lock
//! - Typed view-state parameters and the run id used for supersession
//!
//! ### Firing (`firing` module)
//! - Runs one transition's job on the pool
//! - Captures faults, panics and timing; reports exactly one result
//!
//! ### Scheduler (`scheduler` module)
//! - Drives one run from the source places until nothing is ready or running
//! - Push model: completions hand newly ready transitions to the run loop
//!
//! ### Manager (`manager` module)
//! - Public façade for location updates
//! - Debounces rapid updates and cancels superseded runs
//!
//! ### Support
//! - `events`: listener contract and broadcast event bus
//! - `pool`: the shared tokio worker pool
//!
//! ## Rust Learning Notes:
//!
//! ### Module Organization Pattern
//! 1. Create a directory with the module name (`engine/`)
//! 2. Add a `mod.rs` file as the module root
//! 3. Declare submodules in `mod.rs`
//! 4. Keep larger scenario tests in sibling files compiled only under `cfg(test)`

pub mod context;

pub mod events;

pub mod firing;

pub mod manager;

pub mod pool;

pub mod scheduler;


#[cfg(test)]
mod manager_tests;
