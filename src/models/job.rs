// Job capability - the opaque unit of work a transition wraps

//! # Jobs
//!
//! The engine knows nothing about what a job computes. A job receives the run
//! context (for the view-state parameters) plus the tokens of its transition's
//! input places, and either yields a new token value or fails.
//!
//! Two flags are queried once per run, before scheduling:
//! - `is_disabled()`: the job is permanently inapplicable (e.g. a hidden track)
//! - `requires_exclusive_access()`: the job family must never run concurrently
//!   with other firings of the same run
//!
//! ## Rust Learning Notes:
//!
//! ### Blocking Work in Async Code
//! A synchronous closure that sleeps, reads files or crunches numbers would
//! hold a tokio worker thread for its whole duration. `FnJob` therefore runs
//! its closure through `tokio::task::spawn_blocking`, which moves it to the
//! runtime's blocking thread pool. That pool grows on demand, so a wide fan-out
//! of blocking jobs runs side by side and the async workers stay free to
//! notice cancellation.

use std::fmt;
use std::panic;
use std::sync::Arc;

use async_trait::async_trait;

use super::token::TokenValue;
use crate::engine::context::ExecutionContext;
use crate::PipelineError;

/// A unit of work fired by the scheduler
///
/// Faults are plain `anyhow::Error`s. A job that notices cancellation (see
/// [`ExecutionContext::is_cancelled`]) should return
/// [`PipelineError::Cancelled`](crate::PipelineError::Cancelled) so the fault
/// is reported as a cancellation rather than an error.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Run the job; `inputs` follow the order of the transition's input places
    async fn execute(
        &self,
        context: &Arc<ExecutionContext>,
        inputs: Vec<TokenValue>,
    ) -> anyhow::Result<TokenValue>;

    fn is_disabled(&self) -> bool {
        false
    }

    fn requires_exclusive_access(&self) -> bool {
        false
    }
}

type JobFn =
    dyn Fn(&ExecutionContext, &[TokenValue]) -> anyhow::Result<TokenValue> + Send + Sync + 'static;

/// Adapts a synchronous closure into a [`Job`]
///
/// The closure runs on the runtime's blocking pool, so it may block freely.
/// It cannot be interrupted: once cancelled, the firing reports `Cancelled`
/// right away and the closure's eventual result is discarded.
///
/// ```rust
/// # use track_pipeline::{FnJob, TokenValue};
/// let double = FnJob::new(|_ctx, inputs| {
///     let n = inputs[0].downcast_ref::<i64>().copied().unwrap_or_default();
///     Ok(TokenValue::new(n * 2))
/// });
/// ```
pub struct FnJob {
    f: Arc<JobFn>,
    disabled: bool,
    exclusive: bool,
}

impl FnJob {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext, &[TokenValue]) -> anyhow::Result<TokenValue> + Send + Sync + 'static,
    {
        FnJob {
            f: Arc::new(f),
            disabled: false,
            exclusive: false,
        }
    }

    /// Mark the job as statically disabled
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

impl fmt::Debug for FnJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob")
            .field("disabled", &self.disabled)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

#[async_trait]
impl Job for FnJob {
    async fn execute(
        &self,
        context: &Arc<ExecutionContext>,
        inputs: Vec<TokenValue>,
    ) -> anyhow::Result<TokenValue> {
        let f = Arc::clone(&self.f);
        let context = Arc::clone(context);
        match tokio::task::spawn_blocking(move || f(context.as_ref(), inputs.as_slice())).await {
            Ok(result) => result,
            // Re-raise so the firing reports the closure's own panic message
            Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            // The runtime is shutting down
            Err(_) => Err(PipelineError::Cancelled.into()),
        }
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn requires_exclusive_access(&self) -> bool {
        self.exclusive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::net::PetriNetBuilder;
    use std::sync::Arc;

    use std::time::{Duration, Instant};

    fn empty_context() -> Arc<ExecutionContext> {
        let net = Arc::new(PetriNetBuilder::new().build().unwrap());
        Arc::new(ExecutionContext::new(net))
    }

    #[tokio::test]
    async fn test_fn_job_executes_closure() {
        let context = empty_context();

        let job = FnJob::new(|_, inputs| {
            let total: i64 = inputs.iter().filter_map(|t| t.downcast_ref::<i64>()).sum();
            Ok(TokenValue::new(total))
        });

        let result = job
            .execute(&context, vec![TokenValue::new(2i64), TokenValue::new(3i64)])
            .await
            .unwrap();
        assert_eq!(result.downcast_ref::<i64>(), Some(&5));
        assert!(!job.is_disabled());
        assert!(!job.requires_exclusive_access());
    }

    #[tokio::test]
    async fn test_blocking_closure_leaves_runtime_free() {
        // Single-threaded runtime: a closure run inline would stall the timer below
        let context = empty_context();
        let job = Arc::new(FnJob::new(|_, _| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(TokenValue::new("done"))
        }));

        let started = Instant::now();
        let running = tokio::spawn({
            let job = Arc::clone(&job);
            let context = Arc::clone(&context);
            async move { job.execute(&context, Vec::new()).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(!running.is_finished());

        let value = running.await.unwrap().unwrap();
        assert_eq!(value.downcast_ref::<&str>(), Some(&"done"));
    }

    #[tokio::test]
    async fn test_blocking_panic_is_raised_again() {
        use futures::FutureExt;
        use std::panic::AssertUnwindSafe;

        let context = empty_context();
        let job = FnJob::new(|_, _| panic!("index out of range"));

        let panic = AssertUnwindSafe(job.execute(&context, Vec::new()))
            .catch_unwind()
            .await
            .unwrap_err();
        assert_eq!(panic.downcast_ref::<&str>(), Some(&"index out of range"));
    }

    #[test]
    fn test_fn_job_flags() {
        let job = FnJob::new(|_, _| Ok(TokenValue::unit())).disabled().exclusive();
        assert!(job.is_disabled());
        assert!(job.requires_exclusive_access());
    }
}
