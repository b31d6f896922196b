// Firing unit - one transition's job, run once, outcome always reported

//! # Firing a Transition
//!
//! [`FireTransition`] binds one transition to one run of an
//! [`ExecutionContext`] and turns the transition's job into a unit of work for
//! the [`WorkerPool`]. Whatever the job does, the unit produces exactly one
//! [`FiringResult`]:
//!
//! - the job returns a value → [`FiringOutcome::Success`]
//! - the job returns an error or panics → [`FiringOutcome::Fault`]
//! - the run is cancelled, or the job reports
//!   [`PipelineError::Cancelled`] → [`FiringOutcome::Cancelled`]
//!
//! Faults never escape the unit, so one broken job cannot take down the pool
//! or the scheduler that submitted it.
//!
//! ## Rust Learning Notes:
//!
//! ### Catching Panics in Futures
//! `std::panic::catch_unwind` only works for synchronous closures. For async
//! code, `futures::FutureExt::catch_unwind` does the same for every poll of a
//! future. The future must be `UnwindSafe`; `AssertUnwindSafe` is our promise
//! that a panicking job leaves no shared state half-updated (it never touches
//! the token store directly).
//!
//! ### Racing Futures with `select!`
//! `tokio::select!` polls the job and the cancellation token together and
//! finishes with whichever completes first. The losing branch is dropped,
//! which is how an in-flight job is interrupted.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::pool::WorkerPool;
use crate::models::{TokenValue, TransitionId};
use crate::PipelineError;

/// How a single firing ended
#[derive(Debug)]
pub enum FiringOutcome {
    /// The job produced the value for the transition's output place
    Success(TokenValue),
    /// The job failed or panicked; the output place stays empty
    Fault(anyhow::Error),
    /// The run was cancelled before or while the job ran
    Cancelled,
}

/// Outcome of one transition's firing within one run
#[derive(Debug)]
pub struct FiringResult {
    pub transition: TransitionId,
    pub execution_id: u64,
    pub outcome: FiringOutcome,
    /// Time spent inside the job (zero if it never started)
    pub elapsed: Duration,
}

impl FiringResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FiringOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, FiringOutcome::Cancelled)
    }

    pub fn value(&self) -> Option<&TokenValue> {
        match &self.outcome {
            FiringOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn fault(&self) -> Option<&anyhow::Error> {
        match &self.outcome {
            FiringOutcome::Fault(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for FiringResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match &self.outcome {
            FiringOutcome::Success(value) => format!("produced {:?}", value),
            FiringOutcome::Fault(err) => format!("failed: {:#}", err),
            FiringOutcome::Cancelled => "cancelled".to_string(),
        };
        write!(
            f,
            "{} (execution {}) {} in {:?}",
            self.transition, self.execution_id, outcome, self.elapsed
        )
    }
}

/// A transition bound to one run, ready to be fired on the pool
pub struct FireTransition {
    context: Arc<ExecutionContext>,
    transition: TransitionId,
    execution_id: u64,
    cancellation: CancellationToken,
    limit: Option<Arc<Semaphore>>,
}

impl FireTransition {
    /// Bind `transition` to run `execution_id`, cancelled with the run
    pub fn new(context: Arc<ExecutionContext>, transition: TransitionId, execution_id: u64) -> Self {
        let cancellation = context.run_token();
        Self {
            context,
            transition,
            execution_id,
            cancellation,
            limit: None,
        }
    }

    /// Interrupt the firing when `token` is cancelled instead of the run token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Wait for a permit of `limit` before the job starts
    pub fn with_limit(mut self, limit: Arc<Semaphore>) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn transition(&self) -> &TransitionId {
        &self.transition
    }

    /// Run the job once and classify its outcome
    pub async fn fire(self) -> FiringResult {
        let FireTransition {
            context,
            transition,
            execution_id,
            cancellation,
            limit,
        } = self;

        let mut elapsed = Duration::ZERO;
        let outcome = 'firing: {
            if cancellation.is_cancelled() || !context.is_current(execution_id) {
                break 'firing FiringOutcome::Cancelled;
            }

            let _permit = match limit {
                Some(limit) => tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => break 'firing FiringOutcome::Cancelled,
                    permit = limit.acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break 'firing FiringOutcome::Cancelled,
                    },
                },
                None => None,
            };

            let job = match context.net().transition(&transition) {
                Some(definition) => Arc::clone(definition.job()),
                None => {
                    break 'firing FiringOutcome::Fault(
                        PipelineError::UnknownTransition {
                            id: transition.to_string(),
                        }
                        .into(),
                    )
                }
            };
            let inputs = match context.inputs_for(&transition) {
                Ok(inputs) => inputs,
                Err(err) => break 'firing FiringOutcome::Fault(err.into()),
            };

            let started = Instant::now();
            let work = AssertUnwindSafe(job.execute(&context, inputs)).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = cancellation.cancelled() => FiringOutcome::Cancelled,
                result = work => match result {
                    Ok(Ok(value)) => FiringOutcome::Success(value),
                    Ok(Err(err)) if PipelineError::is_cancellation(&err) => FiringOutcome::Cancelled,
                    Ok(Err(err)) => FiringOutcome::Fault(err),
                    Err(panic) => FiringOutcome::Fault(anyhow::anyhow!(
                        "job panicked: {}",
                        panic_message(panic.as_ref())
                    )),
                },
            };
            elapsed = started.elapsed();
            outcome
        };

        FiringResult {
            transition,
            execution_id,
            outcome,
            elapsed,
        }
    }

    /// Fire on `pool` and hand the result to `callback` on the pool thread
    ///
    /// The callback runs exactly once unless the pool itself shuts down.
    pub fn spawn<F>(self, pool: &WorkerPool, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(FiringResult) + Send + 'static,
    {
        pool.spawn(async move {
            let result = self.fire().await;
            callback(result);
        })
    }
}

impl fmt::Debug for FireTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FireTransition")
            .field("transition", &self.transition)
            .field("execution_id", &self.execution_id)
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
