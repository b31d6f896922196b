// Petri net scheduler - drives one run from its sources to completion

//! # Scheduler
//!
//! A [`PetriNetScheduler`] drives exactly one run of one
//! [`ExecutionContext`] and is consumed by [`run`](PetriNetScheduler::run):
//!
//! ```text
//! Idle ──run()──▶ Running ──▶ Finished   (nothing ready, nothing in flight)
//!                        └──▶ Cancelled  (run token cancelled or run superseded)
//! ```
//!
//! ## Token Flow
//!
//! 1. `start_run` marks the source places; their ready consumers are claimed
//!    and fired on the [`WorkerPool`]
//! 2. When a firing succeeds, its completion callback (on the pool thread)
//!    deposits the token and claims every consumer that just became ready,
//!    all under the context's run lock
//! 3. The callback pushes the result and the claimed consumers to the run
//!    loop over an unbounded channel; the loop fires them in turn
//! 4. The run finishes when no firing is in flight
//!
//! A faulted firing deposits nothing. Its consumers never become ready, so
//! that branch stalls while the rest of the run carries on.
//!
//! ## Cancellation
//!
//! The loop waits on either the next completion or the run's cancellation
//! token. Starting a newer run on the same context cancels that token, as
//! does cancelling the parent token given to
//! [`with_cancellation`](PetriNetScheduler::with_cancellation). In-flight
//! firings observe the same token and report `Cancelled`.
//!
//! ## Rust Learning Notes:
//!
//! ### Consuming `self`
//! `run(self)` takes the scheduler by value. After a run the scheduler is
//! gone, so "a scheduler is never reused" is enforced by the compiler.
//!
//! ### Channels Instead of Polling
//! `mpsc::unbounded_channel` lets synchronous callbacks on any thread hand
//! results to the async loop without blocking; the loop sleeps in
//! `recv().await` until something happens.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::context::ExecutionContext;
use super::events::{same_listener, EventKind, PetriNetEvent, PetriNetListener};
use super::firing::{FireTransition, FiringOutcome, FiringResult};
use super::pool::WorkerPool;
use crate::config::EngineConfig;
use crate::models::TransitionId;
use crate::{PipelineError, Result};

/// Callback invoked once when a run finishes normally
pub type FinishAction = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Finished,
    Cancelled,
}

/// Summary of one completed or cancelled run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub execution_id: u64,
    pub uid: String,
    pub status: RunStatus,
    /// Transitions that deposited a token, in completion order
    pub fired: Vec<TransitionId>,
    pub failed: Vec<TransitionId>,
    /// Transitions interrupted by cancellation
    pub cancelled: Vec<TransitionId>,
    pub wall_time: Duration,
    /// Sum of the time spent inside jobs
    pub busy_time: Duration,
}

impl RunReport {
    fn new(execution_id: u64, uid: String) -> Self {
        Self {
            execution_id,
            uid,
            status: RunStatus::Finished,
            fired: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
            wall_time: Duration::ZERO,
            busy_time: Duration::ZERO,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == RunStatus::Finished
    }

    pub fn has_fired(&self, transition: &TransitionId) -> bool {
        self.fired.contains(transition)
    }
}

/// Sent by a firing's completion callback to the run loop
struct Completion {
    result: FiringResult,
    /// Consumers claimed after the token was deposited
    ready: Result<Vec<TransitionId>>,
}

/// Drives one run of an execution context
pub struct PetriNetScheduler {
    context: Arc<ExecutionContext>,
    pool: WorkerPool,
    listeners: Vec<Arc<dyn PetriNetListener>>,
    finish_action: Option<FinishAction>,
    logging: bool,
    max_concurrent_firings: Option<usize>,
    parent: Option<CancellationToken>,
}

impl PetriNetScheduler {
    pub fn new(context: Arc<ExecutionContext>, pool: WorkerPool) -> Self {
        Self {
            context,
            pool,
            listeners: Vec::new(),
            finish_action: None,
            logging: true,
            max_concurrent_firings: None,
            parent: None,
        }
    }

    /// Apply the logging switch and concurrency limit from `config`
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.logging = config.logging;
        self.max_concurrent_firings = config.max_concurrent_firings;
        self
    }

    /// Cancel the run whenever `parent` is cancelled
    pub fn with_cancellation(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn PetriNetListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_listener(&mut self, listener: &Arc<dyn PetriNetListener>) {
        self.listeners
            .retain(|l| !same_listener(l.as_ref(), listener.as_ref()));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn set_finish_action(&mut self, action: Option<FinishAction>) {
        self.finish_action = action;
    }

    /// Lifecycle and per-firing logging; faults are always logged
    pub fn set_logging(&mut self, logging: bool) {
        self.logging = logging;
    }

    pub fn set_max_concurrent_firings(&mut self, limit: Option<usize>) {
        self.max_concurrent_firings = limit;
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Run to completion or cancellation
    ///
    /// Fails without starting anything when the run is misconfigured.
    pub async fn run(self) -> Result<RunReport> {
        self.check_configuration()?;

        let context = Arc::clone(&self.context);
        let parent = self.parent.clone().unwrap_or_default();
        let (execution_id, token) = context.begin_run(&parent);
        let started = Instant::now();
        let mut report = RunReport::new(execution_id, context.uid().to_string());

        if self.logging {
            debug!(uid = %report.uid, execution_id, "starting run");
            trace!(uid = %report.uid, "pipeline:\n{}", context.net());
        }
        self.notify(&PetriNetEvent::started(execution_id, &report.uid));

        let limit = self
            .max_concurrent_firings
            .map(|permits| Arc::new(Semaphore::new(permits)));
        let (sender, mut receiver) = mpsc::unbounded_channel::<Completion>();
        let mut in_flight: HashSet<TransitionId> = HashSet::new();

        match context.claim_initial(execution_id) {
            Ok(ready) => {
                for transition in ready {
                    self.submit(transition, execution_id, &token, &limit, &sender, &mut in_flight);
                }
            }
            // Superseded already; the loop below reports the cancellation
            Err(PipelineError::StaleRun { .. }) => {}
            Err(err) => return Err(err),
        }

        let status = loop {
            if token.is_cancelled() || !context.is_current(execution_id) {
                break RunStatus::Cancelled;
            }
            if in_flight.is_empty() {
                break RunStatus::Finished;
            }

            let completion = tokio::select! {
                biased;
                _ = token.cancelled() => break RunStatus::Cancelled,
                completion = receiver.recv() => completion,
            };
            let Some(Completion { result, ready }) = completion else {
                return Err(PipelineError::Internal(
                    "completion channel closed while firings were in flight".to_string(),
                ));
            };

            in_flight.remove(&result.transition);
            report.busy_time += result.elapsed;
            let transition = result.transition.clone();

            match (result.outcome, ready) {
                (FiringOutcome::Success(_), Ok(ready)) => {
                    if self.logging {
                        trace!(
                            uid = %report.uid,
                            transition = %transition,
                            elapsed = ?result.elapsed,
                            ready = ready.len(),
                            "transition fired"
                        );
                    }
                    report.fired.push(transition);
                    for next in ready {
                        self.submit(next, execution_id, &token, &limit, &sender, &mut in_flight);
                    }
                }
                (FiringOutcome::Success(_), Err(PipelineError::StaleRun { .. }))
                | (FiringOutcome::Cancelled, _) => {
                    debug!(uid = %report.uid, transition = %transition, "firing cancelled");
                    report.cancelled.push(transition);
                }
                (FiringOutcome::Success(_), Err(err)) => {
                    error!(uid = %report.uid, transition = %transition, "failed to store token: {}", err);
                    report.failed.push(transition);
                }
                (FiringOutcome::Fault(err), _) => {
                    error!(
                        uid = %report.uid,
                        transition = %transition,
                        elapsed = ?result.elapsed,
                        "transition failed: {:#}",
                        err
                    );
                    report.failed.push(transition);
                }
            }
        };

        report.status = status;
        report.wall_time = started.elapsed();

        match status {
            RunStatus::Cancelled => {
                token.cancel();
                report.cancelled.extend(in_flight);
                if self.logging {
                    debug!(
                        uid = %report.uid,
                        execution_id,
                        fired = report.fired.len(),
                        interrupted = report.cancelled.len(),
                        "run cancelled"
                    );
                }
                self.notify(&PetriNetEvent::ended(EventKind::Cancelled, &report));
            }
            RunStatus::Finished => {
                if self.logging {
                    debug!(
                        uid = %report.uid,
                        execution_id,
                        fired = report.fired.len(),
                        failed = report.failed.len(),
                        wall_time = ?report.wall_time,
                        busy_time = ?report.busy_time,
                        "run finished"
                    );
                }
                self.notify(&PetriNetEvent::ended(EventKind::Finished, &report));
                if let Some(action) = &self.finish_action {
                    action();
                }
            }
        }

        Ok(report)
    }

    /// Jobs that need exclusive access may only run with a limit of one
    fn check_configuration(&self) -> Result<()> {
        if self.max_concurrent_firings == Some(0) {
            return Err(PipelineError::Configuration(
                "max_concurrent_firings must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_firings == Some(1) {
            return Ok(());
        }

        let exclusive: Vec<&str> = self
            .context
            .net()
            .transitions()
            .iter()
            .filter(|t| !t.is_statically_disabled() && !self.context.is_disabled(t.id()))
            .filter(|t| t.job().requires_exclusive_access())
            .map(|t| t.id().as_str())
            .collect();

        if exclusive.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Configuration(format!(
                "transitions [{}] require exclusive access but firings may run concurrently",
                exclusive.join(", ")
            )))
        }
    }

    fn submit(
        &self,
        transition: TransitionId,
        execution_id: u64,
        token: &CancellationToken,
        limit: &Option<Arc<Semaphore>>,
        sender: &mpsc::UnboundedSender<Completion>,
        in_flight: &mut HashSet<TransitionId>,
    ) {
        if self.logging {
            trace!(uid = %self.context.uid(), transition = %transition, "submitting");
        }
        in_flight.insert(transition.clone());

        let mut firing = FireTransition::new(Arc::clone(&self.context), transition, execution_id)
            .with_cancellation(token.clone());
        if let Some(limit) = limit {
            firing = firing.with_limit(Arc::clone(limit));
        }

        let context = Arc::clone(&self.context);
        let sender = sender.clone();
        firing.spawn(&self.pool, move |result| {
            let ready = match &result.outcome {
                FiringOutcome::Success(value) => {
                    context.complete_firing(execution_id, &result.transition, value.clone())
                }
                _ => Ok(Vec::new()),
            };
            // The run loop may already have stopped listening
            let _ = sender.send(Completion { result, ready });
        });
    }

    fn notify(&self, event: &PetriNetEvent) {
        for listener in &self.listeners {
            match event.kind {
                EventKind::Started => listener.on_started(event),
                EventKind::Cancelled => listener.on_cancelled(event),
                EventKind::Finished => listener.on_finished(event),
            }
        }
    }
}
