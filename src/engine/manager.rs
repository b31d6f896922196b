// Tracks data manager - debounced, superseding location updates

//! # Tracks Data Manager
//!
//! [`TracksDataManager`] is the entry point the view layer talks to. Every
//! location update goes through [`set_location`](TracksDataManager::set_location):
//!
//! 1. Cancel every run and debounce window started by earlier updates
//! 2. Wait out the hysteresis window; a newer update during the wait
//!    cancels this one before anything is scheduled
//! 3. Build one fresh [`ExecutionContext`] per (reference, region) pair with
//!    the [`UID`](crate::UID), [`REFERENCE`], [`REGION`] and [`PIXEL_MAPPING`] parameters,
//!    and apply static and transitive disabling
//! 4. Start one [`PetriNetScheduler`] per context on the shared pool
//!
//! Rapid-fire updates therefore coalesce into the last one, and at most one
//! generation of runs is ever active.
//!
//! ## Cancellation Hierarchy
//!
//! ```text
//! update token (one per set_location)
//!   ├── debounce task
//!   └── run token of each scheduler (child)
//!         └── every firing of that run
//! ```
//!
//! Cancelling the update token stops everything below it.

use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::context::ExecutionContext;
use super::events::{same_listener, PetriNetListener};
use super::firing::panic_message;
use super::pool::WorkerPool;
use super::scheduler::{FinishAction, PetriNetScheduler};
use crate::config::EngineConfig;
use crate::models::PetriNet;
use crate::{PipelineError, Result};

/// Parameter holding the reference (e.g. chromosome) of a run
pub const REFERENCE: &str = "reference";

/// Parameter holding the visible region of a run
pub const REGION: &str = "region";

/// Parameter holding the mapper's pixel mapping for the run's reference
pub const PIXEL_MAPPING: &str = "pixel_mapping";

/// Maps the view state of one reference to the pixel space jobs render into
pub trait LocationMapper: Send + Sync + 'static {
    type Reference: Clone + Debug + Send + Sync + 'static;
    type Region: Clone + Debug + Send + Sync + 'static;
    type Mapping: Send + Sync + 'static;

    fn pixel_mapping(&self, reference: &Self::Reference) -> Self::Mapping;
}

#[derive(Default)]
struct Tracked {
    /// Tokens of updates that have not been superseded yet
    updates: Vec<CancellationToken>,
    /// Debounce and scheduler tasks, kept until they finish
    tasks: Vec<JoinHandle<()>>,
}

/// Debounces location updates and runs the pipeline for the latest one
pub struct TracksDataManager {
    net: Arc<PetriNet>,
    pool: WorkerPool,
    config: EngineConfig,
    hysteresis: RwLock<Duration>,
    listeners: Arc<RwLock<Vec<Arc<dyn PetriNetListener>>>>,
    runs: Arc<Mutex<Tracked>>,
}

impl TracksDataManager {
    pub fn new(net: Arc<PetriNet>, pool: WorkerPool, config: EngineConfig) -> Self {
        let hysteresis = config.hysteresis();
        Self {
            net,
            pool,
            config,
            hysteresis: RwLock::new(hysteresis),
            listeners: Arc::new(RwLock::new(Vec::new())),
            runs: Arc::new(Mutex::new(Tracked::default())),
        }
    }

    /// The pipeline every run executes
    pub fn pipeline(&self) -> &Arc<PetriNet> {
        &self.net
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn hysteresis(&self) -> Duration {
        *self.hysteresis.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies to updates issued after this call
    pub fn set_hysteresis(&self, hysteresis: Duration) {
        *self.hysteresis.write().unwrap_or_else(PoisonError::into_inner) = hysteresis;
    }

    /// Listeners are copied into each scheduler when it is created
    pub fn add_listener(&self, listener: Arc<dyn PetriNetListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn PetriNetListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| !same_listener(l.as_ref(), listener.as_ref()));
    }

    /// Supersede all earlier updates with a new location
    ///
    /// `references[i]` and `regions[i]` form one independent run. `on_finish`
    /// is called once for every run that finishes without being cancelled.
    pub fn set_location<M: LocationMapper>(
        &self,
        mapper: Arc<M>,
        references: Vec<M::Reference>,
        regions: Vec<M::Region>,
        on_finish: Option<FinishAction>,
    ) -> Result<()> {
        if references.len() != regions.len() {
            return Err(PipelineError::InvalidRequest(format!(
                "{} references but {} regions",
                references.len(),
                regions.len()
            )));
        }

        let mut runs = lock(&self.runs);
        cancel_tracked(&mut runs);

        let update = CancellationToken::new();
        let hysteresis = self.hysteresis();
        let task = self.pool.spawn(debounce(
            Update {
                net: Arc::clone(&self.net),
                pool: self.pool.clone(),
                config: self.config.clone(),
                listeners: Arc::clone(&self.listeners),
                runs: Arc::clone(&self.runs),
                token: update.clone(),
                on_finish,
            },
            hysteresis,
            mapper,
            references,
            regions,
        ));
        runs.updates.push(update);
        runs.tasks.push(task);
        Ok(())
    }

    /// `set_location` for a single reference and region
    pub fn set_single_location<M: LocationMapper>(
        &self,
        mapper: Arc<M>,
        reference: M::Reference,
        region: M::Region,
        on_finish: Option<FinishAction>,
    ) -> Result<()> {
        self.set_location(mapper, vec![reference], vec![region], on_finish)
    }

    /// Cancel every pending debounce window and running scheduler
    pub fn cancel_all(&self) {
        cancel_tracked(&mut lock(&self.runs));
    }

    /// Tracked tasks (debounce windows and scheduler runs) still running
    ///
    /// Cancelled tasks count until they have wound down. Tasks a
    /// [`wait_idle`](Self::wait_idle) call is currently awaiting do not count.
    pub fn active_runs(&self) -> usize {
        let mut runs = lock(&self.runs);
        runs.tasks.retain(|task| !task.is_finished());
        runs.tasks.len()
    }

    /// Wait until every tracked task has stopped
    pub async fn wait_idle(&self) {
        loop {
            let tasks = std::mem::take(&mut lock(&self.runs).tasks);
            if tasks.is_empty() {
                return;
            }
            // Debounce tasks may track scheduler tasks meanwhile
            join_all(tasks).await;
        }
    }
}

impl Drop for TracksDataManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Everything a debounce task needs to start the runs of one update
struct Update {
    net: Arc<PetriNet>,
    pool: WorkerPool,
    config: EngineConfig,
    listeners: Arc<RwLock<Vec<Arc<dyn PetriNetListener>>>>,
    runs: Arc<Mutex<Tracked>>,
    token: CancellationToken,
    on_finish: Option<FinishAction>,
}

async fn debounce<M: LocationMapper>(
    update: Update,
    hysteresis: Duration,
    mapper: Arc<M>,
    references: Vec<M::Reference>,
    regions: Vec<M::Region>,
) {
    tokio::select! {
        biased;
        _ = update.token.cancelled() => {
            debug!("location update superseded during hysteresis");
            return;
        }
        _ = tokio::time::sleep(hysteresis) => {}
    }

    for (reference, region) in references.into_iter().zip(regions) {
        let context = match build_context(&update.net, mapper.as_ref(), &reference, region) {
            Ok(context) => context,
            Err(err) => {
                error!(?reference, "failed to prepare run: {}", err);
                continue;
            }
        };

        let mut scheduler = PetriNetScheduler::new(Arc::new(context), update.pool.clone())
            .with_config(&update.config)
            .with_cancellation(update.token.clone());
        for listener in update
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            scheduler.add_listener(Arc::clone(listener));
        }
        scheduler.set_finish_action(update.on_finish.clone());

        let mut runs = lock(&update.runs);
        // A newer update may have cancelled us while the contexts were built
        if update.token.is_cancelled() {
            debug!("location update superseded before scheduling");
            return;
        }
        let handle = update.pool.spawn(async move {
            let uid = scheduler.context().uid().to_string();
            // Listeners and the finish action run inside the scheduler
            match AssertUnwindSafe(scheduler.run()).catch_unwind().await {
                Ok(Ok(report)) => debug!(
                    uid = %uid,
                    status = ?report.status,
                    fired = report.fired.len(),
                    failed = report.failed.len(),
                    "run complete"
                ),
                Ok(Err(err)) => error!(uid = %uid, "run aborted: {}", err),
                Err(panic) => error!(
                    uid = %uid,
                    "run panicked: {}",
                    panic_message(panic.as_ref())
                ),
            }
        });
        runs.tasks.push(handle);
    }
}

/// Fresh context with the view-state parameters and disabling applied
fn build_context<M: LocationMapper>(
    net: &Arc<PetriNet>,
    mapper: &M,
    reference: &M::Reference,
    region: M::Region,
) -> Result<ExecutionContext> {
    let mut context = ExecutionContext::new(Arc::clone(net));
    context
        .new_parameter::<M::Reference>(REFERENCE)
        .new_parameter::<M::Region>(REGION)
        .new_parameter::<M::Mapping>(PIXEL_MAPPING);
    context.set_parameter(REFERENCE, reference.clone())?;
    context.set_parameter(REGION, region)?;
    context.set_parameter(PIXEL_MAPPING, mapper.pixel_mapping(reference))?;

    let statically = context.disable_statically_disabled();
    let unreachable = context.disable_unreachable();
    debug!(
        uid = %context.uid(),
        ?reference,
        disabled = statically + unreachable,
        "prepared run context"
    );
    Ok(context)
}

fn cancel_tracked(runs: &mut Tracked) {
    for update in runs.updates.drain(..) {
        update.cancel();
    }
}

fn lock(runs: &Mutex<Tracked>) -> MutexGuard<'_, Tracked> {
    runs.lock().unwrap_or_else(PoisonError::into_inner)
}
