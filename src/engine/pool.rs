// Worker pool - where debounce tasks, scheduler loops and firings run

//! # Worker Pool
//!
//! All engine work runs as tokio tasks on one shared pool. A `WorkerPool` is a
//! cheap, cloneable handle to that pool. It either borrows the runtime the
//! caller is already in, or owns a dedicated multi-thread runtime whose
//! threads are named `<prefix>-<pool#>-thread-<n>` so they stand out in
//! thread dumps.
//!
//! A dedicated runtime is shut down in the background when the last handle is
//! dropped. Outstanding tasks are abandoned rather than awaited, so the pool
//! never keeps the process alive.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::{PipelineError, Result};

static POOL_NUMBER: AtomicUsize = AtomicUsize::new(0);

struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Shared executor for all engine tasks
#[derive(Clone)]
pub struct WorkerPool {
    handle: Handle,
    name: Arc<str>,
    owned: Option<Arc<OwnedRuntime>>,
}

impl WorkerPool {
    /// Use the runtime the caller is running in
    ///
    /// # Panics
    /// When called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::from_handle(Handle::current())
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            name: Arc::from("current"),
            owned: None,
        }
    }

    /// Build an owned multi-thread runtime sized and named by `config`
    pub fn dedicated(config: &EngineConfig) -> Result<Self> {
        if config.worker_threads == Some(0) {
            return Err(PipelineError::Configuration(
                "worker_threads must be at least 1".to_string(),
            ));
        }

        let pool_number = POOL_NUMBER.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("{}-{}", config.thread_name_prefix, pool_number);
        let thread_number = Arc::new(AtomicUsize::new(0));

        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name_fn({
            let name = name.clone();
            move || {
                let n = thread_number.fetch_add(1, Ordering::SeqCst) + 1;
                format!("{}-thread-{}", name, n)
            }
        });
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads);
        }

        let runtime = builder
            .build()
            .map_err(|e| PipelineError::Internal(format!("failed to start worker pool: {}", e)))?;
        tracing::debug!(pool = %name, "started dedicated worker pool");

        Ok(Self {
            handle: runtime.handle().clone(),
            name: Arc::from(name),
            owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dedicated(&self) -> bool {
        self.owned.is_some()
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("dedicated", &self.is_dedicated())
            .finish()
    }
}
