// Lifecycle notifications for scheduler runs

//! # Event System
//!
//! Schedulers report three lifecycle events per run: started, then exactly
//! one of cancelled or finished. Two ways to observe them:
//!
//! - implement [`PetriNetListener`] and register it with the manager or a
//!   scheduler (called synchronously, must not block)
//! - subscribe to an [`EventBus`], itself a listener that re-broadcasts every
//!   event on a `tokio::sync::broadcast` channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::scheduler::RunReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Cancelled,
    Finished,
}

/// A lifecycle notification for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetriNetEvent {
    pub execution_id: u64,
    /// Run-scoped unique id of the execution context
    pub uid: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Transitions that produced a token (zero for `Started`)
    pub fired: usize,
    /// Transitions whose job faulted
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl PetriNetEvent {
    pub(crate) fn started(execution_id: u64, uid: &str) -> Self {
        Self {
            execution_id,
            uid: uid.to_string(),
            kind: EventKind::Started,
            timestamp: Utc::now(),
            fired: 0,
            failed: 0,
            elapsed_ms: 0,
        }
    }

    pub(crate) fn ended(kind: EventKind, report: &RunReport) -> Self {
        Self {
            execution_id: report.execution_id,
            uid: report.uid.clone(),
            kind,
            timestamp: Utc::now(),
            fired: report.fired.len(),
            failed: report.failed.len(),
            elapsed_ms: report.wall_time.as_millis() as u64,
        }
    }
}

/// Receives run lifecycle notifications
///
/// Called on whichever worker thread drives the run. Implementations must
/// return quickly; hand heavy work off to another task.
pub trait PetriNetListener: Send + Sync {
    fn on_started(&self, _event: &PetriNetEvent) {}

    fn on_cancelled(&self, _event: &PetriNetEvent) {}

    fn on_finished(&self, _event: &PetriNetEvent) {}
}

/// Identity comparison for registered listeners
pub(crate) fn same_listener(a: &dyn PetriNetListener, b: &dyn PetriNetListener) -> bool {
    std::ptr::eq(
        a as *const dyn PetriNetListener as *const (),
        b as *const dyn PetriNetListener as *const (),
    )
}

/// Event bus for publishing and subscribing to run events
pub struct EventBus {
    sender: broadcast::Sender<PetriNetEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(1000) // Buffer up to 1000 events
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: PetriNetEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PetriNetEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a `Stream`; lagging subscribers see `Err` items
    pub fn stream(&self) -> BroadcastStream<PetriNetEvent> {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl PetriNetListener for EventBus {
    fn on_started(&self, event: &PetriNetEvent) {
        self.publish(event.clone());
    }

    fn on_cancelled(&self, event: &PetriNetEvent) {
        self.publish(event.clone());
    }

    fn on_finished(&self, event: &PetriNetEvent) {
        self.publish(event.clone());
    }
}
