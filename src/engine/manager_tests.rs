// Scenario tests for the manager: debounce, supersession, fan-out per region

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

use super::context::{ExecutionContext, UID};
use super::events::{EventKind, PetriNetEvent, PetriNetListener};
use super::manager::{LocationMapper, TracksDataManager, PIXEL_MAPPING, REFERENCE, REGION};
use super::pool::WorkerPool;
use super::scheduler::FinishAction;
use crate::config::EngineConfig;
use crate::models::{FnJob, Job, PetriNet, PetriNetBuilder, TokenValue};
use crate::PipelineError;

type Region = (u64, u64);

struct Mapper;

impl LocationMapper for Mapper {
    type Reference = String;
    type Region = Region;
    type Mapping = f64;

    /// Bases per pixel
    fn pixel_mapping(&self, reference: &String) -> f64 {
        if reference == "chrM" {
            1.0
        } else {
            250.0
        }
    }
}

/// Lines written by jobs: "<job> <reference> <uid>"
#[derive(Default)]
struct Log {
    lines: Mutex<Vec<String>>,
}

impl Log {
    fn job(self: &Arc<Self>, name: &'static str) -> FnJob {
        let log = Arc::clone(self);
        FnJob::new(move |context, _| {
            let reference = context.parameter::<String>(REFERENCE)?;
            let uid = context.parameter::<String>(UID)?;
            log.lines
                .lock()
                .unwrap()
                .push(format!("{} {} {}", name, reference, uid));
            Ok(TokenValue::new(reference.clone()))
        })
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn mentions(&self, reference: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.split(' ').nth(1) == Some(reference))
            .count()
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<EventKind>>,
}

impl PetriNetListener for Recorder {
    fn on_started(&self, event: &PetriNetEvent) {
        self.events.lock().unwrap().push(event.kind);
    }

    fn on_cancelled(&self, event: &PetriNetEvent) {
        self.events.lock().unwrap().push(event.kind);
    }

    fn on_finished(&self, event: &PetriNetEvent) {
        self.events.lock().unwrap().push(event.kind);
    }
}

/// Signals when it starts, then blocks until cancelled
struct Gate {
    started: Arc<Notify>,
}

#[async_trait]
impl Job for Gate {
    async fn execute(
        &self,
        _context: &Arc<ExecutionContext>,
        _inputs: Vec<TokenValue>,
    ) -> anyhow::Result<TokenValue> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(TokenValue::unit())
    }
}

/// view -> fetch -> reads -> render -> image
fn track_net(log: &Arc<Log>) -> Arc<PetriNet> {
    Arc::new(
        PetriNetBuilder::new()
            .place("view")
            .place("reads")
            .place("image")
            .transition("fetch", log.job("fetch"), ["view"], "reads")
            .transition("render", log.job("render"), ["reads"], "image")
            .build()
            .unwrap(),
    )
}

fn manager(net: Arc<PetriNet>, hysteresis_ms: u64) -> TracksDataManager {
    let config = EngineConfig {
        hysteresis_ms,
        ..EngineConfig::default()
    };
    TracksDataManager::new(net, WorkerPool::current(), config)
}

fn counter_action() -> (FinishAction, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let action: FinishAction = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (action, calls)
}

async fn settle(manager: &TracksDataManager) {
    tokio::time::timeout(Duration::from_secs(5), manager.wait_idle())
        .await
        .expect("manager becomes idle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_location_runs_pipeline() {
    let log = Arc::new(Log::default());
    let manager = manager(track_net(&log), 10);
    let (action, finished) = counter_action();

    assert_ok!(manager.set_single_location(
        Arc::new(Mapper),
        "chr1".to_string(),
        (10_000, 20_000),
        Some(action)
    ));
    settle(&manager).await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    let lines = log.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("fetch chr1 "));
    assert!(lines[1].starts_with("render chr1 "));
    assert_eq!(manager.active_runs(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_request_within_hysteresis_supersedes_first() {
    let log = Arc::new(Log::default());
    let manager = manager(track_net(&log), 200);
    let (first_action, first_finished) = counter_action();
    let (second_action, second_finished) = counter_action();

    assert_ok!(manager.set_single_location(
        Arc::new(Mapper),
        "chr1".to_string(),
        (0, 1_000),
        Some(first_action)
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_ok!(manager.set_single_location(
        Arc::new(Mapper),
        "chr2".to_string(),
        (0, 1_000),
        Some(second_action)
    ));
    settle(&manager).await;

    assert_eq!(log.mentions("chr1"), 0, "no job of the first request ran");
    assert_eq!(log.mentions("chr2"), 2);
    assert_eq!(first_finished.load(Ordering::SeqCst), 0);
    assert_eq!(second_finished.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_of_requests_coalesces_into_last() {
    let log = Arc::new(Log::default());
    let manager = manager(track_net(&log), 100);

    for i in 0..5 {
        assert_ok!(manager.set_single_location(
            Arc::new(Mapper),
            format!("chr{}", i + 1),
            (0, 500),
            None
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    settle(&manager).await;

    for i in 0..4 {
        assert_eq!(log.mentions(&format!("chr{}", i + 1)), 0);
    }
    assert_eq!(log.mentions("chr5"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_each_region_gets_its_own_run() {
    let log = Arc::new(Log::default());
    let manager = manager(track_net(&log), 0);
    let (action, finished) = counter_action();

    assert_ok!(manager.set_location(
        Arc::new(Mapper),
        vec!["chr1".to_string(), "chrM".to_string()],
        vec![(0, 100), (200, 300)],
        Some(action)
    ));
    settle(&manager).await;

    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert_eq!(log.mentions("chr1"), 2);
    assert_eq!(log.mentions("chrM"), 2);

    let uids: std::collections::HashSet<String> = log
        .lines()
        .iter()
        .filter_map(|line| line.split(' ').nth(2).map(String::from))
        .collect();
    assert_eq!(uids.len(), 2, "one uid per run");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_view_state_parameters_are_set() {
    let seen: Arc<Mutex<Option<(Region, f64)>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let net = Arc::new(
        PetriNetBuilder::new()
            .place("view")
            .place("scale")
            .transition(
                "inspect",
                FnJob::new(move |context, _| {
                    let region = *context.parameter::<Region>(REGION)?;
                    let mapping = *context.parameter::<f64>(PIXEL_MAPPING)?;
                    *sink.lock().unwrap() = Some((region, mapping));
                    Ok(TokenValue::unit())
                }),
                ["view"],
                "scale",
            )
            .build()
            .unwrap(),
    );
    let manager = manager(net, 0);

    assert_ok!(manager.set_single_location(Arc::new(Mapper), "chrM".to_string(), (5, 50), None));
    settle(&manager).await;

    assert_eq!(*seen.lock().unwrap(), Some(((5, 50), 1.0)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mismatched_request_is_rejected() {
    let log = Arc::new(Log::default());
    let manager = manager(track_net(&log), 0);

    let err = assert_err!(manager.set_location(
        Arc::new(Mapper),
        vec!["chr1".to_string(), "chr2".to_string()],
        vec![(0, 100)],
        None
    ));
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
    assert_eq!(manager.active_runs(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_all_stops_running_pipeline() {
    let started = Arc::new(Notify::new());
    let net = Arc::new(
        PetriNetBuilder::new()
            .place("view")
            .place("reads")
            .transition(
                "fetch",
                Gate {
                    started: Arc::clone(&started),
                },
                ["view"],
                "reads",
            )
            .build()
            .unwrap(),
    );
    let manager = manager(net, 0);
    let recorder = Arc::new(Recorder::default());
    manager.add_listener(recorder.clone());
    let (action, finished) = counter_action();

    assert_ok!(manager.set_single_location(Arc::new(Mapper), "chr1".to_string(), (0, 10), Some(action)));
    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .expect("fetch started");
    manager.cancel_all();
    settle(&manager).await;

    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![EventKind::Started, EventKind::Cancelled]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listeners_are_forwarded_to_new_runs() {
    let log = Arc::new(Log::default());
    let manager = manager(track_net(&log), 0);
    let kept = Arc::new(Recorder::default());
    let removed: Arc<dyn PetriNetListener> = Arc::new(Recorder::default());
    manager.add_listener(kept.clone());
    manager.add_listener(Arc::clone(&removed));
    manager.remove_listener(&removed);

    assert_ok!(manager.set_single_location(Arc::new(Mapper), "chr1".to_string(), (0, 10), None));
    settle(&manager).await;

    assert_eq!(
        *kept.events.lock().unwrap(),
        vec![EventKind::Started, EventKind::Finished]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_statically_disabled_tracks_are_skipped() {
    let log = Arc::new(Log::default());
    let net = Arc::new(
        PetriNetBuilder::new()
            .place("view")
            .place("reads")
            .place("image")
            .place("variants")
            .place("variant_image")
            .transition("fetch", log.job("fetch"), ["view"], "reads")
            .transition("render", log.job("render"), ["reads"], "image")
            .transition("call", log.job("call").disabled(), ["reads"], "variants")
            .transition("draw_variants", log.job("draw_variants"), ["variants"], "variant_image")
            .build()
            .unwrap(),
    );
    let manager = manager(net, 0);
    let (action, finished) = counter_action();

    assert_ok!(manager.set_single_location(Arc::new(Mapper), "chr1".to_string(), (0, 10), Some(action)));
    settle(&manager).await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    let jobs: Vec<String> = log
        .lines()
        .iter()
        .filter_map(|line| line.split(' ').next().map(String::from))
        .collect();
    assert_eq!(jobs, vec!["fetch".to_string(), "render".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hysteresis_setting() {
    let log = Arc::new(Log::default());
    let manager = manager(track_net(&log), 200);
    assert_eq!(manager.hysteresis(), Duration::from_millis(200));

    manager.set_hysteresis(Duration::from_millis(5));
    assert_eq!(manager.hysteresis(), Duration::from_millis(5));
    assert_eq!(manager.pipeline().transitions().len(), 2);
}

/// Fails every run as soon as it starts
struct Exploding;

impl PetriNetListener for Exploding {
    fn on_started(&self, _event: &PetriNetEvent) {
        panic!("listener exploded");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_listener_does_not_break_manager() {
    let log = Arc::new(Log::default());
    let manager = manager(track_net(&log), 0);
    let exploding: Arc<dyn PetriNetListener> = Arc::new(Exploding);
    manager.add_listener(Arc::clone(&exploding));
    let (first_action, first_finished) = counter_action();

    assert_ok!(manager.set_single_location(Arc::new(Mapper), "chr1".to_string(), (0, 10), Some(first_action)));
    settle(&manager).await;

    assert_eq!(first_finished.load(Ordering::SeqCst), 0);
    assert_eq!(log.mentions("chr1"), 0);
    assert_eq!(manager.active_runs(), 0);

    manager.remove_listener(&exploding);
    let recorder = Arc::new(Recorder::default());
    manager.add_listener(recorder.clone());
    let (second_action, second_finished) = counter_action();

    assert_ok!(manager.set_single_location(Arc::new(Mapper), "chr2".to_string(), (0, 10), Some(second_action)));
    settle(&manager).await;

    assert_eq!(second_finished.load(Ordering::SeqCst), 1);
    assert_eq!(log.mentions("chr2"), 2);
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![EventKind::Started, EventKind::Finished]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wait_idle_covers_runs_started_after_the_call() {
    let log = Arc::new(Log::default());
    let manager = manager(track_net(&log), 100);
    let (action, finished) = counter_action();

    assert_ok!(manager.set_single_location(Arc::new(Mapper), "chr1".to_string(), (0, 10), Some(action)));
    // Only the debounce task is tracked at this point
    settle(&manager).await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(log.mentions("chr1"), 2);
    assert_eq!(manager.active_runs(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_runs_are_tracked_until_they_stop() {
    let started = Arc::new(Notify::new());
    let net = Arc::new(
        PetriNetBuilder::new()
            .place("view")
            .place("reads")
            .transition(
                "fetch",
                Gate {
                    started: Arc::clone(&started),
                },
                ["view"],
                "reads",
            )
            .build()
            .unwrap(),
    );
    let manager = manager(net, 0);

    assert_ok!(manager.set_single_location(Arc::new(Mapper), "chr1".to_string(), (0, 10), None));
    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .expect("fetch started");
    assert!(manager.active_runs() > 0);

    manager.cancel_all();
    settle(&manager).await;
    assert_eq!(manager.active_runs(), 0);
}
