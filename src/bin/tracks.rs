// Track Pipeline - demo driver
// Simulates a genome browser scrolling through a region
// Run with: cargo run --bin tracks -- --updates 5 --interval-ms 50

//! # Tracks Demo Binary
//!
//! Builds a small track pipeline of simulated jobs:
//!
//! ```text
//! view ─▶ fetch ─▶ reads ─┬─▶ coverage ─▶ coverage_track ─┐
//!                         └─▶ features ─▶ feature_track ──┴─▶ render ─▶ image
//! ```
//!
//! and fires a burst of location updates at a [`TracksDataManager`], the way
//! a user dragging the view would. Only the last update inside the hysteresis
//! window produces runs; the others are superseded before any job starts.
//!
//! Lifecycle events are collected from an [`EventBus`] and printed at the end,
//! as JSON with `--json`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use track_pipeline::{
    EngineConfig, EventBus, EventKind, ExecutionContext, FinishAction, Job, LocationMapper,
    PetriNet, PetriNetBuilder, PipelineError, TokenValue, TracksDataManager, WorkerPool,
    PIXEL_MAPPING, REFERENCE, REGION,
};

#[derive(Parser)]
#[command(name = "tracks")]
#[command(about = "Drive the track pipeline with a burst of simulated location updates")]
#[command(version = "0.1")]
struct Cli {
    /// Debounce window; overrides TRACKS_HYSTERESIS_MS
    #[arg(long)]
    hysteresis_ms: Option<u64>,

    /// Number of location updates to send
    #[arg(long, default_value_t = 5)]
    updates: usize,

    /// Delay between consecutive updates
    #[arg(long, default_value_t = 50)]
    interval_ms: u64,

    /// References shown side by side, one run each
    #[arg(long, value_delimiter = ',', default_value = "chr1")]
    references: Vec<String>,

    /// Make the feature track fail to show branch isolation
    #[arg(long)]
    fail_branch: bool,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

type Region = (u64, u64);

/// Fixed 1200 pixel wide view
struct ViewMapper {
    width_px: u64,
}

impl LocationMapper for ViewMapper {
    type Reference = String;
    type Region = Region;
    type Mapping = f64;

    fn pixel_mapping(&self, _reference: &String) -> f64 {
        // Bases per pixel for a 5 kb window
        5_000.0 / self.width_px as f64
    }
}

/// A simulated job that sleeps, then summarizes its inputs
struct Simulated {
    name: &'static str,
    cost: Duration,
    fail: bool,
}

#[async_trait]
impl Job for Simulated {
    async fn execute(
        &self,
        context: &Arc<ExecutionContext>,
        inputs: Vec<TokenValue>,
    ) -> anyhow::Result<TokenValue> {
        let reference = context.parameter::<String>(REFERENCE)?;
        let (start, end) = *context.parameter::<Region>(REGION)?;
        let scale = *context.parameter::<f64>(PIXEL_MAPPING)?;

        tokio::time::sleep(self.cost).await;
        if context.is_cancelled() {
            return Err(PipelineError::Cancelled.into());
        }
        if self.fail {
            anyhow::bail!("{} has no data for {}:{}-{}", self.name, reference, start, end);
        }

        let parts: Vec<String> = inputs
            .iter()
            .filter_map(|input| input.downcast_ref::<String>().cloned())
            .collect();
        let summary = if parts.is_empty() {
            format!("{}({}:{}-{} @ {:.2} bp/px)", self.name, reference, start, end, scale)
        } else {
            format!("{}[{}]", self.name, parts.join(" + "))
        };
        Ok(TokenValue::new(summary))
    }
}

fn job(name: &'static str, cost_ms: u64) -> Simulated {
    Simulated {
        name,
        cost: Duration::from_millis(cost_ms),
        fail: false,
    }
}

fn build_pipeline(fail_branch: bool) -> Result<PetriNet, PipelineError> {
    PetriNetBuilder::new()
        .place("view")
        .place("reads")
        .place("coverage")
        .place("features")
        .place("coverage_track")
        .place("feature_track")
        .place("image")
        .transition("fetch", job("fetch", 40), ["view"], "reads")
        .transition("coverage", job("coverage", 25), ["reads"], "coverage")
        .transition(
            "features",
            Simulated {
                fail: fail_branch,
                ..job("features", 15)
            },
            ["reads"],
            "features",
        )
        .transition("draw_coverage", job("draw_coverage", 10), ["coverage"], "coverage_track")
        .transition("draw_features", job("draw_features", 10), ["features"], "feature_track")
        .transition(
            "render",
            job("render", 5),
            ["coverage_track", "feature_track"],
            "image",
        )
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional
    let _ = dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env()?;
    if let Some(hysteresis_ms) = cli.hysteresis_ms {
        config.hysteresis_ms = hysteresis_ms;
    }

    let net = Arc::new(build_pipeline(cli.fail_branch)?);
    info!("🧬 Track pipeline with {} transitions", net.transitions().len());
    for line in net.to_string().lines() {
        info!("  {}", line);
    }

    let pool = WorkerPool::dedicated(&config)?;
    let manager = TracksDataManager::new(Arc::clone(&net), pool, config.clone());

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    manager.add_listener(Arc::new(bus.clone()));

    let finished = Arc::new(AtomicUsize::new(0));
    let on_finish: FinishAction = {
        let finished = Arc::clone(&finished);
        Arc::new(move || {
            finished.fetch_add(1, Ordering::SeqCst);
        })
    };

    let mapper = Arc::new(ViewMapper { width_px: 1200 });
    for update in 0..cli.updates as u64 {
        let start = 10_000 + update * 1_000;
        let regions = vec![(start, start + 5_000); cli.references.len()];
        info!("📍 update {}: {}-{}", update + 1, start, start + 5_000);
        manager.set_location(
            Arc::clone(&mapper),
            cli.references.clone(),
            regions,
            Some(Arc::clone(&on_finish)),
        )?;
        tokio::time::sleep(Duration::from_millis(cli.interval_ms)).await;
    }

    tokio::time::timeout(Duration::from_secs(30), manager.wait_idle())
        .await
        .map_err(|_| "pipeline did not settle within 30s")?;

    let mut cancelled = 0;
    while let Ok(event) = events.try_recv() {
        if event.kind == EventKind::Cancelled {
            cancelled += 1;
        }
        if cli.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            info!(
                "{:?} execution {} ({}) fired={} failed={} elapsed={}ms",
                event.kind, event.execution_id, event.uid, event.fired, event.failed, event.elapsed_ms
            );
        }
    }

    if cancelled > 0 {
        warn!("{} runs were cancelled", cancelled);
    }
    info!(
        "✅ {} of {} requested runs finished",
        finished.load(Ordering::SeqCst),
        cli.references.len()
    );
    Ok(())
}
