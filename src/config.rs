// Engine configuration - defaults layered with TRACKS_* environment variables

//! # Engine Configuration
//!
//! [`EngineConfig`] collects the knobs shared by the manager, the scheduler and
//! the worker pool. Every field has a default, so an empty environment yields a
//! working configuration:
//!
//! | Variable                        | Default  | Meaning                                   |
//! |---------------------------------|----------|-------------------------------------------|
//! | `TRACKS_HYSTERESIS_MS`          | `200`    | Debounce window before a run starts       |
//! | `TRACKS_MAX_CONCURRENT_FIRINGS` | unset    | Upper bound on in-flight jobs per run     |
//! | `TRACKS_WORKER_THREADS`         | unset    | Threads of a dedicated pool (cores if unset) |
//! | `TRACKS_THREAD_NAME_PREFIX`     | `TRACKS` | Prefix of dedicated pool thread names     |
//! | `TRACKS_LOGGING`                | `true`   | Per-firing trace logging                  |

use std::time::Duration;

use ::config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Tunables for the track pipeline engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wait this long after a location update before starting the runs
    pub hysteresis_ms: u64,
    /// `None` means unbounded; `Some(1)` serializes all firings of a run
    pub max_concurrent_firings: Option<usize>,
    pub worker_threads: Option<usize>,
    pub thread_name_prefix: String,
    /// Log every firing at trace level
    pub logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hysteresis_ms: 200,
            max_concurrent_firings: None,
            worker_threads: None,
            thread_name_prefix: "TRACKS".to_string(),
            logging: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TRACKS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_environment(Environment::with_prefix("TRACKS"))
    }

    /// Defaults overridden by the given environment source
    pub fn from_environment(environment: Environment) -> Result<Self> {
        let config = Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn hysteresis(&self) -> Duration {
        Duration::from_millis(self.hysteresis_ms)
    }

    /// Whether firings of one run are executed strictly one at a time
    pub fn is_serial(&self) -> bool {
        self.max_concurrent_firings == Some(1)
    }
}
