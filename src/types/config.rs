//! Configuration structures.
//!
//! Configuration is loaded from environment variables and, for timeouts and
//! bounds, has documented defaults matching the spec's recommended values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global engine configuration: everything that isn't a per-construction
/// input (index, script roots) lives here with a sensible default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Timeouts and bounds governing queue/supervisor behavior.
    #[serde(default)]
    pub limits: EngineLimits,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Timeouts and bounds for the queue engine and its supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineLimits {
    /// How wide each ScriptQueue component's index range is (`SCRIPT_INDEX_MULT`
    /// in the original). `min_idx = component_index * script_index_span`,
    /// `max_idx = min_idx + script_index_span - 1`.
    pub script_index_span: i32,

    /// How long `add`/`requeue` waits for the subprocess to reach LOADED and
    /// accept configuration before it is forcibly terminated and retired as
    /// `FAILED`.
    #[serde(with = "humantime_serde")]
    pub load_timeout: Duration,

    /// Grace window for a graceful `stop` before `stopScripts` escalates to
    /// signal-based termination.
    #[serde(with = "humantime_serde")]
    pub stop_grace_window: Duration,

    /// Maximum number of terminally-finished scripts retained in `history`.
    pub history_bound: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            script_index_span: 100_000,
            load_timeout: Duration::from_secs(20),
            stop_grace_window: Duration::from_secs(5),
            history_bound: 100,
        }
    }
}

impl EngineLimits {
    /// `stopScripts(indices)`'s bounded-operation timeout: `5s + 0.2s * len`.
    pub fn stop_scripts_timeout(&self, len: usize) -> Duration {
        Duration::from_millis(5_000 + 200 * len as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_scripts_timeout_matches_formula() {
        let limits = EngineLimits::default();
        assert_eq!(limits.stop_scripts_timeout(0), Duration::from_millis(5_000));
        assert_eq!(limits.stop_scripts_timeout(3), Duration::from_millis(5_600));
    }
}
