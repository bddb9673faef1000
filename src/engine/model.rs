//! Script data model: kinds, lifecycle states, and per-script metadata.

use serde::{Deserialize, Serialize};

use crate::types::{CmdId, ScriptIndex};

/// Current time as fractional seconds since the Unix epoch, the concrete
/// realization of the spec's "monotonic double" timestamps — increasing
/// under normal operation without this crate needing its own epoch/clock
/// state, at the cost of (rare, NTP-driven) backward jumps a true monotonic
/// clock wouldn't have.
pub fn unix_timestamp() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9
}

/// Which root directory a script's relative `path` is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Standard,
    External,
}

/// The supervisor's view of a subprocess.
///
/// ```text
/// LOADING → LOADED → RUNNING → {DONE | FAILED | TERMINATED}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Loading,
    Loaded,
    Running,
    Done,
    Failed,
    Terminated,
}

impl ProcessState {
    /// I6: states a script must be in to live in `history`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Done | ProcessState::Failed | ProcessState::Terminated
        )
    }

    /// I4: states a script must be in to live in `pending`.
    pub fn is_pending_eligible(self) -> bool {
        matches!(self, ProcessState::Loading | ProcessState::Loaded)
    }
}

/// The subprocess's self-reported internal state. The engine treats this as
/// opaque observation and only ever asks the three predicates below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptState {
    Unconfigured,
    Configured,
    Running,
    Ended,
    Stopped,
    Failed,
}

impl ScriptState {
    pub fn is_configured(self) -> bool {
        matches!(self, ScriptState::Configured)
    }

    pub fn is_finished(self) -> bool {
        matches!(
            self,
            ScriptState::Ended | ScriptState::Stopped | ScriptState::Failed
        )
    }

    pub fn is_runnable(self) -> bool {
        self.is_configured()
    }
}

/// One admitted script: immutable identity/request fields plus the mutable
/// lifecycle fields the Supervisor updates as the subprocess reports in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInfo {
    // Immutable identity and request fields.
    pub index: ScriptIndex,
    pub cmd_id: CmdId,
    pub kind: ScriptKind,
    pub path: String,
    pub config: String,
    pub descr: String,

    // Mutable fields — Supervisor-owned.
    pub process_state: ProcessState,
    pub script_state: ScriptState,

    /// Monotonic seconds since engine start; 0.0 until the process exits.
    pub timestamp_start: f64,
    pub timestamp_end: f64,

    /// Estimated duration in seconds, reported by the script's `metadata`
    /// event; 0.0 until reported.
    pub duration_estimate: f64,
}

impl ScriptInfo {
    pub fn new(
        index: ScriptIndex,
        cmd_id: CmdId,
        kind: ScriptKind,
        path: String,
        config: String,
        descr: String,
        timestamp_start: f64,
    ) -> Self {
        Self {
            index,
            cmd_id,
            kind,
            path,
            config,
            descr,
            process_state: ProcessState::Loading,
            script_state: ScriptState::Unconfigured,
            timestamp_start,
            timestamp_end: 0.0,
            duration_estimate: 0.0,
        }
    }

    /// Whether this script is ready to be promoted to `current` (I7): its
    /// subprocess is up (`LOADED`) and has accepted configuration
    /// (`CONFIGURED`).
    pub fn is_promotable(&self) -> bool {
        self.process_state == ProcessState::Loaded && self.script_state.is_runnable()
    }
}
