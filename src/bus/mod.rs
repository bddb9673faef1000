//! Abstract command/event surface (§6).
//!
//! This module defines the wire-level types and the two async traits a real
//! message-bus binding must implement to drive an `Engine`. It is
//! deliberately not a transport: see [`channel`] for the in-memory adapter
//! used by the CLI binary and integration tests.

mod channel;

pub use channel::{
    channel_pair, ChannelAckHandle, ChannelCommandSource, ChannelCommandSubmitter,
    ChannelEventSink, ChannelEventSubscriber,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::engine::queue::Location;
use crate::types::CmdId;

/// One inbound command, matching §6's field lists exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    Add {
        cmd_id: CmdId,
        is_standard: bool,
        path: String,
        config: String,
        descr: String,
        location: Location,
        location_sal_index: i32,
    },
    Move {
        sal_index: i32,
        location: Location,
        location_sal_index: i32,
    },
    Requeue {
        cmd_id: CmdId,
        sal_index: i32,
        location: Location,
        location_sal_index: i32,
    },
    StopScripts {
        sal_indices: Vec<i32>,
        length: i32,
        terminate: bool,
    },
    Pause,
    Resume,
    ShowQueue,
    ShowAvailableScripts,
    ShowScript {
        sal_index: i32,
    },
}

/// Command acknowledgment phase (§6: `IN_PROGRESS`, terminal `COMPLETE`/`FAILED`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckPhase {
    InProgress,
    Complete { result: String },
    Failed { result: String },
}

/// Lets a command handler report progress without coupling to a transport.
#[async_trait]
pub trait AckHandle: Send {
    async fn ack(&mut self, phase: AckPhase);
}

/// Source of inbound commands, each paired with a handle for acknowledging it.
#[async_trait]
pub trait CommandSource: Send {
    async fn next_command(&mut self) -> Option<(Command, Box<dyn AckHandle>)>;
}

/// `queue` event (§6): zero-padded fixed-width arrays on the wire; modeled
/// here as `Vec<i32>` since this crate does not serialize onto SAL's fixed
/// arrays directly — a binding adapter pads/truncates as needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEvent {
    pub enabled: bool,
    pub running: bool,
    pub current_sal_index: i32,
    pub length: i32,
    pub sal_indices: Vec<i32>,
    pub past_length: i32,
    pub past_sal_indices: Vec<i32>,
}

/// `script` event (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEvent {
    pub cmd_id: CmdId,
    pub sal_index: i32,
    pub path: String,
    pub is_standard: bool,
    pub timestamp: f64,
    pub duration: f64,
    pub process_state: String,
    pub script_state: String,
}

/// `availableScripts` event (§6): colon-separated path strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableScriptsEvent {
    pub standard: String,
    pub external: String,
}

/// Sink for outbound events.
#[async_trait]
pub trait EventSink: Send {
    async fn queue_changed(&mut self, event: QueueEvent);
    async fn script_changed(&mut self, event: ScriptEvent);
    async fn available_scripts(&mut self, event: AvailableScriptsEvent);
}
