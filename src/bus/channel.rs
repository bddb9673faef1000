//! In-memory `tokio::sync::mpsc` adapter implementing [`super::CommandSource`]
//! and [`super::EventSink`]. Used by the CLI binary and integration tests;
//! not a production message-bus binding.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{AckHandle, AckPhase, AvailableScriptsEvent, Command, CommandSource, EventSink};
use super::{QueueEvent, ScriptEvent};

/// Acknowledgment handle that forwards phases to a `oneshot` watched by the
/// command's submitter, plus a `mpsc` for `IN_PROGRESS` observers.
pub struct ChannelAckHandle {
    progress: mpsc::UnboundedSender<AckPhase>,
    terminal: Option<oneshot::Sender<AckPhase>>,
}

#[async_trait]
impl AckHandle for ChannelAckHandle {
    async fn ack(&mut self, phase: AckPhase) {
        match &phase {
            AckPhase::InProgress => {
                let _ = self.progress.send(phase);
            }
            AckPhase::Complete { .. } | AckPhase::Failed { .. } => {
                if let Some(terminal) = self.terminal.take() {
                    let _ = terminal.send(phase);
                }
            }
        }
    }
}

/// Submitter-facing half: send a command, await its phases.
pub struct ChannelCommandSubmitter {
    commands: mpsc::UnboundedSender<(Command, ChannelAckHandle)>,
}

impl ChannelCommandSubmitter {
    /// Submit a command and return a receiver for its `IN_PROGRESS` phases
    /// plus a future resolving to the terminal phase.
    pub fn submit(
        &self,
        command: Command,
    ) -> (
        mpsc::UnboundedReceiver<AckPhase>,
        oneshot::Receiver<AckPhase>,
    ) {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (terminal_tx, terminal_rx) = oneshot::channel();
        let handle = ChannelAckHandle {
            progress: progress_tx,
            terminal: Some(terminal_tx),
        };
        let _ = self.commands.send((command, handle));
        (progress_rx, terminal_rx)
    }
}

/// Engine-facing half: pull the next command.
pub struct ChannelCommandSource {
    commands: mpsc::UnboundedReceiver<(Command, ChannelAckHandle)>,
}

#[async_trait]
impl CommandSource for ChannelCommandSource {
    async fn next_command(&mut self) -> Option<(Command, Box<dyn AckHandle>)> {
        let (command, handle) = self.commands.recv().await?;
        Some((command, Box::new(handle)))
    }
}

/// Engine-facing event sink; forwards to whatever is listening.
pub struct ChannelEventSink {
    queue: mpsc::UnboundedSender<QueueEvent>,
    script: mpsc::UnboundedSender<ScriptEvent>,
    available: mpsc::UnboundedSender<AvailableScriptsEvent>,
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn queue_changed(&mut self, event: QueueEvent) {
        let _ = self.queue.send(event);
    }

    async fn script_changed(&mut self, event: ScriptEvent) {
        let _ = self.script.send(event);
    }

    async fn available_scripts(&mut self, event: AvailableScriptsEvent) {
        let _ = self.available.send(event);
    }
}

/// Subscriber-facing half of the event sink.
pub struct ChannelEventSubscriber {
    pub queue: mpsc::UnboundedReceiver<QueueEvent>,
    pub script: mpsc::UnboundedReceiver<ScriptEvent>,
    pub available: mpsc::UnboundedReceiver<AvailableScriptsEvent>,
}

/// Build a connected (submitter, source) pair and a connected (sink, subscriber) pair.
pub fn channel_pair() -> (
    ChannelCommandSubmitter,
    ChannelCommandSource,
    ChannelEventSink,
    ChannelEventSubscriber,
) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let (script_tx, script_rx) = mpsc::unbounded_channel();
    let (available_tx, available_rx) = mpsc::unbounded_channel();

    (
        ChannelCommandSubmitter {
            commands: commands_tx,
        },
        ChannelCommandSource {
            commands: commands_rx,
        },
        ChannelEventSink {
            queue: queue_tx,
            script: script_tx,
            available: available_tx,
        },
        ChannelEventSubscriber {
            queue: queue_rx,
            script: script_rx,
            available: available_rx,
        },
    )
}
