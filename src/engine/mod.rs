//! The Engine: orchestrates the IndexAllocator, Supervisor, and Queue behind
//! a single serialized command loop (§4.4, §5).

pub mod allocator;
pub mod discovery;
pub mod model;
pub mod queue;
pub mod recovery;
pub mod supervisor;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::bus::{
    AckHandle, AckPhase, AvailableScriptsEvent, Command, CommandSource, EventSink, QueueEvent,
    ScriptEvent,
};
use crate::types::{CmdId, EngineLimits, Error, Result, ScriptIndex};

use allocator::IndexAllocator;
use discovery::ScriptCatalog;
use model::{unix_timestamp, ProcessState, ScriptInfo, ScriptKind, ScriptState};
use queue::Queue;
use recovery::with_recovery_async;
use supervisor::{ExitDisposition, Roots, Supervisor, SupervisorEvent};

/// Orchestrates the queue engine: `running`/`enabled` state plus the Queue,
/// Supervisor, and IndexAllocator (§4.4).
pub struct Engine {
    running: bool,
    enabled: bool,
    queue: Queue,
    supervisor: Supervisor,
    supervisor_events: tokio::sync::mpsc::UnboundedReceiver<SupervisorEvent>,
    allocator: IndexAllocator,
    limits: EngineLimits,
    catalog: Box<dyn ScriptCatalog>,
    /// Config blobs awaiting delivery once their script reports `LOADED`.
    pending_config: HashMap<ScriptIndex, String>,
    /// Scripts whose load timer fired while still loading/unconfigured, so
    /// their eventual exit must be reported as `FAILED` rather than
    /// whatever the forced kill's exit disposition would otherwise imply.
    load_timed_out: HashSet<ScriptIndex>,
}

impl Engine {
    pub fn new(
        component_index: i32,
        roots: Roots,
        limits: EngineLimits,
        catalog: Box<dyn ScriptCatalog>,
    ) -> Self {
        let min_idx = component_index * limits.script_index_span;
        let max_idx = min_idx + limits.script_index_span - 1;
        let (supervisor, supervisor_events) = Supervisor::new(roots, limits.load_timeout);

        Self {
            running: false,
            enabled: true,
            queue: Queue::new(limits.history_bound),
            supervisor,
            supervisor_events,
            allocator: IndexAllocator::new(min_idx, max_idx),
            limits,
            catalog,
            pending_config: HashMap::new(),
            load_timed_out: HashSet::new(),
        }
    }

    /// Drive the engine until `source` is exhausted, dispatching commands
    /// and reacting to Supervisor notifications as they arrive.
    pub async fn run(&mut self, source: &mut dyn CommandSource, sink: &mut dyn EventSink) {
        loop {
            tokio::select! {
                next = source.next_command() => {
                    match next {
                        Some((command, mut ack)) => self.dispatch(command, ack.as_mut(), sink).await,
                        None => return,
                    }
                }
                Some(event) = self.supervisor_events.recv() => {
                    self.handle_supervisor_event(event, sink).await;
                }
            }
        }
    }

    async fn dispatch(&mut self, command: Command, ack: &mut dyn AckHandle, sink: &mut dyn EventSink) {
        ack.ack(AckPhase::InProgress).await;

        if !self.enabled && !matches!(command, Command::Pause) {
            ack.ack(AckPhase::Failed {
                result: Error::Disabled.to_string(),
            })
            .await;
            return;
        }

        let result = with_recovery_async(|| self.handle_command(command, sink), "handle_command").await;
        match result {
            Ok(result) => ack.ack(AckPhase::Complete { result }).await,
            Err(err) => {
                ack.ack(AckPhase::Failed {
                    result: err.to_string(),
                })
                .await
            }
        }
    }

    async fn handle_command(&mut self, command: Command, sink: &mut dyn EventSink) -> Result<String> {
        match command {
            Command::ShowAvailableScripts => {
                let event = self.catalog.available();
                sink.available_scripts(event).await;
                Ok(String::new())
            }
            Command::ShowQueue => {
                self.emit_queue_event(sink).await;
                Ok(String::new())
            }
            Command::ShowScript { sal_index } => {
                let index = ScriptIndex::new(sal_index);
                if self.queue.find(index, true).is_none() {
                    return Err(Error::unknown_index(sal_index));
                }
                self.emit_script_event(sink, index).await;
                Ok(String::new())
            }
            Command::Pause => {
                self.running = false;
                self.emit_queue_event(sink).await;
                Ok(String::new())
            }
            Command::Resume => {
                self.running = true;
                self.emit_queue_event(sink).await;
                self.advance(sink).await;
                Ok(String::new())
            }
            Command::Add {
                cmd_id,
                is_standard,
                path,
                config,
                descr,
                location,
                location_sal_index,
            } => {
                let kind = if is_standard {
                    ScriptKind::Standard
                } else {
                    ScriptKind::External
                };
                let anchor = (location_sal_index != 0).then(|| ScriptIndex::new(location_sal_index));
                self.admit(cmd_id, kind, path, config, descr, location, anchor, sink)
                    .await
            }
            Command::Requeue {
                cmd_id,
                sal_index,
                location,
                location_sal_index,
            } => {
                let source_index = ScriptIndex::new(sal_index);
                let original = self
                    .queue
                    .find(source_index, true)
                    .cloned()
                    .ok_or_else(|| Error::unknown_index(sal_index))?;
                let anchor = (location_sal_index != 0).then(|| ScriptIndex::new(location_sal_index));
                self.admit(
                    cmd_id,
                    original.kind,
                    original.path,
                    original.config,
                    original.descr,
                    location,
                    anchor,
                    sink,
                )
                .await
            }
            Command::Move {
                sal_index,
                location,
                location_sal_index,
            } => {
                let index = ScriptIndex::new(sal_index);
                let anchor = (location_sal_index != 0).then(|| ScriptIndex::new(location_sal_index));
                self.queue.move_script(index, location, anchor)?;
                self.emit_queue_event(sink).await;
                Ok(String::new())
            }
            Command::StopScripts {
                sal_indices,
                length,
                terminate,
            } => {
                self.stop_scripts(sal_indices, length, terminate, sink)
                    .await
            }
        }
    }

    /// Shared path for `add`/`requeue`: allocate an index, spawn the
    /// subprocess, insert into `pending`, and queue its configure blob.
    #[allow(clippy::too_many_arguments)]
    async fn admit(
        &mut self,
        cmd_id: CmdId,
        kind: ScriptKind,
        path: String,
        config: String,
        descr: String,
        location: queue::Location,
        anchor: Option<ScriptIndex>,
        sink: &mut dyn EventSink,
    ) -> Result<String> {
        // Validate placement before doing anything irreversible: a
        // LocationInvalid/UnknownIndex anchor must leave the queue
        // untouched and never spawn a subprocess (§7).
        self.queue.validate_insert(location, anchor)?;

        let queue_ref = &self.queue;
        let index = self
            .allocator
            .allocate(|candidate| queue_ref.is_live(ScriptIndex::new(candidate)))?;

        self.supervisor.spawn(index, kind, &path)?;

        let info = ScriptInfo::new(index, cmd_id, kind, path, config.clone(), descr, unix_timestamp());
        self.queue.insert(info, location, anchor)?;
        self.pending_config.insert(index, config);

        self.emit_queue_event(sink).await;
        self.emit_script_event(sink, index).await;

        Ok(index.get().to_string())
    }

    async fn stop_scripts(
        &mut self,
        sal_indices: Vec<i32>,
        length: i32,
        terminate: bool,
        sink: &mut dyn EventSink,
    ) -> Result<String> {
        if length <= 0 || length as usize != sal_indices.len() {
            return Err(Error::length_invalid(format!(
                "stopScripts length {length} does not match {} indices",
                sal_indices.len()
            )));
        }

        let grace = self.limits.stop_grace_window;
        let bound = self.limits.stop_scripts_timeout(sal_indices.len());

        let outcome = tokio::time::timeout(bound, self.stop_all(&sal_indices, terminate, grace)).await;

        self.emit_queue_event(sink).await;

        match outcome {
            Ok(()) => Ok(String::new()),
            Err(_) => Err(Error::timeout(format!(
                "stopScripts did not complete within {bound:?}"
            ))),
        }
    }

    async fn stop_all(&mut self, sal_indices: &[i32], terminate: bool, grace: Duration) {
        // Signal every target up front, then wait for exits against one
        // shared deadline below — stopping N scripts this way costs at most
        // `grace` total (plus signalling overhead), not `grace` per script.
        let mut waiting = Vec::with_capacity(sal_indices.len());
        for raw in sal_indices {
            let index = ScriptIndex::new(*raw);
            if self.queue.find(index, false).is_none() {
                continue;
            }
            let exited = self.supervisor.begin_stop(index, terminate).await;
            waiting.push((index, exited));
        }

        let deadline = tokio::time::Instant::now() + grace;
        for (index, exited) in waiting {
            if let Some(exited) = exited {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                tokio::select! {
                    _ = exited => {}
                    _ = tokio::time::sleep(remaining) => {
                        let _ = self.supervisor.kill(index);
                    }
                }
            }
            // Pending removal on operator-initiated stop is immediate;
            // `current` scripts retire through the Exited notification.
            if self.queue.current().map(|s| s.index) != Some(index) {
                let _ = self.queue.remove(index);
                self.supervisor.release(index);
            }
        }
    }

    async fn advance(&mut self, sink: &mut dyn EventSink) {
        if !self.running {
            return;
        }
        if let Some(info) = self.queue.promote() {
            if let Some(current) = self.queue.current_mut() {
                current.process_state = ProcessState::Running;
            }
            let _ = self.supervisor.run(info.index).await;
            self.emit_script_event(sink, info.index).await;
            self.emit_queue_event(sink).await;
        }
    }

    async fn handle_supervisor_event(&mut self, event: SupervisorEvent, sink: &mut dyn EventSink) {
        match event {
            SupervisorEvent::Heartbeat(index) => {
                if let Some(info) = self.queue.find_mut(index) {
                    if info.process_state == ProcessState::Loading {
                        info.process_state = ProcessState::Loaded;
                    }
                }
                self.emit_script_event(sink, index).await;
                if let Some(config) = self.pending_config.remove(&index) {
                    let _ = self.supervisor.configure(index, &config).await;
                }
            }
            SupervisorEvent::StateChange(index, state) => {
                if let Some(info) = self.queue.find_mut(index) {
                    info.script_state = state;
                }
                self.emit_script_event(sink, index).await;
                if state.is_configured() {
                    self.advance(sink).await;
                }
            }
            SupervisorEvent::Metadata(index, duration) => {
                if let Some(info) = self.queue.find_mut(index) {
                    info.duration_estimate = duration;
                }
                self.emit_script_event(sink, index).await;
            }
            SupervisorEvent::Exited(index, disposition) => {
                self.handle_exit(index, disposition, sink).await;
            }
            SupervisorEvent::LoadTimedOut(index) => {
                let should_kill = self.queue.find(index, false).is_some_and(|info| {
                    info.process_state != ProcessState::Running && !info.script_state.is_configured()
                });
                if should_kill {
                    self.load_timed_out.insert(index);
                    let _ = self.supervisor.kill(index);
                }
            }
        }
    }

    async fn handle_exit(&mut self, index: ScriptIndex, disposition: ExitDisposition, sink: &mut dyn EventSink) {
        let timed_out = self.load_timed_out.remove(&index);
        let process_state = if timed_out {
            ProcessState::Failed
        } else {
            match disposition {
                ExitDisposition::Done => ProcessState::Done,
                ExitDisposition::Failed => ProcessState::Failed,
                ExitDisposition::Terminated => ProcessState::Terminated,
            }
        };

        let was_current = self.queue.current().map(|s| s.index) == Some(index);

        if let Some(info) = self.queue.find_mut(index) {
            info.process_state = process_state;
            info.timestamp_end = unix_timestamp();
        }

        self.supervisor.release(index);

        if was_current {
            let _ = self.queue.retire(index);
            self.emit_script_event(sink, index).await;
            self.emit_queue_event(sink).await;
            self.advance(sink).await;
        } else if timed_out {
            // A load/configure timeout forces a still-pending script to
            // terminal FAILED (§7: "its ScriptInfo moves to history with
            // terminal FAILED"); I4/I6 forbid a FAILED script staying in
            // `pending`, so it retires to `history` here just as a
            // `current` script would.
            let _ = self.queue.fail_pending(index);
            self.emit_script_event(sink, index).await;
            self.emit_queue_event(sink).await;
        } else if self.queue.find(index, false).is_some() {
            // Still in `pending` after an operator-initiated stopScripts:
            // §4.4 says a queued script removed this way does not enter
            // `history`.
            let _ = self.queue.remove(index);
            self.emit_queue_event(sink).await;
        }
    }

    /// Toggle the service-level `enabled` flag the Engine reads (§4.4's
    /// "disabled transition"); not a bus command, set by the supervisory
    /// layer that owns the broader service state machine.
    pub async fn set_enabled(&mut self, enabled: bool, sink: &mut dyn EventSink) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            sink.available_scripts(self.catalog.available()).await;
        }
        self.emit_queue_event(sink).await;
    }

    async fn emit_queue_event(&self, sink: &mut dyn EventSink) {
        let event = QueueEvent {
            enabled: self.enabled,
            running: self.running,
            current_sal_index: self.queue.current().map(|s| s.index.get()).unwrap_or(0),
            length: self.queue.pending_len() as i32,
            sal_indices: self.queue.pending().map(|s| s.index.get()).collect(),
            past_length: self.queue.history_len() as i32,
            past_sal_indices: self.queue.history().map(|s| s.index.get()).collect(),
        };
        sink.queue_changed(event).await;
    }

    async fn emit_script_event(&self, sink: &mut dyn EventSink, index: ScriptIndex) {
        let Some(info) = self.queue.find(index, true) else {
            return;
        };
        let event = ScriptEvent {
            cmd_id: info.cmd_id.clone(),
            sal_index: info.index.get(),
            path: info.path.clone(),
            is_standard: matches!(info.kind, ScriptKind::Standard),
            timestamp: info.timestamp_start,
            duration: info.duration_estimate,
            process_state: format!("{:?}", info.process_state).to_lowercase(),
            script_state: format!("{:?}", info.script_state).to_lowercase(),
        };
        sink.script_changed(event).await;
    }
}
