//! Subprocess supervisor: spawns, observes, configures, runs, stops, and
//! reaps one child process per admitted script.
//!
//! The external message bus is out of scope (§1); the per-script control
//! channel this module owns is realized concretely as newline-delimited
//! JSON over the child's stdin/stdout — the local transport this crate is
//! responsible for, as opposed to the operator-facing bus in [`crate::bus`].
//! See DESIGN.md for the rationale.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::types::{Error, Result, ScriptIndex};

use super::model::{ScriptKind, ScriptState};

/// Filesystem roots a script's relative `path` resolves against.
#[derive(Debug, Clone)]
pub struct Roots {
    pub standard: PathBuf,
    pub external: PathBuf,
}

impl Roots {
    pub fn root_for(&self, kind: ScriptKind) -> &Path {
        match kind {
            ScriptKind::Standard => &self.standard,
            ScriptKind::External => &self.external,
        }
    }
}

/// Resolve `root/path`, rejecting paths that escape `root` or do not exist.
fn resolve_script_path(root: &Path, path: &str) -> Result<PathBuf> {
    let candidate = root.join(path);
    let canonical_root = root
        .canonicalize()
        .map_err(|_| Error::bad_path(format!("script root does not exist: {}", root.display())))?;
    let canonical = candidate
        .canonicalize()
        .map_err(|_| Error::bad_path(format!("script path does not exist: {path}")))?;
    if !canonical.starts_with(&canonical_root) {
        return Err(Error::bad_path(format!(
            "script path escapes its root: {path}"
        )));
    }
    Ok(canonical)
}

/// Notifications the Supervisor delivers to the Engine's single command
/// loop. Never mutates Engine state directly — see §5.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    Heartbeat(ScriptIndex),
    StateChange(ScriptIndex, ScriptState),
    Metadata(ScriptIndex, f64),
    Exited(ScriptIndex, ExitDisposition),
    LoadTimedOut(ScriptIndex),
}

/// How a subprocess's exit maps onto a terminal `ProcessState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    Done,
    Failed,
    Terminated,
}

impl ExitDisposition {
    fn from_exit_status(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(0) => ExitDisposition::Done,
            Some(_) => ExitDisposition::Failed,
            None => ExitDisposition::Terminated,
        }
    }
}

/// Wire frames sent to the child over stdin.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
enum ScriptCommand {
    Configure { config: String },
    Run,
    Stop,
}

/// Wire frames the child reports over stdout.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum ScriptReport {
    Heartbeat,
    State { state: ScriptState },
    Metadata { duration_estimate: f64 },
}

/// What the supervisor retains for a live script: the write half of its
/// stdin, a one-shot to ask its reap task to escalate to a hard kill, and a
/// one-shot that resolves once the reap task has observed the child exit —
/// `stop` races this against its grace window instead of sleeping the full
/// window unconditionally.
struct ChildHandle {
    stdin: tokio::process::ChildStdin,
    kill: Option<oneshot::Sender<()>>,
    exited: Option<oneshot::Receiver<()>>,
}

/// Launches, monitors, configures, stops, and reaps script subprocesses.
pub struct Supervisor {
    roots: Roots,
    load_timeout: Duration,
    handles: HashMap<ScriptIndex, ChildHandle>,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(
        roots: Roots,
        load_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                roots,
                load_timeout,
                handles: HashMap::new(),
                events_tx,
            },
            events_rx,
        )
    }

    /// Spawn the subprocess for `index` and start its reader and reap tasks.
    /// `LOADED` is reported asynchronously via a `Heartbeat` event.
    pub fn spawn(&mut self, index: ScriptIndex, kind: ScriptKind, path: &str) -> Result<()> {
        let resolved = resolve_script_path(self.roots.root_for(kind), path)?;

        let mut child = Command::new(&resolved)
            .arg(index.get().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::Io)?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let (kill_tx, mut kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = oneshot::channel();
        let mut exited_tx = Some(exited_tx);

        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    status = child.wait() => {
                        let disposition = status
                            .map(ExitDisposition::from_exit_status)
                            .unwrap_or(ExitDisposition::Terminated);
                        let _ = events_tx.send(SupervisorEvent::Exited(index, disposition));
                        if let Some(tx) = exited_tx.take() {
                            let _ = tx.send(());
                        }
                        return;
                    }
                    _ = &mut kill_rx => {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        let _ = events_tx.send(SupervisorEvent::Exited(index, ExitDisposition::Terminated));
                        if let Some(tx) = exited_tx.take() {
                            let _ = tx.send(());
                        }
                        return;
                    }
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                if let Ok(report) = serde_json::from_str::<ScriptReport>(&line) {
                                    let event = match report {
                                        ScriptReport::Heartbeat => SupervisorEvent::Heartbeat(index),
                                        ScriptReport::State { state } => {
                                            SupervisorEvent::StateChange(index, state)
                                        }
                                        ScriptReport::Metadata { duration_estimate } => {
                                            SupervisorEvent::Metadata(index, duration_estimate)
                                        }
                                    };
                                    let _ = events_tx.send(event);
                                }
                            }
                            Ok(None) => {
                                // stdout closed; keep waiting on exit/kill.
                            }
                            Err(_) => {}
                        }
                    }
                }
            }
        });

        let load_timeout = self.load_timeout;
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(load_timeout).await;
            let _ = events_tx.send(SupervisorEvent::LoadTimedOut(index));
        });

        self.handles.insert(
            index,
            ChildHandle {
                stdin,
                kill: Some(kill_tx),
                exited: Some(exited_rx),
            },
        );
        Ok(())
    }

    /// Send the opaque config blob. Must be called once `LOADED` is observed.
    pub async fn configure(&mut self, index: ScriptIndex, config: &str) -> Result<()> {
        self.send(
            index,
            ScriptCommand::Configure {
                config: config.to_string(),
            },
        )
        .await
    }

    /// Tell the subprocess to run. Caller must have already observed `CONFIGURED`.
    pub async fn run(&mut self, index: ScriptIndex) -> Result<()> {
        self.send(index, ScriptCommand::Run).await
    }

    /// Signal `index` to stop: a hard `terminate` kills it immediately; a
    /// graceful stop sends the `stop` command and returns a receiver that
    /// resolves once the reap task observes the child exit. The caller
    /// races that receiver against its own grace window (§4.2: "wait **up
    /// to** a per-script grace window") rather than this call blocking for
    /// the full window itself — that lets `stopScripts` wait on several
    /// scripts against one shared deadline instead of `grace` apiece.
    /// Returns `None` when there is nothing left to wait for (terminate, or
    /// the `stop` command couldn't be delivered).
    pub async fn begin_stop(&mut self, index: ScriptIndex, terminate: bool) -> Option<oneshot::Receiver<()>> {
        if terminate {
            let _ = self.kill(index);
            return None;
        }
        if self.send(index, ScriptCommand::Stop).await.is_err() {
            let _ = self.kill(index);
            return None;
        }
        self.handles.get_mut(&index).and_then(|handle| handle.exited.take())
    }

    /// Escalate to a hard kill. Safe to call on a script that has already
    /// exited — `handles` no longer has an entry once the Engine has
    /// released it, so this becomes a no-op.
    pub fn kill(&mut self, index: ScriptIndex) -> Result<()> {
        if let Some(handle) = self.handles.get_mut(&index) {
            if let Some(kill) = handle.kill.take() {
                let _ = kill.send(());
            }
        }
        Ok(())
    }

    async fn send(&mut self, index: ScriptIndex, command: ScriptCommand) -> Result<()> {
        let handle = self
            .handles
            .get_mut(&index)
            .ok_or_else(|| Error::unknown_index(index.get()))?;
        let mut line = serde_json::to_string(&command)?;
        line.push('\n');
        handle.stdin.write_all(line.as_bytes()).await.map_err(Error::Io)
    }

    /// Drop bookkeeping for a script that has fully retired (exited and been
    /// reaped). Called by the Engine once the `Exited` notification has been
    /// acted on.
    pub fn release(&mut self, index: ScriptIndex) {
        self.handles.remove(&index);
    }
}
