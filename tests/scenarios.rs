//! End-to-end scenarios (§8) driven through the real bus surface against a
//! live `Engine` and actual subprocess fixtures, complementing the
//! module-level unit tests alongside each source file.
//!
//! Scenario 6 (index wrap with a live holdout) is a pure allocator property
//! and is covered by `engine::allocator::tests::index_wrap_with_live_holdout_never_collides`
//! instead of here — spinning up ~100 subprocesses to exercise the same
//! logic the allocator already owns in isolation would add nothing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use scriptqueue_core::bus::{
    channel_pair, AckPhase, ChannelCommandSubmitter, ChannelEventSubscriber, Command, Location,
};
use scriptqueue_core::engine::discovery::FsScriptCatalog;
use scriptqueue_core::engine::supervisor::Roots;
use scriptqueue_core::engine::Engine;
use scriptqueue_core::types::{CmdId, EngineLimits};

/// Writes an executable fixture implementing the newline-delimited JSON
/// script protocol: a heartbeat, then (once the configure line arrives on
/// stdin) a `configured` state, then (once the run line arrives) a
/// `running` state, followed by `tail`.
fn write_fixture(dir: &Path, name: &str, tail: &str) -> PathBuf {
    let path = dir.join(name);
    let body = format!(
        "#!/bin/sh\n\
         echo '{{\"event\":\"heartbeat\"}}'\n\
         read _cfg\n\
         echo '{{\"event\":\"state\",\"state\":\"configured\"}}'\n\
         read _run\n\
         echo '{{\"event\":\"state\",\"state\":\"running\"}}'\n\
         {tail}\n"
    );
    std::fs::write(&path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }
    path
}

fn test_limits() -> EngineLimits {
    EngineLimits {
        load_timeout: Duration::from_secs(5),
        stop_grace_window: Duration::from_millis(150),
        ..EngineLimits::default()
    }
}

fn spawn_engine(
    root: &Path,
) -> (
    ChannelCommandSubmitter,
    ChannelEventSubscriber,
    tokio::task::JoinHandle<()>,
) {
    let roots = Roots {
        standard: root.to_path_buf(),
        external: root.to_path_buf(),
    };
    let catalog = FsScriptCatalog::new(root.to_path_buf(), root.to_path_buf());
    let mut engine = Engine::new(1, roots, test_limits(), Box::new(catalog));

    let (submitter, mut source, mut sink, subscriber) = channel_pair();
    let handle = tokio::spawn(async move {
        engine.run(&mut source, &mut sink).await;
    });
    (submitter, subscriber, handle)
}

async fn submit(submitter: &ChannelCommandSubmitter, command: Command) -> AckPhase {
    let (_progress, terminal) = submitter.submit(command);
    terminal.await.unwrap()
}

fn add_command(path: &str, descr: &str) -> Command {
    Command::Add {
        cmd_id: CmdId::new(),
        is_standard: true,
        path: path.to_string(),
        config: String::new(),
        descr: descr.to_string(),
        location: Location::Last,
        location_sal_index: 0,
    }
}

fn allocated_index(ack: AckPhase) -> i32 {
    match ack {
        AckPhase::Complete { result } => result.parse().expect("add/requeue result is decimal"),
        other => panic!("expected COMPLETE, got {other:?}"),
    }
}

/// Scenario 1: basic admit+run — `resume`, `add`, expect promotion then a
/// DONE entry in history.
#[tokio::test]
async fn scenario_1_basic_admit_and_run() {
    let root = tempfile::tempdir().unwrap();
    write_fixture(root.path(), "slew.py", "exit 0");
    let (submitter, mut subscriber, _engine_task) = spawn_engine(root.path());

    assert_eq!(
        submit(&submitter, Command::Resume).await,
        AckPhase::Complete {
            result: String::new()
        }
    );

    let index = allocated_index(submit(&submitter, add_command("slew.py", "t1")).await);
    assert_eq!(index, 100_000);

    let mut saw_current = false;
    for _ in 0..50 {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), subscriber.queue.recv()).await
        {
            if event.current_sal_index == index {
                saw_current = true;
                break;
            }
        }
    }
    assert!(saw_current, "script never promoted to current");

    let mut saw_done = false;
    for _ in 0..50 {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), subscriber.queue.recv()).await
        {
            if event.past_sal_indices.first() == Some(&index) {
                saw_done = true;
                break;
            }
        }
    }
    assert!(saw_done, "script never retired to history");
}

/// Scenario 2: `pause` blocks promotion until `resume`.
#[tokio::test]
async fn scenario_2_pause_blocks_promotion() {
    let root = tempfile::tempdir().unwrap();
    write_fixture(root.path(), "slew.py", "exit 0");
    let (submitter, mut subscriber, _engine_task) = spawn_engine(root.path());

    // Engine starts with `running = false`; do not resume yet.
    let index = allocated_index(submit(&submitter, add_command("slew.py", "t1")).await);
    assert_eq!(index, 100_000);

    let deadline = tokio::time::Instant::now() + Duration::from_millis(600);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, subscriber.queue.recv()).await {
            Ok(Some(event)) => {
                assert!(!event.running);
                assert_eq!(event.current_sal_index, 0);
                assert_eq!(event.sal_indices, vec![index]);
            }
            _ => break,
        }
    }

    assert_eq!(
        submit(&submitter, Command::Resume).await,
        AckPhase::Complete {
            result: String::new()
        }
    );

    let mut saw_current = false;
    for _ in 0..50 {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), subscriber.queue.recv()).await
        {
            if event.current_sal_index == index {
                saw_current = true;
                break;
            }
        }
    }
    assert!(saw_current, "script never promoted after resume");
}

/// Scenario 3: moving a script before itself is a no-op that still
/// republishes exactly one queue event.
#[tokio::test]
async fn scenario_3_move_before_itself_is_a_noop_but_republishes() {
    let root = tempfile::tempdir().unwrap();
    write_fixture(root.path(), "slew.py", "sleep 30");
    let (submitter, mut subscriber, _engine_task) = spawn_engine(root.path());

    let mut indices = Vec::new();
    for i in 0..3 {
        let index = allocated_index(
            submit(&submitter, add_command("slew.py", &format!("t{i}"))).await,
        );
        indices.push(index);
    }

    // Drain the queue events produced by the three `add`s (the engine never
    // resumed, so nothing else touches the queue channel).
    while tokio::time::timeout(Duration::from_millis(50), subscriber.queue.recv())
        .await
        .is_ok()
    {}

    let middle = indices[1];
    assert_eq!(
        submit(
            &submitter,
            Command::Move {
                sal_index: middle,
                location: Location::Before,
                location_sal_index: middle,
            },
        )
        .await,
        AckPhase::Complete {
            result: String::new()
        }
    );

    let event = tokio::time::timeout(Duration::from_secs(1), subscriber.queue.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.sal_indices, indices);
    assert!(tokio::time::timeout(Duration::from_millis(100), subscriber.queue.recv())
        .await
        .is_err());
}

/// Scenario 4: `stopScripts` on a mix of `current` and `pending` indices —
/// the current one retires TERMINATED, the pending one is dropped silently,
/// and the untouched pending script is promoted afterward.
#[tokio::test]
async fn scenario_4_stop_scripts_current_and_queued() {
    let root = tempfile::tempdir().unwrap();
    write_fixture(root.path(), "slew.py", "sleep 30");
    let (submitter, mut subscriber, _engine_task) = spawn_engine(root.path());

    submit(&submitter, Command::Resume).await;

    let mut indices = Vec::new();
    for i in 0..3 {
        let index = allocated_index(
            submit(&submitter, add_command("slew.py", &format!("t{i}"))).await,
        );
        indices.push(index);
    }
    let (current, untouched, queued) = (indices[0], indices[1], indices[2]);

    let mut promoted = false;
    for _ in 0..50 {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), subscriber.queue.recv()).await
        {
            if event.current_sal_index == current {
                promoted = true;
                break;
            }
        }
    }
    assert!(promoted, "first script never promoted to current");

    assert_eq!(
        submit(
            &submitter,
            Command::StopScripts {
                sal_indices: vec![current, queued],
                length: 2,
                terminate: false,
            },
        )
        .await,
        AckPhase::Complete {
            result: String::new()
        }
    );

    let mut retired = false;
    for _ in 0..50 {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), subscriber.queue.recv()).await
        {
            if event.past_sal_indices.first() == Some(&current) {
                assert!(!event.sal_indices.contains(&queued));
                assert!(!event.past_sal_indices.contains(&queued));
                retired = true;
                break;
            }
        }
    }
    assert!(retired, "current script never retired to history");

    let mut promoted_next = false;
    for _ in 0..50 {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), subscriber.queue.recv()).await
        {
            if event.current_sal_index == untouched {
                promoted_next = true;
                break;
            }
        }
    }
    assert!(promoted_next, "remaining pending script never promoted");
}

/// Scenario 5: `requeue` against a script in history reproduces its
/// immutable fields under a fresh index.
#[tokio::test]
async fn scenario_5_requeue_from_history_gets_a_new_index() {
    let root = tempfile::tempdir().unwrap();
    write_fixture(root.path(), "slew.py", "exit 0");
    let (submitter, mut subscriber, _engine_task) = spawn_engine(root.path());

    submit(&submitter, Command::Resume).await;
    let original = allocated_index(submit(&submitter, add_command("slew.py", "t1")).await);

    let mut in_history = false;
    for _ in 0..50 {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), subscriber.queue.recv()).await
        {
            if event.past_sal_indices.first() == Some(&original) {
                in_history = true;
                break;
            }
        }
    }
    assert!(in_history, "original script never reached history");

    let requeued = allocated_index(
        submit(
            &submitter,
            Command::Requeue {
                cmd_id: CmdId::new(),
                sal_index: original,
                location: Location::Last,
                location_sal_index: 0,
            },
        )
        .await,
    );
    assert_ne!(requeued, original);
}
