//! scriptqueue engine — main entry point.
//!
//! Thin wiring layer: parses the construction inputs (§6), builds an
//! `Engine`, connects it to the in-memory bus adapter, and runs until
//! shutdown. A production deployment swaps [`scriptqueue_core::bus::channel`]
//! for a real message-bus binding implementing [`scriptqueue_core::bus::CommandSource`]
//! / [`scriptqueue_core::bus::EventSink`]; that binding is out of scope here.

use clap::Parser;

use scriptqueue_core::bus::channel_pair;
use scriptqueue_core::engine::discovery::FsScriptCatalog;
use scriptqueue_core::engine::supervisor::Roots;
use scriptqueue_core::engine::Engine;
use scriptqueue_core::types::Config;
use scriptqueue_core::{observability, Result};

/// Queue engine for loading, configuring, and running instrument-control
/// scripts as supervised subprocesses.
#[derive(Parser, Debug)]
#[command(name = "scriptqueue", version, about)]
struct Cli {
    /// This component's SAL index; determines its `[min_idx, max_idx]` range.
    #[arg(long, env = "SCRIPTQUEUE_INDEX")]
    index: i32,

    /// Root directory `standard` script paths resolve against.
    #[arg(long, env = "SCRIPTQUEUE_STANDARDPATH")]
    standardpath: std::path::PathBuf,

    /// Root directory `external` script paths resolve against.
    #[arg(long, env = "SCRIPTQUEUE_EXTERNALPATH")]
    externalpath: std::path::PathBuf,

    /// Verbose logging (sets the default filter to `debug` unless `RUST_LOG` is set).
    #[arg(long, short, env = "SCRIPTQUEUE_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    observability::init_tracing();

    let config = Config::default();
    let roots = Roots {
        standard: cli.standardpath,
        external: cli.externalpath,
    };
    let catalog = FsScriptCatalog::new(roots.standard.clone(), roots.external.clone());
    let mut engine = Engine::new(cli.index, roots, config.limits, Box::new(catalog));

    let (_submitter, mut source, mut sink, mut subscriber) = channel_pair();

    tracing::info!(index = cli.index, "scriptqueue engine starting");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = subscriber.queue.recv() => {
                    tracing::debug!(?event, "queue changed");
                }
                Some(event) = subscriber.script.recv() => {
                    tracing::debug!(?event, "script changed");
                }
                Some(event) = subscriber.available.recv() => {
                    tracing::debug!(?event, "available scripts");
                }
                else => return,
            }
        }
    });

    tokio::select! {
        _ = engine.run(&mut source, &mut sink) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    Ok(())
}
