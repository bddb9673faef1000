//! # scriptqueue-core — script queue control-plane engine
//!
//! Loads, configures, runs, and supervises instrument-control scripts as
//! subprocesses, queued and ordered per operator command.
//!
//! ## Architecture
//!
//! The engine follows a single-actor model where the [`engine::Engine`] owns
//! all mutable state and is driven by one serialized command loop — no
//! `Mutex`, no shared state across tasks:
//! ```text
//!                    ┌──────────────────────────────────┐
//!   bus commands  →  │             Engine               │
//!                    │  ┌───────┐ ┌──────────┐ ┌───────┐ │
//!                    │  │ Queue │ │Supervisor│ │ Index │ │
//!                    │  │       │ │          │ │Alloc. │ │
//!                    │  └───────┘ └──────────┘ └───────┘ │
//!                    └──────────────────────────────────┘
//!                               │
//!                               ▼ (per-script, stdin/stdout)
//!                      subprocess (standard/external script)
//! ```
//!
//! [`bus`] defines the abstract command/event surface a binding implements;
//! [`bus::channel`] is the in-memory adapter used by the CLI binary and
//! integration tests. [`engine::supervisor`] owns the concrete per-script
//! transport (newline-delimited JSON over the child's stdin/stdout).

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod bus;
pub mod engine;
pub mod types;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, Result};
