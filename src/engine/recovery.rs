//! Panic recovery for command handlers.
//!
//! A single malformed command must not take the whole engine down. Command
//! dispatch wraps each handler in `with_recovery_async` so a panic is
//! converted into `Error::Internal` instead of unwinding past the command
//! loop.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::types::{Error, Result};

/// Execute a synchronous operation with panic recovery.
pub fn with_recovery<F, T>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(panic_payload) => {
            let panic_msg = extract_panic_message(&panic_payload);
            tracing::error!(operation = operation_name, panic = %panic_msg, "panic recovered");
            Err(Error::internal(format!(
                "panic in {operation_name}: {panic_msg}"
            )))
        }
    }
}

/// Execute an async operation with panic recovery.
pub async fn with_recovery_async<F, Fut, T>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let future = operation();
    match catch_unwind(AssertUnwindSafe(|| future)) {
        Ok(fut) => fut.await,
        Err(panic_payload) => {
            let panic_msg = extract_panic_message(&panic_payload);
            tracing::error!(operation = operation_name, panic = %panic_msg, "async panic recovered");
            Err(Error::internal(format!(
                "async panic in {operation_name}: {panic_msg}"
            )))
        }
    }
}

fn extract_panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic (no message)".to_string()
    }
}
