//! The relay pipeline.
//!
//! ```text
//! Producer 1..P ──offer──┐                ┌──take── Dispatcher 0 ──publish──▶ partition 0
//!                        ├─ HandoffQueue ─┤              ...
//! Producer ... ──offer───┘   (capacity 0) └──take── Dispatcher M-1 ─publish──▶ partition M-1
//!
//! partition 0 ──consume──▶ Reader 0         (independent of the path above)
//! partition M-1 ─consume─▶ Reader M-1
//! ```
//!
//! - [`producer`]: generates work items at a fixed cadence.
//! - [`dispatcher`]: publishes handed-off items to its fixed partition.
//! - [`reader`]: consumes one partition.
//! - [`balancer`]: owns the handoff queue, producers and dispatchers.
//! - [`orchestrator`]: topic setup, readers, balancer, and the final join.

pub mod balancer;
pub mod dispatcher;
pub mod orchestrator;
pub mod producer;
pub mod reader;


use crate::{Error, Result};
use tokio::task::JoinHandle;

/// Awaits a spawned task, mapping a panic or abort to [`Error::TaskFailed`].
async fn join_task<T>(task: String, handle: JoinHandle<T>) -> Result<T> {
    handle.await.map_err(|e| {
        tracing::error!(task = %task, error = %e, "Task did not finish cleanly");
        Error::TaskFailed {
            task,
            reason: e.to_string(),
        }
    })
}
