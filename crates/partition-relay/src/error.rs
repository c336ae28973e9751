//! Error types for the relay pipeline.
//!
//! This module defines the central `Error` enum shared by the broker adapters,
//! the handoff queue and the pipeline tasks. Errors fall into three classes:
//!
//! - Setup failures (`TopicSetup`, `InvalidConfig`) are fatal and stop the
//!   pipeline before any task is spawned.
//! - Operational failures (`Broker`, `UnknownTopic`, `UnknownPartition`) are
//!   logged by the owning task, which then moves on to its next iteration.
//! - `Cancelled` is not a fault. It reports that the shared cancellation token
//!   fired while the caller was suspended.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the relay pipeline.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The broker rejected or failed an operation (publish, consume, connect).
    #[error("Broker error: {context}")]
    Broker { context: String },

    /// The topic does not exist on the broker.
    #[error("Unknown topic: {topic}")]
    UnknownTopic { topic: String },

    /// A topic with the same name already exists.
    #[error("Topic already exists: {topic}")]
    TopicExists { topic: String },

    /// The partition index is outside of the topic's partition range.
    #[error("Partition {partition} out of range for topic {topic}")]
    UnknownPartition { topic: String, partition: u32 },

    /// Topic administration failed during startup.
    #[error("Topic setup failed: {reason}")]
    TopicSetup { reason: String },

    /// The pipeline configuration was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Internal channel failure between pipeline tasks.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The cancellation token fired before the operation completed.
    #[error("Pipeline is shutting down")]
    Cancelled,

    /// A spawned task panicked or was aborted.
    #[error("Task {task} failed: {reason}")]
    TaskFailed { task: String, reason: String },
}

impl Error {
    /// Returns `true` if this error only reports shutdown in progress.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
