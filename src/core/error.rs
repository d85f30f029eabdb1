//! Error types for the sync engine.
//! Every failure is a value for the caller to act on; nothing here aborts the process.

/// Outcome of a push/pop on a queue that no longer accepts work
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Queue was closed before the call; end of stream, not a fault
    #[error("packet queue is closed")]
    Closed,
    /// Queue was aborted while the caller was blocked; unwind, do not retry
    #[error("packet queue was aborted while waiting")]
    Aborted,
}

/// Error type for master clock resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("no enabled stream can drive the {0:?} sync mode")]
    NoMasterClock(super::config::SyncMode),
}

/// Crate-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("Stream not open: {0:?}")]
    StreamNotOpen(crate::stream::StreamKind),
}

pub type Result<T> = std::result::Result<T, Error>;
