use std::time::Duration;

use crate::controller::RunState;

/// Errors surfaced to the caller driving a run.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("buffer size {buffer_size} overflows the region byte length")]
    SizeOverflow { buffer_size: usize },

    #[error("failed to allocate shared region of {bytes} bytes")]
    Allocation { bytes: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("controller is {actual:?}, expected {expected:?}")]
    InvalidState { expected: RunState, actual: RunState },

    #[error("control channel to the engine is closed")]
    ChannelClosed,

    #[error("run did not complete within {0:?}")]
    Timeout(Duration),

    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HandoffError>;

/// Why the engine refused a `compute-shared` request.
///
/// Rejections stay on the engine side; nothing is sent back to the controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartRejected {
    #[error("request carries no region")]
    MissingRegion,

    #[error("unexpected message type {0:?}")]
    UnexpectedTag(String),

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("iterations must be at least 1")]
    ZeroIterations,

    #[error("buffer size {buffer_size} exceeds region capacity {capacity}")]
    ExceedsCapacity { buffer_size: u64, capacity: usize },

    #[error("region was already lent to a previous run")]
    AlreadyLent,
}
