use thiserror::Error;

/// Result alias for fallible core operations.
pub type EpsResult<T> = Result<T, EpsError>;

/// Errors surfaced to callers of the dispatch core.
///
/// Bus-level failures are deliberately absent: a negative status from the
/// device is data, recorded per sub-command in its [`crate::Outcome`], and
/// never aborts the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EpsError {
    /// The command queue is at capacity; the request was rejected, not queued.
    #[error("command queue is full")]
    QueueFull,

    /// A batch must contain at least one command.
    #[error("command batch is empty")]
    EmptyBatch,

    /// The batch exceeds the fixed per-request command capacity.
    #[error("command batch exceeds capacity")]
    BatchOverflow,

    /// The wait bound elapsed before the dispatcher delivered a result.
    /// Execution is not cancelled; any late result is reclaimed internally.
    #[error("timed out waiting for command completion")]
    Timeout,

    /// Shutdown drained the request from the queue before execution.
    #[error("request cancelled by shutdown")]
    Cancelled,

    /// The core is shutting down and no longer accepts requests.
    #[error("dispatch core is shutting down")]
    ShuttingDown,

    /// Core configuration failed validation.
    #[error("invalid core configuration: {0}")]
    InvalidConfig(&'static str),

    /// The OS refused a worker thread at startup. Surfaced to the caller;
    /// the process keeps running.
    #[error("failed to spawn worker thread")]
    ThreadSpawn,
}
