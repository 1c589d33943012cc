/// Errors that can occur in connection operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] telelink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] telelink_frame::FrameError),

    /// No socket is open to write to.
    #[error("connection is not open")]
    Closed,

    /// Frames accepted by `send` were never written to the socket.
    #[error("{frames} queued frame(s) were not written")]
    Unflushed { frames: u64 },

    /// The background connection task panicked or was cancelled.
    #[error("connection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A connection was started outside a tokio runtime.
    #[error("connection requires a running tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, PeerError>;
