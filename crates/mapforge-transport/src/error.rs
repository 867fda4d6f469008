/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket or accepting a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The outbound connect attempt failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The outbound connect attempt did not complete within the deadline.
    #[error("connect to {addr} timed out after {timeout_ms} ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    /// A frame exceeded [`MAX_FRAME_SIZE`](crate::MAX_FRAME_SIZE).
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// The transport is not listening (hosting-only operation).
    #[error("transport is not listening")]
    NotListening,
}
