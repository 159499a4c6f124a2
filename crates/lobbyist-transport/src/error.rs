/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote side closed the connection before the operation finished.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Binding the local socket or completing the hello exchange failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// An operation that needs a live connection was called before
    /// `connect` succeeded.
    #[error("not connected")]
    NotConnected,
}
