/// Errors that can occur inside the progress stream client.
///
/// None of these escape the adapter boundary: transport faults are
/// folded into [`StreamView`](crate::adapter::StreamView) state.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Failed to establish a WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A connection was requested outside a Tokio runtime.
    #[error("No Tokio runtime available to drive the connection")]
    NoRuntime,

    /// An environment variable held a value that could not be used.
    #[error("Configuration error: {0}")]
    Config(String),
}
