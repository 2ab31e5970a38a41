use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The listener could not be bound to the configured address.
    #[error("failed to bind HTTP API on {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("HTTP API server error: {0}")]
    Server(String),
}
