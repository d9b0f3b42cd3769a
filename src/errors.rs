use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedriveError {
    #[error("Invalid redrive configuration: {0}")]
    ConfigError(String),

    #[error("Failed to receive messages from the dead letter queue: {0}")]
    ReceiveError(String),

    #[error("Timed out receiving messages after {0:?}")]
    ReceiveTimeout(Duration),

    #[error("Failed to invoke target function: {0}")]
    InvokeError(String),

    #[error("Target function reported an error: {0}")]
    FunctionError(String),

    #[error("Message body is not valid JSON: {0}")]
    PayloadError(String),

    #[error("Failed to delete message from the dead letter queue: {0}")]
    DeleteError(String),

    #[error("Failed to apply queue policy: {0}")]
    PolicyError(String),
}

impl From<serde_json::Error> for RedriveError {
    fn from(error: serde_json::Error) -> Self {
        RedriveError::PayloadError(error.to_string())
    }
}
