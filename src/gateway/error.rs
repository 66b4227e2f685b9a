use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Timeout, 5xx or connection failure. Safe to retry.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("payment declined: {0}")]
    Declined(String),

    #[error("intent {0} not found")]
    IntentNotFound(String),

    #[error("intent {0} already refunded")]
    AlreadyRefunded(String),

    /// Any other permanent refusal from the provider.
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}
