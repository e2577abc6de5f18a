use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReelcheckError {
    /// The video could not be opened or decoded. Permanent for this submission.
    #[error("Media unreadable: {0}")]
    MediaUnreadable(String),

    /// Caller misconfiguration (bad interval, threshold, identifier...).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transient persistence failure. Nothing was committed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Store or ledger state contradicts the write discipline.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl ReelcheckError {
    /// Whether the whole decide-and-write step may be retried from the top.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub(crate) fn unreadable(message: impl Into<String>) -> Self {
        Self::MediaUnreadable(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ReelcheckError>;
