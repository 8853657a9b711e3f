//! Error taxonomy for envelope operations

use thiserror::Error;

pub type BoxResult<T> = Result<T, BoxError>;

/// Every failure surfaces as exactly one of these three kinds.
///
/// `InvalidKey` and `InvalidMessage` are caller input errors and are never
/// worth retrying with the same input. `Encryption` wraps everything else,
/// including authentication failures, with the underlying cause attached.
#[derive(Debug, Error)]
pub enum BoxError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("encryption error: {0:#}")]
    Encryption(#[from] anyhow::Error),
}

impl BoxError {
    pub(crate) fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub(crate) fn invalid_message(msg: impl Into<String>) -> Self {
        Self::InvalidMessage(msg.into())
    }

    pub fn is_invalid_key(&self) -> bool {
        matches!(self, Self::InvalidKey(_))
    }

    pub fn is_invalid_message(&self) -> bool {
        matches!(self, Self::InvalidMessage(_))
    }

    pub fn is_encryption(&self) -> bool {
        matches!(self, Self::Encryption(_))
    }
}
