//! Error kinds for each pipeline boundary.
//!
//! Each enum maps to one containment scope: a `MailboxError` from opening or
//! listing ends one user's check, everything else ends one message.

use thiserror::Error;

use crate::mailbox::MessageHandle;

#[derive(Debug, Error)]
pub enum MailboxError {
    /// Login rejected: bad credential.
    #[error("mailbox login failed for {email}: {reason}")]
    Auth { email: String, reason: String },

    /// TCP, TLS or login did not complete.
    #[error("could not reach mail server {server}: {reason}")]
    Connect { server: String, reason: String },

    /// A session-level command (select, search) failed.
    #[error("mailbox protocol error: {0}")]
    Protocol(String),

    #[error("failed to fetch message {handle}: {reason}")]
    Fetch { handle: MessageHandle, reason: String },

    #[error("failed to decode message {handle}: {reason}")]
    Decode { handle: MessageHandle, reason: String },
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed classifier output: {0}")]
    Malformed(String),

    #[error("unknown classification type {0}")]
    UnknownKind(i64),

    #[error(transparent)]
    UnknownStatus(#[from] shared::UnknownStatus),

    #[error("incomplete classification: {0}")]
    Incomplete(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// No application matches the requested key or id.
    #[error("application not found")]
    NotFound,

    #[error("application already exists: {0}")]
    DuplicateKey(String),

    #[error("owner is not a known user: {0}")]
    UnknownOwner(String),

    /// Connection failure, timeout or 5xx.
    #[error("application store unavailable: {0}")]
    Unavailable(String),

    #[error("application store rejected request (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("malformed application store response: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Malformed(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Status event for an application that was never recorded.
    #[error("no application to transition")]
    ApplicationNotFound,

    #[error("duplicate application: {0}")]
    DuplicateKey(String),

    #[error("unknown owner: {0}")]
    UnknownOwner(String),

    #[error("classification cannot be applied: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ReconcileError::ApplicationNotFound,
            StoreError::DuplicateKey(detail) => ReconcileError::DuplicateKey(detail),
            StoreError::UnknownOwner(detail) => ReconcileError::UnknownOwner(detail),
            other => ReconcileError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(StoreError::Unavailable("timeout".into()).is_retryable());
        assert!(!StoreError::NotFound.is_retryable());
        assert!(!StoreError::DuplicateKey("x".into()).is_retryable());
        assert!(!StoreError::Rejected {
            status: 400,
            detail: "bad".into()
        }
        .is_retryable());
    }

    #[test]
    fn store_conflicts_keep_their_meaning() {
        assert!(matches!(
            ReconcileError::from(StoreError::NotFound),
            ReconcileError::ApplicationNotFound
        ));
        assert!(matches!(
            ReconcileError::from(StoreError::DuplicateKey("dup".into())),
            ReconcileError::DuplicateKey(_)
        ));
        assert!(matches!(
            ReconcileError::from(StoreError::Unavailable("down".into())),
            ReconcileError::Store(StoreError::Unavailable(_))
        ));
    }
}
