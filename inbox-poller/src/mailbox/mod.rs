//! Mailbox access: one session per user, unseen messages only.
//!
//! The traits here are the seam between the pipeline and the mail server so
//! the processor can run against scripted sessions in tests.

mod imap;
mod parse;

use std::fmt;

use async_trait::async_trait;
use shared::MailboxCredential;

use crate::error::MailboxError;

pub use imap::ImapConnector;
pub use parse::parse_message;

/// Server-side sequence number of an unseen message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageHandle(pub u32);

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Normalized content of one unseen message. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawMessage {
    pub sender: String,
    pub subject: String,
    pub body: String,
}

impl RawMessage {
    /// Text handed to the classifier.
    pub fn compose(&self) -> String {
        format!(
            "From: {}\nSubject: {}\nContent: {}",
            self.sender, self.subject, self.body
        )
    }
}

/// Opens mailbox sessions.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn open(
        &self,
        credential: &MailboxCredential,
    ) -> Result<Box<dyn MailboxSession>, MailboxError>;
}

/// An authenticated session on one mailbox.
///
/// Callers must finish with [`MailboxSession::logout`] on every path.
#[async_trait]
pub trait MailboxSession: Send {
    /// Unseen messages in the inbox, oldest first. Nothing is marked read.
    async fn list_unseen(&mut self) -> Result<Vec<MessageHandle>, MailboxError>;

    async fn fetch(&mut self, handle: MessageHandle) -> Result<RawMessage, MailboxError>;

    async fn logout(self: Box<Self>) -> Result<(), MailboxError>;
}
