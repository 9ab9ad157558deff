use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_imap::Session;
use async_native_tls::TlsStream;
use async_trait::async_trait;
use futures::TryStreamExt;
use shared::MailboxCredential;
use tokio::net::TcpStream;
use tokio::time;

use super::{parse_message, MailboxConnector, MailboxSession, MessageHandle, RawMessage};
use crate::config::ImapConfig;
use crate::error::MailboxError;

/// Run one IMAP round trip under `limit`, folding both failure kinds into a
/// reason string.
async fn bounded<T, E, F>(limit: Duration, step: &str, fut: F) -> Result<T, String>
where
    E: fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    match time::timeout(limit, fut).await {
        Ok(result) => result.map_err(|e| format!("{} failed: {}", step, e)),
        Err(_) => Err(format!("{} timed out after {:?}", step, limit)),
    }
}

/// Connects to an IMAP server over implicit TLS.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    server: String,
    port: u16,
    timeout: Duration,
}

impl ImapConnector {
    pub fn new(config: &ImapConfig) -> Self {
        Self {
            server: config.server.clone(),
            port: config.port,
            timeout: config.timeout,
        }
    }

    fn connect_error(&self, reason: impl ToString) -> MailboxError {
        MailboxError::Connect {
            server: self.server.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn open(
        &self,
        credential: &MailboxCredential,
    ) -> Result<Box<dyn MailboxSession>, MailboxError> {
        let tcp = bounded(
            self.timeout,
            "TCP connect",
            TcpStream::connect((self.server.as_str(), self.port)),
        )
        .await
        .map_err(|e| self.connect_error(e))?;

        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = bounded(
            self.timeout,
            "TLS handshake",
            tls.connect(self.server.as_str(), tcp),
        )
        .await
        .map_err(|e| self.connect_error(e))?;

        let client = async_imap::Client::new(tls_stream);

        let session = match time::timeout(
            self.timeout,
            client.login(&credential.email, &credential.app_password),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err((e, _))) => {
                return Err(MailboxError::Auth {
                    email: credential.email.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(self.connect_error(format!("login timed out after {:?}", self.timeout)))
            }
        };

        tracing::debug!(owner = %credential.email, server = %self.server, "Mailbox session opened");

        Ok(Box::new(ImapSession {
            session,
            timeout: self.timeout,
        }))
    }
}

struct ImapSession {
    session: Session<TlsStream<TcpStream>>,
    timeout: Duration,
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn list_unseen(&mut self) -> Result<Vec<MessageHandle>, MailboxError> {
        bounded(self.timeout, "SELECT INBOX", self.session.select("INBOX"))
            .await
            .map_err(MailboxError::Protocol)?;

        let found = bounded(self.timeout, "SEARCH UNSEEN", self.session.search("UNSEEN"))
            .await
            .map_err(MailboxError::Protocol)?;

        let mut handles: Vec<MessageHandle> = found.into_iter().map(MessageHandle).collect();
        handles.sort();
        Ok(handles)
    }

    async fn fetch(&mut self, handle: MessageHandle) -> Result<RawMessage, MailboxError> {
        let limit = self.timeout;
        let fetch_error = |reason: String| MailboxError::Fetch { handle, reason };

        // PEEK leaves the \Seen flag untouched.
        let stream = bounded(
            limit,
            "FETCH",
            self.session.fetch(handle.0.to_string(), "BODY.PEEK[]"),
        )
        .await
        .map_err(fetch_error)?;

        let messages = bounded(limit, "FETCH response", stream.try_collect::<Vec<_>>())
            .await
            .map_err(fetch_error)?;

        let raw = messages
            .iter()
            .find_map(|message| message.body())
            .ok_or_else(|| fetch_error("server returned no message body".to_string()))?;

        parse_message(handle, raw)
    }

    async fn logout(self: Box<Self>) -> Result<(), MailboxError> {
        let limit = self.timeout;
        let mut session = self.session;
        bounded(limit, "LOGOUT", session.logout())
            .await
            .map_err(MailboxError::Protocol)
    }
}
