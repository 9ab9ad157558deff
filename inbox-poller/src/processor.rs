//! One mailbox check: unseen messages through classification and
//! reconciliation, with failures contained to the message that caused them.

use std::ops::AddAssign;
use std::sync::Arc;

use shared::ListeningUser;

use crate::classifier::{classify_with_retry, Classifier};
use crate::error::{MailboxError, ReconcileError};
use crate::mailbox::{MailboxConnector, MailboxSession, MessageHandle, RawMessage};
use crate::reconcile::{Reconciliation, ReconciliationEngine};

/// Tally of what happened to one user's unseen messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxReport {
    pub unseen: usize,
    pub fetch_failures: usize,
    pub decode_failures: usize,
    pub classifier_failures: usize,
    pub ignored: usize,
    pub created: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub not_found: usize,
    pub store_failures: usize,
}

impl MailboxReport {
    fn record(&mut self, outcome: &Result<Reconciliation, ReconcileError>) {
        match outcome {
            Ok(Reconciliation::Ignored) => self.ignored += 1,
            Ok(Reconciliation::Created { .. }) => self.created += 1,
            Ok(Reconciliation::Updated { .. }) => self.updated += 1,
            Err(ReconcileError::DuplicateKey(_)) => self.duplicates += 1,
            Err(ReconcileError::ApplicationNotFound) => self.not_found += 1,
            Err(_) => self.store_failures += 1,
        }
    }

    /// Messages that could not be taken all the way through.
    pub fn failures(&self) -> usize {
        self.fetch_failures
            + self.decode_failures
            + self.classifier_failures
            + self.duplicates
            + self.not_found
            + self.store_failures
    }
}

impl AddAssign for MailboxReport {
    fn add_assign(&mut self, other: Self) {
        self.unseen += other.unseen;
        self.fetch_failures += other.fetch_failures;
        self.decode_failures += other.decode_failures;
        self.classifier_failures += other.classifier_failures;
        self.ignored += other.ignored;
        self.created += other.created;
        self.updated += other.updated;
        self.duplicates += other.duplicates;
        self.not_found += other.not_found;
        self.store_failures += other.store_failures;
    }
}

pub struct MailboxProcessor {
    connector: Arc<dyn MailboxConnector>,
    classifier: Arc<dyn Classifier>,
    engine: ReconciliationEngine,
}

impl MailboxProcessor {
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        classifier: Arc<dyn Classifier>,
        engine: ReconciliationEngine,
    ) -> Self {
        Self {
            connector,
            classifier,
            engine,
        }
    }

    /// Check one user's inbox.
    ///
    /// Fails only when the mailbox cannot be opened or listed. The session is
    /// logged out whenever it was opened, whatever happens afterwards.
    pub async fn check_inbox(&self, user: &ListeningUser) -> Result<MailboxReport, MailboxError> {
        let mut session = self.connector.open(&user.credential).await?;
        tracing::debug!(owner = %user.email, "Connected, checking for unseen messages");

        let result = self.process_unseen(session.as_mut(), &user.email).await;

        if let Err(e) = session.logout().await {
            tracing::warn!(owner = %user.email, error = %e, "Mailbox logout failed");
        }

        result
    }

    async fn process_unseen(
        &self,
        session: &mut dyn MailboxSession,
        owner: &str,
    ) -> Result<MailboxReport, MailboxError> {
        let handles = session.list_unseen().await?;
        let mut report = MailboxReport {
            unseen: handles.len(),
            ..MailboxReport::default()
        };

        for handle in handles {
            let message = match session.fetch(handle).await {
                Ok(message) => message,
                Err(e) => {
                    match e {
                        MailboxError::Decode { .. } => report.decode_failures += 1,
                        _ => report.fetch_failures += 1,
                    }
                    tracing::warn!(owner, %handle, error = %e, "Skipping message");
                    continue;
                }
            };

            self.process_message(owner, handle, &message, &mut report)
                .await;
        }

        Ok(report)
    }

    async fn process_message(
        &self,
        owner: &str,
        handle: MessageHandle,
        message: &RawMessage,
        report: &mut MailboxReport,
    ) {
        let classification =
            match classify_with_retry(self.classifier.as_ref(), &message.compose()).await {
                Ok(classification) => classification,
                Err(e) => {
                    // Left unseen, so it gets another chance next cycle.
                    report.classifier_failures += 1;
                    tracing::error!(
                        owner,
                        %handle,
                        subject = %message.subject,
                        error = %e,
                        "Classification failed twice, treating message as unrelated"
                    );
                    return;
                }
            };

        let outcome = self.engine.reconcile(owner, &classification).await;

        if let Err(e) = &outcome {
            let status = classification
                .status
                .map(|s| s.code())
                .unwrap_or("-");
            match e {
                ReconcileError::DuplicateKey(_) => tracing::info!(
                    owner,
                    company = %classification.company_name,
                    job_title = %classification.job_title,
                    operation = "create-application",
                    error = %e,
                    "Application already recorded"
                ),
                ReconcileError::ApplicationNotFound => tracing::warn!(
                    owner,
                    company = %classification.company_name,
                    job_title = %classification.job_title,
                    status,
                    operation = "lookup-application-id",
                    "Status update for an unknown application, skipping"
                ),
                _ => tracing::error!(
                    owner,
                    %handle,
                    kind = ?classification.kind,
                    company = %classification.company_name,
                    job_title = %classification.job_title,
                    status,
                    error = %e,
                    "Failed to reconcile message"
                ),
            }
        }

        report.record(&outcome);
    }
}
