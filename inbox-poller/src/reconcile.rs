//! Maps a classified email onto the Application Store.
//!
//! The engine keeps no state between calls. Duplicate protection is the
//! store's natural key `(owner, company, job_title)`, and status updates are
//! overwrites, so replaying the same event converges on the same row.

use std::sync::Arc;

use shared::{ApplicationStatus, Classification, ClassificationKind, NewApplicationRequest};
use validator::Validate;

use crate::error::ReconcileError;
use crate::store::ApplicationStore;

/// Side effect applied for one classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Not an application event; nothing sent to the store.
    Ignored,
    Created { app_id: i64 },
    Updated { app_id: i64, status: ApplicationStatus },
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn ApplicationStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }

    /// Decide between create, update and no-op, and apply it.
    ///
    /// Store conflicts come back as errors for the caller to count and log:
    /// a second `NEW_APPLICATION` for the same key is `DuplicateKey`, and a
    /// `STATUS_EVENT` with nothing to transition is `ApplicationNotFound`.
    pub async fn reconcile(
        &self,
        owner_email: &str,
        classification: &Classification,
    ) -> Result<Reconciliation, ReconcileError> {
        match classification.kind {
            ClassificationKind::None => Ok(Reconciliation::Ignored),
            ClassificationKind::NewApplication => self.create(owner_email, classification).await,
            ClassificationKind::StatusEvent => self.transition(owner_email, classification).await,
        }
    }

    async fn create(
        &self,
        owner_email: &str,
        classification: &Classification,
    ) -> Result<Reconciliation, ReconcileError> {
        // The status the classifier reported is irrelevant here.
        let request = NewApplicationRequest {
            email: owner_email.to_string(),
            company_name: classification.company_name.clone(),
            job_title: classification.job_title.clone(),
            status: ApplicationStatus::PendingResponse,
        };
        request
            .validate()
            .map_err(|e| ReconcileError::InvalidEvent(e.to_string()))?;

        let created = self.store.create_application(&request).await?;

        tracing::info!(
            owner = owner_email,
            company = %request.company_name,
            job_title = %request.job_title,
            app_id = created.app_id,
            "Recorded new application"
        );

        Ok(Reconciliation::Created {
            app_id: created.app_id,
        })
    }

    async fn transition(
        &self,
        owner_email: &str,
        classification: &Classification,
    ) -> Result<Reconciliation, ReconcileError> {
        let status = classification
            .status
            .ok_or_else(|| ReconcileError::InvalidEvent("status event without a status".into()))?;

        // A status email with no prior application is treated as a bad match,
        // never as a reason to create one.
        let app_id = self
            .store
            .lookup_application_id(
                owner_email,
                &classification.company_name,
                &classification.job_title,
            )
            .await?;

        // Last write wins: no transition is refused, including backwards ones.
        let updated = self.store.update_application_status(app_id, status).await?;

        tracing::info!(
            owner = owner_email,
            company = %classification.company_name,
            job_title = %classification.job_title,
            app_id,
            status = %updated.status,
            "Updated application status"
        );

        Ok(Reconciliation::Updated { app_id, status })
    }
}
