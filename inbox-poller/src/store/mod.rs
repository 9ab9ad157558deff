//! Client side of the Application Store.

mod http;
mod retry;

use async_trait::async_trait;
use shared::{Application, ApplicationStatus, ListeningUser, NewApplicationRequest};

use crate::error::StoreError;

pub use http::HttpApplicationStore;

/// The four store operations the pipeline depends on.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn list_listening_users(&self) -> Result<Vec<ListeningUser>, StoreError>;

    /// Resolve the natural key `(owner, company, job_title)` to an `app_id`.
    async fn lookup_application_id(
        &self,
        owner_email: &str,
        company_name: &str,
        job_title: &str,
    ) -> Result<i64, StoreError>;

    /// Insert a new application row. Never retried.
    async fn create_application(
        &self,
        request: &NewApplicationRequest,
    ) -> Result<Application, StoreError>;

    /// Overwrite the status of an application. Never retried.
    async fn update_application_status(
        &self,
        app_id: i64,
        status: ApplicationStatus,
    ) -> Result<Application, StoreError>;
}
