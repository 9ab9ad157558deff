use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use shared::{
    Application, ApplicationLookupQuery, ApplicationStatus, ErrorBody, ListeningUser,
    NewApplicationRequest, UserRecord,
};
use tokio::sync::{Semaphore, SemaphorePermit};

use super::retry::{with_retry, RetryConfig};
use super::ApplicationStore;
use crate::config::StoreConfig;
use crate::error::StoreError;

/// Application Store over HTTP + JSON.
///
/// Reads are retried on transient failures; writes go out exactly once.
/// A semaphore caps how many calls are in flight at the same time.
pub struct HttpApplicationStore {
    base_url: String,
    http: reqwest::Client,
    permits: Semaphore,
    retry: RetryConfig,
}

impl HttpApplicationStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            permits: Semaphore::new(config.max_in_flight.max(1)),
            retry: RetryConfig {
                max_retries: config.read_retries,
                ..RetryConfig::default()
            },
        })
    }

    #[cfg(test)]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, StoreError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| StoreError::Unavailable("store client is shutting down".to_string()))
    }

    async fn fetch_users(&self) -> Result<Vec<ListeningUser>, StoreError> {
        let _permit = self.permit().await?;
        let response = self.http.get(self.url("/users")).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(unexpected(status, error_detail(response).await));
        }

        let rows: Vec<UserRecord> = response.json().await?;
        Ok(rows
            .into_iter()
            .filter_map(UserRecord::into_listening)
            .collect())
    }

    async fn fetch_application_id(&self, query: &ApplicationLookupQuery) -> Result<i64, StoreError> {
        let _permit = self.permit().await?;
        let response = self
            .http
            .get(self.url("/applications"))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let value: serde_json::Value = response.json().await?;
            return app_id_from(&value);
        }

        let detail = error_detail(response).await;
        if is_not_found(status, &detail) {
            return Err(StoreError::NotFound);
        }
        Err(unexpected(status, detail))
    }
}

#[async_trait]
impl ApplicationStore for HttpApplicationStore {
    async fn list_listening_users(&self) -> Result<Vec<ListeningUser>, StoreError> {
        with_retry(&self.retry, "list_listening_users", || self.fetch_users()).await
    }

    async fn lookup_application_id(
        &self,
        owner_email: &str,
        company_name: &str,
        job_title: &str,
    ) -> Result<i64, StoreError> {
        let query = ApplicationLookupQuery {
            email: owner_email.to_string(),
            company_name: company_name.to_string(),
            job_title: job_title.to_string(),
        };
        with_retry(&self.retry, "lookup_application_id", || {
            self.fetch_application_id(&query)
        })
        .await
    }

    async fn create_application(
        &self,
        request: &NewApplicationRequest,
    ) -> Result<Application, StoreError> {
        let _permit = self.permit().await?;
        let response = self
            .http
            .post(self.url("/applications"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let detail = error_detail(response).await;
        let lowered = detail.to_lowercase();
        if lowered.contains("duplicate") || lowered.contains("unique") {
            return Err(StoreError::DuplicateKey(detail));
        }
        if status == StatusCode::CONFLICT || lowered.contains("foreign key") {
            return Err(StoreError::UnknownOwner(detail));
        }
        Err(unexpected(status, detail))
    }

    async fn update_application_status(
        &self,
        app_id: i64,
        status: ApplicationStatus,
    ) -> Result<Application, StoreError> {
        let _permit = self.permit().await?;
        let response = self
            .http
            .put(self.url(&format!("/applications/{app_id}")))
            .query(&[("status_update", status.label())])
            .send()
            .await?;

        let http_status = response.status();
        if http_status.is_success() {
            return Ok(response.json().await?);
        }

        let detail = error_detail(response).await;
        if is_not_found(http_status, &detail) {
            return Err(StoreError::NotFound);
        }
        Err(unexpected(http_status, detail))
    }
}

/// The store wraps its own 404s into 400s, so the detail text decides.
fn is_not_found(status: StatusCode, detail: &str) -> bool {
    if status == StatusCode::NOT_FOUND {
        return true;
    }
    let lowered = detail.to_lowercase();
    status == StatusCode::BAD_REQUEST
        && (lowered.contains("not found") || lowered.contains("0 rows"))
}

fn unexpected(status: StatusCode, detail: String) -> StoreError {
    if status.is_server_error() {
        StoreError::Unavailable(format!("HTTP {}: {}", status.as_u16(), detail))
    } else {
        StoreError::Rejected {
            status: status.as_u16(),
            detail,
        }
    }
}

async fn error_detail(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) if !body.detail_text().is_empty() => body.detail_text(),
        _ => text,
    }
}

/// Lookup answers with a bare integer; tolerate `{"app_id": n}` too.
fn app_id_from(value: &serde_json::Value) -> Result<i64, StoreError> {
    value
        .as_i64()
        .or_else(|| value.get("app_id").and_then(serde_json::Value::as_i64))
        .ok_or_else(|| StoreError::Malformed(format!("expected app_id, got {value}")))
}
