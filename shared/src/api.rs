use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{ApplicationStatus, ListeningUser, MailboxCredential};

// ============================================================================
// User API Types
// ============================================================================

/// Row returned by `GET /users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub email: String,
    #[serde(default)]
    pub email_app_password: String,
    #[serde(default)]
    pub listening: bool,
}

impl UserRecord {
    /// Returns the user as a polling target, or `None` when not listening.
    pub fn into_listening(self) -> Option<ListeningUser> {
        if !self.listening {
            return None;
        }
        Some(ListeningUser {
            credential: MailboxCredential {
                email: self.email.clone(),
                app_password: self.email_app_password,
            },
            email: self.email,
        })
    }
}

// ============================================================================
// Application API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewApplicationRequest {
    /// Owner email as listed by the store; the store checks it.
    pub email: String,

    #[validate(length(min = 1, max = 200))]
    pub company_name: String,

    #[validate(length(min = 1, max = 200))]
    pub job_title: String,

    pub status: ApplicationStatus,
}

/// Query string for `GET /applications`, the natural-key lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationLookupQuery {
    pub email: String,
    pub company_name: String,
    pub job_title: String,
}

/// Error body returned by the store, `{"detail": ...}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// Flattens `detail` into text; validation errors come back as arrays.
    pub fn detail_text(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}
