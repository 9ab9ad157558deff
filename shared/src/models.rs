use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a job application, as stored by the Application Store.
///
/// The serialized form is the store's label (`"Pending Response"`), the
/// `Display` form is the code (`PENDING_RESPONSE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[serde(rename = "Pending Response")]
    PendingResponse,
    #[serde(rename = "Rejected")]
    Rejected,
    #[serde(rename = "Interview Scheduled")]
    InterviewScheduled,
    #[serde(rename = "Talk Scheduled")]
    TalkScheduled,
    #[serde(rename = "Offer Received")]
    OfferReceived,
}

/// A status string outside the closed [`ApplicationStatus`] set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown application status: {0:?}")]
pub struct UnknownStatus(pub String);

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 5] = [
        ApplicationStatus::PendingResponse,
        ApplicationStatus::Rejected,
        ApplicationStatus::InterviewScheduled,
        ApplicationStatus::TalkScheduled,
        ApplicationStatus::OfferReceived,
    ];

    /// Label used on the wire by the Application Store.
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::PendingResponse => "Pending Response",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::InterviewScheduled => "Interview Scheduled",
            ApplicationStatus::TalkScheduled => "Talk Scheduled",
            ApplicationStatus::OfferReceived => "Offer Received",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApplicationStatus::PendingResponse => "PENDING_RESPONSE",
            ApplicationStatus::Rejected => "REJECTED",
            ApplicationStatus::InterviewScheduled => "INTERVIEW_SCHEDULED",
            ApplicationStatus::TalkScheduled => "TALK_SCHEDULED",
            ApplicationStatus::OfferReceived => "OFFER_RECEIVED",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ApplicationStatus {
    type Err = UnknownStatus;

    /// Accepts either the code or the store label, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| {
                status.code().eq_ignore_ascii_case(trimmed)
                    || status.label().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// What kind of event a classified email represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationKind {
    /// Not related to a job application.
    None,
    /// Confirmation that an application was received.
    NewApplication,
    /// A status change on an existing application.
    StatusEvent,
}

/// Structured result of classifying one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ClassificationKind,
    pub company_name: String,
    pub job_title: String,
    pub status: Option<ApplicationStatus>,
    pub date: Option<NaiveDate>,
}

impl Classification {
    pub fn none() -> Self {
        Self {
            kind: ClassificationKind::None,
            company_name: String::new(),
            job_title: String::new(),
            status: None,
            date: None,
        }
    }

    pub fn new_application(company_name: impl Into<String>, job_title: impl Into<String>) -> Self {
        Self {
            kind: ClassificationKind::NewApplication,
            company_name: company_name.into(),
            job_title: job_title.into(),
            status: None,
            date: None,
        }
    }

    pub fn status_event(
        company_name: impl Into<String>,
        job_title: impl Into<String>,
        status: ApplicationStatus,
    ) -> Self {
        Self {
            kind: ClassificationKind::StatusEvent,
            company_name: company_name.into(),
            job_title: job_title.into(),
            status: Some(status),
            date: None,
        }
    }
}

/// Application row owned by the Application Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub app_id: i64,
    pub email: String,
    pub company_name: String,
    pub job_title: String,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub app_date: Option<NaiveDate>,
}

/// Login for one user's mailbox.
#[derive(Clone, PartialEq, Eq)]
pub struct MailboxCredential {
    pub email: String,
    pub app_password: String,
}

impl fmt::Debug for MailboxCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredential")
            .field("email", &self.email)
            .field("app_password", &"<redacted>")
            .finish()
    }
}

/// A user whose mailbox is currently eligible for polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListeningUser {
    pub email: String,
    pub credential: MailboxCredential,
}
