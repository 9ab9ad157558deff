//! Classification boundary: free-text email in, [`Classification`] out.
//!
//! The model only fills a structured form; everything it returns is checked
//! against the closed status set before it reaches reconciliation.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use shared::{ApplicationStatus, Classification, ClassificationKind};

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;

/// Turns a composed email into a structured event.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError>;
}

/// Classify, retrying once. The caller decides what a second failure means.
pub async fn classify_with_retry(
    classifier: &dyn Classifier,
    text: &str,
) -> Result<Classification, ClassifierError> {
    match classifier.classify(text).await {
        Ok(classification) => Ok(classification),
        Err(first) => {
            tracing::warn!(error = %first, "Classification failed, retrying once");
            classifier.classify(text).await
        }
    }
}

const SYSTEM_PROMPT: &str = "\
You read a single email received by a job seeker and fill in a form about it.

Set `type` to:
- 1 when the email is an automated confirmation that a job application was received.
- 2 when the email reports a decision or next step on an application: a rejection, \
an interview or call invitation, or an offer.
- 0 for anything else.

For types 1 and 2 set `company_name` to the hiring company and `job_title` to the \
position exactly as named in the email. For type 0 set both to \"-\".

Set `status` to one of: PENDING_RESPONSE, REJECTED, INTERVIEW_SCHEDULED, \
TALK_SCHEDULED, OFFER_RECEIVED. Use PENDING_RESPONSE for type 1. Use \"-\" for type 0.

Set `date` to the date of the email as DD/MM/YYYY, or \"-\" when unknown.";

/// Raw structured output before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierOutput {
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub date: String,
}

impl ClassifierOutput {
    pub fn into_classification(self) -> Result<Classification, ClassifierError> {
        let kind = match self.kind {
            0 => return Ok(Classification::none()),
            1 => ClassificationKind::NewApplication,
            2 => ClassificationKind::StatusEvent,
            other => return Err(ClassifierError::UnknownKind(other)),
        };

        let company_name = placeholder_to_empty(&self.company_name);
        let job_title = placeholder_to_empty(&self.job_title);
        if company_name.is_empty() {
            return Err(ClassifierError::Incomplete("missing company name"));
        }
        if job_title.is_empty() {
            return Err(ClassifierError::Incomplete("missing job title"));
        }

        let status = match placeholder_to_empty(&self.status) {
            "" => None,
            raw => Some(raw.parse::<ApplicationStatus>()?),
        };
        if kind == ClassificationKind::StatusEvent && status.is_none() {
            return Err(ClassifierError::Incomplete("status event without a status"));
        }

        Ok(Classification {
            kind,
            company_name: company_name.to_string(),
            job_title: job_title.to_string(),
            status,
            date: parse_date(&self.date),
        })
    }
}

fn placeholder_to_empty(value: &str) -> &str {
    match value.trim() {
        "-" => "",
        trimmed => trimmed,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = placeholder_to_empty(raw);
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|e| tracing::debug!(date = raw, error = %e, "Ignoring unparsable date"))
        .ok()
}

/// Classifier backed by an OpenAI-compatible chat completion endpoint.
pub struct OpenAiClassifier {
    config: ClassifierConfig,
    http: reqwest::Client,
}

impl OpenAiClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let statuses: Vec<&str> = std::iter::once("-")
            .chain(ApplicationStatus::ALL.iter().map(|s| s.code()))
            .collect();

        json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "email_classification",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "type": { "type": "integer", "enum": [0, 1, 2] },
                            "company_name": { "type": "string" },
                            "job_title": { "type": "string" },
                            "status": { "type": "string", "enum": statuses },
                            "date": { "type": "string" },
                        },
                        "required": ["type", "company_name", "job_title", "status", "date"],
                        "additionalProperties": false,
                    },
                },
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        tracing::debug!(model = %self.config.model, "Sending classification request");

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ClassifierError::Malformed("no choices in response".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(ClassifierError::Malformed(format!("model refused: {refusal}")));
        }

        let content = message
            .content
            .ok_or_else(|| ClassifierError::Malformed("empty message content".to_string()))?;

        let output: ClassifierOutput = serde_json::from_str(&content)
            .map_err(|e| ClassifierError::Malformed(format!("{e}: {content}")))?;

        output.into_classification()
    }
}
