use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub store: StoreConfig,
    pub classifier: ClassifierConfig,
    pub imap: ImapConfig,
    pub scheduler: SchedulerConfig,
}

/// Application Store HTTP client settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_in_flight: usize,
    pub read_retries: u32,
}

#[derive(Clone)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub server: String,
    pub port: u16,
    /// Limit on each connect, login and command round trip
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed interval between the starts of consecutive cycles
    pub poll_interval: Duration,
    /// Consecutive user-listing failures before the cool-down kicks in
    pub max_failures: u32,
    pub failure_cooldown: Duration,
    pub max_concurrent_users: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_failures: 3,
            failure_cooldown: Duration::from_secs(300), // 5 minutes
            max_concurrent_users: 1,
        }
    }
}

impl PollerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            store: StoreConfig {
                base_url: env::var("DB_API_ADDY").context("DB_API_ADDY must be set")?,
                timeout: Duration::from_secs(parse_or("STORE_TIMEOUT_SECS", 30)?),
                max_in_flight: parse_or("STORE_MAX_IN_FLIGHT", 4)?,
                read_retries: parse_or("STORE_READ_RETRIES", 3)?,
            },
            classifier: ClassifierConfig {
                base_url: env::var("CLASSIFIER_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
                model: env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                timeout: Duration::from_secs(parse_or("CLASSIFIER_TIMEOUT_SECS", 60)?),
            },
            imap: ImapConfig {
                server: env::var("IMAP_SERVER").unwrap_or_else(|_| "imap.gmail.com".to_string()),
                port: parse_or("IMAP_PORT", 993)?,
                timeout: Duration::from_secs(parse_or("IMAP_TIMEOUT_SECS", 30)?),
            },
            scheduler: SchedulerConfig {
                poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 60)?),
                max_failures: parse_or("MAX_USER_LIST_FAILURES", 3)?,
                failure_cooldown: Duration::from_secs(parse_or("FAILURE_COOLDOWN_SECS", 300)?),
                max_concurrent_users: parse_or::<usize>("MAX_CONCURRENT_USERS", 1)?.max(1),
            },
        })
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}
