//! Test doubles for the mailbox, classifier and Application Store seams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shared::{
    Application, ApplicationStatus, Classification, ListeningUser, MailboxCredential,
    NewApplicationRequest,
};
use tokio::time::Instant;

use crate::classifier::Classifier;
use crate::error::{ClassifierError, MailboxError, StoreError};
use crate::mailbox::{MailboxConnector, MailboxSession, MessageHandle, RawMessage};
use crate::store::ApplicationStore;

pub fn listening_user(email: &str) -> ListeningUser {
    ListeningUser {
        email: email.to_string(),
        credential: MailboxCredential {
            email: email.to_string(),
            app_password: format!("{email}-password"),
        },
    }
}

// ============================================================================
// Application Store
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    ListUsers,
    Lookup {
        owner: String,
        company: String,
        job_title: String,
    },
    Create {
        owner: String,
        company: String,
        job_title: String,
        status: ApplicationStatus,
    },
    Update {
        app_id: i64,
        status: ApplicationStatus,
    },
}

impl StoreCall {
    fn is_mutation(&self) -> bool {
        matches!(self, StoreCall::Create { .. } | StoreCall::Update { .. })
    }
}

#[derive(Default)]
struct StoreState {
    users: Vec<ListeningUser>,
    applications: Vec<Application>,
    calls: Vec<StoreCall>,
    listing_times: Vec<Instant>,
    failing_listings: u32,
    writes_unavailable: bool,
}

/// Store that enforces the natural key like the real one does.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, email: &str) -> Self {
        self.state
            .get_mut()
            .unwrap()
            .users
            .push(listening_user(email));
        self
    }

    pub fn insert_application(
        &self,
        app_id: i64,
        owner: &str,
        company: &str,
        job_title: &str,
        status: ApplicationStatus,
    ) {
        self.state.lock().unwrap().applications.push(Application {
            app_id,
            email: owner.to_string(),
            company_name: company.to_string(),
            job_title: job_title.to_string(),
            status,
            app_date: None,
        });
    }

    /// Fail the next `n` user listings; `u32::MAX` fails forever.
    pub fn fail_user_listings(&self, n: u32) {
        self.state.lock().unwrap().failing_listings = n;
    }

    pub fn set_writes_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().writes_unavailable = unavailable;
    }

    pub fn applications(&self) -> Vec<Application> {
        let mut applications = self.state.lock().unwrap().applications.clone();
        applications.sort_by_key(|a| a.app_id);
        applications
    }

    pub fn status_of(&self, app_id: i64) -> Option<ApplicationStatus> {
        self.state
            .lock()
            .unwrap()
            .applications
            .iter()
            .find(|a| a.app_id == app_id)
            .map(|a| a.status)
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(StoreCall::is_mutation)
            .collect()
    }

    pub fn listing_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().listing_times.clone()
    }
}

#[async_trait]
impl ApplicationStore for InMemoryStore {
    async fn list_listening_users(&self) -> Result<Vec<ListeningUser>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::ListUsers);
        state.listing_times.push(Instant::now());

        if state.failing_listings > 0 {
            if state.failing_listings != u32::MAX {
                state.failing_listings -= 1;
            }
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(state.users.clone())
    }

    async fn lookup_application_id(
        &self,
        owner_email: &str,
        company_name: &str,
        job_title: &str,
    ) -> Result<i64, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::Lookup {
            owner: owner_email.to_string(),
            company: company_name.to_string(),
            job_title: job_title.to_string(),
        });

        state
            .applications
            .iter()
            .find(|a| {
                a.email == owner_email && a.company_name == company_name && a.job_title == job_title
            })
            .map(|a| a.app_id)
            .ok_or(StoreError::NotFound)
    }

    async fn create_application(
        &self,
        request: &NewApplicationRequest,
    ) -> Result<Application, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::Create {
            owner: request.email.clone(),
            company: request.company_name.clone(),
            job_title: request.job_title.clone(),
            status: request.status,
        });

        if state.writes_unavailable {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        if !state.users.iter().any(|u| u.email == request.email) {
            return Err(StoreError::UnknownOwner(request.email.clone()));
        }
        if state.applications.iter().any(|a| {
            a.email == request.email
                && a.company_name == request.company_name
                && a.job_title == request.job_title
        }) {
            return Err(StoreError::DuplicateKey(format!(
                "{}/{}/{}",
                request.email, request.company_name, request.job_title
            )));
        }

        let app_id = state.applications.iter().map(|a| a.app_id).max().unwrap_or(0) + 1;
        let application = Application {
            app_id,
            email: request.email.clone(),
            company_name: request.company_name.clone(),
            job_title: request.job_title.clone(),
            status: request.status,
            app_date: None,
        };
        state.applications.push(application.clone());
        Ok(application)
    }

    async fn update_application_status(
        &self,
        app_id: i64,
        status: ApplicationStatus,
    ) -> Result<Application, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::Update { app_id, status });

        if state.writes_unavailable {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        let application = state
            .applications
            .iter_mut()
            .find(|a| a.app_id == app_id)
            .ok_or(StoreError::NotFound)?;
        application.status = status;
        Ok(application.clone())
    }
}

// ============================================================================
// Mailbox
// ============================================================================

#[derive(Debug, Clone)]
enum ScriptedMessage {
    Message(RawMessage),
    Undecodable,
    Unfetchable,
}

/// Contents and failure modes of one scripted mailbox.
#[derive(Debug, Clone, Default)]
pub struct MailboxScript {
    messages: Vec<ScriptedMessage>,
    reject_login: bool,
    fail_listing: bool,
}

impl MailboxScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, sender: &str, subject: &str, body: &str) -> Self {
        self.messages.push(ScriptedMessage::Message(RawMessage {
            sender: sender.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        }));
        self
    }

    pub fn undecodable(mut self) -> Self {
        self.messages.push(ScriptedMessage::Undecodable);
        self
    }

    pub fn unfetchable(mut self) -> Self {
        self.messages.push(ScriptedMessage::Unfetchable);
        self
    }

    pub fn reject_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct SessionLog {
    pub opened: Vec<String>,
    pub logged_out: Vec<String>,
    pub fetched: Vec<(String, u32)>,
}

/// Connector serving scripted mailboxes keyed by owner email.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    mailboxes: HashMap<String, MailboxScript>,
    listing_delay: Duration,
    log: Arc<Mutex<SessionLog>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mailbox(mut self, owner: &str, script: MailboxScript) -> Self {
        self.mailboxes.insert(owner.to_string(), script);
        self
    }

    /// Make every `list_unseen` take this long, simulating a slow server.
    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    pub fn log(&self) -> SessionLog {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailboxConnector for ScriptedConnector {
    async fn open(
        &self,
        credential: &MailboxCredential,
    ) -> Result<Box<dyn MailboxSession>, MailboxError> {
        let script = self
            .mailboxes
            .get(&credential.email)
            .filter(|script| !script.reject_login)
            .cloned()
            .ok_or_else(|| MailboxError::Auth {
                email: credential.email.clone(),
                reason: "[AUTHENTICATIONFAILED] Invalid credentials".to_string(),
            })?;

        self.log.lock().unwrap().opened.push(credential.email.clone());

        Ok(Box::new(ScriptedSession {
            owner: credential.email.clone(),
            script,
            listing_delay: self.listing_delay,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedSession {
    owner: String,
    script: MailboxScript,
    listing_delay: Duration,
    log: Arc<Mutex<SessionLog>>,
}

#[async_trait]
impl MailboxSession for ScriptedSession {
    async fn list_unseen(&mut self) -> Result<Vec<MessageHandle>, MailboxError> {
        if !self.listing_delay.is_zero() {
            tokio::time::sleep(self.listing_delay).await;
        }
        if self.script.fail_listing {
            return Err(MailboxError::Protocol("SEARCH failed".to_string()));
        }
        Ok((1..=self.script.messages.len() as u32)
            .map(MessageHandle)
            .collect())
    }

    async fn fetch(&mut self, handle: MessageHandle) -> Result<RawMessage, MailboxError> {
        self.log
            .lock()
            .unwrap()
            .fetched
            .push((self.owner.clone(), handle.0));

        match self.script.messages.get(handle.0 as usize - 1) {
            Some(ScriptedMessage::Message(message)) => Ok(message.clone()),
            Some(ScriptedMessage::Undecodable) => Err(MailboxError::Decode {
                handle,
                reason: "Header cannot start with a space".to_string(),
            }),
            Some(ScriptedMessage::Unfetchable) | None => Err(MailboxError::Fetch {
                handle,
                reason: "connection reset".to_string(),
            }),
        }
    }

    async fn logout(self: Box<Self>) -> Result<(), MailboxError> {
        self.log.lock().unwrap().logged_out.push(self.owner.clone());
        Ok(())
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Returns queued results in order, then `NONE` once the queue is empty.
pub struct ScriptedClassifier {
    results: Mutex<VecDeque<Result<Classification, ClassifierError>>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(results: Vec<Result<Classification, ClassifierError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _text: &str) -> Result<Classification, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Classification::none()))
    }
}

/// Classifies by the `Subject:` line of the composed text.
#[derive(Default)]
pub struct SubjectClassifier {
    rules: HashMap<String, Classification>,
    failing: HashSet<String>,
    seen: Mutex<Vec<String>>,
}

impl SubjectClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, subject: &str, classification: Classification) -> Self {
        self.rules.insert(subject.to_string(), classification);
        self
    }

    /// Every attempt for this subject fails.
    pub fn failing(mut self, subject: &str) -> Self {
        self.failing.insert(subject.to_string());
        self
    }

    /// Subjects of every classify call, in order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for SubjectClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        let subject = text
            .lines()
            .find_map(|line| line.strip_prefix("Subject: "))
            .unwrap_or_default()
            .to_string();
        self.seen.lock().unwrap().push(subject.clone());

        if self.failing.contains(&subject) {
            return Err(ClassifierError::Malformed("truncated JSON".to_string()));
        }
        Ok(self
            .rules
            .get(&subject)
            .cloned()
            .unwrap_or_else(Classification::none))
    }
}
