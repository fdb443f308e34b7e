use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    auth::{AuthStateStore, TokenStore},
    email::{
        client::{MailboxError, MailboxGateway, MailboxResult, MessagePage, TagOutcome},
        message::Message,
    },
    prompt::{Category, ClassificationEngine, ClassificationResult, Classifier},
    rate_limiters::RateLimiters,
    server_config::{ModelConfig, OAuthConfig},
    state::{
        reconciler::ReconcilerSettings, CycleDriver, InboxReconciler, LedgerEntry,
        ProcessingStore,
    },
    HttpClient, ServerState,
};

/// Server state wired to a scripted mailbox and the keyword classifier
pub fn test_server_state(mailbox: Arc<ScriptedMailbox>, oauth_authority: &str) -> ServerState {
    let http_client = HttpClient::new();
    let engine = ClassificationEngine::keyword_only();
    let mailbox: Arc<dyn MailboxGateway> = mailbox;
    let reconciler = InboxReconciler::new(
        mailbox.clone(),
        Arc::new(engine.clone()),
        ProcessingStore::new(),
        ReconcilerSettings {
            folder: "inbox".to_string(),
            batch_size: 50,
            max_concurrent_classifications: 4,
        },
    );
    let driver = CycleDriver::new(reconciler.clone(), 60);

    ServerState {
        http_client,
        oauth: Arc::new(test_oauth_config(oauth_authority)),
        token_store: TokenStore::new(),
        auth_states: AuthStateStore::new(3600),
        engine,
        mailbox,
        reconciler,
        driver,
        rate_limiters: RateLimiters::new(10, 1000, 10),
    }
}

pub fn test_oauth_config(authority: &str) -> OAuthConfig {
    OAuthConfig {
        client_id: "client-1".to_string(),
        client_secret: "secret-1".to_string(),
        tenant_id: "tenant-1".to_string(),
        redirect_uri: "http://localhost:8000/auth/callback".to_string(),
        authority: authority.trim_end_matches('/').to_string(),
        scopes: vec![
            "offline_access".to_string(),
            "https://graph.microsoft.com/Mail.Read".to_string(),
            "https://graph.microsoft.com/Mail.ReadWrite".to_string(),
        ],
        state_ttl_secs: 3600,
    }
}

pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        deployment: "gpt-4o-mini".to_string(),
        api_version: "2024-12-01-preview".to_string(),
        temperature: 0.3,
        max_tokens: 200,
        request_timeout_secs: 1,
    }
}

pub fn test_message(
    local_id: &str,
    internet_message_id: Option<&str>,
    received_at: Option<DateTime<Utc>>,
) -> Message {
    Message {
        id: local_id.to_string(),
        internet_message_id: internet_message_id.map(String::from),
        subject: format!("Subject of {local_id}"),
        body_preview: "Body preview".to_string(),
        sender_address: "sender@uiowa.edu".to_string(),
        received_at,
    }
}

pub fn ledger_entry(internet_message_id: &str) -> LedgerEntry {
    LedgerEntry {
        internet_message_id: internet_message_id.to_string(),
        result: ClassificationResult::new(Category::Other, 0.5, "test"),
        processed_at: Utc::now(),
        subject: "subject".to_string(),
        sender: "sender@uiowa.edu".to_string(),
        tag_applied: true,
    }
}

/// In-memory mailbox returning the same page on every fetch
#[derive(Default)]
pub struct ScriptedMailbox {
    messages: Mutex<Vec<Message>>,
    fetch_errors: Mutex<VecDeque<MailboxError>>,
    failing_tags: Mutex<HashSet<String>>,
    tags: Mutex<HashMap<String, Vec<String>>>,
    fetch_delay: Option<Duration>,
    fetch_calls: AtomicUsize,
}

impl ScriptedMailbox {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: Mutex::new(messages),
            ..Default::default()
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn set_messages(&self, messages: Vec<Message>) {
        *self.messages.lock().unwrap() = messages;
    }

    pub fn fail_next_fetch(&self, error: MailboxError) {
        self.fetch_errors.lock().unwrap().push_back(error);
    }

    pub fn fail_tag_for(&self, local_id: &str) {
        self.failing_tags.lock().unwrap().insert(local_id.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Every (local id, category) pair applied so far
    pub fn tags(&self) -> Vec<(String, String)> {
        let tags = self.tags.lock().unwrap();
        let mut pairs: Vec<_> = tags
            .iter()
            .flat_map(|(id, categories)| categories.iter().map(|c| (id.clone(), c.clone())))
            .collect();
        pairs.sort();
        pairs
    }
}

#[async_trait]
impl MailboxGateway for ScriptedMailbox {
    async fn fetch(
        &self,
        _folder: &str,
        page_size: u32,
        offset: u32,
    ) -> MailboxResult<MessagePage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.fetch_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        let messages = self.messages.lock().unwrap();
        let page: Vec<Message> = messages
            .iter()
            .skip(offset as usize)
            .take(page_size as usize)
            .cloned()
            .collect();
        let has_more = messages.len() > offset as usize + page.len();
        Ok(MessagePage {
            messages: page,
            has_more,
        })
    }

    async fn tag(&self, message_local_id: &str, category: &str) -> MailboxResult<TagOutcome> {
        if self.failing_tags.lock().unwrap().contains(message_local_id) {
            return Err(MailboxError::Provider {
                status: 500,
                body: "tag write failed".to_string(),
            });
        }

        let mut tags = self.tags.lock().unwrap();
        let categories = tags.entry(message_local_id.to_string()).or_default();
        if categories.iter().any(|c| c == category) {
            return Ok(TagOutcome::AlreadyPresent);
        }
        categories.push(category.to_string());
        Ok(TagOutcome::Added)
    }
}

/// Classifier with fixed answers, an optional per-call delay and a subject
/// that makes it panic
pub struct ScriptedClassifier {
    default: Category,
    rules: Vec<(String, Category)>,
    panic_on: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(default: Category) -> Self {
        Self {
            default,
            rules: Vec::new(),
            panic_on: None,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Subjects containing `needle` are classified as `category`
    pub fn with_rule(mut self, needle: &str, category: Category) -> Self {
        self.rules.push((needle.to_string(), category));
        self
    }

    pub fn panic_on(mut self, subject: &str) -> Self {
        self.panic_on = Some(subject.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, subject: &str, _body: &str, _sender: &str) -> ClassificationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on.as_deref() == Some(subject) {
            panic!("scripted classifier panic");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let category = self
            .rules
            .iter()
            .find(|(needle, _)| subject.contains(needle.as_str()))
            .map_or(self.default, |(_, category)| *category);
        ClassificationResult::new(category, 0.9, "scripted")
    }
}
