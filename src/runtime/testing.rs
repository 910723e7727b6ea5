//! Mock implementations for testing
//!
//! These mocks enable runtime and API tests without a chat service.

use super::{DatabaseStorage, RuntimeManager};
use crate::chat_backend::{BackendCall, ChatBackend, ChatBackendError, HistoryEntry};
use crate::db::{Bot, ConvMode, Conversation, Database, Persona, Script, Step, StepDraft, Subscriber};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Chat Backend
// ============================================================================

/// One call received by the mock backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub call: BackendCall,
    pub session_id: String,
    pub message: String,
    pub history: Vec<HistoryEntry>,
    pub persona: Option<Persona>,
}

type CallHook = Box<dyn FnOnce() + Send>;

/// Mock chat backend that returns queued replies
#[derive(Default)]
pub struct MockChatBackend {
    responses: Mutex<VecDeque<Result<String, ChatBackendError>>>,
    /// Runs inside the next call, before it answers
    hook: Mutex<Option<CallHook>>,
    /// Record of all calls made
    pub calls: Mutex<Vec<RecordedCall>>,
}

#[allow(dead_code)]
impl MockChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(reply.into()));
    }

    /// Queue a failure
    pub fn queue_error(&self, error: ChatBackendError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Run `hook` while the next call is in flight
    pub fn before_next_reply(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Get recorded calls
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(
        &self,
        call: BackendCall,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: Option<&Persona>,
    ) -> Result<String, ChatBackendError> {
        self.calls.lock().unwrap().push(RecordedCall {
            call,
            session_id: session_id.to_string(),
            message: message.to_string(),
            history: history.to_vec(),
            persona: persona.cloned(),
        });
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChatBackendError::network("No mock response queued")))
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn personality_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
    ) -> Result<String, ChatBackendError> {
        self.respond(BackendCall::Personality, session_id, message, history, Some(persona))
    }

    async fn script_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
        script: &str,
    ) -> Result<String, ChatBackendError> {
        let call = BackendCall::Script {
            script: script.to_string(),
        };
        self.respond(call, session_id, message, history, Some(persona))
    }

    async fn script_media(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
        script: &str,
        media: &str,
    ) -> Result<String, ChatBackendError> {
        let call = BackendCall::ScriptMedia {
            script: script.to_string(),
            media: media.to_string(),
        };
        self.respond(call, session_id, message, history, Some(persona))
    }

    async fn unpersona_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<String, ChatBackendError> {
        self.respond(BackendCall::Unpersona, session_id, message, history, None)
    }
}

// ============================================================================
// Test Environment
// ============================================================================

pub type TestManager = RuntimeManager<DatabaseStorage, Arc<MockChatBackend>>;

/// In-memory database with the creator bot, one subscriber and a runtime
/// manager wired to a mock backend
pub struct TestEnv {
    pub db: Database,
    pub backend: Arc<MockChatBackend>,
    pub manager: Arc<TestManager>,
    pub bot: Bot,
    pub subscriber: Subscriber,
}

#[allow(dead_code)]
impl TestEnv {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let bot = db.ensure_single_creator().unwrap();
        let subscriber = db.upsert_subscriber("fan", Some("Fan")).unwrap();
        let backend = Arc::new(MockChatBackend::new());
        let manager = Arc::new(RuntimeManager::new(
            DatabaseStorage::new(db.clone()),
            Arc::clone(&backend),
            20,
        ));
        Self {
            db,
            backend,
            manager,
            bot,
            subscriber,
        }
    }

    /// Create a script with the given steps
    pub fn script(&self, drafts: &[StepDraft]) -> (Script, Vec<Step>) {
        let script = self.db.create_script("Test script", None).unwrap();
        let steps = drafts
            .iter()
            .map(|draft| self.db.add_step(script.id, draft).unwrap())
            .collect();
        (script, steps)
    }

    pub fn conversation(&self, mode: ConvMode, script_id: Option<i64>) -> Conversation {
        self.db
            .create_conversation(self.subscriber.id, self.bot.id, mode, script_id)
            .unwrap()
    }

    /// Paywall step draft with title and price
    pub fn paywall(text: &str, title: &str, price: &str) -> StepDraft {
        StepDraft {
            title: Some(title.to_string()),
            price: Some(price.to_string()),
            ..StepDraft::new(crate::db::StepKind::PaywallText, text)
        }
    }
}
