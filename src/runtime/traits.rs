//! Trait abstractions for runtime I/O
//!
//! These traits let the runtime drive any store; production uses the
//! SQLite `Database` through `DatabaseStorage`.

use crate::chat_backend::HistoryEntry;
use crate::db::{Conversation, Database, DbError, DbResult, ExchangeCommit, Message, MessageRole, Persona, Step};
use crate::state_machine::ConvState;
use async_trait::async_trait;
use std::sync::Arc;

/// Everything one action on a conversation reads before deciding
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub conversation: Conversation,
    /// Steps of the active script, empty when there is none
    pub steps: Vec<Step>,
    /// Persona of the conversation's bot
    pub persona: Persona,
}

/// Storage for conversation messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Add a message to the conversation
    async fn add_message(&self, conv_id: i64, role: MessageRole, content: &str) -> DbResult<Message>;

    /// The last `limit` messages, oldest first
    async fn recent_history(&self, conv_id: i64, limit: usize) -> DbResult<Vec<HistoryEntry>>;
}

/// Storage for conversation state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the conversation with its active steps and persona
    async fn load_snapshot(&self, conv_id: i64) -> DbResult<ConversationSnapshot>;

    async fn get_conversation(&self, conv_id: i64) -> DbResult<Conversation>;

    /// Persist mode, script and progression
    async fn save_state(&self, conv_id: i64, state: &ConvState) -> DbResult<()>;

    /// Delete every message and persist the reset state
    async fn reset_conversation(&self, conv_id: i64, state: &ConvState) -> DbResult<()>;

    /// Store the assistant reply and, when given, the new state if the
    /// persisted state still equals `expected`
    async fn commit_exchange(
        &self,
        conv_id: i64,
        expected: &ConvState,
        new: Option<&ConvState>,
        reply: &str,
    ) -> DbResult<ExchangeCommit>;
}

/// Combined storage trait for convenience
pub trait Storage: MessageStore + StateStore {}
impl<T: MessageStore + StateStore> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn add_message(&self, conv_id: i64, role: MessageRole, content: &str) -> DbResult<Message> {
        (**self).add_message(conv_id, role, content).await
    }

    async fn recent_history(&self, conv_id: i64, limit: usize) -> DbResult<Vec<HistoryEntry>> {
        (**self).recent_history(conv_id, limit).await
    }
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn load_snapshot(&self, conv_id: i64) -> DbResult<ConversationSnapshot> {
        (**self).load_snapshot(conv_id).await
    }

    async fn get_conversation(&self, conv_id: i64) -> DbResult<Conversation> {
        (**self).get_conversation(conv_id).await
    }

    async fn save_state(&self, conv_id: i64, state: &ConvState) -> DbResult<()> {
        (**self).save_state(conv_id, state).await
    }

    async fn reset_conversation(&self, conv_id: i64, state: &ConvState) -> DbResult<()> {
        (**self).reset_conversation(conv_id, state).await
    }

    async fn commit_exchange(
        &self,
        conv_id: i64,
        expected: &ConvState,
        new: Option<&ConvState>,
        reply: &str,
    ) -> DbResult<ExchangeCommit> {
        (**self).commit_exchange(conv_id, expected, new, reply).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persona of the conversation's bot, or the creator's when that bot
    /// no longer exists
    fn persona_for(&self, bot_id: i64) -> DbResult<Persona> {
        match self.db.get_bot(bot_id) {
            Ok(bot) => Ok(bot.persona),
            Err(DbError::BotNotFound(_)) => {
                tracing::warn!(bot_id, "Conversation bot missing, using creator persona");
                Ok(self.db.creator_bot()?.persona)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MessageStore for DatabaseStorage {
    async fn add_message(&self, conv_id: i64, role: MessageRole, content: &str) -> DbResult<Message> {
        self.db.add_message(conv_id, role, content)
    }

    async fn recent_history(&self, conv_id: i64, limit: usize) -> DbResult<Vec<HistoryEntry>> {
        self.db.recent_history(conv_id, limit)
    }
}

#[async_trait]
impl StateStore for DatabaseStorage {
    async fn load_snapshot(&self, conv_id: i64) -> DbResult<ConversationSnapshot> {
        let conversation = self.db.get_conversation(conv_id)?;
        let steps = match conversation.state.script_id {
            Some(script_id) if conversation.state.has_active_script() => self.db.list_steps(script_id)?,
            _ => Vec::new(),
        };
        let persona = self.persona_for(conversation.bot_id)?;
        Ok(ConversationSnapshot {
            conversation,
            steps,
            persona,
        })
    }

    async fn get_conversation(&self, conv_id: i64) -> DbResult<Conversation> {
        self.db.get_conversation(conv_id)
    }

    async fn save_state(&self, conv_id: i64, state: &ConvState) -> DbResult<()> {
        self.db.save_state(conv_id, state)
    }

    async fn reset_conversation(&self, conv_id: i64, state: &ConvState) -> DbResult<()> {
        self.db.reset_conversation(conv_id, state)
    }

    async fn commit_exchange(
        &self,
        conv_id: i64,
        expected: &ConvState,
        new: Option<&ConvState>,
        reply: &str,
    ) -> DbResult<ExchangeCommit> {
        self.db.commit_exchange(conv_id, expected, new, reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConvMode, StepDraft, StepKind};

    #[tokio::test]
    async fn test_snapshot_falls_back_to_creator_persona() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("myfancrm.sqlite3");
        let db = Database::open(&path).unwrap();
        let creator = db.ensure_single_creator().unwrap();
        let mut persona = creator.persona.clone();
        persona.base_prompt = "Toujours taquine".to_string();
        db.update_bot(creator.id, &creator.name, &persona).unwrap();
        let sub = db.upsert_subscriber("fan", None).unwrap();
        let conv = db
            .create_conversation(sub.id, creator.id, ConvMode::Free, None)
            .unwrap();

        // Legacy databases ran without foreign keys and kept dangling bot ids
        {
            let raw = rusqlite::Connection::open(&path).unwrap();
            raw.execute_batch("PRAGMA foreign_keys = OFF;").unwrap();
            raw.execute(
                "UPDATE conversations SET bot_id = 999 WHERE id = ?1",
                rusqlite::params![conv.id],
            )
            .unwrap();
        }

        let storage = DatabaseStorage::new(db);
        let snapshot = storage.load_snapshot(conv.id).await.unwrap();
        assert_eq!(snapshot.conversation.bot_id, 999);
        assert_eq!(snapshot.persona, persona);
    }

    #[tokio::test]
    async fn test_snapshot_loads_steps_only_for_active_script() {
        let db = Database::open_in_memory().unwrap();
        let bot = db.ensure_single_creator().unwrap();
        let sub = db.upsert_subscriber("fan", None).unwrap();
        let script = db.create_script("Soirée", None).unwrap();
        db.add_step(script.id, &StepDraft::new(StepKind::Text, "hello")).unwrap();
        let scripted = db
            .create_conversation(sub.id, bot.id, ConvMode::Script, Some(script.id))
            .unwrap();
        let free = db.create_conversation(sub.id, bot.id, ConvMode::Free, None).unwrap();

        let storage = DatabaseStorage::new(db);
        assert_eq!(storage.load_snapshot(scripted.id).await.unwrap().steps.len(), 1);
        assert!(storage.load_snapshot(free.id).await.unwrap().steps.is_empty());
        assert_eq!(storage.load_snapshot(free.id).await.unwrap().persona, bot.persona);
    }
}
