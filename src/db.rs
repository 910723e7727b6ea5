//! Database module for the creator console
//!
//! Provides persistence for the creator bot, scripts and their steps,
//! subscribers, conversations and messages.

mod schema;

pub use schema::*;
use schema::{MIGRATION_ADD_COLUMNS, MIGRATION_LEGACY_PAYWALL};

use crate::chat_backend::HistoryEntry;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Bot not found: {0}")]
    BotNotFound(i64),
    #[error("Script not found: {0}")]
    ScriptNotFound(i64),
    #[error("Step not found: {0}")]
    StepNotFound(i64),
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(i64),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(i64),
    #[error("No creator bot exists")]
    NoCreatorBot,
    #[error("Step text must not be empty")]
    EmptyStepText,
    #[error("Username must not be empty")]
    EmptyUsername,
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

const DEFAULT_SCRIPT_NAME: &str = "Script";

const BOT_COLUMNS: &str = "id, name, persona_json, created_at, updated_at";
const SCRIPT_COLUMNS: &str = "id, name, description, bot_id, created_at, updated_at";
const STEP_COLUMNS: &str =
    "id, script_id, position, step_type, title, script_text, media_desc, price, created_at, updated_at";
const SUBSCRIBER_COLUMNS: &str = "id, username, display_name, created_at";
/// A script id whose script row is gone reads back as `NULL`
const CONVERSATION_COLUMNS: &str = "c.id, c.subscriber_id, c.bot_id, sc.id, c.mode, c.current_step,
     c.paywall_unlocked, c.script_started, c.paywall_counter, c.created_at, c.updated_at";
const CONVERSATION_FROM: &str =
    "FROM conversations c LEFT JOIN scripts sc ON sc.id = c.script_id";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;

        // Columns may already exist
        for statement in MIGRATION_ADD_COLUMNS {
            if let Err(e) = conn.execute(statement, []) {
                log_migration_error(statement, &e);
            }
        }

        // Fails on databases that never had `is_paywall`
        if let Err(e) = conn.execute_batch(MIGRATION_LEGACY_PAYWALL) {
            log_migration_error("legacy paywall flag", &e);
        }

        Ok(())
    }

    // ==================== Bot Operations ====================

    /// Enforce the single creator bot.
    ///
    /// Creates it with the default persona when no bot exists. Otherwise the
    /// most recently updated bot survives, every conversation and script of
    /// the others is re-pointed to it and the others are deleted.
    pub fn ensure_single_creator(&self) -> DbResult<Bot> {
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let now = format_datetime(&Utc::now());

            let ids: Vec<i64> = tx
                .prepare("SELECT id FROM bots ORDER BY updated_at DESC, id DESC")?
                .query_map([], |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            match ids.split_first() {
                None => {
                    let persona = serde_json::to_string(&Persona::default())
                        .unwrap_or_else(|_| "{}".to_string());
                    tx.execute(
                        "INSERT INTO bots (name, persona_json, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?3)",
                        params![CREATOR_NAME, persona, now],
                    )?;
                    tracing::info!("Created default creator bot");
                }
                Some((&keep, others)) => {
                    for &other in others {
                        tx.execute(
                            "UPDATE conversations SET bot_id = ?1 WHERE bot_id = ?2",
                            params![keep, other],
                        )?;
                        tx.execute(
                            "UPDATE scripts SET bot_id = ?1 WHERE bot_id = ?2",
                            params![keep, other],
                        )?;
                        tx.execute("DELETE FROM bots WHERE id = ?1", params![other])?;
                    }
                    if !others.is_empty() {
                        tracing::warn!(keep, removed = others.len(), "Merged duplicate bots");
                    }
                    tx.execute(
                        "UPDATE bots SET name = ?1, updated_at = ?2 WHERE id = ?3",
                        params![CREATOR_NAME, now, keep],
                    )?;
                }
            }
            tx.commit()?;
        }
        self.creator_bot()
    }

    /// The creator bot
    pub fn creator_bot(&self) -> DbResult<Bot> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {BOT_COLUMNS} FROM bots ORDER BY updated_at DESC, id DESC LIMIT 1"),
            [],
            parse_bot_row,
        )
        .optional()?
        .ok_or(DbError::NoCreatorBot)
    }

    pub fn get_bot(&self, id: i64) -> DbResult<Bot> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {BOT_COLUMNS} FROM bots WHERE id = ?1"),
            params![id],
            parse_bot_row,
        )
        .optional()?
        .ok_or(DbError::BotNotFound(id))
    }

    /// Rename the bot and replace its persona
    pub fn update_bot(&self, id: i64, name: &str, persona: &Persona) -> DbResult<Bot> {
        {
            let conn = self.lock()?;
            let name = non_empty_or(name, CREATOR_NAME);
            let persona = serde_json::to_string(&persona.clone().clamped())
                .unwrap_or_else(|_| "{}".to_string());
            let changed = conn.execute(
                "UPDATE bots SET name = ?1, persona_json = ?2, updated_at = ?3 WHERE id = ?4",
                params![name, persona, format_datetime(&Utc::now()), id],
            )?;
            if changed == 0 {
                return Err(DbError::BotNotFound(id));
            }
        }
        self.get_bot(id)
    }

    // ==================== Script Operations ====================

    /// All scripts, most recently updated first
    pub fn list_scripts(&self) -> DbResult<Vec<Script>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCRIPT_COLUMNS} FROM scripts ORDER BY updated_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], parse_script_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn get_script(&self, id: i64) -> DbResult<Script> {
        let conn = self.lock()?;
        get_script_internal(&conn, id)
    }

    /// Create a script owned by the creator bot
    pub fn create_script(&self, name: &str, description: Option<&str>) -> DbResult<Script> {
        let id = {
            let conn = self.lock()?;
            let now = format_datetime(&Utc::now());
            conn.execute(
                "INSERT INTO scripts (name, description, bot_id, created_at, updated_at)
                 VALUES (?1, ?2, (SELECT id FROM bots ORDER BY updated_at DESC, id DESC LIMIT 1), ?3, ?3)",
                params![
                    non_empty_or(name, DEFAULT_SCRIPT_NAME),
                    description.and_then(non_blank),
                    now
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.get_script(id)
    }

    pub fn update_script(&self, id: i64, name: &str, description: Option<&str>) -> DbResult<Script> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE scripts SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                non_empty_or(name, DEFAULT_SCRIPT_NAME),
                description.and_then(non_blank),
                format_datetime(&Utc::now()),
                id
            ],
        )?;
        if changed == 0 {
            return Err(DbError::ScriptNotFound(id));
        }
        get_script_internal(&conn, id)
    }

    /// Delete a script and its steps. Conversations using it lose their script.
    pub fn delete_script(&self, id: i64) -> DbResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM scripts WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::ScriptNotFound(id));
        }
        Ok(())
    }

    // ==================== Step Operations ====================

    /// Steps of a script in position order
    pub fn list_steps(&self, script_id: i64) -> DbResult<Vec<Step>> {
        let conn = self.lock()?;
        list_steps_internal(&conn, script_id)
    }

    pub fn get_step(&self, id: i64) -> DbResult<Step> {
        let conn = self.lock()?;
        get_step_internal(&conn, id)
    }

    /// Append a step at the end of the script
    pub fn add_step(&self, script_id: i64, draft: &StepDraft) -> DbResult<Step> {
        let draft = draft.normalized().ok_or(DbError::EmptyStepText)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        get_script_internal(&tx, script_id)?;

        let now = format_datetime(&Utc::now());
        let position: u32 = tx.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM script_steps WHERE script_id = ?1",
            params![script_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO script_steps (script_id, position, step_type, title, script_text, media_desc, price, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                script_id,
                position,
                draft.kind,
                draft.title,
                draft.text,
                draft.media_desc,
                draft.price,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        touch_script(&tx, script_id, &now)?;

        let step = get_step_internal(&tx, id)?;
        tx.commit()?;
        Ok(step)
    }

    /// Replace the editable fields of a step, keeping its position
    pub fn update_step(&self, id: i64, draft: &StepDraft) -> DbResult<Step> {
        let draft = draft.normalized().ok_or(DbError::EmptyStepText)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let script_id = get_step_internal(&tx, id)?.script_id;

        let now = format_datetime(&Utc::now());
        tx.execute(
            "UPDATE script_steps
             SET step_type = ?1, title = ?2, script_text = ?3, media_desc = ?4, price = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                draft.kind,
                draft.title,
                draft.text,
                draft.media_desc,
                draft.price,
                now,
                id
            ],
        )?;
        touch_script(&tx, script_id, &now)?;

        let step = get_step_internal(&tx, id)?;
        tx.commit()?;
        Ok(step)
    }

    /// Delete a step and close the gap in the remaining positions
    pub fn delete_step(&self, id: i64) -> DbResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let script_id = get_step_internal(&tx, id)?.script_id;

        tx.execute("DELETE FROM script_steps WHERE id = ?1", params![id])?;
        let remaining: Vec<i64> = list_steps_internal(&tx, script_id)?
            .into_iter()
            .map(|step| step.id)
            .collect();
        for (step_id, position) in remaining.into_iter().zip(1u32..) {
            tx.execute(
                "UPDATE script_steps SET position = ?1 WHERE id = ?2",
                params![position, step_id],
            )?;
        }
        touch_script(&tx, script_id, &format_datetime(&Utc::now()))?;

        tx.commit()?;
        Ok(())
    }

    /// Swap a step with its neighbour.
    ///
    /// Returns `false` without changes when the step is already at that end
    /// or does not belong to the script.
    pub fn move_step(&self, script_id: i64, step_id: i64, direction: MoveDirection) -> DbResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let steps = list_steps_internal(&tx, script_id)?;

        let Some(index) = steps.iter().position(|step| step.id == step_id) else {
            return Ok(false);
        };
        let neighbour = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|next| *next < steps.len()),
        };
        let Some(neighbour) = neighbour else {
            return Ok(false);
        };

        let (a, b) = (&steps[index], &steps[neighbour]);
        tx.execute(
            "UPDATE script_steps SET position = ?1 WHERE id = ?2",
            params![b.position, a.id],
        )?;
        tx.execute(
            "UPDATE script_steps SET position = ?1 WHERE id = ?2",
            params![a.position, b.id],
        )?;
        touch_script(&tx, script_id, &format_datetime(&Utc::now()))?;

        tx.commit()?;
        Ok(true)
    }

    // ==================== Subscriber Operations ====================

    /// All subscribers, newest first
    pub fn list_subscribers(&self) -> DbResult<Vec<Subscriber>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], parse_subscriber_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn get_subscriber(&self, id: i64) -> DbResult<Subscriber> {
        let conn = self.lock()?;
        get_subscriber_internal(&conn, id)
    }

    /// Find or create the subscriber with this username.
    ///
    /// A provided display name replaces the stored one. Losing an insert race
    /// on the unique username resolves to the row that won.
    pub fn upsert_subscriber(&self, username: &str, display_name: Option<&str>) -> DbResult<Subscriber> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DbError::EmptyUsername);
        }
        let display_name = display_name.and_then(non_blank);

        let conn = self.lock()?;
        let id = match find_subscriber_id(&conn, username)? {
            Some(id) => {
                if display_name.is_some() {
                    conn.execute(
                        "UPDATE subscribers SET display_name = ?1 WHERE id = ?2",
                        params![display_name, id],
                    )?;
                }
                id
            }
            None => match conn.execute(
                "INSERT INTO subscribers (username, display_name, created_at) VALUES (?1, ?2, ?3)",
                params![username, display_name, format_datetime(&Utc::now())],
            ) {
                Ok(_) => conn.last_insert_rowid(),
                Err(e) if is_constraint_violation(&e) => {
                    tracing::debug!(username, "Subscriber insert raced, using existing row");
                    find_subscriber_id(&conn, username)?.ok_or(DbError::Sqlite(e))?
                }
                Err(e) => return Err(e.into()),
            },
        };
        get_subscriber_internal(&conn, id)
    }

    /// Delete a subscriber with all their conversations
    pub fn delete_subscriber(&self, id: i64) -> DbResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM subscribers WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::SubscriberNotFound(id));
        }
        Ok(())
    }

    // ==================== Conversation Operations ====================

    /// Create a new conversation with fresh progression
    pub fn create_conversation(
        &self,
        subscriber_id: i64,
        bot_id: i64,
        mode: ConvMode,
        script_id: Option<i64>,
    ) -> DbResult<Conversation> {
        let conn = self.lock()?;
        let id = insert_conversation(&conn, subscriber_id, bot_id, &ConvState::new(mode, script_id))?;
        get_conversation_internal(&conn, id)
    }

    /// Most recent conversation for subscriber, bot, mode and script, created
    /// when there is none
    pub fn get_or_create_conversation(
        &self,
        subscriber_id: i64,
        bot_id: i64,
        mode: ConvMode,
        script_id: Option<i64>,
    ) -> DbResult<Conversation> {
        let state = ConvState::new(mode, script_id);
        let conn = self.lock()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM conversations
                 WHERE subscriber_id = ?1 AND bot_id = ?2 AND mode = ?3 AND script_id IS ?4
                 ORDER BY updated_at DESC, id DESC LIMIT 1",
                params![subscriber_id, bot_id, state.mode, state.script_id],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => id,
            None => insert_conversation(&conn, subscriber_id, bot_id, &state)?,
        };
        get_conversation_internal(&conn, id)
    }

    pub fn get_conversation(&self, id: i64) -> DbResult<Conversation> {
        let conn = self.lock()?;
        get_conversation_internal(&conn, id)
    }

    /// All conversations with their display names, most recent first
    pub fn list_conversations(&self) -> DbResult<Vec<ConversationSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS},
                    COALESCE(s.username, ''), s.display_name, COALESCE(b.name, ''), sc.name
             {CONVERSATION_FROM}
             LEFT JOIN subscribers s ON s.id = c.subscriber_id
             LEFT JOIN bots b ON b.id = c.bot_id
             ORDER BY c.updated_at DESC, c.id DESC"
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok(ConversationSummary {
                conversation: parse_conversation_row(row)?,
                subscriber_username: row.get(11)?,
                subscriber_display_name: row.get(12)?,
                bot_name: row.get(13)?,
                script_name: row.get(14)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Delete a conversation and its messages
    pub fn delete_conversation(&self, id: i64) -> DbResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::ConversationNotFound(id));
        }
        Ok(())
    }

    /// Persist mode, script and progression of a conversation
    pub fn save_state(&self, id: i64, state: &ConvState) -> DbResult<()> {
        let conn = self.lock()?;
        write_state(&conn, id, state)
    }

    /// Delete every message and write the reset state in one transaction
    pub fn reset_conversation(&self, id: i64, state: &ConvState) -> DbResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE conversation_id = ?1", params![id])?;
        write_state(&tx, id, state)?;
        tx.commit()?;
        Ok(())
    }

    /// Finish a message exchange in one transaction.
    ///
    /// The assistant reply is always appended. `new` is written only if the
    /// persisted state still equals `expected`; a state changed underneath
    /// the exchange (a script deleted mid-call) is left as it is.
    pub fn commit_exchange(
        &self,
        id: i64,
        expected: &ConvState,
        new: Option<&ConvState>,
        reply: &str,
    ) -> DbResult<ExchangeCommit> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut state_saved = false;
        if let Some(new) = new {
            let current = get_conversation_internal(&tx, id)?.state;
            if &current == expected {
                write_state(&tx, id, new)?;
                state_saved = true;
            } else {
                tracing::warn!(conv_id = id, "Conversation changed during the exchange, keeping its state");
            }
        }
        let reply = insert_message(&tx, id, MessageRole::Assistant, reply)?;

        tx.commit()?;
        Ok(ExchangeCommit { reply, state_saved })
    }

    // ==================== Message Operations ====================

    /// Append a message to a conversation
    pub fn add_message(&self, conversation_id: i64, role: MessageRole, content: &str) -> DbResult<Message> {
        let conn = self.lock()?;
        insert_message(&conn, conversation_id, role, content)
    }

    /// The last `limit` messages of a conversation, oldest first
    pub fn list_messages(&self, conversation_id: i64, limit: usize) -> DbResult<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, created_at FROM (
                 SELECT id, conversation_id, role, content, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY id DESC LIMIT ?2
             ) ORDER BY id ASC",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![conversation_id, limit], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Trailing history in the shape the chat backend expects
    pub fn recent_history(&self, conversation_id: i64, limit: usize) -> DbResult<Vec<HistoryEntry>> {
        Ok(self
            .list_messages(conversation_id, limit)?
            .into_iter()
            .map(|message| HistoryEntry::new(message.role, message.content))
            .collect())
    }
}

// ==================== Internal helpers ====================

fn get_script_internal(conn: &Connection, id: i64) -> DbResult<Script> {
    conn.query_row(
        &format!("SELECT {SCRIPT_COLUMNS} FROM scripts WHERE id = ?1"),
        params![id],
        parse_script_row,
    )
    .optional()?
    .ok_or(DbError::ScriptNotFound(id))
}

fn touch_script(conn: &Connection, script_id: i64, now: &str) -> DbResult<()> {
    conn.execute(
        "UPDATE scripts SET updated_at = ?1 WHERE id = ?2",
        params![now, script_id],
    )?;
    Ok(())
}

fn list_steps_internal(conn: &Connection, script_id: i64) -> DbResult<Vec<Step>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STEP_COLUMNS} FROM script_steps WHERE script_id = ?1 ORDER BY position ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![script_id], parse_step_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

fn get_step_internal(conn: &Connection, id: i64) -> DbResult<Step> {
    conn.query_row(
        &format!("SELECT {STEP_COLUMNS} FROM script_steps WHERE id = ?1"),
        params![id],
        parse_step_row,
    )
    .optional()?
    .ok_or(DbError::StepNotFound(id))
}

fn find_subscriber_id(conn: &Connection, username: &str) -> DbResult<Option<i64>> {
    conn.query_row(
        "SELECT id FROM subscribers WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )
    .optional()
    .map_err(DbError::from)
}

fn get_subscriber_internal(conn: &Connection, id: i64) -> DbResult<Subscriber> {
    conn.query_row(
        &format!("SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE id = ?1"),
        params![id],
        parse_subscriber_row,
    )
    .optional()?
    .ok_or(DbError::SubscriberNotFound(id))
}

fn insert_conversation(conn: &Connection, subscriber_id: i64, bot_id: i64, state: &ConvState) -> DbResult<i64> {
    let now = format_datetime(&Utc::now());
    let progress = &state.progress;
    conn.execute(
        "INSERT INTO conversations (subscriber_id, bot_id, script_id, mode, current_step, paywall_unlocked,
                                    script_started, paywall_counter, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            subscriber_id,
            bot_id,
            state.script_id,
            state.mode,
            progress.current_step,
            progress.paywall_unlocked,
            progress.script_started,
            progress.paywall_counter,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn get_conversation_internal(conn: &Connection, id: i64) -> DbResult<Conversation> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} {CONVERSATION_FROM} WHERE c.id = ?1"),
        params![id],
        parse_conversation_row,
    )
    .optional()?
    .ok_or(DbError::ConversationNotFound(id))
}

fn write_state(conn: &Connection, id: i64, state: &ConvState) -> DbResult<()> {
    let progress = &state.progress;
    let changed = conn.execute(
        "UPDATE conversations
         SET mode = ?1, script_id = ?2, current_step = ?3, paywall_unlocked = ?4,
             script_started = ?5, paywall_counter = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            state.mode,
            state.script_id,
            progress.current_step,
            progress.paywall_unlocked,
            progress.script_started,
            progress.paywall_counter,
            format_datetime(&Utc::now()),
            id
        ],
    )?;
    if changed == 0 {
        return Err(DbError::ConversationNotFound(id));
    }
    Ok(())
}

fn insert_message(conn: &Connection, conversation_id: i64, role: MessageRole, content: &str) -> DbResult<Message> {
    let now = Utc::now();
    let timestamp = format_datetime(&now);
    conn.execute(
        "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![conversation_id, role, content, timestamp],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            DbError::ConversationNotFound(conversation_id)
        } else {
            DbError::Sqlite(e)
        }
    })?;
    let id = conn.last_insert_rowid();

    // Update conversation timestamp
    conn.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        params![timestamp, conversation_id],
    )?;

    Ok(Message {
        id,
        conversation_id,
        role,
        content: content.to_string(),
        created_at: now,
    })
}

fn parse_bot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bot> {
    Ok(Bot {
        id: row.get(0)?,
        name: row.get(1)?,
        persona: Persona::from_json(&row.get::<_, String>(2)?),
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn parse_script_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Script> {
    Ok(Script {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        bot_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn parse_step_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Step> {
    Ok(Step {
        id: row.get(0)?,
        script_id: row.get(1)?,
        position: row.get(2)?,
        kind: row.get(3)?,
        title: row.get(4)?,
        text: row.get(5)?,
        media_desc: row.get(6)?,
        price: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        updated_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn parse_subscriber_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscriber> {
    Ok(Subscriber {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn parse_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        subscriber_id: row.get(1)?,
        bot_id: row.get(2)?,
        state: ConvState {
            script_id: row.get(3)?,
            mode: row.get(4)?,
            progress: Progress {
                current_step: row.get(5)?,
                paywall_unlocked: row.get(6)?,
                script_started: row.get(7)?,
                paywall_counter: row.get(8)?,
            },
        },
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        updated_at: parse_datetime(&row.get::<_, String>(10)?),
    })
}

fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

/// "duplicate column" and "no such column" are how an already-applied or
/// inapplicable migration fails
fn is_expected_migration_error(error: &rusqlite::Error) -> bool {
    match error {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            message.contains("duplicate column") || message.contains("no such column")
        }
        _ => false,
    }
}

fn log_migration_error(migration: &str, error: &rusqlite::Error) {
    if is_expected_migration_error(error) {
        tracing::debug!(migration, error = %error, "Migration skipped");
    } else {
        tracing::warn!(migration, error = %error, "Migration failed");
    }
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    non_blank(value).unwrap_or(default)
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

/// Step with the given position, for engine tests that never touch SQLite
#[cfg(test)]
pub fn test_step(position: u32, kind: StepKind, text: &str) -> Step {
    let now = Utc::now();
    Step {
        id: i64::from(position),
        script_id: 1,
        position,
        kind,
        title: None,
        text: text.to_string(),
        media_desc: None,
        price: None,
        created_at: now,
        updated_at: now,
    }
}
