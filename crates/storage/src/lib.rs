use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pulse_core::{
    should_retitle, title_from_message, ChatMessage, Checkpoint, ConversationSummary, Role,
    NEW_CONVERSATION_TITLE,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

/// Durable per-conversation playback checkpoints. One record per key; a save
/// replaces whatever was stored before.
pub trait CheckpointStore: Send + Sync {
    /// Unreadable records are discarded and reported as absent.
    async fn load_checkpoint(&self, conversation_id: &str) -> Result<Option<Checkpoint>>;
    async fn save_checkpoint(&self, conversation_id: &str, checkpoint: &Checkpoint)
        -> Result<()>;
    async fn delete_checkpoint(&self, conversation_id: &str) -> Result<()>;
}

/// Append-only message log plus the conversation list around it.
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self) -> Result<ConversationSummary>;
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;
    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<()>;
    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;
    async fn append_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<()>;
    async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;
    async fn clear_streaming_flags(&self, conversation_id: &str) -> Result<()>;
}

fn new_conversation_id() -> String {
    format!("chat_{}", Uuid::new_v4().simple())
}

fn decode_checkpoint(conversation_id: &str, raw: &str) -> Option<Checkpoint> {
    match Checkpoint::from_json(raw) {
        Ok(checkpoint) => Some(checkpoint),
        Err(err) => {
            warn!(
                conversation_id = %conversation_id,
                error = %err,
                "discarding unreadable checkpoint"
            );
            None
        }
    }
}

#[derive(Debug, Clone)]
struct ConversationRecord {
    summary: ConversationSummary,
    messages: Vec<ChatMessage>,
}

impl ConversationRecord {
    fn new(id: String) -> Self {
        Self {
            summary: ConversationSummary {
                id,
                title: NEW_CONVERSATION_TITLE.to_string(),
                created_at: Utc::now(),
            },
            messages: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    /// Serialized records, so the unreadable-record path matches SQLite.
    checkpoints: Arc<RwLock<HashMap<String, String>>>,
    /// Newest first.
    conversations: Arc<RwLock<Vec<ConversationRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw checkpoint record as-is, bypassing serialization.
    pub fn put_raw_checkpoint(&self, conversation_id: &str, raw: impl Into<String>) {
        self.checkpoints
            .write()
            .insert(conversation_id.to_string(), raw.into());
    }
}

impl CheckpointStore for MemoryStore {
    async fn load_checkpoint(&self, conversation_id: &str) -> Result<Option<Checkpoint>> {
        let raw = self.checkpoints.read().get(conversation_id).cloned();
        let Some(raw) = raw else {
            return Ok(None);
        };

        let decoded = decode_checkpoint(conversation_id, &raw);
        if decoded.is_none() {
            self.checkpoints.write().remove(conversation_id);
        }
        Ok(decoded)
    }

    async fn save_checkpoint(
        &self,
        conversation_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<()> {
        let raw = checkpoint.to_json()?;
        self.checkpoints
            .write()
            .insert(conversation_id.to_string(), raw);
        Ok(())
    }

    async fn delete_checkpoint(&self, conversation_id: &str) -> Result<()> {
        self.checkpoints.write().remove(conversation_id);
        Ok(())
    }
}

impl ConversationStore for MemoryStore {
    async fn create_conversation(&self) -> Result<ConversationSummary> {
        let record = ConversationRecord::new(new_conversation_id());
        let summary = record.summary.clone();
        self.conversations.write().insert(0, record);
        Ok(summary)
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        Ok(self
            .conversations
            .read()
            .iter()
            .map(|record| record.summary.clone())
            .collect())
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<()> {
        if let Some(record) = self
            .conversations
            .write()
            .iter_mut()
            .find(|record| record.summary.id == conversation_id)
        {
            record.summary.title = title.to_string();
        }
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.conversations
            .write()
            .retain(|record| record.summary.id != conversation_id);
        self.checkpoints.write().remove(conversation_id);
        Ok(())
    }

    async fn append_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<()> {
        let mut conversations = self.conversations.write();
        let position = match conversations
            .iter()
            .position(|record| record.summary.id == conversation_id)
        {
            Some(position) => position,
            None => {
                conversations.insert(0, ConversationRecord::new(conversation_id.to_string()));
                0
            }
        };

        let record = &mut conversations[position];
        if message.role == Role::User && should_retitle(&record.summary.title) {
            record.summary.title = title_from_message(&message.content);
        }
        record.messages.push(message.clone());
        Ok(())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .conversations
            .read()
            .iter()
            .find(|record| record.summary.id == conversation_id)
            .map(|record| record.messages.clone())
            .unwrap_or_default())
    }

    async fn clear_streaming_flags(&self, conversation_id: &str) -> Result<()> {
        if let Some(record) = self
            .conversations
            .write()
            .iter_mut()
            .find(|record| record.summary.id == conversation_id)
        {
            for message in &mut record.messages {
                message.streaming = false;
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
              id TEXT PRIMARY KEY,
              title TEXT NOT NULL,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
              seq INTEGER PRIMARY KEY AUTOINCREMENT,
              conversation_id TEXT NOT NULL,
              id TEXT NOT NULL,
              role TEXT NOT NULL,
              content TEXT NOT NULL,
              timestamp TEXT NOT NULL,
              streaming INTEGER NOT NULL,
              stream_token TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
              conversation_id TEXT PRIMARY KEY,
              record_json TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ensure_conversation(&self, conversation_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO conversations (id, title, created_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(conversation_id)
        .bind(NEW_CONVERSATION_TITLE)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|_| Utc::now())
}

impl CheckpointStore for SqliteStore {
    async fn load_checkpoint(&self, conversation_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query("SELECT record_json FROM checkpoints WHERE conversation_id = ?1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("record_json");
        let decoded = decode_checkpoint(conversation_id, &raw);
        if decoded.is_none() {
            self.delete_checkpoint(conversation_id).await?;
        }
        Ok(decoded)
    }

    async fn save_checkpoint(
        &self,
        conversation_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<()> {
        let record_json = checkpoint.to_json()?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (conversation_id, record_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(conversation_id) DO UPDATE SET
              record_json=excluded.record_json,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(conversation_id)
        .bind(record_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(conversation_id = %conversation_id, "checkpoint saved");
        Ok(())
    }

    async fn delete_checkpoint(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE conversation_id = ?1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

impl ConversationStore for SqliteStore {
    async fn create_conversation(&self) -> Result<ConversationSummary> {
        let summary = ConversationSummary {
            id: new_conversation_id(),
            title: NEW_CONVERSATION_TITLE.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO conversations (id, title, created_at) VALUES (?1, ?2, ?3)")
            .bind(&summary.id)
            .bind(&summary.title)
            .bind(summary.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(summary)
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, created_at
            FROM conversations
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let conversations = rows
            .into_iter()
            .map(|row| ConversationSummary {
                id: row.get("id"),
                title: row.get("title"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at")),
            })
            .collect();

        Ok(conversations)
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET title = ?2 WHERE id = ?1")
            .bind(conversation_id)
            .bind(title)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for statement in [
            "DELETE FROM messages WHERE conversation_id = ?1",
            "DELETE FROM checkpoints WHERE conversation_id = ?1",
            "DELETE FROM conversations WHERE id = ?1",
        ] {
            sqlx::query(statement)
                .bind(conversation_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<()> {
        self.ensure_conversation(conversation_id).await?;

        sqlx::query(
            r#"
            INSERT INTO messages
              (conversation_id, id, role, content, timestamp, streaming, stream_token)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(conversation_id)
        .bind(&message.id)
        .bind(message.role.as_code())
        .bind(&message.content)
        .bind(message.timestamp.to_rfc3339())
        .bind(message.streaming)
        .bind(&message.stream_token)
        .execute(&self.pool)
        .await?;

        if message.role == Role::User {
            sqlx::query("UPDATE conversations SET title = ?2 WHERE id = ?1 AND title = ?3")
                .bind(conversation_id)
                .bind(title_from_message(&message.content))
                .bind(NEW_CONVERSATION_TITLE)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, role, content, timestamp, streaming, stream_token
            FROM messages
            WHERE conversation_id = ?1
            ORDER BY seq
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(|row| ChatMessage {
                id: row.get("id"),
                role: Role::from_code(row.get::<String, _>("role").as_str()),
                content: row.get("content"),
                timestamp: parse_timestamp(&row.get::<String, _>("timestamp")),
                streaming: row.get("streaming"),
                stream_token: row.get("stream_token"),
            })
            .collect();

        Ok(messages)
    }

    async fn clear_streaming_flags(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET streaming = 0 WHERE conversation_id = ?1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    /// SQLite when a URL is given, in-memory otherwise.
    pub async fn connect(database_url: Option<&str>) -> Result<Self> {
        match database_url {
            Some(url) => Self::sqlite(url).await,
            None => Ok(Self::memory()),
        }
    }
}

impl CheckpointStore for Store {
    async fn load_checkpoint(&self, conversation_id: &str) -> Result<Option<Checkpoint>> {
        match self {
            Store::Memory(store) => store.load_checkpoint(conversation_id).await,
            Store::Sqlite(store) => store.load_checkpoint(conversation_id).await,
        }
    }

    async fn save_checkpoint(
        &self,
        conversation_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<()> {
        match self {
            Store::Memory(store) => store.save_checkpoint(conversation_id, checkpoint).await,
            Store::Sqlite(store) => store.save_checkpoint(conversation_id, checkpoint).await,
        }
    }

    async fn delete_checkpoint(&self, conversation_id: &str) -> Result<()> {
        match self {
            Store::Memory(store) => store.delete_checkpoint(conversation_id).await,
            Store::Sqlite(store) => store.delete_checkpoint(conversation_id).await,
        }
    }
}

impl ConversationStore for Store {
    async fn create_conversation(&self) -> Result<ConversationSummary> {
        match self {
            Store::Memory(store) => store.create_conversation().await,
            Store::Sqlite(store) => store.create_conversation().await,
        }
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        match self {
            Store::Memory(store) => store.list_conversations().await,
            Store::Sqlite(store) => store.list_conversations().await,
        }
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<()> {
        match self {
            Store::Memory(store) => store.rename_conversation(conversation_id, title).await,
            Store::Sqlite(store) => store.rename_conversation(conversation_id, title).await,
        }
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        match self {
            Store::Memory(store) => store.delete_conversation(conversation_id).await,
            Store::Sqlite(store) => store.delete_conversation(conversation_id).await,
        }
    }

    async fn append_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<()> {
        match self {
            Store::Memory(store) => store.append_message(conversation_id, message).await,
            Store::Sqlite(store) => store.append_message(conversation_id, message).await,
        }
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        match self {
            Store::Memory(store) => store.messages(conversation_id).await,
            Store::Sqlite(store) => store.messages(conversation_id).await,
        }
    }

    async fn clear_streaming_flags(&self, conversation_id: &str) -> Result<()> {
        match self {
            Store::Memory(store) => store.clear_streaming_flags(conversation_id).await,
            Store::Sqlite(store) => store.clear_streaming_flags(conversation_id).await,
        }
    }
}
