use async_trait::async_trait;
#[cfg(feature = "persistence")]
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use tokio::{fs, io::AsyncWriteExt};

use crate::error::{ErrataError, Result};
use crate::message::Message;

/// Persistence contract for transcript history replay.
///
/// `append` covers the common grow-only path; `save` rewrites the stored
/// history wholesale, which truncating operations (delete, regenerate,
/// edit) need because they invalidate the tail.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn load(&self) -> Result<Vec<Message>>;
    async fn append(&self, message: &Message) -> Result<()>;
    async fn save(&self, messages: &[Message]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// A simple JSONL-based store that writes messages to disk.
pub struct FileTranscriptStore {
    path: String,
}

impl FileTranscriptStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn load(&self) -> Result<Vec<Message>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(ErrataError::Storage(format!(
                    "failed to read transcript `{}`: {err}",
                    self.path
                )))
            }
        };

        let mut messages = Vec::new();
        for line in content.lines() {
            let msg: Message = serde_json::from_str(line)?;
            messages.push(msg);
        }

        Ok(messages)
    }

    async fn append(&self, message: &Message) -> Result<()> {
        let mut serialized = serde_json::to_string(message)?;
        serialized.push('\n');
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| {
                ErrataError::Storage(format!("failed to open `{}`: {err}", self.path))
            })?
            .write_all(serialized.as_bytes())
            .await
            .map_err(|err| ErrataError::Storage(format!("failed to persist message: {err}")))
    }

    async fn save(&self, messages: &[Message]) -> Result<()> {
        let mut serialized = String::new();
        for message in messages {
            serialized.push_str(&serde_json::to_string(message)?);
            serialized.push('\n');
        }
        fs::write(&self.path, serialized)
            .await
            .map_err(|err| ErrataError::Storage(format!("failed to rewrite transcript: {err}")))
    }

    async fn clear(&self) -> Result<()> {
        fs::remove_file(&self.path)
            .await
            .or_else(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(err)
                }
            })
            .map_err(|err| ErrataError::Storage(format!("failed clearing `{}`: {err}", self.path)))
    }
}

/// SQLite-backed store for embedders that keep several conversations.
#[cfg(feature = "persistence")]
pub struct SqlTranscriptStore {
    pool: SqlitePool,
}

#[cfg(feature = "persistence")]
impl SqlTranscriptStore {
    const INIT_STATEMENT: &'static str = r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payload TEXT NOT NULL
        )
    "#;

    pub async fn connect(connection_url: impl AsRef<str>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(connection_url.as_ref())
            .await
            .map_err(|err| {
                ErrataError::Storage(format!(
                    "failed connecting to SQL backend `{}`: {err}",
                    connection_url.as_ref()
                ))
            })?;

        sqlx::query(Self::INIT_STATEMENT)
            .execute(&pool)
            .await
            .map_err(|err| ErrataError::Storage(format!("failed initializing schema: {err}")))?;

        Ok(Self { pool })
    }
}

#[cfg(feature = "persistence")]
#[async_trait]
impl TranscriptStore for SqlTranscriptStore {
    async fn load(&self) -> Result<Vec<Message>> {
        let rows = sqlx::query("SELECT payload FROM messages ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|err| ErrataError::Storage(format!("failed loading messages: {err}")))?;

        rows.into_iter()
            .map(|row| {
                let payload: String = row.try_get("payload").map_err(|err| {
                    ErrataError::Storage(format!("failed decoding message payload: {err}"))
                })?;
                serde_json::from_str(&payload)
                    .map_err(|err| ErrataError::Storage(format!("invalid message payload: {err}")))
            })
            .collect()
    }

    async fn append(&self, message: &Message) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        sqlx::query("INSERT INTO messages (payload) VALUES (?)")
            .bind(payload)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|err| ErrataError::Storage(format!("failed writing message: {err}")))
    }

    async fn save(&self, messages: &[Message]) -> Result<()> {
        self.clear().await?;
        for message in messages {
            self.append(message).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM messages")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|err| ErrataError::Storage(format!("failed clearing messages: {err}")))
    }
}
