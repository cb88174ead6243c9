use crate::error::{Result, StoreError};
use crate::types::{Interrupt, InterruptOp, SessionRecord, ThreadSummary};
use dashmap::DashMap;
use rusqlite::{Connection, params};
use scout_llm::Message;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// SQLite-backed turn store.
///
/// Uses a `Mutex<Connection>` for thread-safe interior mutability; every
/// public operation is one transaction, so a crash can never leave a torn
/// session. Per-thread serializability is provided by [`lock_thread`]:
/// callers hold the guard for a whole external invocation, while the
/// connection mutex is only held per operation.
///
/// [`lock_thread`]: TurnStore::lock_thread
pub struct TurnStore {
    conn: Mutex<Connection>,
    thread_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl TurnStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            thread_locks: DashMap::new(),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, for tests.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            thread_locks: DashMap::new(),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS threads (
                thread_id  TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                interrupt  TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                thread_id  TEXT NOT NULL,
                seq        INTEGER NOT NULL,
                body       TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (thread_id, seq)
            );
            ",
        )?;
        Ok(())
    }

    /// Serialize all work for one thread key. The guard must be held for
    /// the duration of one full external invocation.
    pub async fn lock_thread(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .thread_locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Create the thread if it does not exist; an existing thread keeps its
    /// original user binding.
    pub fn create(&self, thread_id: &str, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO threads (thread_id, user_id, interrupt, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?3)",
            params![thread_id, user_id, now],
        )?;
        Ok(())
    }

    pub fn load(&self, thread_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let head = conn
            .query_row(
                "SELECT user_id, interrupt FROM threads WHERE thread_id = ?1",
                params![thread_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let Some((user_id, interrupt_json)) = head else {
            return Ok(None);
        };

        let interrupt: Option<Interrupt> = interrupt_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;

        let mut stmt = conn
            .prepare("SELECT body FROM messages WHERE thread_id = ?1 ORDER BY seq ASC")?;
        let messages = stmt
            .query_map(params![thread_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .iter()
            .map(|body| serde_json::from_str::<Message>(body))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(SessionRecord {
            thread_id: thread_id.to_string(),
            user_id,
            messages,
            interrupt,
        }))
    }

    /// Append messages and apply the interrupt change in one transaction.
    pub fn append(
        &self,
        thread_id: &str,
        messages: &[Message],
        interrupt: InterruptOp,
    ) -> Result<()> {
        let encoded = encode_messages(messages)?;

        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let tx = conn.transaction()?;
        ensure_thread_exists(&tx, thread_id)?;

        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        let now = chrono::Utc::now().to_rfc3339();
        for (offset, body) in encoded.iter().enumerate() {
            tx.execute(
                "INSERT INTO messages (thread_id, seq, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![thread_id, next_seq + offset as i64, body, now],
            )?;
        }
        apply_interrupt(&tx, thread_id, &interrupt, &now)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the whole message log in one transaction. Only the decline
    /// path uses this; normal steps are append-only.
    pub fn rewrite(
        &self,
        thread_id: &str,
        messages: &[Message],
        interrupt: InterruptOp,
    ) -> Result<()> {
        let encoded = encode_messages(messages)?;

        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let tx = conn.transaction()?;
        ensure_thread_exists(&tx, thread_id)?;

        tracing::debug!(thread_id, messages = encoded.len(), "rewriting thread history");
        tx.execute("DELETE FROM messages WHERE thread_id = ?1", params![thread_id])?;
        let now = chrono::Utc::now().to_rfc3339();
        for (seq, body) in encoded.iter().enumerate() {
            tx.execute(
                "INSERT INTO messages (thread_id, seq, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![thread_id, seq as i64, body, now],
            )?;
        }
        apply_interrupt(&tx, thread_id, &interrupt, &now)?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let mut stmt = conn.prepare(
            "SELECT t.thread_id, t.user_id, t.interrupt, t.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.thread_id = t.thread_id)
             FROM threads t ORDER BY t.updated_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ThreadSummary {
                thread_id: row.get(0)?,
                user_id: row.get(1)?,
                pending_interrupt: row.get::<_, Option<String>>(2)?.is_some(),
                updated_at: row.get(3)?,
                message_count: row.get::<_, i64>(4)? as usize,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn encode_messages(messages: &[Message]) -> Result<Vec<String>> {
    messages
        .iter()
        .map(|m| match m {
            Message::System { .. } => Err(StoreError::EphemeralMessage),
            other => Ok(serde_json::to_string(other)?),
        })
        .collect()
}

fn ensure_thread_exists(tx: &rusqlite::Transaction<'_>, thread_id: &str) -> Result<()> {
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM threads WHERE thread_id = ?1)",
        params![thread_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::UnknownThread(thread_id.to_string()));
    }
    Ok(())
}

fn apply_interrupt(
    tx: &rusqlite::Transaction<'_>,
    thread_id: &str,
    op: &InterruptOp,
    now: &str,
) -> Result<()> {
    match op {
        InterruptOp::Keep => {
            tx.execute(
                "UPDATE threads SET updated_at = ?2 WHERE thread_id = ?1",
                params![thread_id, now],
            )?;
        }
        InterruptOp::Set(interrupt) => {
            tx.execute(
                "UPDATE threads SET interrupt = ?2, updated_at = ?3 WHERE thread_id = ?1",
                params![thread_id, serde_json::to_string(interrupt)?, now],
            )?;
        }
        InterruptOp::Clear => {
            tx.execute(
                "UPDATE threads SET interrupt = NULL, updated_at = ?2 WHERE thread_id = ?1",
                params![thread_id, now],
            )?;
        }
    }
    Ok(())
}
