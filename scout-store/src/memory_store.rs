use crate::error::{Result, StoreError};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// Read-mostly per-user fact store. The orchestrator only queries it; facts
/// are seeded out of band (CLI subcommand or an operator).
pub struct MemoryStore {
    conn: Mutex<Connection>,
}

impl MemoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS facts (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    TEXT NOT NULL,
                fact       TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS facts_user ON facts (user_id, id);
            ",
        )?;
        Ok(())
    }

    pub fn add_fact(&self, user_id: &str, fact: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        conn.execute(
            "INSERT INTO facts (user_id, fact, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, fact, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// All facts for a user, in insertion order.
    pub fn facts(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let mut stmt =
            conn.prepare("SELECT fact FROM facts WHERE user_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
