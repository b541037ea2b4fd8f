//! SQLite persistence for transcriptions and per-category records.
//!
//! One connection per `Store`; the pipeline is single-threaded so no pooling
//! is needed. Schema is created on open and is idempotent.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// A transcription awaiting or past routing
#[derive(Debug, Clone)]
pub struct Transcription {
    pub id: i64,
    pub content: String,
    pub source_file: Option<String>,
    pub category: Option<String>,
    pub processed: bool,
    pub destination: Option<String>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS transcriptions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    content TEXT NOT NULL,
                    source_file TEXT,
                    category TEXT,
                    processed INTEGER NOT NULL DEFAULT 0,
                    destination TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    summary TEXT NOT NULL,
                    start_time TEXT,
                    end_time TEXT,
                    location TEXT,
                    description TEXT,
                    calendar_link TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS contacts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    phone TEXT,
                    email TEXT,
                    note TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS expenses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    description TEXT NOT NULL,
                    amount REAL,
                    currency TEXT,
                    incurred_on TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS diary_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    content TEXT NOT NULL,
                    mood TEXT,
                    entry_date TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    description TEXT NOT NULL,
                    due_date TEXT,
                    status TEXT NOT NULL DEFAULT 'open',
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS entities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    kind TEXT,
                    note TEXT,
                    created_at TEXT NOT NULL
                );
                "#,
            )
            .context("initializing database schema")?;
        Ok(())
    }

    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    pub fn insert_transcription(
        &self,
        content: &str,
        source_file: Option<&str>,
        category: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO transcriptions (content, source_file, category, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![content, source_file, category, Self::now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Mark a transcription routed, recording where its data landed
    pub fn mark_processed(&self, id: i64, destination: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE transcriptions SET processed = 1, destination = ?1 WHERE id = ?2",
            params![destination, id],
        )?;
        anyhow::ensure!(updated == 1, "transcription {} not found", id);
        Ok(())
    }

    pub fn get_transcription(&self, id: i64) -> Result<Option<Transcription>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, content, source_file, category, processed, destination
                 FROM transcriptions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Transcription {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        source_file: row.get(2)?,
                        category: row.get(3)?,
                        processed: row.get::<_, i64>(4)? != 0,
                        destination: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_event(
        &self,
        summary: &str,
        start_time: Option<&str>,
        end_time: Option<&str>,
        location: Option<&str>,
        description: Option<&str>,
        calendar_link: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO events (summary, start_time, end_time, location, description, calendar_link, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![summary, start_time, end_time, location, description, calendar_link, Self::now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_contact(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
        note: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO contacts (name, phone, email, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, phone, email, note, Self::now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_expense(
        &self,
        description: &str,
        amount: Option<f64>,
        currency: Option<&str>,
        incurred_on: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO expenses (description, amount, currency, incurred_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![description, amount, currency, incurred_on, Self::now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_diary_entry(
        &self,
        content: &str,
        mood: Option<&str>,
        entry_date: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO diary_entries (content, mood, entry_date, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![content, mood, entry_date, Self::now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_task(&self, description: &str, due_date: Option<&str>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO tasks (description, due_date, created_at) VALUES (?1, ?2, ?3)",
            params![description, due_date, Self::now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_entity(
        &self,
        name: &str,
        kind: Option<&str>,
        note: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO entities (name, kind, note, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, kind, note, Self::now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn count(&self, table: &str) -> Result<i64> {
        // Table names come from a fixed internal set, never user input
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }
}
