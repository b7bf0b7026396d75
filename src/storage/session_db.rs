use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqlResult, params};
use std::path::Path;

use super::database::Database;
use crate::common::Session;

/// Token and user id cached after login (single row).
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let store = Self {
            db: Database::open(path)?,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> SqlResult<Self> {
        let store = Self {
            db: Database::in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> SqlResult<()> {
        self.db.connection().execute(
            "CREATE TABLE IF NOT EXISTS session (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                token TEXT NOT NULL,
                user_id TEXT NOT NULL,
                logged_in_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Save session (replace if exists)
    pub fn save(&self, session: &Session) -> SqlResult<()> {
        self.db.connection().execute(
            "INSERT OR REPLACE INTO session (id, token, user_id, logged_in_at)
             VALUES (1, ?1, ?2, ?3)",
            params![session.token, session.user_id, Utc::now()],
        )?;
        Ok(())
    }

    pub fn load(&self) -> SqlResult<Option<Session>> {
        self.db
            .connection()
            .query_row(
                "SELECT token, user_id FROM session WHERE id = 1",
                [],
                |row| {
                    Ok(Session {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                },
            )
            .optional()
    }

    pub fn logged_in_at(&self) -> SqlResult<Option<DateTime<Utc>>> {
        self.db
            .connection()
            .query_row("SELECT logged_in_at FROM session WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
    }

    /// Logout: forget everything we cached.
    pub fn clear(&self) -> SqlResult<()> {
        self.db.connection().execute("DELETE FROM session", [])?;
        Ok(())
    }
}
