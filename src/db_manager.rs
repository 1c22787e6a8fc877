use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::playlist_store::KeyValueStore;

/// SQLite-backed string key-value store.
pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    log::warn!(
                        "DbManager: could not create data directory {}: {}",
                        parent.display(),
                        err
                    );
                }
            }
        }

        let conn = Connection::open(db_path)?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
    }

    pub fn set_value(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl KeyValueStore for DbManager {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        self.get_value(key)
            .map_err(|err| format!("failed to read key {key}: {err}"))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.set_value(key, value)
            .map_err(|err| format!("failed to write key {key}: {err}"))
    }
}
