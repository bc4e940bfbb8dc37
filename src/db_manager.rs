use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::collections::Track;

/// Storage key for the playlist collection.
pub const PLAYLIST_KEY: &str = "playlist";
/// Storage key for the history collection.
pub const HISTORY_KEY: &str = "history";

/// Durable key-value store for the user-facing track collections.
///
/// Values are JSON-serialized `Vec<Track>`; read once at startup, written
/// back after every mutation.
pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn new() -> Result<Self, rusqlite::Error> {
        let data_dir = dirs::data_dir()
            .expect("Could not find data directory")
            .join("floatdeck");

        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).expect("Could not create data directory");
        }

        Self::open(data_dir.join("collections.db"))
    }

    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(db_path)?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS collections (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Loads the collection stored under `key`. A missing row or an
    /// unparseable value degrades to an empty collection.
    pub fn load_tracks(&self, key: &str) -> Result<Vec<Track>, rusqlite::Error> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM collections WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(value) = value else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<Track>>(&value) {
            Ok(tracks) => Ok(tracks),
            Err(e) => {
                warn!(
                    "DbManager: Discarding unparseable '{}' collection: {}",
                    key, e
                );
                Ok(Vec::new())
            }
        }
    }

    pub fn save_tracks(&self, key: &str, tracks: &[Track]) -> Result<(), rusqlite::Error> {
        let value = match serde_json::to_string(tracks) {
            Ok(value) => value,
            Err(e) => {
                warn!("DbManager: Failed to serialize '{}' collection: {}", key, e);
                return Ok(());
            }
        };
        self.conn.execute(
            "INSERT INTO collections (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
