pub mod models;
pub mod queries;

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thiserror::Error;

use self::models::StoredConfig;

/// Bumped whenever the table shapes change; a mismatch means the index on
/// disk was written by an incompatible build.
pub const SCHEMA_VERSION: i64 = 1;

// ON DELETE RESTRICT: referenced rows can't be deleted while referenced.
// ON DELETE CASCADE: deletes propagate to the rows that reference them.
static TABLE_DEFS: &str = "
CREATE TABLE IF NOT EXISTS artist (
    id      INTEGER PRIMARY KEY,
    name    TEXT NOT NULL COLLATE NOCASE
);
CREATE TABLE IF NOT EXISTS album (
    id      INTEGER PRIMARY KEY,
    name    TEXT NOT NULL COLLATE NOCASE
);
CREATE TABLE IF NOT EXISTS track (
    id              INTEGER PRIMARY KEY,
    artist_id       INTEGER NOT NULL,
    albumartist_id  INTEGER NOT NULL,
    album_id        INTEGER NOT NULL,
    year            INTEGER NOT NULL,
    name            TEXT    NOT NULL COLLATE NOCASE,
    track           INTEGER NOT NULL,
    disc            TEXT    NOT NULL,
    FOREIGN KEY(artist_id)      REFERENCES artist(id) ON DELETE RESTRICT,
    FOREIGN KEY(albumartist_id) REFERENCES artist(id) ON DELETE RESTRICT,
    FOREIGN KEY(album_id)       REFERENCES album(id)  ON DELETE RESTRICT
);
CREATE TABLE IF NOT EXISTS file (
    id          INTEGER PRIMARY KEY,
    track_id    INTEGER NOT NULL,
    path        TEXT NOT NULL,
    mtime       INTEGER NOT NULL,
    FOREIGN KEY(track_id) REFERENCES track(id) ON DELETE RESTRICT
);
CREATE TABLE IF NOT EXISTS path (
    id          INTEGER PRIMARY KEY,
    path        TEXT NOT NULL UNIQUE ON CONFLICT IGNORE,
    track_id    INTEGER,
    file_id     INTEGER,
    parent_id   INTEGER,
    FOREIGN KEY(track_id)  REFERENCES track(id) ON DELETE CASCADE,
    FOREIGN KEY(file_id)   REFERENCES file(id)  ON DELETE CASCADE,
    FOREIGN KEY(parent_id) REFERENCES path(id)  ON DELETE CASCADE
);
CREATE TABLE IF NOT EXISTS config (
    id                  INTEGER PRIMARY KEY,
    schema_version      INTEGER NOT NULL,
    backing_fs_paths    BLOB NOT NULL,
    extension_priority  BLOB,
    path_pattern        TEXT,
    aliases_conf_path   TEXT
);
CREATE INDEX IF NOT EXISTS idx_file_track ON file(track_id);
CREATE INDEX IF NOT EXISTS idx_path_parent ON path(parent_id);
CREATE INDEX IF NOT EXISTS idx_path_track ON path(track_id);
";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(
        "index schema is version {found}, this build expects {expected}; \
         delete the database file and re-run the indexer"
    )]
    SchemaMismatch { found: i64, expected: i64 },
}

pub type Result<T> = std::result::Result<T, DbError>;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        // WAL mode for better concurrent read performance
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn.pragma_update(None, "busy_timeout", 15000)?;
        self.conn.execute_batch(TABLE_DEFS)?;
        Ok(())
    }

    /// Scoped write transaction: dropping the guard rolls back, `commit()`
    /// consumes it. Nesting is not supported.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Validate the config row against this build and sync it with the
    /// in-memory configuration. A missing row is created from `config`;
    /// with `load_from_db` the persisted values win instead.
    pub fn init_config(&self, config: &mut StoredConfig, load_from_db: bool) -> Result<()> {
        type ConfigRow = (i64, Vec<u8>, Option<Vec<u8>>, Option<String>, Option<String>);
        let row: Option<ConfigRow> = self
            .conn
            .query_row(
                "SELECT schema_version, backing_fs_paths, extension_priority,
                        path_pattern, aliases_conf_path
                 FROM config WHERE id = 0",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((version, backing, priority, pattern, aliases)) => {
                if version != SCHEMA_VERSION {
                    return Err(DbError::SchemaMismatch {
                        found: version,
                        expected: SCHEMA_VERSION,
                    });
                }
                if load_from_db {
                    config.backing_fs_paths = decode_string_list(&backing);
                    config.extension_priority = priority
                        .as_deref()
                        .map(decode_string_list)
                        .unwrap_or_default();
                    config.path_pattern = pattern.unwrap_or_default();
                    config.aliases_conf_path = aliases.unwrap_or_default();
                }
                Ok(())
            }
            None => self.save_config(config),
        }
    }

    /// Persist the configuration row, replacing any previous one.
    pub fn save_config(&self, config: &StoredConfig) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO config
                (id, schema_version, backing_fs_paths, extension_priority,
                 path_pattern, aliases_conf_path)
             VALUES (0, ?1, ?2, ?3, ?4, ?5)",
            params![
                SCHEMA_VERSION,
                encode_string_list(&config.backing_fs_paths),
                encode_string_list(&config.extension_priority),
                config.path_pattern,
                config.aliases_conf_path,
            ],
        )?;
        Ok(())
    }
}

/// String lists persist as a concatenation of NUL-terminated strings,
/// trailing NUL included. An empty list is an empty blob.
pub(crate) fn encode_string_list(items: &[String]) -> Vec<u8> {
    let mut blob = Vec::new();
    for item in items {
        blob.extend_from_slice(item.as_bytes());
        blob.push(0);
    }
    blob
}

pub(crate) fn decode_string_list(blob: &[u8]) -> Vec<String> {
    let mut items = Vec::new();
    let mut start = 0;
    for (i, byte) in blob.iter().enumerate() {
        if *byte == 0 {
            items.push(String::from_utf8_lossy(&blob[start..i]).into_owned());
            start = i + 1;
        }
    }
    items
}
