#![allow(dead_code)]

use std::{path::Path, sync::Arc};

use nestql_core::{Adapter, ConnectionConfig, OpenOptions};
use nestql_driver_sqlite::SqliteDriver;
use tempfile::TempDir;

pub const CREATE_NOTES_SQL: &str =
    "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);";

pub struct TempDatabase {
    _dir: TempDir,
    location: String,
}

impl TempDatabase {
    pub fn new() -> Self {
        let dir = tempfile::tempdir()
            .unwrap_or_else(|error| panic!("failed to create tempdir: {error}"));
        let location = dir.path().join("notes.db").to_string_lossy().into_owned();
        Self {
            _dir: dir,
            location,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.location)
    }

    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.location.clone())
    }

    pub fn config_with(&self, options: OpenOptions) -> ConnectionConfig {
        self.config().with_options(options)
    }

    /// Creates the file with an empty `notes` table.
    pub fn with_notes_table() -> Self {
        let database = Self::new();
        let mut adapter = sqlite_adapter();
        adapter
            .open(&database.config())
            .expect("fresh database should open");
        adapter
            .execute(CREATE_NOTES_SQL)
            .expect("notes table should be created");
        adapter.close().expect("close after schema setup");
        database
    }

    pub fn open_adapter(&self) -> Adapter {
        let mut adapter = sqlite_adapter();
        adapter
            .open(&self.config())
            .unwrap_or_else(|error| panic!("failed to open {}: {error}", self.location));
        adapter
    }

    /// Reads the committed note bodies through a separate raw connection.
    pub fn note_bodies(&self) -> Vec<String> {
        let connection = rusqlite::Connection::open(&self.location)
            .unwrap_or_else(|error| panic!("raw open failed: {error}"));
        let mut statement = connection
            .prepare("SELECT body FROM notes ORDER BY id")
            .unwrap_or_else(|error| panic!("prepare failed: {error}"));
        let bodies = statement
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap_or_else(|error| panic!("query failed: {error}"))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_else(|error| panic!("row decode failed: {error}"));
        bodies
    }
}

pub fn sqlite_adapter() -> Adapter {
    Adapter::new(Arc::new(SqliteDriver))
}

pub fn insert_note_sql(body: &str) -> String {
    format!(
        "INSERT INTO notes(body) VALUES ('{}');",
        nestql_core::escape_literal(body)
    )
}
