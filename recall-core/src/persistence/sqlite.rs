//! SQLite snapshot backend.
//!
//! Cards live in a single table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS cards (
//!     id            TEXT PRIMARY KEY,
//!     document_path TEXT NOT NULL,
//!     question      TEXT NOT NULL,
//!     due_date      INTEGER,
//!     interval      INTEGER,
//!     ease          REAL
//! );
//! ```
//!
//! A store replaces the whole table inside one transaction, so a reader of
//! the file sees either the previous snapshot or the new one. Nullable
//! scheduling columns read back as the card defaults.

use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

use super::SnapshotBackend;
use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::scheduler::{DEFAULT_EASE, DEFAULT_INTERVAL};
use crate::types::{Card, CardId};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cards (
        id            TEXT PRIMARY KEY,
        document_path TEXT NOT NULL,
        question      TEXT NOT NULL,
        due_date      INTEGER,
        interval      INTEGER,
        ease          REAL
    );
    CREATE INDEX IF NOT EXISTS cards_by_document ON cards (document_path);";

/// Handle to an SQLite database holding the card snapshot.
///
/// # Usage
///
/// ```no_run
/// # use recall_core::persistence::{SnapshotBackend, SqliteBackend};
/// # use recall_core::config::PersistenceConfig;
/// let backend = SqliteBackend::open("recall.db", &PersistenceConfig::default())?;
/// let cards = backend.load()?.unwrap_or_default();
/// backend.store(&cards)?;
/// # Ok::<(), recall_core::error::RecallError>(())
/// ```
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    backup_count: u32,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("db_path", &self.db_path)
            .field("backup_count", &self.backup_count)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open (or create) an SQLite database at `path`.
    ///
    /// Missing parent directories are created. The schema is created if it
    /// does not exist. WAL mode is enabled when `config.wal_mode` is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RecallError::Database`] on SQLite failures and
    /// [`crate::RecallError::Io`] if the parent directory cannot be created.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "SQLite card backend opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            backup_count: config.backup_count,
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`crate::RecallError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            backup_count: 0,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Number of card rows currently stored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RecallError::Database`] on SQLite failures.
    pub fn card_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` using SQLite's online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RecallError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Card database backup completed"
        );
        Ok(())
    }

    /// Create a numbered backup next to the database file, rotating older
    /// ones so that at most `backup_count` are kept.
    ///
    /// Does nothing for in-memory databases or when `backup_count` is 0.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RecallError::Database`] or
    /// [`crate::RecallError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        if self.db_path.as_os_str() == ":memory:" {
            return Ok(());
        }

        let max = self.backup_count;
        if max == 0 {
            return Ok(());
        }

        // Highest first so nothing is overwritten.
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }

        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }

        self.backup(self.backup_path(1))?;
        info!(max_backups = max, "Rotating card backup created");
        Ok(())
    }

    /// Path of backup number `n` (e.g. `recall.db.bak.1`).
    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension()
                .map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run SQLite's integrity check; `Ok(false)` means corruption.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RecallError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

impl SnapshotBackend for SqliteBackend {
    fn load(&self) -> Result<Option<Vec<Card>>> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, document_path, question, due_date, interval, ease FROM cards ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let due: Option<i64> = row.get(3)?;
            let interval: Option<u32> = row.get(4)?;
            let ease: Option<f64> = row.get(5)?;
            Ok(Card {
                id: CardId(row.get(0)?),
                document_path: row.get(1)?,
                question: row.get(2)?,
                due_date: due.unwrap_or(0),
                interval: interval.unwrap_or(DEFAULT_INTERVAL).max(1),
                ease: ease.unwrap_or(DEFAULT_EASE),
            })
        })?;
        let cards = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            cards = cards.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded card snapshot from SQLite"
        );
        Ok(Some(cards))
    }

    fn store(&self, cards: &[Card]) -> Result<()> {
        let start = Instant::now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cards", [])?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO cards (id, document_path, question, due_date, interval, ease)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for card in cards {
                insert.execute(params![
                    card.id.as_str(),
                    card.document_path,
                    card.question,
                    card.due_date,
                    card.interval,
                    card.ease,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            cards = cards.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Stored card snapshot to SQLite"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn on_close(&self) -> Result<()> {
        self.create_rotating_backup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cards() -> Vec<Card> {
        let mut reviewed = Card::new(CardId::from("b2"), "notes/b.md", "Ownership", 5_000);
        reviewed.interval = 12;
        reviewed.ease = 2.35;
        vec![
            Card::new(CardId::from("a1"), "notes/a.md", "Lifetimes", 1_000),
            reviewed,
        ]
    }

    #[test]
    fn fresh_database_loads_empty_snapshot() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        assert_eq!(backend.load().expect("load"), Some(Vec::new()));
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        backend.store(&sample_cards()).expect("store");
        assert_eq!(backend.load().expect("load"), Some(sample_cards()));
        assert_eq!(backend.card_count().expect("count"), 2);
    }

    #[test]
    fn store_replaces_previous_snapshot() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        backend.store(&sample_cards()).expect("store");
        backend.store(&sample_cards()[..1]).expect("store again");
        let loaded = backend.load().expect("load").expect("Some");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, CardId::from("a1"));
    }

    #[test]
    fn null_schedule_columns_read_as_defaults() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        backend
            .conn
            .lock()
            .execute(
                "INSERT INTO cards (id, document_path, question) VALUES ('x', 'n.md', 'Q')",
                [],
            )
            .expect("raw insert");
        let loaded = backend.load().expect("load").expect("Some");
        assert_eq!(loaded[0].interval, 1);
        assert!((loaded[0].ease - 2.5).abs() < f64::EPSILON);
        assert_eq!(loaded[0].due_date, 0);
    }

    #[test]
    fn integrity_check_passes() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        assert!(backend.integrity_check().expect("check"));
    }

    #[test]
    fn file_based_open_and_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PersistenceConfig::default();
        let backend =
            SqliteBackend::open(dir.path().join("nested/recall.db"), &config).expect("open");
        backend.store(&sample_cards()).expect("store");

        let backup_path = dir.path().join("copy.db");
        backend.backup(&backup_path).expect("backup");

        let copy = SqliteBackend::open(&backup_path, &config).expect("open backup");
        assert_eq!(copy.load().expect("load"), Some(sample_cards()));
    }

    #[test]
    fn rotating_backup_keeps_at_most_backup_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PersistenceConfig {
            backup_count: 2,
            ..PersistenceConfig::default()
        };
        let backend = SqliteBackend::open(dir.path().join("recall.db"), &config).expect("open");
        backend.store(&sample_cards()).expect("store");

        backend.on_close().expect("backup 1");
        backend.on_close().expect("backup 2");
        backend.on_close().expect("backup 3");

        assert!(dir.path().join("recall.db.bak.1").exists());
        assert!(dir.path().join("recall.db.bak.2").exists());
        assert!(!dir.path().join("recall.db.bak.3").exists());
    }
}
