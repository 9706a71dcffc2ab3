//! Durable snapshot backends for the card store.
//!
//! The in-memory [`crate::store::CardStore`] is the source of truth between
//! flushes; a backend only ever sees whole snapshots of the card collection.
//! Backends are synchronous and are driven from tokio's blocking pool by the
//! store's flush task.
//!
//! - [`sqlite::SqliteBackend`]: a single `cards` table in an SQLite file.
//! - [`json::JsonFileBackend`]: a checksummed JSON file, written atomically.
//! - [`MemoryBackend`]: an in-process blob, for tests and ephemeral stores.

pub mod json;
pub mod sqlite;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::config::{BackendKind, PersistenceConfig};
use crate::error::{RecallError, Result};
use crate::types::Card;

pub use json::JsonFileBackend;
pub use sqlite::SqliteBackend;

/// Read-all / write-all access to a durable copy of the card collection.
pub trait SnapshotBackend: Send + Sync + 'static {
    /// Load the last stored snapshot.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error when stored data exists but cannot be read or
    /// decoded; the store treats this as an initialization failure.
    fn load(&self) -> Result<Option<Vec<Card>>>;

    /// Replace the stored snapshot with `cards`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write does not complete.
    fn store(&self, cards: &[Card]) -> Result<()>;

    /// Short name for log output.
    fn name(&self) -> &'static str;

    /// Hook run once after the final flush on close.
    ///
    /// # Errors
    ///
    /// Backend specific; the default does nothing.
    fn on_close(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the backend selected by `config`.
///
/// # Errors
///
/// Returns an error if the backend cannot be opened.
pub fn open_backend(config: &PersistenceConfig) -> Result<Arc<dyn SnapshotBackend>> {
    Ok(match config.backend {
        BackendKind::Sqlite => Arc::new(SqliteBackend::open(&config.path, config)?),
        BackendKind::Json => Arc::new(JsonFileBackend::new(&config.path, config.checksum_enabled)),
    })
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// In-process backend holding the last snapshot as encoded bytes.
///
/// Counts writes and tracks how many are in flight at once, and can be told
/// to fail writes, which makes it the backend of choice for store tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    write_delay: Mutex<Option<std::time::Duration>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that already holds `cards`.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Serialization`] if encoding fails.
    pub fn with_cards(cards: &[Card]) -> Result<Self> {
        let backend = Self::new();
        *backend.blob.lock() = Some(encode(cards)?);
        Ok(backend)
    }

    /// Create a backend holding bytes that do not decode.
    #[must_use]
    pub fn corrupt() -> Self {
        let backend = Self::new();
        *backend.blob.lock() = Some(b"\x00not a snapshot".to_vec());
        backend
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Hold each write for `delay` of real time before completing it.
    pub fn set_write_delay(&self, delay: Option<std::time::Duration>) {
        *self.write_delay.lock() = delay;
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of writes started so far, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of writes running right now.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Largest number of writes observed running at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Decode the currently stored snapshot, if any.
    #[must_use]
    pub fn stored_cards(&self) -> Option<Vec<Card>> {
        self.blob
            .lock()
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}

fn encode(cards: &[Card]) -> Result<Vec<u8>> {
    serde_json::to_vec(cards).map_err(|e| RecallError::Serialization(e.to_string()))
}

impl SnapshotBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Vec<Card>>> {
        let guard = self.blob.lock();
        let Some(bytes) = guard.as_deref() else {
            return Ok(None);
        };
        let cards =
            serde_json::from_slice(bytes).map_err(|e| RecallError::Serialization(e.to_string()))?;
        Ok(Some(cards))
    }

    fn store(&self, cards: &[Card]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let result = if self.fail_writes.load(Ordering::SeqCst) {
            Err(RecallError::Io(std::io::Error::other("injected write failure")))
        } else {
            encode(cards).map(|bytes| {
                *self.blob.lock() = Some(bytes);
                self.writes.fetch_add(1, Ordering::SeqCst);
            })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardId;

    fn cards() -> Vec<Card> {
        vec![
            Card::new(CardId::from("a"), "x.md", "One", 1),
            Card::new(CardId::from("b"), "x.md", "Two", 2),
        ]
    }

    #[test]
    fn empty_backend_loads_none() {
        let backend = MemoryBackend::new();
        assert!(backend.load().expect("load").is_none());
    }

    #[test]
    fn store_then_load() {
        let backend = MemoryBackend::new();
        backend.store(&cards()).expect("store");
        assert_eq!(backend.load().expect("load"), Some(cards()));
        assert_eq!(backend.writes(), 1);
        assert_eq!(backend.max_in_flight(), 1);
    }

    #[test]
    fn injected_failure_keeps_previous_snapshot() {
        let backend = MemoryBackend::with_cards(&cards()).expect("seed");
        backend.set_fail_writes(true);
        assert!(backend.store(&[]).is_err());
        assert_eq!(backend.stored_cards(), Some(cards()));
        assert_eq!(backend.writes(), 0);
        assert_eq!(backend.attempts(), 1);
        assert_eq!(backend.in_flight(), 0);
    }

    #[test]
    fn corrupt_blob_is_an_error() {
        assert!(MemoryBackend::corrupt().load().is_err());
    }
}
