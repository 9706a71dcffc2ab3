//! The card store.
//!
//! The in-memory [`CardTable`](table) is the source of truth between
//! flushes; the durable backend only ever receives whole snapshots, written
//! by the store's [flusher](flusher) task. Every query and mutation is
//! synchronous and works on the in-memory table under a short lock, so
//! callers always see a consistent view even while a flush is running.
//!
//! A store whose backend could not be loaded is *not ready*: every
//! operation returns its empty value and nothing is ever written.

mod flusher;
mod table;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PersistenceConfig;
use crate::error::{RecallError, Result};
use crate::persistence::{self, MemoryBackend, SnapshotBackend};
use crate::scheduler::{self, NextReview, ReviewInput};
use crate::types::{Card, CardId, CardPatch, Rating, Timestamp, now_ms};

use flusher::{Command, Flusher};
use table::CardTable;

/// Debounce timing of the background flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Quiet period after the last mutation before a flush runs.
    pub quiet: Duration,
    /// Longest any mutation waits for a flush while mutations keep arriving.
    pub max_coalesce: Duration,
}

impl FlushPolicy {
    /// Build a policy; `max_coalesce` is raised to `quiet` if shorter.
    #[must_use]
    pub fn new(quiet: Duration, max_coalesce: Duration) -> Self {
        Self {
            quiet,
            max_coalesce: max_coalesce.max(quiet),
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(10))
    }
}

struct State {
    ready: bool,
    table: CardTable,
}

/// State shared between store handles and the flusher.
pub(crate) struct Shared {
    state: Mutex<State>,
    dirty: Notify,
}

struct Inner {
    shared: Arc<Shared>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    backend: &'static str,
}

/// Handle to a card store. Clones share the same cards and flusher.
///
/// Opening a store requires a tokio runtime; the operations themselves are
/// synchronous apart from [`flush`](Self::flush) and [`close`](Self::close).
#[derive(Clone)]
pub struct CardStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardStore")
            .field("backend", &self.inner.backend)
            .field("ready", &self.is_ready())
            .field("cards", &self.len())
            .finish()
    }
}

impl CardStore {
    /// Load the snapshot held by `backend` and start the flusher.
    ///
    /// A backend that fails to load yields a not-ready store; the failure
    /// is logged once at warn level.
    pub async fn open(backend: Arc<dyn SnapshotBackend>, policy: FlushPolicy) -> Self {
        let name = backend.name();
        let loader = Arc::clone(&backend);
        let loaded = match tokio::task::spawn_blocking(move || loader.load()).await {
            Ok(result) => result,
            Err(e) => Err(RecallError::Flush(e.to_string())),
        };

        let cards = match loaded {
            Ok(cards) => cards.unwrap_or_default(),
            Err(e) => {
                warn!(
                    backend = name,
                    error = %e,
                    "Card store unavailable; review and indexing are disabled"
                );
                return Self::not_ready_named(name);
            }
        };

        let count = cards.len();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                ready: true,
                table: CardTable::from_cards(cards),
            }),
            dirty: Notify::new(),
        });
        let (commands, task) = Flusher::spawn(Arc::clone(&shared), backend, policy);

        info!(
            backend = name,
            cards = count,
            quiet_ms = policy.quiet.as_millis(),
            max_coalesce_ms = policy.max_coalesce.as_millis(),
            "Card store opened"
        );

        Self {
            inner: Arc::new(Inner {
                shared,
                commands: Mutex::new(Some(commands)),
                task: Mutex::new(Some(task)),
                backend: name,
            }),
        }
    }

    /// Open the backend described by `config` and load it.
    pub async fn open_with_config(config: &PersistenceConfig) -> Self {
        let owned = config.clone();
        let opened = match tokio::task::spawn_blocking(move || persistence::open_backend(&owned)).await
        {
            Ok(result) => result,
            Err(e) => Err(RecallError::Flush(e.to_string())),
        };
        match opened {
            Ok(backend) => Self::open(backend, config.flush_policy()).await,
            Err(e) => {
                warn!(
                    path = %config.path.display(),
                    error = %e,
                    "Card store unavailable; review and indexing are disabled"
                );
                Self::not_ready_named("unavailable")
            }
        }
    }

    /// An empty store over a fresh [`MemoryBackend`].
    pub async fn in_memory() -> Self {
        Self::open(Arc::new(MemoryBackend::new()), FlushPolicy::default()).await
    }

    /// A store in the permanent not-ready state.
    #[must_use]
    pub fn not_ready() -> Self {
        Self::not_ready_named("none")
    }

    fn not_ready_named(backend: &'static str) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared {
                    state: Mutex::new(State {
                        ready: false,
                        table: CardTable::default(),
                    }),
                    dirty: Notify::new(),
                }),
                commands: Mutex::new(None),
                task: Mutex::new(None),
                backend,
            }),
        }
    }

    /// Whether the store loaded and has not been closed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.shared.state.lock().ready
    }

    fn with_table<R: Default>(&self, f: impl FnOnce(&CardTable) -> R) -> R {
        let state = self.inner.shared.state.lock();
        if !state.ready {
            return R::default();
        }
        f(&state.table)
    }

    fn with_table_mut<R: Default>(&self, f: impl FnOnce(&mut CardTable) -> R) -> R {
        let changed;
        let result = {
            let mut state = self.inner.shared.state.lock();
            if !state.ready {
                return R::default();
            }
            let before = state.table.generation();
            let result = f(&mut state.table);
            changed = state.table.generation() != before;
            result
        };
        if changed {
            self.inner.shared.dirty.notify_one();
        }
        result
    }

    // -- mutations ----------------------------------------------------------

    /// Insert a card with default scheduling, or update only the question
    /// of an existing one. Returns `true` if anything changed.
    pub fn upsert(&self, id: &CardId, document_path: &str, question: &str) -> bool {
        self.upsert_at(id, document_path, question, now_ms())
    }

    /// [`upsert`](Self::upsert) with an explicit creation time.
    pub fn upsert_at(
        &self,
        id: &CardId,
        document_path: &str,
        question: &str,
        now: Timestamp,
    ) -> bool {
        self.with_table_mut(|t| t.upsert(id, document_path, question, now))
    }

    /// Merge the present fields of `patch` into card `id`.
    ///
    /// Returns `false` for an unknown id, an empty patch, or a patch that
    /// changes nothing.
    pub fn update(&self, id: &CardId, patch: &CardPatch) -> bool {
        self.with_table_mut(|t| t.update(id, patch))
    }

    /// Remove a single card. Returns `true` if it existed.
    pub fn delete(&self, id: &CardId) -> bool {
        self.with_table_mut(|t| t.remove(id).is_some())
    }

    /// Remove every card of `document_path`; returns the number removed.
    pub fn delete_all_for_document(&self, document_path: &str) -> usize {
        self.with_table_mut(|t| t.delete_document(document_path))
    }

    /// Move every card of `old_path` to `new_path` in one step; returns the
    /// number moved. Ids are unchanged.
    pub fn rename_document(&self, old_path: &str, new_path: &str) -> usize {
        self.with_table_mut(|t| t.rename_document(old_path, new_path))
    }

    /// Record a review of card `id` at the current time.
    ///
    /// Returns the new schedule, or `None` if the card is unknown.
    pub fn review(&self, id: &CardId, rating: Rating) -> Option<NextReview> {
        self.review_at(id, rating, now_ms(), &mut rand::thread_rng())
    }

    /// Record a review of card `id` at `now`, drawing jitter from `rng`.
    pub fn review_at<R: Rng>(
        &self,
        id: &CardId,
        rating: Rating,
        now: Timestamp,
        rng: &mut R,
    ) -> Option<NextReview> {
        self.with_table_mut(|t| {
            let current = ReviewInput::from(t.get(id)?);
            let next = scheduler::next_state_at(current, rating, now, rng);
            t.update(id, &next.to_patch());
            Some(next)
        })
    }

    // -- queries ------------------------------------------------------------

    /// The card `id`, if present.
    #[must_use]
    pub fn get(&self, id: &CardId) -> Option<Card> {
        self.with_table(|t| t.get(id).cloned())
    }

    /// Cards with `due_date <= as_of`, ascending by due date.
    #[must_use]
    pub fn list_due(&self, as_of: Timestamp) -> Vec<Card> {
        self.with_table(|t| t.due(as_of))
    }

    /// Cards due right now.
    #[must_use]
    pub fn list_due_now(&self) -> Vec<Card> {
        self.list_due(now_ms())
    }

    /// Cards of `document_path`, ordered by id.
    #[must_use]
    pub fn list_for_document(&self, document_path: &str) -> Vec<Card> {
        self.with_table(|t| t.for_document(document_path))
    }

    /// Ids of the cards of `document_path`, ordered.
    #[must_use]
    pub fn ids_for_document(&self, document_path: &str) -> Vec<CardId> {
        self.with_table(|t| t.ids_for_document(document_path).into_iter().collect())
    }

    /// Distinct document paths that own at least one card, sorted.
    #[must_use]
    pub fn list_tracked_documents(&self) -> Vec<String> {
        self.with_table(CardTable::documents)
    }

    /// Every card, ordered by id.
    #[must_use]
    pub fn all_cards(&self) -> Vec<Card> {
        self.with_table(CardTable::snapshot)
    }

    /// Number of cards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_table(CardTable::len)
    }

    /// Whether the store holds no cards.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- lifecycle ----------------------------------------------------------

    /// Write the current snapshot now.
    ///
    /// Requests issued while another flush is running are answered by one
    /// shared follow-up flush. A not-ready store has nothing to write and
    /// returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Flush`] if the write failed (the data stays in
    /// memory and is retried), or [`RecallError::Closed`] if the flusher is
    /// gone.
    pub async fn flush(&self) -> Result<()> {
        let Some(commands) = self.inner.commands.lock().clone() else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        commands
            .send(Command::Flush(tx))
            .await
            .map_err(|_| RecallError::Closed)?;
        rx.await.map_err(|_| RecallError::Closed)?
    }

    /// Flush a final snapshot, stop the flusher and release the backend.
    ///
    /// The store is not-ready for every handle afterwards. Closing twice, or
    /// closing a store that never became ready, is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the final flush's error; the flusher is stopped either way.
    pub async fn close(&self) -> Result<()> {
        self.inner.shared.state.lock().ready = false;
        let Some(commands) = self.inner.commands.lock().take() else {
            return Ok(());
        };

        let (tx, rx) = oneshot::channel();
        let result = match commands.send(Command::Shutdown(tx)).await {
            Ok(()) => rx.await.unwrap_or(Err(RecallError::Closed)),
            Err(_) => Err(RecallError::Closed),
        };
        drop(commands);

        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Card store flusher did not stop cleanly");
            }
        }
        info!(backend = self.inner.backend, "Card store closed");
        result
    }
}
