//! Tracked-document bookkeeping.
//!
//! [`Tracker`] owns the tracked list together with the card store and turns
//! user commands (track, untrack, review) and document events (modified,
//! renamed, deleted) into store and reconciliation calls.

use rand::Rng;
use tracing::{debug, info};

use crate::config::TrackingConfig;
use crate::reconcile::{self, ReconcileReport};
use crate::scheduler::NextReview;
use crate::source::DocumentSource;
use crate::store::CardStore;
use crate::types::{Card, CardId, Rating, Timestamp};

/// The tracked list and the store it indexes into.
#[derive(Debug, Clone)]
pub struct Tracker {
    config: TrackingConfig,
    store: CardStore,
}

impl Tracker {
    /// Combine a tracking configuration with an open store.
    #[must_use]
    pub fn new(config: TrackingConfig, store: CardStore) -> Self {
        Self { config, store }
    }

    /// The current tracking configuration.
    #[must_use]
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &CardStore {
        &self.store
    }

    /// Whether `path` is tracked.
    #[must_use]
    pub fn is_tracked(&self, path: &str) -> bool {
        self.config.is_tracked(path)
    }

    /// Start tracking `path` and index it.
    ///
    /// Returns `None` if it was already tracked; otherwise the report of
    /// the first index, which is empty when the document does not exist
    /// yet.
    pub fn track<S: DocumentSource + ?Sized>(
        &mut self,
        path: &str,
        source: &S,
    ) -> Option<ReconcileReport> {
        if !self.config.track(path) {
            debug!(document = path, "Already tracked");
            return None;
        }
        info!(document = path, "Started tracking document");
        Some(
            reconcile::reconcile_from_source(&self.store, source, path, self.config.stale_policy)
                .unwrap_or_else(|| ReconcileReport {
                    document: path.to_string(),
                    ..ReconcileReport::default()
                }),
        )
    }

    /// Stop tracking `path` and delete its cards.
    ///
    /// Returns the number of cards deleted, or `None` if it was not tracked.
    pub fn untrack(&mut self, path: &str) -> Option<usize> {
        if !self.config.untrack(path) {
            return None;
        }
        let removed = self.store.delete_all_for_document(path);
        info!(document = path, removed, "Stopped tracking document");
        Some(removed)
    }

    /// Re-index `path` after its content changed. Untracked documents are
    /// ignored.
    pub fn on_modified<S: DocumentSource + ?Sized>(
        &self,
        path: &str,
        source: &S,
    ) -> Option<ReconcileReport> {
        if !self.config.is_tracked(path) {
            return None;
        }
        debug!(document = path, "Tracked document modified; re-indexing");
        reconcile::reconcile_from_source(&self.store, source, path, self.config.stale_policy)
    }

    /// Follow a rename of a tracked document.
    ///
    /// Returns the number of cards moved, or `None` if `old_path` was not
    /// tracked. Card ids keep deriving from the old path.
    pub fn on_renamed(&mut self, old_path: &str, new_path: &str) -> Option<usize> {
        if !self.config.rename(old_path, new_path) {
            return None;
        }
        let moved = self.store.rename_document(old_path, new_path);
        info!(from = old_path, to = new_path, moved, "Tracked document renamed");
        Some(moved)
    }

    /// A tracked document was deleted; same as [`untrack`](Self::untrack).
    pub fn on_deleted(&mut self, path: &str) -> Option<usize> {
        self.untrack(path)
    }

    /// Re-index every tracked document that `source` still has.
    pub fn reindex_all<S: DocumentSource + ?Sized>(&self, source: &S) -> Vec<ReconcileReport> {
        reconcile::reindex_all(&self.store, source, &self.config)
    }

    /// Record a review of card `id`.
    pub fn review(&self, id: &CardId, rating: Rating) -> Option<NextReview> {
        let next = self.store.review(id, rating)?;
        debug!(card = %id, %rating, interval = next.interval, "Card reviewed");
        Some(next)
    }

    /// [`review`](Self::review) at an explicit time and randomness.
    pub fn review_at<R: Rng>(
        &self,
        id: &CardId,
        rating: Rating,
        now: Timestamp,
        rng: &mut R,
    ) -> Option<NextReview> {
        self.store.review_at(id, rating, now, rng)
    }

    /// The section under card `id`'s heading in its document, i.e. the
    /// answer shown during review.
    ///
    /// `None` if the card is unknown, its document is gone, or the heading
    /// no longer appears in it.
    pub fn answer<S: DocumentSource + ?Sized>(&self, id: &CardId, source: &S) -> Option<String> {
        let card = self.store.get(id)?;
        let content = source.content(&card.document_path)?;
        crate::source::section(&content, &card.question)
    }

    /// Cards due now, earliest first.
    #[must_use]
    pub fn due_cards(&self) -> Vec<Card> {
        self.store.list_due_now()
    }

    /// Tracked document paths in tracking order.
    #[must_use]
    pub fn tracked_documents(&self) -> &[String] {
        &self.config.documents
    }

    /// Give back the configuration, e.g. for saving.
    #[must_use]
    pub fn into_parts(self) -> (TrackingConfig, CardStore) {
        (self.config, self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StalePolicy;
    use crate::identity::identify;
    use crate::source::MemorySource;

    async fn tracker() -> (Tracker, MemorySource) {
        let source = MemorySource::new();
        source.insert("a.md", "# Alpha\n## Beta\n");
        source.insert("b.md", "# Gamma\n");
        (Tracker::new(TrackingConfig::default(), CardStore::in_memory().await), source)
    }

    #[tokio::test]
    async fn track_indexes_once() {
        let (mut t, source) = tracker().await;
        let report = t.track("a.md", &source).expect("newly tracked");
        assert_eq!(report.created, 2);
        assert!(t.track("a.md", &source).is_none());
        assert_eq!(t.tracked_documents(), ["a.md"]);
        assert_eq!(t.due_cards().len(), 2);
    }

    #[tokio::test]
    async fn track_missing_document_still_tracks() {
        let (mut t, source) = tracker().await;
        let report = t.track("later.md", &source).expect("tracked");
        assert_eq!(report.current, 0);
        assert!(t.is_tracked("later.md"));

        source.insert("later.md", "# Soon\n");
        let report = t.on_modified("later.md", &source).expect("re-indexed");
        assert_eq!(report.created, 1);
    }

    #[tokio::test]
    async fn untrack_deletes_cards() {
        let (mut t, source) = tracker().await;
        t.track("a.md", &source);
        t.track("b.md", &source);
        assert_eq!(t.untrack("a.md"), Some(2));
        assert_eq!(t.untrack("a.md"), None);
        assert_eq!(t.store().list_tracked_documents(), vec!["b.md"]);
    }

    #[tokio::test]
    async fn modified_untracked_document_is_ignored() {
        let (t, source) = tracker().await;
        assert!(t.on_modified("a.md", &source).is_none());
        assert!(t.store().is_empty());
    }

    #[tokio::test]
    async fn rename_moves_cards_and_list_entry() {
        let (mut t, source) = tracker().await;
        t.track("a.md", &source);
        assert_eq!(t.on_renamed("a.md", "moved/a.md"), Some(2));
        assert_eq!(t.tracked_documents(), ["moved/a.md"]);
        let card = t.store().get(&identify("a.md", "Alpha")).expect("same id");
        assert_eq!(card.document_path, "moved/a.md");
        assert_eq!(t.on_renamed("nope.md", "x.md"), None);
    }

    #[tokio::test]
    async fn deleted_document_is_untracked() {
        let (mut t, source) = tracker().await;
        t.track("b.md", &source);
        assert_eq!(t.on_deleted("b.md"), Some(1));
        assert!(t.tracked_documents().is_empty());
        assert!(t.store().is_empty());
    }

    #[tokio::test]
    async fn review_reschedules_card() {
        let (mut t, source) = tracker().await;
        t.track("b.md", &source);
        let id = identify("b.md", "Gamma");
        let next = t.review(&id, Rating::Hard).expect("known");
        assert_eq!(next.interval, 1);
        assert!(t.due_cards().is_empty());
    }

    #[tokio::test]
    async fn answer_is_the_section_under_the_heading() {
        let (mut t, source) = tracker().await;
        source.insert("a.md", "# Alpha\nFirst letter.\n## Beta\nSecond letter.\n");
        t.track("a.md", &source);
        let alpha = identify("a.md", "Alpha");
        assert_eq!(
            t.answer(&alpha, &source).expect("section"),
            "First letter.\n## Beta\nSecond letter."
        );
        assert_eq!(
            t.answer(&identify("a.md", "Beta"), &source).expect("section"),
            "Second letter."
        );

        source.insert("a.md", "# Omega\n");
        assert!(t.answer(&alpha, &source).is_none());
        assert!(t.answer(&CardId::from("0000000000000000"), &source).is_none());
    }

    #[tokio::test]
    async fn reindex_all_applies_delete_policy() {
        let source = MemorySource::new();
        source.insert("a.md", "# Alpha\n## Beta\n");
        let config = TrackingConfig {
            documents: vec!["a.md".into()],
            stale_policy: StalePolicy::Delete,
        };
        let t = Tracker::new(config, CardStore::in_memory().await);
        t.reindex_all(&source);
        source.insert("a.md", "# Alpha\n");
        let reports = t.reindex_all(&source);
        assert_eq!(reports[0].deleted, 1);
        assert_eq!(t.store().len(), 1);
    }
}
