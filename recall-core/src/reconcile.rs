//! Aligning stored cards with the live headings of documents.
//!
//! Reconciliation is stateless: everything it needs (the store, the
//! headings, the tracked list and the stale policy) is passed in, so a
//! single document can be re-indexed on its own and a full re-index is just
//! the per-document step repeated.
//!
//! Cards of headings that still exist keep their review history; only the
//! question is refreshed. What happens to cards whose heading disappeared
//! is decided by [`StalePolicy`].

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::config::{StalePolicy, TrackingConfig};
use crate::identity::identify;
use crate::source::DocumentSource;
use crate::store::CardStore;
use crate::types::{CardId, Heading};

/// Outcome of reconciling one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Document that was reconciled.
    pub document: String,
    /// Distinct cards the document's headings map to.
    pub current: usize,
    /// Cards created for headings seen for the first time.
    pub created: usize,
    /// Existing cards whose question text was refreshed.
    pub updated: usize,
    /// Cards whose heading is gone, ordered by id.
    pub stale: Vec<CardId>,
    /// How many of the stale cards were deleted.
    pub deleted: usize,
}

/// Bring the cards of `document_path` in line with `headings`.
///
/// Every heading is upserted under its derived id, in document order.
/// Existing cards under `document_path` that no heading maps to are
/// reported as stale and, with [`StalePolicy::Delete`], removed.
pub fn reconcile_document(
    store: &CardStore,
    document_path: &str,
    headings: &[Heading],
    policy: StalePolicy,
) -> ReconcileReport {
    let existing: BTreeSet<CardId> = store.ids_for_document(document_path).into_iter().collect();
    let mut report = ReconcileReport {
        document: document_path.to_string(),
        ..ReconcileReport::default()
    };

    let mut current = BTreeSet::new();
    for heading in headings {
        let id = identify(document_path, &heading.text);
        let known = existing.contains(&id) || store.get(&id).is_some();
        if store.upsert(&id, document_path, &heading.text) {
            if known {
                report.updated += 1;
            } else {
                report.created += 1;
            }
        }
        current.insert(id);
    }
    report.current = current.len();

    report.stale = existing.difference(&current).cloned().collect();
    if policy == StalePolicy::Delete {
        report.deleted = report.stale.iter().filter(|id| store.delete(id)).count();
    }

    if report.created + report.updated + report.stale.len() > 0 {
        info!(
            document = document_path,
            headings = headings.len(),
            created = report.created,
            updated = report.updated,
            stale = report.stale.len(),
            deleted = report.deleted,
            "Reconciled document"
        );
    } else {
        debug!(document = document_path, headings = headings.len(), "Document already in sync");
    }
    report
}

/// Reconcile `document_path` against what `source` currently holds.
///
/// Returns `None` when the source has no such document; its cards are left
/// alone.
pub fn reconcile_from_source<S: DocumentSource + ?Sized>(
    store: &CardStore,
    source: &S,
    document_path: &str,
    policy: StalePolicy,
) -> Option<ReconcileReport> {
    let headings = source.headings(document_path)?;
    Some(reconcile_document(store, document_path, &headings, policy))
}

/// Reconcile every tracked document, in tracking order.
///
/// Documents missing from `source` are skipped.
pub fn reindex_all<S: DocumentSource + ?Sized>(
    store: &CardStore,
    source: &S,
    tracking: &TrackingConfig,
) -> Vec<ReconcileReport> {
    info!(documents = tracking.documents.len(), "Re-indexing tracked documents");
    let mut reports = Vec::with_capacity(tracking.documents.len());
    for path in &tracking.documents {
        match reconcile_from_source(store, source, path, tracking.stale_policy) {
            Some(report) => reports.push(report),
            None => debug!(document = %path, "Tracked document not found; skipped"),
        }
    }
    info!(reconciled = reports.len(), "Re-index complete");
    reports
}
