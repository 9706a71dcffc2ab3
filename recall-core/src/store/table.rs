//! In-memory card table with a per-document index.
//!
//! Invariants kept by every mutating method:
//! - each card id appears in exactly one document set, the one named by its
//!   `document_path`;
//! - no document set is empty;
//! - `generation` increases by one for every call that changed something.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Card, CardId, CardPatch, Timestamp};

/// The logical dataset of a card store.
#[derive(Debug, Default)]
pub(crate) struct CardTable {
    cards: BTreeMap<CardId, Card>,
    by_document: BTreeMap<String, BTreeSet<CardId>>,
    generation: u64,
}

impl CardTable {
    /// Build a table from a loaded snapshot. Later duplicates of an id win.
    pub(crate) fn from_cards(cards: Vec<Card>) -> Self {
        let mut table = Self::default();
        for card in cards {
            table.insert(card);
        }
        table.generation = 0;
        table
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn len(&self) -> usize {
        self.cards.len()
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    fn index(&mut self, path: &str, id: &CardId) {
        self.by_document
            .entry(path.to_string())
            .or_default()
            .insert(id.clone());
    }

    fn unindex(&mut self, path: &str, id: &CardId) {
        if let Some(ids) = self.by_document.get_mut(path) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_document.remove(path);
            }
        }
    }

    fn insert(&mut self, card: Card) {
        if let Some(old) = self.cards.remove(&card.id) {
            self.unindex(&old.document_path, &old.id);
        }
        self.index(&card.document_path, &card.id);
        self.cards.insert(card.id.clone(), card);
        self.bump();
    }

    /// Insert a fresh card, or refresh only the question of an existing one.
    ///
    /// Returns `true` if the table changed.
    pub(crate) fn upsert(
        &mut self,
        id: &CardId,
        document_path: &str,
        question: &str,
        now: Timestamp,
    ) -> bool {
        if let Some(card) = self.cards.get_mut(id) {
            if card.question == question {
                return false;
            }
            card.question = question.to_string();
            self.bump();
            return true;
        }
        self.insert(Card::new(id.clone(), document_path, question, now));
        true
    }

    pub(crate) fn get(&self, id: &CardId) -> Option<&Card> {
        self.cards.get(id)
    }

    /// Apply `patch` to the card `id`. Returns `true` if the card changed.
    pub(crate) fn update(&mut self, id: &CardId, patch: &CardPatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        let Some(card) = self.cards.get_mut(id) else {
            return false;
        };
        let old_path = card.document_path.clone();
        if !patch.apply(card) {
            return false;
        }
        let new_path = card.document_path.clone();
        if new_path != old_path {
            self.unindex(&old_path, id);
            self.index(&new_path, id);
        }
        self.bump();
        true
    }

    pub(crate) fn remove(&mut self, id: &CardId) -> Option<Card> {
        let card = self.cards.remove(id)?;
        self.unindex(&card.document_path, id);
        self.bump();
        Some(card)
    }

    /// Remove every card of `document_path`; returns how many were removed.
    pub(crate) fn delete_document(&mut self, document_path: &str) -> usize {
        let Some(ids) = self.by_document.remove(document_path) else {
            return 0;
        };
        for id in &ids {
            self.cards.remove(id);
        }
        self.bump();
        ids.len()
    }

    /// Move every card of `old` to `new`; returns how many moved.
    pub(crate) fn rename_document(&mut self, old: &str, new: &str) -> usize {
        if old == new {
            return 0;
        }
        let Some(ids) = self.by_document.remove(old) else {
            return 0;
        };
        for id in &ids {
            if let Some(card) = self.cards.get_mut(id) {
                card.document_path = new.to_string();
            }
        }
        let moved = ids.len();
        self.by_document.entry(new.to_string()).or_default().extend(ids);
        self.bump();
        moved
    }

    /// Cards due at `as_of`, ascending by due date (ties by id).
    pub(crate) fn due(&self, as_of: Timestamp) -> Vec<Card> {
        let mut due: Vec<Card> = self
            .cards
            .values()
            .filter(|c| c.is_due(as_of))
            .cloned()
            .collect();
        // Stable sort over id order keeps ties deterministic.
        due.sort_by_key(|c| c.due_date);
        due
    }

    /// Cards of `document_path`, ordered by id.
    pub(crate) fn for_document(&self, document_path: &str) -> Vec<Card> {
        self.by_document
            .get(document_path)
            .map(|ids| ids.iter().filter_map(|id| self.cards.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Ids of the cards of `document_path`.
    pub(crate) fn ids_for_document(&self, document_path: &str) -> BTreeSet<CardId> {
        self.by_document.get(document_path).cloned().unwrap_or_default()
    }

    /// Distinct document paths, lexicographically.
    pub(crate) fn documents(&self) -> Vec<String> {
        self.by_document.keys().cloned().collect()
    }

    /// All cards, ordered by id.
    pub(crate) fn snapshot(&self) -> Vec<Card> {
        self.cards.values().cloned().collect()
    }

    #[cfg(test)]
    fn check_index(&self) {
        let indexed: usize = self.by_document.values().map(BTreeSet::len).sum();
        assert_eq!(indexed, self.cards.len(), "index size mismatch");
        for (path, ids) in &self.by_document {
            assert!(!ids.is_empty(), "empty index set for {path}");
            for id in ids {
                let card = self.cards.get(id).expect("indexed card exists");
                assert_eq!(&card.document_path, path);
            }
        }
    }
}
