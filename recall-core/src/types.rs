//! Core type definitions for the recall card system.
//!
//! All persisted types are serializable; timestamps are integer
//! milliseconds since the Unix epoch.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::scheduler::{DEFAULT_EASE, DEFAULT_INTERVAL, MIN_EASE, MIN_INTERVAL};

/// Milliseconds in one day.
pub const DAY_MS: i64 = 86_400_000;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> Timestamp {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable identifier of a card, derived from document path and heading text.
///
/// See [`crate::identity::identify`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub String);

impl CardId {
    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CardId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// The unit of review: one heading of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Stable identifier; never changes once the card exists.
    pub id: CardId,
    /// Path of the owning document.
    pub document_path: String,
    /// Heading text shown as the prompt.
    pub question: String,
    /// When the card becomes eligible for review.
    pub due_date: Timestamp,
    /// Days until the next due date after a successful review.
    pub interval: u32,
    /// Interval growth multiplier, never below [`MIN_EASE`].
    pub ease: f64,
}

impl Card {
    /// Create a card with default scheduling state, due at `now`.
    #[must_use]
    pub fn new(
        id: CardId,
        document_path: impl Into<String>,
        question: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            document_path: document_path.into(),
            question: question.into(),
            due_date: now,
            interval: DEFAULT_INTERVAL,
            ease: DEFAULT_EASE,
        }
    }

    /// Whether the card is due at `as_of`.
    #[must_use]
    pub fn is_due(&self, as_of: Timestamp) -> bool {
        self.due_date <= as_of
    }
}

/// Typed partial update over the mutable attributes of a [`Card`].
///
/// Fields left as `None` are not touched. The identifier is deliberately
/// absent: a card's id cannot be patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardPatch {
    /// New owning document path.
    pub document_path: Option<String>,
    /// New prompt text.
    pub question: Option<String>,
    /// New due timestamp.
    pub due_date: Option<Timestamp>,
    /// New interval in days; raised to at least 1.
    pub interval: Option<u32>,
    /// New ease factor; raised to at least [`MIN_EASE`].
    pub ease: Option<f64>,
}

impl CardPatch {
    /// Whether the patch carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.document_path.is_none()
            && self.question.is_none()
            && self.due_date.is_none()
            && self.interval.is_none()
            && self.ease.is_none()
    }

    /// Apply the present fields to `card`.
    ///
    /// Returns `true` if any stored value actually changed.
    pub fn apply(&self, card: &mut Card) -> bool {
        let before = card.clone();
        if let Some(path) = &self.document_path {
            card.document_path.clone_from(path);
        }
        if let Some(question) = &self.question {
            card.question.clone_from(question);
        }
        if let Some(due) = self.due_date {
            card.due_date = due;
        }
        if let Some(interval) = self.interval {
            card.interval = interval.max(MIN_INTERVAL);
        }
        if let Some(ease) = self.ease {
            card.ease = if ease.is_finite() { ease.max(MIN_EASE) } else { MIN_EASE };
        }
        *card != before
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// One heading of a document: its text and nesting level (1–6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Plain heading text.
    pub text: String,
    /// Nesting level, 1 for a top-level heading.
    pub level: u8,
}

impl Heading {
    /// Create a heading.
    #[must_use]
    pub fn new(text: impl Into<String>, level: u8) -> Self {
        Self {
            text: text.into(),
            level,
        }
    }
}

// ---------------------------------------------------------------------------
// Review outcome
// ---------------------------------------------------------------------------

/// How well the user recalled a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// Recalled with difficulty or not at all; resets the interval.
    Hard,
    /// Recalled correctly.
    Good,
    /// Recalled effortlessly; also raises the ease factor.
    Easy,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        })
    }
}

impl FromStr for Rating {
    type Err = crate::RecallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard" => Ok(Self::Hard),
            "good" => Ok(Self::Good),
            "easy" => Ok(Self::Easy),
            other => Err(crate::RecallError::Config(format!(
                "unknown rating '{other}' (expected hard, good or easy)"
            ))),
        }
    }
}
