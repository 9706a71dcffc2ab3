//! Review scheduling — an SM-2 style interval and ease update.
//!
//! Given a card's current interval `I` (days) and ease `E`:
//!
//! ```text
//! Hard:          I' = 1                    E' = max(1.3, E - 0.2)
//! Good / Easy:   I' = 3 | 5   if I <= 1    (first success, Good | Easy)
//!                I' = I * E   otherwise
//!                E' = E + 0.15 for Easy, E for Good
//! ```
//!
//! The planned interval is then multiplied by a jitter factor drawn from
//! `[0.95, 1.05]` and rounded, so cards reviewed together do not all fall
//! due on the same day. The result is never below one day.
//!
//! Reference: Wozniak, P. (1990). "Optimization of learning" (SuperMemo 2).

use rand::Rng;

use crate::types::{Card, CardPatch, DAY_MS, Rating, Timestamp};

/// Ease of a card that has never been reviewed.
pub const DEFAULT_EASE: f64 = 2.5;
/// Ease floor.
pub const MIN_EASE: f64 = 1.3;
/// Interval of a card that has never been reviewed.
pub const DEFAULT_INTERVAL: u32 = 1;
/// Interval floor in days.
pub const MIN_INTERVAL: u32 = 1;

const HARD_EASE_PENALTY: f64 = 0.2;
const EASY_EASE_BONUS: f64 = 0.15;
const FIRST_GOOD_INTERVAL: f64 = 3.0;
const FIRST_EASY_INTERVAL: f64 = 5.0;
/// Half-width of the jitter window around 1.0.
pub const JITTER: f64 = 0.05;

/// Scheduling fields the update reads; absent values take the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReviewInput {
    /// Current interval in days.
    pub interval: Option<u32>,
    /// Current ease factor.
    pub ease: Option<f64>,
}

impl From<&Card> for ReviewInput {
    fn from(card: &Card) -> Self {
        Self {
            interval: Some(card.interval),
            ease: Some(card.ease),
        }
    }
}

/// Interval and ease before jitter is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plan {
    /// Planned interval in (possibly fractional) days.
    pub interval: f64,
    /// New ease factor.
    pub ease: f64,
}

/// Outcome of a review: the card's new scheduling state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextReview {
    /// Whole days until the card is due again, at least 1.
    pub interval: u32,
    /// New ease factor, at least [`MIN_EASE`].
    pub ease: f64,
    /// New due timestamp.
    pub due_date: Timestamp,
}

impl NextReview {
    /// Store patch carrying exactly the scheduling fields.
    #[must_use]
    pub fn to_patch(&self) -> CardPatch {
        CardPatch {
            interval: Some(self.interval),
            ease: Some(self.ease),
            due_date: Some(self.due_date),
            ..CardPatch::default()
        }
    }
}

/// Compute the deterministic part of the update: interval and ease before
/// jitter.
#[must_use]
pub fn plan(current: ReviewInput, rating: Rating) -> Plan {
    let ease0 = current
        .ease
        .filter(|e| e.is_finite())
        .unwrap_or(DEFAULT_EASE);
    let interval0 = current.interval.unwrap_or(DEFAULT_INTERVAL);

    let (interval, ease) = match rating {
        Rating::Hard => (1.0, (ease0 - HARD_EASE_PENALTY).max(MIN_EASE)),
        Rating::Good | Rating::Easy => {
            let interval = if interval0 <= 1 {
                if rating == Rating::Good {
                    FIRST_GOOD_INTERVAL
                } else {
                    FIRST_EASY_INTERVAL
                }
            } else {
                f64::from(interval0) * ease0
            };
            let ease = if rating == Rating::Easy {
                ease0 + EASY_EASE_BONUS
            } else {
                ease0
            };
            (interval, ease)
        }
    };

    Plan {
        interval,
        ease: ease.max(MIN_EASE),
    }
}

/// Round `interval * factor` to whole days, never below [`MIN_INTERVAL`].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn apply_jitter(interval: f64, factor: f64) -> u32 {
    let days = (interval * factor).round();
    if !days.is_finite() || days < f64::from(MIN_INTERVAL) {
        return MIN_INTERVAL;
    }
    days.min(f64::from(u32::MAX)) as u32
}

/// Compute the next review state at the current time with thread-local
/// randomness.
#[must_use]
pub fn next_state(current: ReviewInput, rating: Rating) -> NextReview {
    next_state_at(current, rating, crate::types::now_ms(), &mut rand::thread_rng())
}

/// Compute the next review state at `now`, drawing jitter from `rng`.
pub fn next_state_at<R: Rng>(
    current: ReviewInput,
    rating: Rating,
    now: Timestamp,
    rng: &mut R,
) -> NextReview {
    let plan = plan(current, rating);
    let factor = rng.gen_range((1.0 - JITTER)..=(1.0 + JITTER));
    let interval = apply_jitter(plan.interval, factor);
    let due_date = now.saturating_add(i64::from(interval).saturating_mul(DAY_MS));

    NextReview {
        interval,
        ease: plan.ease,
        due_date,
    }
}
