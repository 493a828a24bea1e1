//! SM-2 Spaced Repetition Algorithm
//!
//! Pure scheduling transition: given a card's current state, a review
//! grade, and the review instant, produce the next state. No clock reads,
//! no I/O — the same inputs always yield the same output, which is what
//! makes review logs replayable.
//!
//! Quality ratings (0-5):
//! - 0: Complete blackout, no recall
//! - 1: Incorrect, but upon seeing answer, remembered
//! - 2: Incorrect, but answer seemed easy to recall
//! - 3: Correct response with serious difficulty
//! - 4: Correct response after hesitation
//! - 5: Perfect response with no hesitation

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::models::{CardState, CardStatus};

/// Minimum ease factor allowed
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Highest accepted grade
pub const MAX_GRADE: u8 = 5;

/// Grades below this are lapses
pub const PASS_THRESHOLD: u8 = 3;

/// Interval after the first successful review of a new card (days)
const FIRST_INTERVAL_DAYS: f64 = 1.0;

/// Interval on graduation, or on the first pass after a lapse (days)
const GRADUATING_INTERVAL_DAYS: f64 = 6.0;

/// Interval a lapsed card resurfaces at (days)
const LAPSE_INTERVAL_DAYS: f64 = 1.0;

/// Ease penalty applied on every lapse
const LAPSE_EASE_PENALTY: f64 = 0.2;

const MINUTES_PER_DAY: f64 = 24.0 * 60.0;

/// A grade outside the 0-5 scale. Rejected before any state is touched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("grade {grade} outside valid range 0-{MAX_GRADE}")]
pub struct InvalidGrade {
    pub grade: u8,
}

/// Whether a grade counts as a successful recall
pub fn is_pass(grade: u8) -> bool {
    grade >= PASS_THRESHOLD
}

/// Compute the next scheduling state for a card.
///
/// Lapses (`grade < 3`) reset the repetition streak and resurface the card
/// the next day; passes grow the interval 1 → 6 → interval × ease. The
/// ease factor never drops below [`MIN_EASE_FACTOR`].
pub fn schedule(
    state: &CardState,
    grade: u8,
    now: DateTime<Utc>,
) -> Result<CardState, InvalidGrade> {
    if grade > MAX_GRADE {
        return Err(InvalidGrade { grade });
    }

    let mut next = state.clone();

    if !is_pass(grade) {
        next.repetitions = 0;
        next.lapses = state.lapses + 1;
        next.status = CardStatus::Relapsed;
        next.interval_days = LAPSE_INTERVAL_DAYS;
        next.ease_factor = (state.ease_factor - LAPSE_EASE_PENALTY).max(MIN_EASE_FACTOR);
    } else {
        next.repetitions = state.repetitions + 1;

        if state.status == CardStatus::New {
            next.interval_days = FIRST_INTERVAL_DAYS;
            next.status = CardStatus::Learning;
        } else {
            // First pass after a lapse, or graduation out of Learning,
            // lands on the fixed graduating interval; established cards
            // multiply by the pre-update ease factor.
            if next.repetitions == 1 || state.status == CardStatus::Learning {
                next.interval_days = GRADUATING_INTERVAL_DAYS;
            } else {
                next.interval_days = round_days(state.interval_days * state.ease_factor);
            }
            if next.repetitions >= 2 {
                next.status = CardStatus::Review;
            }
        }

        // EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))
        let q = f64::from(grade);
        let delta = 0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02);
        next.ease_factor = (state.ease_factor + delta).max(MIN_EASE_FACTOR);
    }

    next.due_at = now + interval_duration(next.interval_days);
    next.last_reviewed_at = Some(now);

    Ok(next)
}

/// Convert a fractional-day interval into a duration, at one-minute
/// granularity with a one-minute floor.
pub fn interval_duration(interval_days: f64) -> Duration {
    let minutes = (interval_days * MINUTES_PER_DAY).round() as i64;
    Duration::minutes(minutes.max(1))
}

/// Intervals are kept at two-decimal-day precision
fn round_days(days: f64) -> f64 {
    (days * 100.0).round() / 100.0
}
