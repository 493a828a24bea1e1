//! Data models for the scheduling engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a card in the spaced repetition system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardStatus {
    /// Never reviewed
    New,
    /// Passed its first review, not yet graduated
    Learning,
    /// Regular spaced review
    Review,
    /// Lapsed and working back up
    Relapsed,
}

impl Default for CardStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Current spaced repetition state for one user-card pair.
///
/// A row exists from the moment a card enters the user's active set and
/// is only ever rewritten by the scheduler; `due_at` always equals
/// `last_reviewed_at + interval_days` once the card has been reviewed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardState {
    pub card_id: Uuid,
    pub user_id: Uuid,
    /// Current interval in days (fractional days allowed)
    #[serde(default)]
    pub interval_days: f64,
    /// SM-2 ease factor (default 2.5, floor 1.3)
    #[serde(default = "default_ease_factor")]
    pub ease_factor: f64,
    /// Consecutive successful reviews since the last lapse
    #[serde(default)]
    pub repetitions: u32,
    /// Total number of lapses over the card's lifetime
    #[serde(default)]
    pub lapses: u32,
    /// When the card is next eligible for review
    pub due_at: DateTime<Utc>,
    /// Last review instant, absent for never-reviewed cards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: CardStatus,
}

fn default_ease_factor() -> f64 {
    2.5
}

impl CardState {
    /// Fresh state for a card entering the user's active set.
    /// New cards are due immediately.
    pub fn new(user_id: Uuid, card_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            card_id,
            user_id,
            interval_days: 0.0,
            ease_factor: default_ease_factor(),
            repetitions: 0,
            lapses: 0,
            due_at: now,
            last_reviewed_at: None,
            status: CardStatus::New,
        }
    }

    /// Check whether the card is eligible for review at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at
    }
}

/// A record of a single review, appended once and never rewritten.
///
/// The review log is the audit trail; the persisted `CardState` is a
/// derived cache that can be rebuilt by folding the log through the
/// scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub card_id: Uuid,
    pub user_id: Uuid,
    /// Quality rating (0-5, SM-2 scale)
    /// 0-2 = lapse
    /// 3 = correct with difficulty
    /// 4 = correct with hesitation
    /// 5 = perfect response
    pub grade: u8,
    /// When the review occurred
    pub reviewed_at: DateTime<Utc>,
    /// Interval produced by this review (days)
    pub resulting_interval_days: f64,
    /// Ease factor after this review
    pub resulting_ease_factor: f64,
}

/// Per-user scheduling statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub total_cards: usize,
    pub new_cards: usize,
    pub learning_cards: usize,
    pub review_cards: usize,
    pub relapsed_cards: usize,
    pub due_cards: usize,
    pub reviews_today: usize,
    pub correct_today: usize,
}

/// Report for one finished (or expired) study session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub cards_reviewed: usize,
    pub cards_correct: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: i64,
    /// Fraction of submitted reviews graded at or above the pass threshold
    pub accuracy: f64,
}
