//! Card state persistence seam
//!
//! The scheduling core owns no storage technology. It talks to a
//! [`CardStateStore`]: versioned reads plus a single conditional commit
//! that persists the review record and the rewritten card state together
//! or not at all. Two implementations ship with the crate:
//! - [`memory::MemoryStore`] — in-process map, optionally journaled
//! - [`journal`] — the JSONL append-only review log and replay fold

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::scheduler::algorithm::is_pass;
use crate::scheduler::models::{CardState, CardStatus, ReviewRecord, ReviewStats};

pub mod journal;
pub mod memory;

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("card state not found: {0}")]
    NotFound(Uuid),

    #[error("version conflict on card {card_id}: expected {expected}, found {actual}")]
    VersionConflict {
        card_id: Uuid,
        expected: u64,
        actual: u64,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored value together with its logical clock. The version bumps on
/// every committed write and is the token checked by the conditional
/// commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Persistence contract for card scheduling state and the review log.
///
/// Rows are keyed by `(user_id, card_id)`. All mutation goes through
/// `insert_new`, `commit_review`, and `remove`; there is no unconditional
/// state write.
#[async_trait]
pub trait CardStateStore: Send + Sync {
    /// Read one card's state with its current version
    async fn get(&self, user_id: Uuid, card_id: Uuid) -> Result<Versioned<CardState>>;

    /// All state rows for a user, in no particular order
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Versioned<CardState>>>;

    /// Create the row for a card entering the user's active set.
    /// A row that already exists is returned unchanged.
    async fn insert_new(&self, state: CardState) -> Result<Versioned<CardState>>;

    /// Conditionally commit one review: if the row's version still equals
    /// `expected_version`, append `record` to the review log and replace
    /// the state, as one atomic step. Otherwise fail with
    /// [`StoreError::VersionConflict`] and change nothing.
    async fn commit_review(
        &self,
        expected_version: u64,
        record: ReviewRecord,
        state: CardState,
    ) -> Result<Versioned<CardState>>;

    /// Retire a card's state row (the card left the active set).
    /// Review log entries are kept; the log is append-only.
    async fn remove(&self, user_id: Uuid, card_id: Uuid) -> Result<()>;

    /// The user's full review log in append order
    async fn list_reviews(&self, user_id: Uuid) -> Result<Vec<ReviewRecord>>;

    /// Scheduling statistics for a user at `now`
    async fn review_stats(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<ReviewStats> {
        let states = self.list_for_user(user_id).await?;
        let reviews = self.list_reviews(user_id).await?;

        let mut stats = ReviewStats {
            total_cards: states.len(),
            ..ReviewStats::default()
        };

        for row in &states {
            match row.value.status {
                CardStatus::New => stats.new_cards += 1,
                CardStatus::Learning => stats.learning_cards += 1,
                CardStatus::Review => stats.review_cards += 1,
                CardStatus::Relapsed => stats.relapsed_cards += 1,
            }
            if row.value.is_due(now) {
                stats.due_cards += 1;
            }
        }

        let today = start_of_day(now);
        for record in &reviews {
            if record.reviewed_at >= today && record.reviewed_at <= now {
                stats.reviews_today += 1;
                if is_pass(record.grade) {
                    stats.correct_today += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// Midnight (UTC) of the day containing `now`
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

/// Count the cards whose first-ever review record falls at or after
/// `since`. Records are expected in append order, as `list_reviews`
/// returns them. This is the daily "new cards introduced" accounting used
/// by the due queue.
pub fn cards_introduced_since(records: &[ReviewRecord], since: DateTime<Utc>) -> usize {
    let mut first_seen: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
    for record in records {
        first_seen
            .entry(record.card_id)
            .or_insert(record.reviewed_at);
    }
    first_seen.values().filter(|ts| **ts >= since).count()
}
