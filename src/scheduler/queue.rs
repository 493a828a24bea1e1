//! Due queue construction.
//!
//! A queue is a snapshot: every card whose `due_at` has passed, plus new
//! cards up to the day's remaining allowance, interleaved so unfamiliar
//! material doesn't pile up at the front. Building a queue reads state
//! and mutates nothing; a fresh call re-evaluates due-ness from scratch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::StudyConfig;
use crate::store::{cards_introduced_since, start_of_day, CardStateStore, Result};

use super::models::{CardState, CardStatus};

pub struct DueQueueBuilder {
    store: Arc<dyn CardStateStore>,
    config: StudyConfig,
}

impl DueQueueBuilder {
    pub fn new(store: Arc<dyn CardStateStore>, config: StudyConfig) -> Self {
        Self { store, config }
    }

    /// Ordered card ids eligible for review at `now`, truncated to `cap`
    pub async fn build(&self, user_id: Uuid, now: DateTime<Utc>, cap: usize) -> Result<Vec<Uuid>> {
        let rows = self.store.list_for_user(user_id).await?;
        let states: Vec<CardState> = rows.into_iter().map(|row| row.value).collect();

        let reviews = self.store.list_reviews(user_id).await?;
        let introduced_today = cards_introduced_since(&reviews, start_of_day(now));

        Ok(plan_queue(&states, introduced_today, now, cap, &self.config))
    }
}

/// Pure queue planning over a set of card states.
///
/// New cards (never reviewed) are admitted up to the daily allowance
/// remaining after `introduced_today`; reviewed cards are due when
/// `due_at <= now`. Each class is ordered by ascending `due_at` with
/// `card_id` as the deterministic tie-break, then interleaved
/// review-first at the configured ratio. `cap` drops from the tail only.
pub fn plan_queue(
    states: &[CardState],
    introduced_today: usize,
    now: DateTime<Utc>,
    cap: usize,
    config: &StudyConfig,
) -> Vec<Uuid> {
    let mut new_cards: Vec<&CardState> = Vec::new();
    let mut review_cards: Vec<&CardState> = Vec::new();

    for state in states {
        if !state.is_due(now) {
            continue;
        }
        if state.status == CardStatus::New {
            new_cards.push(state);
        } else {
            review_cards.push(state);
        }
    }

    let by_urgency = |a: &&CardState, b: &&CardState| {
        a.due_at.cmp(&b.due_at).then(a.card_id.cmp(&b.card_id))
    };
    new_cards.sort_by(by_urgency);
    review_cards.sort_by(by_urgency);

    let allowance = config.new_cards_per_day.saturating_sub(introduced_today);
    new_cards.truncate(allowance);

    if cap == 0 {
        return Vec::new();
    }

    let mut queue = Vec::with_capacity((new_cards.len() + review_cards.len()).min(cap));
    let mut new_iter = new_cards.into_iter();
    let mut review_iter = review_cards.into_iter();

    // Blocks of N reviews then one new card; whichever class runs out
    // first, the other drains in order.
    'interleave: loop {
        let mut progressed = false;
        for _ in 0..config.reviews_per_new.max(1) {
            match review_iter.next() {
                Some(state) => {
                    queue.push(state.card_id);
                    progressed = true;
                    if queue.len() == cap {
                        break 'interleave;
                    }
                }
                None => break,
            }
        }
        if let Some(state) = new_iter.next() {
            queue.push(state.card_id);
            progressed = true;
            if queue.len() == cap {
                break;
            }
        }
        if !progressed {
            break;
        }
    }

    queue
}
