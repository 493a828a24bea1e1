//! Card catalog collaborator.
//!
//! Card content (decks, words, fronts and backs) lives outside this
//! crate. The scheduling core only needs to know which card ids are
//! active for a user, and to be reconciled when that set changes: a card
//! entering the set gets a fresh state row, a card leaving it has its row
//! retired. Review log entries survive retirement.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::models::CardState;
use crate::store::{CardStateStore, Result};

pub trait CardCatalog: Send + Sync {
    /// Ids of the cards currently active for a user
    fn list_active_cards(&self, user_id: Uuid) -> BTreeSet<Uuid>;
}

/// In-memory catalog, fed by whatever owns deck/card content
#[derive(Default)]
pub struct StaticCatalog {
    active: Mutex<HashMap<Uuid, BTreeSet<Uuid>>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_card(&self, user_id: Uuid, card_id: Uuid) {
        let mut active = self.active.lock().unwrap();
        active.entry(user_id).or_default().insert(card_id);
    }

    pub fn remove_card(&self, user_id: Uuid, card_id: Uuid) {
        let mut active = self.active.lock().unwrap();
        if let Some(cards) = active.get_mut(&user_id) {
            cards.remove(&card_id);
        }
    }

    /// Replace a user's active set wholesale (catalog push notification)
    pub fn set_active_cards(&self, user_id: Uuid, cards: BTreeSet<Uuid>) {
        let mut active = self.active.lock().unwrap();
        active.insert(user_id, cards);
    }
}

impl CardCatalog for StaticCatalog {
    fn list_active_cards(&self, user_id: Uuid) -> BTreeSet<Uuid> {
        let active = self.active.lock().unwrap();
        active.get(&user_id).cloned().unwrap_or_default()
    }
}

/// What a reconcile pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub created: usize,
    pub retired: usize,
}

/// Bring the store's state rows in line with the catalog's active set
/// for one user: create rows (status New, due immediately) for cards
/// without one, retire rows whose card is gone.
pub async fn reconcile_user(
    catalog: &dyn CardCatalog,
    store: &dyn CardStateStore,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ReconcileReport> {
    let active = catalog.list_active_cards(user_id);
    let rows = store.list_for_user(user_id).await?;

    let mut report = ReconcileReport::default();

    for row in &rows {
        if !active.contains(&row.value.card_id) {
            store.remove(user_id, row.value.card_id).await?;
            report.retired += 1;
        }
    }

    let tracked: BTreeSet<Uuid> = rows.iter().map(|row| row.value.card_id).collect();
    for card_id in active {
        if !tracked.contains(&card_id) {
            store
                .insert_new(CardState::new(user_id, card_id, now))
                .await?;
            report.created += 1;
        }
    }

    if report != ReconcileReport::default() {
        log::info!(
            "Reconciled user {}: {} created, {} retired",
            user_id,
            report.created,
            report.retired
        );
    }

    Ok(report)
}
