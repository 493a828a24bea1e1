//! In-process card state store.
//!
//! One mutex guards both the state map and the review log, which is what
//! makes `commit_review` atomic: the version check, the log append, and
//! the state replacement happen under a single short-held lock with no
//! awaits inside. When a journal directory is attached, every committed
//! record is also appended to the owning user's JSONL journal before the
//! lock is released, and [`MemoryStore::load`] can rebuild the whole map
//! from those journals.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::scheduler::models::{CardState, ReviewRecord};

use super::journal;
use super::{CardStateStore, Result, StoreError, Versioned};

#[derive(Default)]
struct Inner {
    /// State rows keyed by (user_id, card_id); no aliasing, one row per pair
    states: HashMap<(Uuid, Uuid), Versioned<CardState>>,
    /// Review log in append order, across all users
    reviews: Vec<ReviewRecord>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// When set, committed reviews are mirrored to per-user JSONL journals
    journal_dir: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            journal_dir: None,
        }
    }

    /// Store that mirrors every committed review to JSONL journals under
    /// `dir`, creating the directory if needed.
    pub fn with_journal(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            inner: Mutex::new(Inner::default()),
            journal_dir: Some(dir),
        })
    }

    /// Rebuild a store from the journals under `dir`: read every user's
    /// log, fold each card's records through the scheduler, and seed the
    /// state map with the results. Rows for never-reviewed cards are not
    /// in any journal; catalog reconciliation recreates those.
    pub fn load(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;

        let mut inner = Inner::default();

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let user_id = match journal::user_id_from_path(&path) {
                Some(id) => id,
                None => continue,
            };

            let records = journal::read_records(&path);

            // Group per card, preserving append order within each card
            let mut per_card: HashMap<Uuid, Vec<ReviewRecord>> = HashMap::new();
            for record in &records {
                per_card.entry(record.card_id).or_default().push(record.clone());
            }

            for (card_id, card_records) in per_card {
                let state = journal::replay(user_id, card_id, &card_records)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                inner.states.insert(
                    (user_id, card_id),
                    Versioned {
                        value: state,
                        // One bump per committed review on top of the
                        // initial insert, matching the live numbering
                        version: 1 + card_records.len() as u64,
                    },
                );
            }

            inner.reviews.extend(records);
        }

        log::info!(
            "Loaded {} card states from journals in {:?}",
            inner.states.len(),
            dir
        );

        Ok(Self {
            inner: Mutex::new(inner),
            journal_dir: Some(dir),
        })
    }

    fn journal_path_for(&self, user_id: Uuid) -> Option<PathBuf> {
        self.journal_dir
            .as_deref()
            .map(|dir: &Path| journal::journal_path(dir, user_id))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CardStateStore for MemoryStore {
    async fn get(&self, user_id: Uuid, card_id: Uuid) -> Result<Versioned<CardState>> {
        let inner = self.inner.lock().unwrap();
        inner
            .states
            .get(&(user_id, card_id))
            .cloned()
            .ok_or(StoreError::NotFound(card_id))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Versioned<CardState>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .states
            .values()
            .filter(|row| row.value.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_new(&self, state: CardState) -> Result<Versioned<CardState>> {
        let mut inner = self.inner.lock().unwrap();
        let key = (state.user_id, state.card_id);
        if let Some(existing) = inner.states.get(&key) {
            return Ok(existing.clone());
        }
        let row = Versioned {
            value: state,
            version: 1,
        };
        inner.states.insert(key, row.clone());
        Ok(row)
    }

    async fn commit_review(
        &self,
        expected_version: u64,
        record: ReviewRecord,
        state: CardState,
    ) -> Result<Versioned<CardState>> {
        let mut inner = self.inner.lock().unwrap();
        let key = (state.user_id, state.card_id);

        let current = inner
            .states
            .get(&key)
            .ok_or(StoreError::NotFound(state.card_id))?;

        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                card_id: state.card_id,
                expected: expected_version,
                actual: current.version,
            });
        }

        // Mirror to the journal first; a failed append leaves the row
        // untouched so the commit stays all-or-nothing.
        if let Some(path) = self.journal_path_for(record.user_id) {
            journal::append_record(&path, &record)?;
        }

        let row = Versioned {
            value: state,
            version: expected_version + 1,
        };
        inner.states.insert(key, row.clone());
        inner.reviews.push(record);

        Ok(row)
    }

    async fn remove(&self, user_id: Uuid, card_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .states
            .remove(&(user_id, card_id))
            .ok_or(StoreError::NotFound(card_id))?;
        Ok(())
    }

    async fn list_reviews(&self, user_id: Uuid) -> Result<Vec<ReviewRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reviews
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::scheduler::algorithm::schedule;

    fn seeded_card(store: &MemoryStore) -> (Uuid, Uuid) {
        let user_id = Uuid::new_v4();
        let card_id = Uuid::new_v4();
        let state = CardState::new(user_id, card_id, Utc::now());
        futures_block(store.insert_new(state)).unwrap();
        (user_id, card_id)
    }

    /// The store's async methods never actually suspend, so tests that
    /// don't need a runtime can drive them to completion directly.
    fn futures_block<F: std::future::Future>(fut: F) -> F::Output {
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn noop_raw_waker() -> RawWaker {
            fn clone(_: *const ()) -> RawWaker {
                noop_raw_waker()
            }
            fn noop(_: *const ()) {}
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }

        let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
        let mut cx = Context::from_waker(&waker);
        let mut fut = Box::pin(fut);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(out) => out,
            Poll::Pending => unreachable!("store futures are always ready"),
        }
    }

    fn record_for(state: &CardState, grade: u8) -> ReviewRecord {
        ReviewRecord {
            card_id: state.card_id,
            user_id: state.user_id,
            grade,
            reviewed_at: state.last_reviewed_at.unwrap_or_else(Utc::now),
            resulting_interval_days: state.interval_days,
            resulting_ease_factor: state.ease_factor,
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let card_id = Uuid::new_v4();
        let now = Utc::now();

        let first = store
            .insert_new(CardState::new(user_id, card_id, now))
            .await
            .unwrap();
        assert_eq!(first.version, 1);

        // Re-inserting (e.g. a second reconcile pass) keeps the row
        let second = store
            .insert_new(CardState::new(user_id, card_id, now))
            .await
            .unwrap();
        assert_eq!(second.version, 1);
    }

    #[tokio::test]
    async fn test_commit_bumps_version_and_appends_log() {
        let store = MemoryStore::new();
        let (user_id, card_id) = seeded_card(&store);
        let now = Utc::now();

        let row = store.get(user_id, card_id).await.unwrap();
        let next = schedule(&row.value, 4, now).unwrap();
        let committed = store
            .commit_review(row.version, record_for(&next, 4), next)
            .await
            .unwrap();

        assert_eq!(committed.version, 2);
        let reviews = store.list_reviews(user_id).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].grade, 4);
    }

    #[tokio::test]
    async fn test_stale_commit_is_rejected_and_changes_nothing() {
        let store = MemoryStore::new();
        let (user_id, card_id) = seeded_card(&store);
        let now = Utc::now();

        let row = store.get(user_id, card_id).await.unwrap();
        let next = schedule(&row.value, 4, now).unwrap();

        // Winner commits against version 1
        store
            .commit_review(row.version, record_for(&next, 4), next.clone())
            .await
            .unwrap();

        // Loser still holds version 1
        let result = store
            .commit_review(row.version, record_for(&next, 2), next)
            .await;
        match result {
            Err(StoreError::VersionConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected version conflict, got {:?}", other.map(|r| r.version)),
        }

        // The losing record must not have been appended
        assert_eq!(store.list_reviews(user_id).await.unwrap().len(), 1);
    }

    /// Two threads race the same snapshot version: exactly one commit
    /// lands, the other sees a version conflict.
    #[test]
    fn test_concurrent_commits_one_winner() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let (user_id, card_id) = seeded_card(&store);
        let now = Utc::now();

        let row = futures_block(store.get(user_id, card_id)).unwrap();

        let mut handles = Vec::new();
        for grade in [4u8, 2] {
            let store = std::sync::Arc::clone(&store);
            let base = row.value.clone();
            let version = row.version;
            handles.push(std::thread::spawn(move || {
                let next = schedule(&base, grade, now).unwrap();
                futures_block(store.commit_review(version, record_for(&next, grade), next))
                    .is_ok()
            }));
        }

        let outcomes: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);
        assert_eq!(
            futures_block(store.get(user_id, card_id)).unwrap().version,
            2
        );
    }

    #[tokio::test]
    async fn test_remove_retires_row_but_keeps_log() {
        let store = MemoryStore::new();
        let (user_id, card_id) = seeded_card(&store);
        let now = Utc::now();

        let row = store.get(user_id, card_id).await.unwrap();
        let next = schedule(&row.value, 4, now).unwrap();
        store
            .commit_review(row.version, record_for(&next, 4), next)
            .await
            .unwrap();

        store.remove(user_id, card_id).await.unwrap();
        assert!(matches!(
            store.get(user_id, card_id).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.list_reviews(user_id).await.unwrap().len(), 1);
    }

    /// Journaled store → fresh load: replayed rows match what was
    /// persisted, version numbering included.
    #[tokio::test]
    async fn test_load_rebuilds_states_from_journals() {
        let dir = std::env::temp_dir().join(format!("mneme_store_{}", Uuid::new_v4()));
        let store = MemoryStore::with_journal(dir.clone()).unwrap();

        let user_id = Uuid::new_v4();
        let card_id = Uuid::new_v4();
        let mut now = Utc::now();
        store
            .insert_new(CardState::new(user_id, card_id, now))
            .await
            .unwrap();

        for grade in [4u8, 4, 1, 5] {
            let row = store.get(user_id, card_id).await.unwrap();
            now += chrono::Duration::days(1);
            let next = schedule(&row.value, grade, now).unwrap();
            let mut record = record_for(&next, grade);
            record.reviewed_at = now;
            store.commit_review(row.version, record, next).await.unwrap();
        }

        let live = store.get(user_id, card_id).await.unwrap();

        let reloaded = MemoryStore::load(dir.clone()).unwrap();
        let rebuilt = reloaded.get(user_id, card_id).await.unwrap();

        assert_eq!(rebuilt.version, live.version);
        assert_eq!(rebuilt.value.interval_days, live.value.interval_days);
        assert_eq!(rebuilt.value.ease_factor, live.value.ease_factor);
        assert_eq!(rebuilt.value.repetitions, live.value.repetitions);
        assert_eq!(rebuilt.value.lapses, live.value.lapses);
        assert_eq!(rebuilt.value.due_at, live.value.due_at);
        assert_eq!(rebuilt.value.status, live.value.status);
        assert_eq!(reloaded.list_reviews(user_id).await.unwrap().len(), 4);

        let _ = fs::remove_dir_all(&dir);
    }
}
