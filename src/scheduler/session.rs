//! Study session coordination.
//!
//! A session is a queue snapshot plus an in-memory cursor: the queue is
//! built once at start and never re-queried, so a card that reschedules
//! itself earlier mid-session is not served again until a new session
//! starts. Submissions commit through the store's conditional write; a
//! concurrent session that got there first surfaces as [`StudyError::StaleState`]
//! and the caller re-reads before retrying. Sessions live only in this
//! process — losing one discards its cursor, never a committed review.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::StudyConfig;
use crate::store::{CardStateStore, StoreError};

use super::algorithm::{is_pass, schedule, InvalidGrade, MAX_GRADE};
use super::models::{CardState, ReviewRecord, SessionSummary};
use super::queue::DueQueueBuilder;

#[derive(Error, Debug)]
pub enum StudyError {
    #[error(transparent)]
    InvalidGrade(#[from] InvalidGrade),

    #[error("unknown session: {0}")]
    UnknownSession(Uuid),

    #[error("card {card_id} is not reviewable in session {session_id}")]
    CardNotInSession { session_id: Uuid, card_id: Uuid },

    #[error("card {0} was rescheduled by a concurrent session")]
    StaleState(Uuid),

    #[error("persistence unavailable: {0}")]
    Unavailable(#[source] StoreError),
}

/// Queue snapshot handed back from `start_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub queue: Vec<Uuid>,
}

struct ActiveSession {
    user_id: Uuid,
    queue: Vec<Uuid>,
    /// Store version of each queued card at snapshot time
    snapshots: HashMap<Uuid, u64>,
    submitted: HashSet<Uuid>,
    correct: usize,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

pub struct SessionCoordinator {
    store: Arc<dyn CardStateStore>,
    queue_builder: DueQueueBuilder,
    config: StudyConfig,
    sessions: Mutex<HashMap<Uuid, ActiveSession>>,
}

impl SessionCoordinator {
    pub fn new(store: Arc<dyn CardStateStore>, config: StudyConfig) -> Self {
        Self {
            queue_builder: DueQueueBuilder::new(Arc::clone(&store), config.clone()),
            store,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot a due queue for the user and open a session over it.
    /// `cap` defaults to the configured session size.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        cap: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<StartedSession, StudyError> {
        let cap = cap.unwrap_or(self.config.default_session_cap);
        let queue = self
            .queue_builder
            .build(user_id, now, cap)
            .await
            .map_err(StudyError::Unavailable)?;

        // Pin each queued card's version; the submit-time conditional
        // write checks against exactly this snapshot.
        let mut snapshots = HashMap::with_capacity(queue.len());
        let mut pinned_queue = Vec::with_capacity(queue.len());
        for card_id in queue {
            match self.store.get(user_id, card_id).await {
                Ok(row) => {
                    snapshots.insert(card_id, row.version);
                    pinned_queue.push(card_id);
                }
                // Retired between listing and pinning; leave it out
                Err(StoreError::NotFound(_)) => {
                    log::warn!("Card {} vanished while starting a session", card_id)
                }
                Err(e) => return Err(StudyError::Unavailable(e)),
            }
        }

        let session_id = Uuid::new_v4();
        let session = ActiveSession {
            user_id,
            queue: pinned_queue.clone(),
            snapshots,
            submitted: HashSet::new(),
            correct: 0,
            started_at: now,
            last_activity: now,
        };

        let mut sessions = self.sessions.lock().unwrap();
        purge_expired(&mut sessions, now, self.idle_timeout());
        sessions.insert(session_id, session);

        log::info!(
            "Started session {} for user {} with {} cards",
            session_id,
            user_id,
            pinned_queue.len()
        );

        Ok(StartedSession {
            session_id,
            user_id,
            queue: pinned_queue,
        })
    }

    /// Grade one card from the session's queue and commit the result.
    ///
    /// The review record and the rewritten card state are persisted as
    /// one step; only after the commit lands does the session cursor
    /// advance, so a failed submit can be retried without losing the
    /// card.
    pub async fn submit_review(
        &self,
        session_id: Uuid,
        card_id: Uuid,
        grade: u8,
        now: DateTime<Utc>,
    ) -> Result<CardState, StudyError> {
        if grade > MAX_GRADE {
            return Err(InvalidGrade { grade }.into());
        }

        // Resolve the snapshot under the registry lock, then release it
        // before touching the store
        let (user_id, expected_version) = {
            let mut sessions = self.sessions.lock().unwrap();
            purge_expired(&mut sessions, now, self.idle_timeout());
            let session = sessions
                .get(&session_id)
                .ok_or(StudyError::UnknownSession(session_id))?;

            let reviewable = session.queue.contains(&card_id)
                && !session.submitted.contains(&card_id);
            let expected = session
                .snapshots
                .get(&card_id)
                .copied()
                .filter(|_| reviewable);
            match expected {
                Some(version) => (session.user_id, version),
                None => {
                    return Err(StudyError::CardNotInSession {
                        session_id,
                        card_id,
                    })
                }
            }
        };

        let row = self
            .store
            .get(user_id, card_id)
            .await
            .map_err(|e| store_error_for(e, session_id, card_id))?;
        if row.version != expected_version {
            return Err(StudyError::StaleState(card_id));
        }

        let next = schedule(&row.value, grade, now)?;
        let record = ReviewRecord {
            card_id,
            user_id,
            grade,
            reviewed_at: now,
            resulting_interval_days: next.interval_days,
            resulting_ease_factor: next.ease_factor,
        };

        let committed = self
            .store
            .commit_review(expected_version, record, next)
            .await
            .map_err(|e| store_error_for(e, session_id, card_id))?;

        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(&session_id) {
            session.submitted.insert(card_id);
            if is_pass(grade) {
                session.correct += 1;
            }
            session.last_activity = now;
        }

        log::debug!(
            "Session {} reviewed card {} at grade {}, next due {}",
            session_id,
            card_id,
            grade,
            committed.value.due_at
        );

        Ok(committed.value)
    }

    /// Close a session and report what happened in it
    pub fn finish_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SessionSummary, StudyError> {
        let mut sessions = self.sessions.lock().unwrap();
        purge_expired(&mut sessions, now, self.idle_timeout());
        let session = sessions
            .remove(&session_id)
            .ok_or(StudyError::UnknownSession(session_id))?;

        let reviewed = session.submitted.len();
        let summary = SessionSummary {
            session_id,
            user_id: session.user_id,
            cards_reviewed: reviewed,
            cards_correct: session.correct,
            started_at: session.started_at,
            finished_at: now,
            duration_seconds: (now - session.started_at).num_seconds(),
            accuracy: if reviewed > 0 {
                session.correct as f64 / reviewed as f64
            } else {
                0.0
            },
        };

        log::info!(
            "Finished session {}: {}/{} correct",
            session_id,
            summary.cards_correct,
            summary.cards_reviewed
        );

        Ok(summary)
    }

    fn idle_timeout(&self) -> Duration {
        Duration::seconds(self.config.session_idle_timeout_secs as i64)
    }
}

/// Map store failures onto the session-level taxonomy. A version conflict
/// is the expected loser of an optimistic race; a missing row means the
/// card left the active set under the session's feet.
fn store_error_for(err: StoreError, session_id: Uuid, card_id: Uuid) -> StudyError {
    match err {
        StoreError::VersionConflict { card_id, .. } => StudyError::StaleState(card_id),
        StoreError::NotFound(_) => StudyError::CardNotInSession {
            session_id,
            card_id,
        },
        other => StudyError::Unavailable(other),
    }
}

fn purge_expired(
    sessions: &mut HashMap<Uuid, ActiveSession>,
    now: DateTime<Utc>,
    idle_timeout: Duration,
) {
    sessions.retain(|session_id, session| {
        let keep = now - session.last_activity <= idle_timeout;
        if !keep {
            log::info!("Discarding idle session {}", session_id);
        }
        keep
    });
}
