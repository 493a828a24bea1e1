//! Append-only review journal (JSONL) and replay.
//!
//! Each user gets a `{user-id}.reviews.jsonl` file; every committed
//! review appends one line. Entries are never rewritten or deleted —
//! the journal is the audit trail, and the per-card state is a pure fold
//! of it through the scheduler, so a state row can always be rebuilt.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::scheduler::algorithm::{schedule, InvalidGrade};
use crate::scheduler::models::{CardState, ReviewRecord};

const JOURNAL_SUFFIX: &str = ".reviews.jsonl";

/// Journal file path for a user
pub fn journal_path(dir: &Path, user_id: Uuid) -> PathBuf {
    dir.join(format!("{}{}", user_id, JOURNAL_SUFFIX))
}

/// Parse the user id back out of a journal file name
pub fn user_id_from_path(path: &Path) -> Option<Uuid> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(JOURNAL_SUFFIX)?;
    Uuid::parse_str(stem).ok()
}

/// Append one record to a user's journal
pub fn append_record(path: &Path, record: &ReviewRecord) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let json = serde_json::to_string(record)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(file, "{}", json)?;

    Ok(())
}

/// Read all records from a journal in chronological (append) order.
/// Blank or unparseable lines are skipped.
pub fn read_records(path: &Path) -> Vec<ReviewRecord> {
    if !path.exists() {
        return Vec::new();
    }

    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };

    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for line in reader.lines() {
        if let Ok(line) = line {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<ReviewRecord>(trimmed) {
                records.push(record);
            }
        }
    }

    records
}

/// Rebuild a card's state by folding its review records through the
/// scheduler, starting from a fresh row seeded at the first review
/// instant. `records` must be that card's records in chronological order.
pub fn replay(
    user_id: Uuid,
    card_id: Uuid,
    records: &[ReviewRecord],
) -> Result<CardState, InvalidGrade> {
    let seed = records
        .first()
        .map(|r| r.reviewed_at)
        .unwrap_or_default();
    let mut state = CardState::new(user_id, card_id, seed);

    for record in records {
        state = schedule(&state, record.grade, record.reviewed_at)?;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::scheduler::models::CardStatus;

    fn temp_journal_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mneme_journal_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_journal_roundtrip() {
        let dir = temp_journal_dir();
        let user_id = Uuid::new_v4();
        let path = journal_path(&dir, user_id);

        let record = ReviewRecord {
            card_id: Uuid::new_v4(),
            user_id,
            grade: 4,
            reviewed_at: Utc::now(),
            resulting_interval_days: 1.0,
            resulting_ease_factor: 2.5,
        };

        append_record(&path, &record).unwrap();
        append_record(&path, &record).unwrap();

        let records = read_records(&path);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].card_id, record.card_id);
        assert_eq!(records[0].grade, 4);

        assert_eq!(user_id_from_path(&path), Some(user_id));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_read_skips_blank_and_garbage_lines() {
        let dir = temp_journal_dir();
        let path = journal_path(&dir, Uuid::new_v4());

        let record = ReviewRecord {
            card_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            grade: 5,
            reviewed_at: Utc::now(),
            resulting_interval_days: 6.0,
            resulting_ease_factor: 2.6,
        };
        append_record(&path, &record).unwrap();
        fs::write(
            &path,
            format!(
                "{}\n\nnot json at all\n",
                serde_json::to_string(&record).unwrap()
            ),
        )
        .unwrap();

        let records = read_records(&path);
        assert_eq!(records.len(), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    /// Folding a card's log from scratch must land on the same state the
    /// sequential schedule calls produced.
    #[test]
    fn test_replay_matches_live_scheduling() {
        let user_id = Uuid::new_v4();
        let card_id = Uuid::new_v4();
        let mut now = Utc::now();
        let mut state = CardState::new(user_id, card_id, now);
        let mut records = Vec::new();

        for grade in [4u8, 4, 1, 3, 5, 4] {
            state = schedule(&state, grade, now).unwrap();
            records.push(ReviewRecord {
                card_id,
                user_id,
                grade,
                reviewed_at: now,
                resulting_interval_days: state.interval_days,
                resulting_ease_factor: state.ease_factor,
            });
            now += Duration::days(1);
        }

        let rebuilt = replay(user_id, card_id, &records).unwrap();

        assert_eq!(rebuilt.interval_days, state.interval_days);
        assert_eq!(rebuilt.ease_factor, state.ease_factor);
        assert_eq!(rebuilt.repetitions, state.repetitions);
        assert_eq!(rebuilt.lapses, state.lapses);
        assert_eq!(rebuilt.due_at, state.due_at);
        assert_eq!(rebuilt.status, state.status);
    }

    #[test]
    fn test_replay_of_empty_log_is_a_new_card() {
        let state = replay(Uuid::new_v4(), Uuid::new_v4(), &[]).unwrap();
        assert_eq!(state.status, CardStatus::New);
        assert_eq!(state.repetitions, 0);
        assert!(state.last_reviewed_at.is_none());
    }
}
