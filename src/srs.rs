use crate::models::ProgressRecord;
use chrono::{DateTime, Duration, Utc};

pub const MIN_LEVEL: i64 = 1;
pub const MAX_LEVEL: i64 = 5;

/// Days until the next review, indexed by `level - 1`.
const INTERVAL_DAYS: [i64; 5] = [1, 3, 7, 14, 30];

/// First review of a brand-new record is always a day out, whatever its level.
const FIRST_REVIEW_DAYS: i64 = 1;

pub fn interval_days(level: i64) -> i64 {
    INTERVAL_DAYS[(level.clamp(MIN_LEVEL, MAX_LEVEL) - 1) as usize]
}

/// Computes the progress record that results from answering an item.
///
/// The ladder:
/// - never studied: level 2 if correct, else 1; next review in one day.
/// - studied: one level up on a correct answer, one down on a miss, clamped
///   to 1..=5; next review after the interval of the new level
///   (1, 3, 7, 14, 30 days).
///
/// Pure in `(current, correct, now)`, so a conflicting write can be retried
/// by re-reading and calling this again.
pub fn next_progress(
    current: Option<&ProgressRecord>,
    correct: bool,
    now: DateTime<Utc>,
) -> ProgressRecord {
    match current {
        None => ProgressRecord {
            level: if correct { 2 } else { 1 },
            next_review: now + Duration::days(FIRST_REVIEW_DAYS),
            correct_count: i64::from(correct),
            total_count: 1,
        },
        Some(progress) => {
            let level = if correct {
                (progress.level + 1).min(MAX_LEVEL)
            } else {
                (progress.level - 1).max(MIN_LEVEL)
            };

            ProgressRecord {
                level,
                next_review: now + Duration::days(interval_days(level)),
                correct_count: progress.correct_count + i64::from(correct),
                total_count: progress.total_count + 1,
            }
        }
    }
}

/// Never-studied items are always due; studied ones once their review time
/// has arrived.
pub fn is_due(progress: Option<&ProgressRecord>, now: DateTime<Utc>) -> bool {
    progress.map_or(true, |p| p.next_review <= now)
}

pub fn normalize_answer(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Exact match after case folding and trimming. No partial credit.
pub fn is_correct(submitted: &str, word: &str) -> bool {
    normalize_answer(submitted) == normalize_answer(word)
}
