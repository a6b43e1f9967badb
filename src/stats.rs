use crate::error::Result;
use crate::models::{ItemWithProgress, QuizSession, UserId};
use crate::scheduler::Scheduler;
use crate::srs;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Level at which an item counts as mastered.
pub const MASTERED_LEVEL: i64 = 4;
const RECENT_SESSIONS: usize = 5;
const ACTIVE_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStats {
    pub total_words: usize,
    pub mastered_words: usize,
    pub learning_words: usize,
    pub unstudied_words: usize,
    pub words_by_level: BTreeMap<i64, usize>,
    pub words_by_difficulty: BTreeMap<i64, usize>,
    pub average_accuracy: u32,
    pub recent_accuracy: u32,
    pub total_study_minutes: i64,
    pub active_days: usize,
    pub due_now: usize,
}

pub async fn learning_stats(scheduler: &Scheduler, user: &UserId) -> Result<LearningStats> {
    learning_stats_at(scheduler, user, Utc::now()).await
}

pub async fn learning_stats_at(
    scheduler: &Scheduler,
    user: &UserId,
    now: DateTime<Utc>,
) -> Result<LearningStats> {
    let db = scheduler.db();
    db.get_user(user).await?;
    let items = db.list_items(user).await?;
    let sessions = db.list_sessions(user, None).await?;
    Ok(compute(&items, &sessions, now))
}

/// `sessions` must be newest first.
pub fn compute(items: &[ItemWithProgress], sessions: &[QuizSession], now: DateTime<Utc>) -> LearningStats {
    let level_buckets = || (1..=5).map(|k| (k, 0)).collect::<BTreeMap<i64, usize>>();
    let mut words_by_level = level_buckets();
    let mut words_by_difficulty = level_buckets();
    let (mut mastered, mut learning, mut unstudied, mut due_now) = (0, 0, 0, 0);

    for entry in items {
        if let Some(count) = words_by_difficulty.get_mut(&entry.item.difficulty) {
            *count += 1;
        }
        if srs::is_due(entry.progress.as_ref(), now) {
            due_now += 1;
        }

        match entry.progress {
            None => unstudied += 1,
            Some(p) => {
                *words_by_level.entry(p.level).or_insert(0) += 1;
                if p.level >= MASTERED_LEVEL {
                    mastered += 1;
                } else if p.level >= 2 {
                    learning += 1;
                }
            }
        }
    }

    let window_start = now - Duration::days(ACTIVE_WINDOW_DAYS);
    let active_days = sessions
        .iter()
        .filter(|s| s.completed_at >= window_start)
        .count()
        .min(ACTIVE_WINDOW_DAYS as usize);

    let total_seconds: i64 = sessions.iter().map(|s| s.time_spent).sum();

    LearningStats {
        total_words: items.len(),
        mastered_words: mastered,
        learning_words: learning,
        unstudied_words: unstudied,
        words_by_level,
        words_by_difficulty,
        average_accuracy: accuracy(sessions),
        recent_accuracy: accuracy(&sessions[..sessions.len().min(RECENT_SESSIONS)]),
        total_study_minutes: (total_seconds as f64 / 60.0).round() as i64,
        active_days,
        due_now,
    }
}

/// Whole-number percentage of correct answers, 0 when nothing was asked.
fn accuracy(sessions: &[QuizSession]) -> u32 {
    let asked: i64 = sessions.iter().map(|s| s.total_questions).sum();
    let correct: i64 = sessions.iter().map(|s| s.score).sum();
    if asked <= 0 {
        return 0;
    }
    (correct as f64 * 100.0 / asked as f64).round() as u32
}
