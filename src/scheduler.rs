use crate::config::QuizConfig;
use crate::db::{Db, UnitOfWork};
use crate::error::{Result, SrsError};
use crate::models::{ItemWithProgress, ProgressRecord, UserId};
use crate::srs;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Base delay before the second attempt; doubles on each further retry.
const RETRY_BASE_DELAY_MS: u64 = 10;

/// Selects due items and applies quiz outcomes to progress records.
///
/// Holds no state of its own beyond the store handle.
#[derive(Clone)]
pub struct Scheduler {
    db: Db,
    config: QuizConfig,
}

impl Scheduler {
    pub fn new(db: Db, config: QuizConfig) -> Self {
        Self { db, config }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn config(&self) -> &QuizConfig {
        &self.config
    }

    pub async fn select_due_items(&self, user: &UserId, limit: usize) -> Result<Vec<ItemWithProgress>> {
        self.select_due_items_at(user, limit, Utc::now()).await
    }

    /// Due items for `user` as of `now`, weakest first, at most `limit`.
    /// An empty result is not an error here.
    pub async fn select_due_items_at(
        &self,
        user: &UserId,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemWithProgress>> {
        self.db.get_user(user).await?;
        let due = self.db.due_items(user, now, limit).await?;
        log::debug!("user {}: {} items selected for review", user, due.len());
        Ok(due)
    }

    pub async fn count_due_at(&self, user: &UserId, now: DateTime<Utc>) -> Result<usize> {
        self.db.count_due(user, now).await
    }

    pub async fn apply_result(&self, user: &UserId, item_id: &str, correct: bool) -> Result<ProgressRecord> {
        self.apply_result_at(user, item_id, correct, Utc::now()).await
    }

    /// Applies one answer in its own transaction, retrying on Conflict.
    pub async fn apply_result_at(
        &self,
        user: &UserId,
        item_id: &str,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord> {
        retry_on_conflict(self.config.max_submit_attempts, || async move {
            let mut uow = self.db.begin().await?;
            let record = apply_result_in(&mut uow, user, item_id, correct, now).await?;
            uow.commit().await?;
            Ok::<_, SrsError>(record)
        })
        .await
    }
}

/// Reads the current record inside `uow`, moves it one step along the ladder
/// and writes it back against the version that was read.
///
/// NotFound if the item is not the user's; nothing is written in that case.
pub async fn apply_result_in(
    uow: &mut UnitOfWork,
    user: &UserId,
    item_id: &str,
    correct: bool,
    now: DateTime<Utc>,
) -> Result<ProgressRecord> {
    uow.get_item(user, item_id).await?;

    let stored = uow.get_progress(user, item_id).await?;
    let next = srs::next_progress(stored.as_ref().map(|s| &s.record), correct, now);

    uow.upsert_progress(user, item_id, &next, stored.map(|s| s.version))
        .await?;

    log::debug!(
        "user {} item {}: correct={} level {:?} -> {}",
        user,
        item_id,
        correct,
        stored.map(|s| s.record.level),
        next.level
    );
    Ok(next)
}

/// Runs `op` until it succeeds, fails with something other than Conflict,
/// or `max_attempts` is used up. Each attempt must start from fresh reads.
///
/// Sleeps a jittered, doubling delay between attempts.
pub(crate) async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(SrsError::Conflict(what)) if attempt < max_attempts => {
                let delay = retry_delay(attempt);
                log::warn!(
                    "{} (attempt {}/{}), retrying in {:?}",
                    what,
                    attempt,
                    max_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn retry_delay(attempt: u32) -> Duration {
    let ceiling = RETRY_BASE_DELAY_MS << attempt.saturating_sub(1).min(6);
    Duration::from_millis(rand::thread_rng().gen_range(ceiling / 2..=ceiling))
}
