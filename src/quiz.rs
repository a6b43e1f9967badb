use crate::config::QuizConfig;
use crate::db::{NewAnswerRecord, NewSession};
use crate::error::{Result, SrsError};
use crate::models::{
    AnswerCheck, QuizAnswerRecord, QuizQuestion, QuizSession, QuizSubmission, UserId,
};
use crate::scheduler::{apply_result_in, retry_on_conflict, Scheduler};
use crate::srs;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// How many past sessions `recent_sessions` returns.
pub const RECENT_SESSION_LIMIT: i64 = 50;

/// Drives one quiz attempt: hands out questions, grades the answers and
/// records the outcome.
#[derive(Clone)]
pub struct QuizService {
    scheduler: Scheduler,
}

impl QuizService {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn config(&self) -> &QuizConfig {
        self.scheduler.config()
    }

    pub async fn begin_quiz(&self, user: &UserId) -> Result<Vec<QuizQuestion>> {
        self.begin_quiz_at(user, Utc::now()).await
    }

    /// The question set for a new quiz. EmptyQuizPool when nothing is due.
    pub async fn begin_quiz_at(&self, user: &UserId, now: DateTime<Utc>) -> Result<Vec<QuizQuestion>> {
        let due = self
            .scheduler
            .select_due_items_at(user, self.config().quiz_size, now)
            .await?;

        if due.is_empty() {
            log::info!("user {} has nothing due", user);
            return Err(SrsError::EmptyQuizPool);
        }

        Ok(due
            .into_iter()
            .map(|c| QuizQuestion {
                vocabulary_id: c.item.id,
                definition: c.item.definition,
                example: c.item.example,
                category: c.item.category,
                difficulty: c.item.difficulty,
                level: c.progress.map(|p| p.level),
            })
            .collect())
    }

    /// Grades a single answer for immediate feedback. Writes nothing.
    pub async fn check_answer(&self, user: &UserId, vocabulary_id: &str, text: &str) -> Result<AnswerCheck> {
        let item = self.scheduler.db().get_item(user, vocabulary_id).await?;
        Ok(AnswerCheck {
            correct: srs::is_correct(text, &item.word),
            word: item.word,
        })
    }

    pub async fn submit_quiz(&self, user: &UserId, submission: &QuizSubmission) -> Result<String> {
        self.submit_quiz_at(user, submission, Utc::now()).await
    }

    /// Scores a finished quiz and returns the new session id.
    ///
    /// Correctness is re-derived from the submitted text. The session, its
    /// answer records and every progress update commit together or not at
    /// all; on Conflict the whole submission is re-run from fresh reads.
    pub async fn submit_quiz_at(
        &self,
        user: &UserId,
        submission: &QuizSubmission,
        now: DateTime<Utc>,
    ) -> Result<String> {
        validate_submission(submission, self.config())?;
        self.scheduler.db().get_user(user).await?;

        let db = self.scheduler.db();
        let session = retry_on_conflict(self.config().max_submit_attempts, || async move {
            let mut uow = db.begin().await?;

            let mut graded = Vec::with_capacity(submission.answers.len());
            for answer in &submission.answers {
                let item = match uow.get_item(user, &answer.vocabulary_id).await {
                    Ok(item) => item,
                    Err(SrsError::NotFound(_)) => {
                        return Err(SrsError::validation(format!(
                            "unknown vocabulary item {}",
                            answer.vocabulary_id
                        )));
                    }
                    Err(e) => return Err(e),
                };

                graded.push(NewAnswerRecord {
                    vocabulary_id: answer.vocabulary_id.clone(),
                    correct: srs::is_correct(&answer.submitted_text, &item.word),
                    time_taken: answer.time_taken,
                });
            }

            let score = graded.iter().filter(|a| a.correct).count() as i64;
            let session = uow
                .create_session(
                    user,
                    &NewSession {
                        score,
                        total_questions: graded.len() as i64,
                        time_spent: submission.total_time_spent,
                        completed_at: now,
                    },
                )
                .await?;
            uow.create_answer_records(&session.id, &graded).await?;

            // Repeated items are applied in order, each from the record the
            // previous one wrote.
            for answer in &graded {
                apply_result_in(&mut uow, user, &answer.vocabulary_id, answer.correct, now).await?;
            }

            uow.commit().await?;
            Ok::<_, SrsError>(session)
        })
        .await?;

        log::info!(
            "user {} completed quiz {}: {}/{} in {}s",
            user,
            session.id,
            session.score,
            session.total_questions,
            session.time_spent
        );
        Ok(session.id)
    }

    /// The user's most recent sessions, newest first.
    pub async fn recent_sessions(&self, user: &UserId) -> Result<Vec<QuizSession>> {
        self.scheduler
            .db()
            .list_sessions(user, Some(RECENT_SESSION_LIMIT))
            .await
    }

    pub async fn session_answers(&self, user: &UserId, session_id: &str) -> Result<Vec<QuizAnswerRecord>> {
        self.scheduler.db().session_answers(user, session_id).await
    }
}

/// Checks that need no database access.
fn validate_submission(submission: &QuizSubmission, config: &QuizConfig) -> Result<()> {
    if submission.answers.is_empty() {
        return Err(SrsError::validation("a quiz needs at least one answer"));
    }

    if submission.total_time_spent < 0 {
        return Err(SrsError::validation("total time spent cannot be negative"));
    }

    if let Some(expected) = submission.question_count {
        if expected != submission.answers.len() {
            return Err(SrsError::validation(format!(
                "expected {} answers, got {}",
                expected,
                submission.answers.len()
            )));
        }
    }

    let mut seen = HashSet::new();
    for answer in &submission.answers {
        if answer.time_taken < 0 {
            return Err(SrsError::validation(format!(
                "time taken for {} cannot be negative",
                answer.vocabulary_id
            )));
        }

        if !seen.insert(answer.vocabulary_id.as_str()) {
            if config.reject_duplicate_answers {
                return Err(SrsError::validation(format!(
                    "vocabulary item {} answered more than once",
                    answer.vocabulary_id
                )));
            }
            log::warn!(
                "vocabulary item {} answered more than once in one quiz",
                answer.vocabulary_id
            );
        }
    }

    Ok(())
}
