use thiserror::Error;

#[derive(Debug, Error)]
pub enum SrsError {
    #[error("{0} not found")]
    NotFound(String),

    /// Nothing is due. Callers should steer the learner towards adding
    /// vocabulary rather than report a failure.
    #[error("no vocabulary is due for review; add vocabulary first")]
    EmptyQuizPool,

    /// Lost a race with another writer. Safe to retry from fresh reads.
    #[error("{0}")]
    Conflict(String),

    #[error("invalid submission: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(sqlx::Error),
}

pub type Result<T, E = SrsError> = std::result::Result<T, E>;

impl SrsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SrsError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        SrsError::Validation(msg.into())
    }

    /// The progress record changed between read and write.
    pub fn stale_progress(item_id: &str) -> Self {
        SrsError::Conflict(format!("concurrent update on progress for item {}", item_id))
    }

    /// SQLite refused a lock because another transaction holds it.
    pub fn busy(detail: &str) -> Self {
        SrsError::Conflict(format!("database busy: {}", detail))
    }
}

impl From<sqlx::Error> for SrsError {
    fn from(err: sqlx::Error) -> Self {
        // SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes mean
        // another writer got there first.
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                if let Ok(code) = code.parse::<i32>() {
                    if matches!(code & 0xff, 5 | 6) {
                        return SrsError::busy(db_err.message());
                    }
                }
            }
        }
        SrsError::Storage(err)
    }
}
