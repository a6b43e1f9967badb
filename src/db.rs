use crate::error::{Result, SrsError};
use crate::models::{
    ItemWithProgress, NewVocabularyItem, ProgressRecord, QuizAnswerRecord, QuizSession,
    StoredProgress, User, UserId, VocabularyEdit, VocabularyItem,
};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow, SqliteSynchronous},
    ConnectOptions, FromRow, Pool, Row, Sqlite, Transaction,
};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        name TEXT,
        created_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vocabulary (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        word TEXT NOT NULL,
        definition TEXT NOT NULL,
        example TEXT,
        category TEXT,
        difficulty INTEGER NOT NULL DEFAULT 1 CHECK (difficulty BETWEEN 1 AND 5),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_vocabulary_user ON vocabulary(user_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS progress (
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        vocabulary_id TEXT NOT NULL REFERENCES vocabulary(id) ON DELETE CASCADE,
        level INTEGER NOT NULL CHECK (level BETWEEN 1 AND 5),
        next_review DATETIME NOT NULL,
        correct_count INTEGER NOT NULL DEFAULT 0 CHECK (correct_count >= 0),
        total_count INTEGER NOT NULL DEFAULT 0 CHECK (total_count >= correct_count),
        version INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, vocabulary_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quiz_sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        score INTEGER NOT NULL,
        total_questions INTEGER NOT NULL,
        time_spent INTEGER NOT NULL,
        completed_at DATETIME NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_quiz_sessions_user ON quiz_sessions(user_id, completed_at)",
    // Answers keep their vocabulary id even after the item is deleted; they
    // are an audit trail, not scheduler state.
    r#"
    CREATE TABLE IF NOT EXISTS quiz_answers (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES quiz_sessions(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        vocabulary_id TEXT NOT NULL,
        correct BOOLEAN NOT NULL,
        time_taken INTEGER NOT NULL
    )
    "#,
];

// A write that touches no rows. As the first statement of a deferred
// transaction it promotes it to a write transaction, like BEGIN IMMEDIATE.
const WRITE_LOCK: &str = "UPDATE users SET id = id WHERE 0";

// Never studied, or the review time has arrived. Binds `now`.
const DUE_FILTER: &str = "(p.level IS NULL OR p.next_review <= ?)";

const ITEM_COLUMNS: &str = "v.id, v.word, v.definition, v.example, v.category, v.difficulty, v.created_at";

impl<'r> FromRow<'r, SqliteRow> for ItemWithProgress {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let item = VocabularyItem::from_row(row)?;

        // Columns come from a LEFT JOIN; a NULL level means never studied.
        let level: Option<i64> = row.try_get("level")?;
        let progress = match level {
            Some(level) => Some(ProgressRecord {
                level,
                next_review: row.try_get("next_review")?,
                correct_count: row.try_get("correct_count")?,
                total_count: row.try_get("total_count")?,
            }),
            None => None,
        };

        Ok(ItemWithProgress { item, progress })
    }
}

/// Session summary to be recorded.
#[derive(Debug, Clone, Copy)]
pub struct NewSession {
    pub score: i64,
    pub total_questions: i64,
    pub time_spent: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnswerRecord {
    pub vocabulary_id: String,
    pub correct: bool,
    pub time_taken: i64,
}

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

impl Db {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .log_statements(log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options).await?;

        let db = Db { pool };
        db.migrate().await?;
        log::info!("database ready at {}", database_url);

        Ok(db)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Opens a transactional scope. Dropping it without `commit` rolls back.
    ///
    /// The scope takes SQLite's write lock before its first read, so a
    /// competing writer waits out `busy_timeout` instead of failing on the
    /// read-to-write upgrade.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(WRITE_LOCK).execute(&mut *tx).await?;
        Ok(UnitOfWork { tx })
    }

    // --- users ---

    pub async fn create_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        let email = email.trim();
        if email.is_empty() {
            return Err(SrsError::validation("email is required"));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.map(str::trim).filter(|n| !n.is_empty()).map(String::from),
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(
            "INSERT INTO users (id, email, name, created_at) VALUES (?, ?, ?, ?) ON CONFLICT(email) DO NOTHING",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(SrsError::validation(format!("email {} is already registered", email)));
        }

        log::info!("created user {}", user.id);
        Ok(user)
    }

    /// Returns the user registered under `email`, creating it first if
    /// needed. Safe to call concurrently for the same email.
    pub async fn find_or_create_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        if let Some(user) = self.find_user_by_email(email).await? {
            return Ok(user);
        }
        match self.create_user(email, name).await {
            Ok(user) => Ok(user),
            Err(SrsError::Validation(msg)) => {
                // Lost the race to another registration of the same email.
                match self.find_user_by_email(email).await? {
                    Some(user) => Ok(user),
                    None => Err(SrsError::Validation(msg)),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: &UserId) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| SrsError::not_found(format!("user {}", id)))
    }

    // --- item management ---

    pub async fn create_item(&self, user: &UserId, new: &NewVocabularyItem) -> Result<VocabularyItem> {
        let valid = validate_item(new)?;
        self.get_user(user).await?;

        let now = Utc::now();
        let item = VocabularyItem {
            id: Uuid::new_v4().to_string(),
            word: valid.word,
            definition: valid.definition,
            example: valid.example,
            category: valid.category,
            difficulty: valid.difficulty,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO vocabulary (id, user_id, word, definition, example, category, difficulty, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(user.as_str())
        .bind(&item.word)
        .bind(&item.definition)
        .bind(&item.example)
        .bind(&item.category)
        .bind(item.difficulty)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        log::debug!("user {} added item {}", user, item.id);
        Ok(item)
    }

    /// Fails with NotFound when the item is absent or owned by someone else.
    pub async fn get_item(&self, user: &UserId, id: &str) -> Result<VocabularyItem> {
        fetch_item(&self.pool, user, id).await
    }

    /// All of the user's items, newest first.
    pub async fn list_items(&self, user: &UserId) -> Result<Vec<ItemWithProgress>> {
        let items = sqlx::query_as::<_, ItemWithProgress>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}, p.level, p.next_review, p.correct_count, p.total_count
            FROM vocabulary v
            LEFT JOIN progress p ON p.vocabulary_id = v.id AND p.user_id = v.user_id
            WHERE v.user_id = ?
            ORDER BY v.created_at DESC, v.rowid DESC
            "#
        ))
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Due items for `user` as of `now`, weakest first, at most `limit`.
    ///
    /// Unstudied items count as level 0. Ties on level and difficulty keep
    /// insertion order. Timestamps are stored as UTC RFC 3339 text, which
    /// orders the same way as the instants it encodes.
    pub async fn due_items(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ItemWithProgress>> {
        let items = sqlx::query_as::<_, ItemWithProgress>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}, p.level, p.next_review, p.correct_count, p.total_count
            FROM vocabulary v
            LEFT JOIN progress p ON p.vocabulary_id = v.id AND p.user_id = v.user_id
            WHERE v.user_id = ? AND {DUE_FILTER}
            ORDER BY COALESCE(p.level, 0) ASC, v.difficulty ASC, v.created_at ASC, v.rowid ASC
            LIMIT ?
            "#
        ))
        .bind(user.as_str())
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn count_due(&self, user: &UserId, now: DateTime<Utc>) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(*)
            FROM vocabulary v
            LEFT JOIN progress p ON p.vocabulary_id = v.id AND p.user_id = v.user_id
            WHERE v.user_id = ? AND {DUE_FILTER}
            "#
        ))
        .bind(user.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    /// Edits an item, keeping whatever `edit` leaves out. Progress is left
    /// untouched.
    pub async fn update_item(
        &self,
        user: &UserId,
        id: &str,
        edit: &VocabularyEdit,
    ) -> Result<VocabularyItem> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(WRITE_LOCK).execute(&mut *tx).await?;
        let current = fetch_item(&mut *tx, user, id).await?;
        let valid = validate_item(&edit.merged_onto(&current))?;

        let updated = sqlx::query(
            r#"
            UPDATE vocabulary
            SET word = ?, definition = ?, example = ?, category = ?, difficulty = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&valid.word)
        .bind(&valid.definition)
        .bind(&valid.example)
        .bind(&valid.category)
        .bind(valid.difficulty)
        .bind(Utc::now())
        .bind(id)
        .bind(user.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(SrsError::not_found(format!("vocabulary item {}", id)));
        }

        let item = fetch_item(&mut *tx, user, id).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Deletes an item; its progress record goes with it.
    pub async fn delete_item(&self, user: &UserId, id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM vocabulary WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user.as_str())
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(SrsError::not_found(format!("vocabulary item {}", id)));
        }

        log::debug!("user {} deleted item {}", user, id);
        Ok(())
    }

    // --- progress (read-only outside a unit of work) ---

    pub async fn get_progress(&self, user: &UserId, item_id: &str) -> Result<Option<ProgressRecord>> {
        let stored = fetch_progress(&self.pool, user, item_id).await?;
        Ok(stored.map(|s| s.record))
    }

    // --- sessions ---

    /// The user's sessions, newest first. `None` means no limit.
    pub async fn list_sessions(&self, user: &UserId, limit: Option<i64>) -> Result<Vec<QuizSession>> {
        let sessions = sqlx::query_as::<_, QuizSession>(
            r#"
            SELECT id, score, total_questions, time_spent, completed_at
            FROM quiz_sessions
            WHERE user_id = ?
            ORDER BY completed_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user.as_str())
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    pub async fn session_answers(&self, user: &UserId, session_id: &str) -> Result<Vec<QuizAnswerRecord>> {
        let owned: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM quiz_sessions WHERE id = ? AND user_id = ?")
                .bind(session_id)
                .bind(user.as_str())
                .fetch_optional(&self.pool)
                .await?;

        if owned.is_none() {
            return Err(SrsError::not_found(format!("quiz session {}", session_id)));
        }

        let answers = sqlx::query_as::<_, QuizAnswerRecord>(
            r#"
            SELECT id, session_id, vocabulary_id, correct, time_taken
            FROM quiz_answers
            WHERE session_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }
}

/// One SQLite transaction spanning progress upserts and session inserts.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub async fn get_item(&mut self, user: &UserId, id: &str) -> Result<VocabularyItem> {
        fetch_item(&mut *self.tx, user, id).await
    }

    pub async fn get_progress(&mut self, user: &UserId, item_id: &str) -> Result<Option<StoredProgress>> {
        fetch_progress(&mut *self.tx, user, item_id).await
    }

    /// Writes `record` for the (user, item) pair.
    ///
    /// `expected` is the version that was read: `None` inserts a new record,
    /// `Some(v)` replaces the stored one only if it is still at version `v`.
    /// Anything else is a Conflict.
    pub async fn upsert_progress(
        &mut self,
        user: &UserId,
        item_id: &str,
        record: &ProgressRecord,
        expected: Option<i64>,
    ) -> Result<()> {
        let written = match expected {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO progress (user_id, vocabulary_id, level, next_review, correct_count, total_count, version)
                    VALUES (?, ?, ?, ?, ?, ?, 0)
                    ON CONFLICT(user_id, vocabulary_id) DO NOTHING
                    "#,
                )
                .bind(user.as_str())
                .bind(item_id)
                .bind(record.level)
                .bind(record.next_review)
                .bind(record.correct_count)
                .bind(record.total_count)
                .execute(&mut *self.tx)
                .await?
            }
            Some(version) => {
                sqlx::query(
                    r#"
                    UPDATE progress
                    SET level = ?, next_review = ?, correct_count = ?, total_count = ?, version = version + 1
                    WHERE user_id = ? AND vocabulary_id = ? AND version = ?
                    "#,
                )
                .bind(record.level)
                .bind(record.next_review)
                .bind(record.correct_count)
                .bind(record.total_count)
                .bind(user.as_str())
                .bind(item_id)
                .bind(version)
                .execute(&mut *self.tx)
                .await?
            }
        };

        if written.rows_affected() == 0 {
            return Err(SrsError::stale_progress(item_id));
        }
        Ok(())
    }

    pub async fn create_session(&mut self, user: &UserId, summary: &NewSession) -> Result<QuizSession> {
        let session = QuizSession {
            id: Uuid::new_v4().to_string(),
            score: summary.score,
            total_questions: summary.total_questions,
            time_spent: summary.time_spent,
            completed_at: summary.completed_at,
        };

        sqlx::query(
            r#"
            INSERT INTO quiz_sessions (id, user_id, score, total_questions, time_spent, completed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(user.as_str())
        .bind(session.score)
        .bind(session.total_questions)
        .bind(session.time_spent)
        .bind(session.completed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(session)
    }

    pub async fn create_answer_records(
        &mut self,
        session_id: &str,
        records: &[NewAnswerRecord],
    ) -> Result<Vec<QuizAnswerRecord>> {
        let mut created = Vec::with_capacity(records.len());

        for (position, record) in records.iter().enumerate() {
            let answer = QuizAnswerRecord {
                id: Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                vocabulary_id: record.vocabulary_id.clone(),
                correct: record.correct,
                time_taken: record.time_taken,
            };

            sqlx::query(
                r#"
                INSERT INTO quiz_answers (id, session_id, position, vocabulary_id, correct, time_taken)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&answer.id)
            .bind(&answer.session_id)
            .bind(position as i64)
            .bind(&answer.vocabulary_id)
            .bind(answer.correct)
            .bind(answer.time_taken)
            .execute(&mut *self.tx)
            .await?;

            created.push(answer);
        }

        Ok(created)
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn fetch_item<'e, E>(executor: E, user: &UserId, id: &str) -> Result<VocabularyItem>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, VocabularyItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM vocabulary v WHERE v.id = ? AND v.user_id = ?"
    ))
    .bind(id)
    .bind(user.as_str())
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| SrsError::not_found(format!("vocabulary item {}", id)))
}

async fn fetch_progress<'e, E>(executor: E, user: &UserId, item_id: &str) -> Result<Option<StoredProgress>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT level, next_review, correct_count, total_count, version
        FROM progress
        WHERE user_id = ? AND vocabulary_id = ?
        "#,
    )
    .bind(user.as_str())
    .bind(item_id)
    .fetch_optional(executor)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(StoredProgress {
        record: ProgressRecord {
            level: row.try_get("level")?,
            next_review: row.try_get("next_review")?,
            correct_count: row.try_get("correct_count")?,
            total_count: row.try_get("total_count")?,
        },
        version: row.try_get("version")?,
    }))
}

struct ValidItem {
    word: String,
    definition: String,
    example: Option<String>,
    category: Option<String>,
    difficulty: i64,
}

fn validate_item(new: &NewVocabularyItem) -> Result<ValidItem> {
    let word = new.word.trim();
    let definition = new.definition.trim();
    if word.is_empty() || definition.is_empty() {
        return Err(SrsError::validation("word and definition are required"));
    }

    let difficulty = new.difficulty.unwrap_or(1);
    if !(1..=5).contains(&difficulty) {
        return Err(SrsError::validation(format!(
            "difficulty must be between 1 and 5, got {}",
            difficulty
        )));
    }

    let optional = |s: &Option<String>| {
        s.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    Ok(ValidItem {
        word: word.to_string(),
        definition: definition.to_string(),
        example: optional(&new.example),
        category: optional(&new.category),
        difficulty,
    })
}
