use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the learner every scheduler call acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyItem {
    pub id: String,
    pub word: String,
    pub definition: String,
    pub example: Option<String>,
    pub category: Option<String>,
    pub difficulty: i64,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating an item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVocabularyItem {
    pub word: String,
    pub definition: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<i64>,
}

/// Partial edit of an item. Omitted fields keep their stored value; an empty
/// `example` or `category` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyEdit {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<i64>,
}

impl VocabularyEdit {
    /// The item as it reads after the edit, before validation.
    pub fn merged_onto(&self, current: &VocabularyItem) -> NewVocabularyItem {
        NewVocabularyItem {
            word: self.word.clone().unwrap_or_else(|| current.word.clone()),
            definition: self
                .definition
                .clone()
                .unwrap_or_else(|| current.definition.clone()),
            example: self.example.clone().or_else(|| current.example.clone()),
            category: self.category.clone().or_else(|| current.category.clone()),
            difficulty: Some(self.difficulty.unwrap_or(current.difficulty)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub level: i64,
    pub next_review: DateTime<Utc>,
    pub correct_count: i64,
    pub total_count: i64,
}

/// A progress record as read from the store, with the version it must be
/// written back against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredProgress {
    pub record: ProgressRecord,
    pub version: i64,
}

/// An item together with the learner's progress on it, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemWithProgress {
    #[serde(flatten)]
    pub item: VocabularyItem,
    pub progress: Option<ProgressRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuizSession {
    pub id: String,
    pub score: i64,
    pub total_questions: i64,
    pub time_spent: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnswerRecord {
    pub id: String,
    pub session_id: String,
    pub vocabulary_id: String,
    pub correct: bool,
    pub time_taken: i64,
}

/// What the learner is shown for one question. The answer word stays on the
/// server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub vocabulary_id: String,
    pub definition: String,
    pub example: Option<String>,
    pub category: Option<String>,
    pub difficulty: i64,
    pub level: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub vocabulary_id: String,
    pub submitted_text: String,
    pub time_taken: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmission {
    pub answers: Vec<SubmittedAnswer>,
    pub total_time_spent: i64,
    /// Number of questions the client was given, echoed back for validation.
    #[serde(default)]
    pub question_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCheck {
    pub correct: bool,
    pub word: String,
}
