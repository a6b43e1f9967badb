use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::SrsError;
use crate::models::{
    AnswerCheck, ItemWithProgress, NewVocabularyItem, QuizAnswerRecord, QuizQuestion, QuizSession,
    QuizSubmission, User, UserId, VocabularyEdit, VocabularyItem,
};
use crate::quiz::QuizService;
use crate::stats;

#[derive(Clone)]
pub struct ApiState {
    pub quiz: QuizService,
}

pub fn app_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/users", post(register_user))
        .route(
            "/api/users/:user_id/vocabulary",
            get(list_vocabulary).post(create_vocabulary),
        )
        .route(
            "/api/users/:user_id/vocabulary/:item_id",
            put(update_vocabulary).delete(delete_vocabulary),
        )
        .route("/api/users/:user_id/quiz", get(begin_quiz).post(submit_quiz))
        .route("/api/users/:user_id/quiz/check", post(check_answer))
        .route("/api/users/:user_id/quiz/sessions", get(recent_sessions))
        .route(
            "/api/users/:user_id/quiz/sessions/:session_id/answers",
            get(session_answers),
        )
        .route("/api/users/:user_id/stats", get(learning_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for SrsError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SrsError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SrsError::EmptyQuizPool => (StatusCode::NOT_FOUND, "EMPTY_QUIZ_POOL"),
            SrsError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            SrsError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            SrsError::Storage(e) => {
                log::error!("storage failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let message = match &self {
            SrsError::Storage(_) => "internal storage error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, SrsError>;

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    name: Option<String>,
}

/// Returns the existing user for a known email, otherwise creates one.
async fn register_user(
    State(state): State<ApiState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<User> {
    let user = state
        .quiz
        .scheduler()
        .db()
        .find_or_create_user(&payload.email, payload.name.as_deref())
        .await?;
    Ok(Json(user))
}

async fn list_vocabulary(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<ItemWithProgress>> {
    let user = UserId::new(user_id);
    let db = state.quiz.scheduler().db();
    db.get_user(&user).await?;
    Ok(Json(db.list_items(&user).await?))
}

async fn create_vocabulary(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(payload): Json<NewVocabularyItem>,
) -> ApiResult<VocabularyItem> {
    let user = UserId::new(user_id);
    let item = state.quiz.scheduler().db().create_item(&user, &payload).await?;
    Ok(Json(item))
}

async fn update_vocabulary(
    State(state): State<ApiState>,
    Path((user_id, item_id)): Path<(String, String)>,
    Json(payload): Json<VocabularyEdit>,
) -> ApiResult<VocabularyItem> {
    let user = UserId::new(user_id);
    let item = state
        .quiz
        .scheduler()
        .db()
        .update_item(&user, &item_id, &payload)
        .await?;
    Ok(Json(item))
}

async fn delete_vocabulary(
    State(state): State<ApiState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> ApiResult<serde_json::Value> {
    let user = UserId::new(user_id);
    state.quiz.scheduler().db().delete_item(&user, &item_id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn begin_quiz(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<QuizQuestion>> {
    let user = UserId::new(user_id);
    Ok(Json(state.quiz.begin_quiz(&user).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    session_id: String,
}

async fn submit_quiz(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(payload): Json<QuizSubmission>,
) -> ApiResult<SubmitResponse> {
    let user = UserId::new(user_id);
    let session_id = state.quiz.submit_quiz(&user, &payload).await?;
    Ok(Json(SubmitResponse { session_id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest {
    vocabulary_id: String,
    answer: String,
}

async fn check_answer(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(payload): Json<CheckRequest>,
) -> ApiResult<AnswerCheck> {
    let user = UserId::new(user_id);
    let check = state
        .quiz
        .check_answer(&user, &payload.vocabulary_id, &payload.answer)
        .await?;
    Ok(Json(check))
}

async fn recent_sessions(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<QuizSession>> {
    let user = UserId::new(user_id);
    state.quiz.scheduler().db().get_user(&user).await?;
    Ok(Json(state.quiz.recent_sessions(&user).await?))
}

async fn session_answers(
    State(state): State<ApiState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> ApiResult<Vec<QuizAnswerRecord>> {
    let user = UserId::new(user_id);
    Ok(Json(state.quiz.session_answers(&user, &session_id).await?))
}

async fn learning_stats(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> ApiResult<stats::LearningStats> {
    let user = UserId::new(user_id);
    Ok(Json(stats::learning_stats(state.quiz.scheduler(), &user).await?))
}
