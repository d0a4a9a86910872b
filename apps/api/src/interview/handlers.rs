//! Axum route handlers for the Interview API.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::orchestrator::{
    AnswerOutcome, StartInterview, UnfinishedStatus, DEFAULT_QUESTION_COUNT,
};
use crate::models::interview::{Difficulty, SessionDetail};
use crate::routes::UserIdQuery;
use crate::state::AppState;

pub const FEEDBACK_HEADER: &str = "x-feedback";
pub const QUESTION_ID_HEADER: &str = "x-question-id";
pub const QUESTION_SEQUENCE_HEADER: &str = "x-question-sequence";
const EXPOSED_HEADERS: &str = "X-Feedback, X-Question-Id, X-Question-Sequence";

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub user_id: Uuid,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct StartInterviewRequest {
    pub job_position: String,
    pub resume_id: Option<Uuid>,
    pub question_count: Option<i32>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    pub answer_text: String,
}

/// POST /api/v1/interviews/start?force=
pub async fn handle_start(
    State(state): State<AppState>,
    Query(params): Query<StartQuery>,
    Json(req): Json<StartInterviewRequest>,
) -> Result<(StatusCode, Json<SessionDetail>), AppError> {
    let detail = state
        .orchestrator
        .start(
            StartInterview {
                user_id: params.user_id,
                job_position: req.job_position,
                resume_id: req.resume_id,
                question_count: req.question_count.unwrap_or(DEFAULT_QUESTION_COUNT),
                difficulty: req.difficulty,
            },
            params.force,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/v1/interviews
pub async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<SessionDetail>>, AppError> {
    Ok(Json(state.orchestrator.list(params.user_id).await?))
}

/// GET /api/v1/interviews/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<SessionDetail>, AppError> {
    Ok(Json(state.orchestrator.get(params.user_id, session_id).await?))
}

/// DELETE /api/v1/interviews/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.delete(params.user_id, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/interviews/:id/submit-answer
///
/// While questions remain, the body is the next question streamed as plain
/// text. The feedback on this answer and the identity of the new question
/// travel in headers. Once the quota is reached the response is JSON:
/// `{"feedback": ..., "interview_finished": true}`.
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Response, AppError> {
    let outcome = state
        .orchestrator
        .submit_answer(params.user_id, session_id, req.question_id, &req.answer_text)
        .await?;

    match outcome {
        AnswerOutcome::Finished { feedback } => Ok(Json(json!({
            "feedback": feedback,
            "interview_finished": true,
        }))
        .into_response()),
        AnswerOutcome::NextQuestion {
            feedback,
            question,
            stream,
        } => {
            let body = ReceiverStream::new(stream.chunks)
                .map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk)));

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .header(header::CACHE_CONTROL, "no-cache")
                .header(FEEDBACK_HEADER, encode_header(&feedback)?)
                .header(QUESTION_ID_HEADER, question.id.to_string())
                .header(QUESTION_SEQUENCE_HEADER, question.sequence.to_string())
                .header(header::ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSED_HEADERS)
                .body(Body::from_stream(body))
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {e}")))
        }
    }
}

/// Percent-encodes text so it is always a valid header value.
fn encode_header(text: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&urlencoding::encode(text))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid header value: {e}")))
}

/// POST /api/v1/interviews/:id/finish
pub async fn handle_finish(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.orchestrator.finish(params.user_id, session_id).await?))
}

/// GET /api/v1/interviews/check-unfinished
pub async fn handle_check_unfinished(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<UnfinishedStatus>, AppError> {
    Ok(Json(state.orchestrator.check_unfinished(params.user_id).await?))
}

/// POST /api/v1/interviews/abandon-unfinished
pub async fn handle_abandon_unfinished(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Value>, AppError> {
    let session_id = state.orchestrator.abandon_unfinished(params.user_id).await?;
    Ok(Json(json!({
        "message": "The unfinished interview has been abandoned",
        "session_id": session_id,
    })))
}
