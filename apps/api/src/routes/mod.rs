pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::ai_gateway::handlers as ai;
use crate::analysis::handlers as analysis;
use crate::interview::handlers as interviews;
use crate::resumes::handlers as resumes;
use crate::state::AppState;

/// Caller identity. Every API route is scoped to the user given here.
#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Interview API
        .route("/api/v1/interviews", get(interviews::handle_list))
        .route("/api/v1/interviews/start", post(interviews::handle_start))
        .route(
            "/api/v1/interviews/check-unfinished",
            get(interviews::handle_check_unfinished),
        )
        .route(
            "/api/v1/interviews/abandon-unfinished",
            post(interviews::handle_abandon_unfinished),
        )
        .route(
            "/api/v1/interviews/:id",
            get(interviews::handle_get).delete(interviews::handle_delete),
        )
        .route(
            "/api/v1/interviews/:id/submit-answer",
            post(interviews::handle_submit_answer),
        )
        .route(
            "/api/v1/interviews/:id/finish",
            post(interviews::handle_finish),
        )
        // Resume API
        .route(
            "/api/v1/resumes",
            get(resumes::handle_list).post(resumes::handle_create),
        )
        .route(
            "/api/v1/resumes/upload",
            post(resumes::handle_upload)
                // Multipart framing on top of the file itself.
                .layer(DefaultBodyLimit::max(resumes::MAX_UPLOAD_BYTES + 64 * 1024)),
        )
        .route(
            "/api/v1/resumes/:id",
            get(resumes::handle_get).delete(resumes::handle_delete),
        )
        // Resume analysis
        .route(
            "/api/v1/resume-analysis",
            get(analysis::handle_list_reports).post(analysis::handle_analyze),
        )
        .route(
            "/api/v1/resume-analysis/:id",
            get(analysis::handle_get_report),
        )
        .route(
            "/api/v1/polish-description",
            post(analysis::handle_polish),
        )
        // AI settings
        .route("/api/v1/ai-models", get(ai::handle_list_models))
        .route(
            "/api/v1/ai-settings",
            get(ai::handle_get_settings).put(ai::handle_update_settings),
        )
        .with_state(state)
}
