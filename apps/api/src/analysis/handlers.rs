//! Axum route handlers for resume analysis and polishing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::analysis::service::{analyze_resume, polish_description};
use crate::analysis::store::{find_report, insert_report, list_reports};
use crate::errors::AppError;
use crate::models::resume::ResumeAnalysisReportRow;
use crate::resumes::text::resume_plain_text;
use crate::routes::UserIdQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub resume_id: Option<Uuid>,
    pub jd_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PolishRequest {
    pub html_content: Option<String>,
    pub job_position: Option<String>,
}

/// POST /api/v1/resume-analysis
pub async fn handle_analyze(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<ResumeAnalysisReportRow>), AppError> {
    let jd_text = req.jd_text.as_deref().map(str::trim).unwrap_or_default();
    let resume_id = req
        .resume_id
        .filter(|_| !jd_text.is_empty())
        .ok_or_else(|| AppError::Validation("resume_id and jd_text are both required".to_string()))?;

    let resume = state
        .resumes
        .find(params.user_id, resume_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;
    let resume_text = resume_plain_text(&resume);
    if resume_text.trim().is_empty() {
        return Err(AppError::Validation(
            "No usable text could be extracted from this resume".to_string(),
        ));
    }

    let analysis = analyze_resume(&state.gateway, params.user_id, &resume_text, jd_text).await?;
    let report_data = serde_json::to_value(&analysis)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Report serialization failed: {e}")))?;

    let report = insert_report(
        &state.db,
        params.user_id,
        resume_id,
        jd_text,
        &report_data,
        analysis.overall_score,
    )
    .await?;

    info!(
        user_id = %params.user_id,
        report_id = %report.id,
        overall_score = report.overall_score,
        "Resume analysis stored"
    );
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/v1/resume-analysis
pub async fn handle_list_reports(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<ResumeAnalysisReportRow>>, AppError> {
    Ok(Json(list_reports(&state.db, params.user_id).await?))
}

/// GET /api/v1/resume-analysis/:id
pub async fn handle_get_report(
    State(state): State<AppState>,
    Path(report_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ResumeAnalysisReportRow>, AppError> {
    let report = find_report(&state.db, params.user_id, report_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Analysis report {report_id} not found")))?;
    Ok(Json(report))
}

/// POST /api/v1/polish-description
pub async fn handle_polish(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
    Json(req): Json<PolishRequest>,
) -> Result<Json<Value>, AppError> {
    let html = req
        .html_content
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| AppError::Validation("html_content is required".to_string()))?;

    let polished = polish_description(
        &state.gateway,
        params.user_id,
        &html,
        req.job_position.as_deref(),
    )
    .await;
    Ok(Json(json!({ "polished_html": polished })))
}
