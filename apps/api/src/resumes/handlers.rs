//! Axum route handlers for the Resume API.

use aws_sdk_s3::primitives::ByteStream;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::{ResumeRow, ResumeStatus};
use crate::resumes::extract::{extract_text, ResumeFileKind};
use crate::resumes::store::NewResume;
use crate::routes::UserIdQuery;
use crate::state::AppState;

/// Upload size ceiling for resume files.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct CreateResumeRequest {
    pub title: String,
    pub content_json: Value,
}

struct UploadedFile {
    file_name: String,
    bytes: Vec<u8>,
}

/// POST /api/v1/resumes/upload
///
/// Multipart fields: `file` (required, .pdf/.txt/.md) and `title` (optional,
/// defaults to the file name). The original file goes to object storage;
/// the extracted text is kept on the row for prompting.
pub async fn handle_upload(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ResumeRow>), AppError> {
    let mut title: Option<String> = None;
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("title") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable title: {e}")))?;
                title = Some(value.trim().to_string()).filter(|t| !t.is_empty());
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable file: {e}")))?;
                file = Some(UploadedFile {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::Validation("No file provided".to_string()))?;
    if file.bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    let kind = ResumeFileKind::from_file_name(&file.file_name).ok_or_else(|| {
        AppError::Validation(format!(
            "Unsupported file type '{}': upload a .pdf, .txt or .md file",
            file.file_name
        ))
    })?;

    let s3_key = format!(
        "resumes/{}/{}.{}",
        params.user_id,
        Uuid::new_v4(),
        kind.extension()
    );
    state
        .s3
        .put_object()
        .bucket(&state.config.s3_bucket)
        .key(&s3_key)
        .body(ByteStream::from(file.bytes.clone()))
        .content_type(kind.content_type())
        .send()
        .await
        .map_err(|e| AppError::S3(format!("Resume upload failed: {e}")))?;

    let file_size_kb = i32::try_from(file.bytes.len().div_ceil(1024)).ok();

    let (status, parsed_content) = match extract_text(kind, file.bytes).await {
        Ok(text) if !text.is_empty() => (ResumeStatus::Parsed, text),
        Ok(_) => (ResumeStatus::Failed, String::new()),
        Err(e) => {
            warn!(user_id = %params.user_id, "Resume text extraction failed: {e}");
            (ResumeStatus::Failed, String::new())
        }
    };

    let resume = state
        .resumes
        .insert(NewResume {
            user_id: params.user_id,
            title: title.unwrap_or_else(|| file.file_name.clone()),
            file_type: kind.extension().to_string(),
            file_size_kb,
            s3_key: Some(s3_key),
            status,
            content_json: None,
            parsed_content,
        })
        .await?;

    info!(
        user_id = %params.user_id,
        resume_id = %resume.id,
        status = ?resume.status,
        "Resume uploaded"
    );
    Ok((StatusCode::CREATED, Json(resume)))
}

/// POST /api/v1/resumes
///
/// Stores a resume authored in the online editor.
pub async fn handle_create(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
    Json(req): Json<CreateResumeRequest>,
) -> Result<(StatusCode, Json<ResumeRow>), AppError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("title cannot be empty".to_string()));
    }
    if !(req.content_json.is_object() || req.content_json.is_array()) {
        return Err(AppError::Validation(
            "content_json must be an object or an array of modules".to_string(),
        ));
    }

    let resume = state
        .resumes
        .insert(NewResume {
            user_id: params.user_id,
            title: title.to_string(),
            file_type: "online".to_string(),
            file_size_kb: None,
            s3_key: None,
            status: ResumeStatus::Parsed,
            content_json: Some(req.content_json),
            parsed_content: String::new(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(resume)))
}

/// GET /api/v1/resumes
pub async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<ResumeRow>>, AppError> {
    Ok(Json(state.resumes.list(params.user_id).await?))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ResumeRow>, AppError> {
    let resume = state
        .resumes
        .find(params.user_id, resume_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;
    Ok(Json(resume))
}

/// DELETE /api/v1/resumes/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .resumes
        .delete(params.user_id, resume_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;

    if let Some(key) = &deleted.s3_key {
        // The row is already gone; an orphaned object is only logged.
        if let Err(e) = state
            .s3
            .delete_object()
            .bucket(&state.config.s3_bucket)
            .key(key)
            .send()
            .await
        {
            warn!("Failed to delete s3://{}/{}: {e}", state.config.s3_bucket, key);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
