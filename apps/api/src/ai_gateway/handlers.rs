use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::ai_gateway::settings::{
    find_active_model, get_or_create_setting, list_active_models, mask_api_keys, merge_api_keys,
    save_setting,
};
use crate::errors::AppError;
use crate::models::ai::{AiModelRow, AiSettingRow};
use crate::routes::UserIdQuery;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AiSettingResponse {
    pub user_id: Uuid,
    pub ai_model_id: Option<Uuid>,
    /// Masked: only the last four characters of each key are returned.
    pub api_keys: Value,
    pub updated_at: DateTime<Utc>,
}

impl From<AiSettingRow> for AiSettingResponse {
    fn from(row: AiSettingRow) -> Self {
        Self {
            user_id: row.user_id,
            ai_model_id: row.ai_model_id,
            api_keys: mask_api_keys(&row.api_keys),
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateAiSettingRequest {
    pub ai_model_id: Option<Uuid>,
    #[serde(default)]
    pub api_keys: HashMap<Uuid, String>,
}

/// GET /api/v1/ai-models
pub async fn handle_list_models(
    State(state): State<AppState>,
) -> Result<Json<Vec<AiModelRow>>, AppError> {
    Ok(Json(list_active_models(&state.db).await?))
}

/// GET /api/v1/ai-settings
pub async fn handle_get_settings(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<AiSettingResponse>, AppError> {
    let setting = get_or_create_setting(&state.db, params.user_id).await?;
    Ok(Json(setting.into()))
}

/// PUT /api/v1/ai-settings
pub async fn handle_update_settings(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
    Json(req): Json<UpdateAiSettingRequest>,
) -> Result<Json<AiSettingResponse>, AppError> {
    let current = get_or_create_setting(&state.db, params.user_id).await?;

    let ai_model_id = match req.ai_model_id {
        Some(model_id) => {
            find_active_model(&state.db, model_id)
                .await?
                .ok_or_else(|| AppError::Validation(format!("Model {model_id} is not available")))?;
            Some(model_id)
        }
        None => current.ai_model_id,
    };
    let api_keys = merge_api_keys(&current.api_keys, &req.api_keys);

    let saved = save_setting(&state.db, params.user_id, ai_model_id, &api_keys).await?;
    info!(user_id = %params.user_id, ?ai_model_id, "AI settings updated");
    Ok(Json(saved.into()))
}
