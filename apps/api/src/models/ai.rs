use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AiModelRow {
    pub id: Uuid,
    pub name: String,
    pub model_slug: String,
    pub base_url: String,
    pub supports_json_mode: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AiSettingRow {
    pub user_id: Uuid,
    pub ai_model_id: Option<Uuid>,
    /// Map of model id (string) to the user's own API key for that model.
    pub api_keys: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiSettingRow {
    pub fn api_key_for(&self, model_id: Uuid) -> Option<&str> {
        self.api_keys
            .get(model_id.to_string())
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
    }
}
