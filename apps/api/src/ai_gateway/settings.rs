use std::collections::HashMap;

use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ai::{AiModelRow, AiSettingRow};

pub async fn list_active_models(pool: &PgPool) -> Result<Vec<AiModelRow>, sqlx::Error> {
    sqlx::query_as::<_, AiModelRow>("SELECT * FROM ai_models WHERE is_active ORDER BY name")
        .fetch_all(pool)
        .await
}

pub async fn find_active_model(
    pool: &PgPool,
    model_id: Uuid,
) -> Result<Option<AiModelRow>, sqlx::Error> {
    sqlx::query_as::<_, AiModelRow>("SELECT * FROM ai_models WHERE id = $1 AND is_active")
        .bind(model_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_active_model_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<AiModelRow>, sqlx::Error> {
    sqlx::query_as::<_, AiModelRow>(
        "SELECT * FROM ai_models WHERE model_slug = $1 AND is_active",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
}

pub async fn find_setting(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<AiSettingRow>, sqlx::Error> {
    sqlx::query_as::<_, AiSettingRow>("SELECT * FROM ai_settings WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_or_create_setting(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<AiSettingRow, sqlx::Error> {
    sqlx::query("INSERT INTO ai_settings (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(pool)
        .await?;

    sqlx::query_as::<_, AiSettingRow>("SELECT * FROM ai_settings WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn save_setting(
    pool: &PgPool,
    user_id: Uuid,
    ai_model_id: Option<Uuid>,
    api_keys: &Value,
) -> Result<AiSettingRow, sqlx::Error> {
    sqlx::query_as::<_, AiSettingRow>(
        r#"
        UPDATE ai_settings
        SET ai_model_id = $2, api_keys = $3, updated_at = NOW()
        WHERE user_id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(ai_model_id)
    .bind(api_keys)
    .fetch_one(pool)
    .await
}

/// Merges key updates into the stored map. An empty key removes the entry.
pub fn merge_api_keys(current: &Value, updates: &HashMap<Uuid, String>) -> Value {
    let mut merged: Map<String, Value> = current.as_object().cloned().unwrap_or_default();
    for (model_id, key) in updates {
        let key = key.trim();
        if key.is_empty() {
            merged.remove(&model_id.to_string());
        } else {
            merged.insert(model_id.to_string(), Value::String(key.to_string()));
        }
    }
    Value::Object(merged)
}

/// Replaces every key with `****` plus its last four characters.
pub fn mask_api_keys(keys: &Value) -> Value {
    let masked = keys
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(model_id, key)| {
                    let key = key.as_str().unwrap_or_default();
                    let tail: String = key
                        .chars()
                        .rev()
                        .take(4)
                        .collect::<Vec<_>>()
                        .into_iter()
                        .rev()
                        .collect();
                    (model_id.clone(), Value::String(format!("****{tail}")))
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Object(masked)
}
