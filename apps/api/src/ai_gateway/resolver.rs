//! Model and API-key resolution.
//!
//! Model: the user's chosen model → the active catalogue model carrying the
//! system default slug → a profile built purely from configuration.
//! Key: the user's key for that model → the system key.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::ai_gateway::settings::{find_active_model, find_active_model_by_slug, find_setting};
use crate::config::LlmConfig;
use crate::llm_client::{LlmError, ModelTarget};
use crate::models::ai::{AiModelRow, AiSettingRow};

#[async_trait]
pub trait ModelResolver: Send + Sync {
    async fn resolve(&self, user_id: Uuid) -> Result<ModelTarget, LlmError>;
}

/// Resolves against the `ai_settings` / `ai_models` tables.
pub struct DbModelResolver {
    pool: PgPool,
    defaults: LlmConfig,
}

impl DbModelResolver {
    pub fn new(pool: PgPool, defaults: LlmConfig) -> Self {
        Self { pool, defaults }
    }

    async fn lookup(
        &self,
        user_id: Uuid,
    ) -> Result<(Option<AiSettingRow>, Option<AiModelRow>), sqlx::Error> {
        let setting = find_setting(&self.pool, user_id).await?;

        let user_model = match setting.as_ref().and_then(|s| s.ai_model_id) {
            Some(model_id) => find_active_model(&self.pool, model_id).await?,
            None => None,
        };

        let model = match user_model {
            Some(model) => Some(model),
            None => find_active_model_by_slug(&self.pool, &self.defaults.default_model).await?,
        };

        Ok((setting, model))
    }
}

#[async_trait]
impl ModelResolver for DbModelResolver {
    async fn resolve(&self, user_id: Uuid) -> Result<ModelTarget, LlmError> {
        let (setting, model) = self
            .lookup(user_id)
            .await
            .map_err(|e| LlmError::NotConfigured(format!("model lookup failed: {e}")))?;

        let target = choose_target(setting.as_ref(), model.as_ref(), &self.defaults);
        debug!(%user_id, model = %target.model_slug, "Resolved AI model");
        Ok(target)
    }
}

pub fn choose_target(
    setting: Option<&AiSettingRow>,
    model: Option<&AiModelRow>,
    defaults: &LlmConfig,
) -> ModelTarget {
    match model {
        Some(model) => {
            let api_key = setting
                .and_then(|s| s.api_key_for(model.id))
                .unwrap_or(defaults.api_key.as_str());
            ModelTarget {
                api_key: api_key.to_string(),
                model_slug: model.model_slug.clone(),
                base_url: model.base_url.clone(),
                supports_json_mode: model.supports_json_mode,
            }
        }
        None => ModelTarget {
            api_key: defaults.api_key.clone(),
            model_slug: defaults.default_model.clone(),
            base_url: defaults.base_url.clone(),
            supports_json_mode: defaults.json_mode,
        },
    }
}
