//! AI Gateway: resolves the per-user model/key, then hands the request to
//! the shared `LlmClient`. Callers decide how to degrade on failure.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::llm_client::{ChatRequest, LlmClient, LlmError, TextStream};

pub mod handlers;
pub mod resolver;
pub mod settings;

pub use resolver::ModelResolver;

#[derive(Clone)]
pub struct AiGateway {
    llm: LlmClient,
    resolver: Arc<dyn ModelResolver>,
}

impl AiGateway {
    pub fn new(llm: LlmClient, resolver: Arc<dyn ModelResolver>) -> Self {
        Self { llm, resolver }
    }

    pub async fn complete(
        &self,
        user_id: Uuid,
        request: &ChatRequest<'_>,
    ) -> Result<String, LlmError> {
        let target = self.resolver.resolve(user_id).await?;
        self.llm.complete(&target, request).await
    }

    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        user_id: Uuid,
        request: &ChatRequest<'_>,
    ) -> Result<T, LlmError> {
        let target = self.resolver.resolve(user_id).await?;
        self.llm.complete_json(&target, request).await
    }

    pub async fn stream(
        &self,
        user_id: Uuid,
        request: &ChatRequest<'_>,
    ) -> Result<TextStream, LlmError> {
        let target = self.resolver.resolve(user_id).await?;
        self.llm.stream(&target, request).await
    }
}
