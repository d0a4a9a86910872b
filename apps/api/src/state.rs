use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::ai_gateway::AiGateway;
use crate::config::Config;
use crate::interview::InterviewOrchestrator;
use crate::resumes::store::ResumeStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    pub config: Config,
    /// Model/key resolution plus the chat-completions client.
    pub gateway: AiGateway,
    pub orchestrator: InterviewOrchestrator,
    pub resumes: Arc<dyn ResumeStore>,
}
