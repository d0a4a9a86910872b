mod ai_gateway;
mod analysis;
mod config;
mod db;
mod errors;
mod interview;
mod llm_client;
mod models;
mod resumes;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ai_gateway::resolver::DbModelResolver;
use crate::ai_gateway::AiGateway;
use crate::config::Config;
use crate::db::create_pool;
use crate::interview::ai::LlmInterviewAi;
use crate::interview::cache::{
    MemoryUnfinishedCache, RedisUnfinishedCache, UnfinishedSessionCache,
};
use crate::interview::store::PgSessionStore;
use crate::interview::sweeper::spawn_sweeper;
use crate::interview::InterviewOrchestrator;
use crate::llm_client::LlmClient;
use crate::resumes::store::PgResumeStore;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Unfinished-interview cache: Redis when configured, process memory otherwise
    let cache: Arc<dyn UnfinishedSessionCache> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Redis client initialized");
            Arc::new(RedisUnfinishedCache::new(client, config.unfinished_ttl))
        }
        None => {
            warn!("REDIS_URL not set, unfinished interviews are tracked in process memory");
            Arc::new(MemoryUnfinishedCache::new(config.unfinished_ttl))
        }
    };

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize AI gateway
    let llm = LlmClient::new(config.llm.timeout)?;
    let resolver = Arc::new(DbModelResolver::new(db.clone(), config.llm.clone()));
    let gateway = AiGateway::new(llm, resolver);
    info!(
        "AI gateway initialized (default model: {}, base url: {})",
        config.llm.default_model, config.llm.base_url
    );
    if config.llm.api_key.is_empty() {
        warn!("LLM_API_KEY not set, only users with their own key get AI responses");
    }

    let resumes = Arc::new(PgResumeStore::new(db.clone()));
    let sessions = Arc::new(PgSessionStore::new(db.clone()));
    let orchestrator = InterviewOrchestrator::new(
        sessions.clone(),
        cache,
        resumes.clone(),
        Arc::new(LlmInterviewAi::new(gateway.clone())),
        config.unfinished_ttl,
    );

    spawn_sweeper(sessions, config.unfinished_ttl, config.sweep_interval);
    info!(
        "Idle interview sweeper running every {}s",
        config.sweep_interval.as_secs()
    );

    // Build app state
    let state = AppState {
        db,
        s3,
        config: config.clone(),
        gateway,
        orchestrator,
        resumes,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "interview-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
