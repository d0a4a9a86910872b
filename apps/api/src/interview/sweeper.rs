use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::errors::AppError;
use crate::interview::store::SessionStore;

/// Cancels Running sessions idle for longer than `ttl`. Returns how many.
pub async fn sweep_idle_sessions(store: &dyn SessionStore, ttl: Duration) -> Result<u64, AppError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid unfinished TTL: {e}")))?;
    store.cancel_idle_sessions(Utc::now() - ttl).await
}

/// Runs `sweep_idle_sessions` every `every` until the runtime shuts down.
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, ttl: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_idle_sessions(store.as_ref(), ttl).await {
                Ok(0) => {}
                Ok(canceled) => info!(canceled, "Canceled idle interviews"),
                Err(e) => error!("Idle interview sweep failed: {e}"),
            }
        }
    })
}
