//! Unfinished-interview cache: user id → id of the session still in progress.
//!
//! Entries expire after the configured TTL unless refreshed. The database is
//! authoritative; this is the fast path for "do you have an interview open?".

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::{Client as RedisClient, Script};
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::AppError;

/// Deletes the key only while it still holds the expected session id.
const CLEAR_IF_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

pub fn unfinished_key(user_id: Uuid) -> String {
    format!("user:{user_id}:unfinished_interview")
}

#[async_trait]
pub trait UnfinishedSessionCache: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<Uuid>, AppError>;
    /// Stores the entry and (re)starts its TTL.
    async fn set(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AppError>;
    async fn clear(&self, user_id: Uuid) -> Result<(), AppError>;
    /// Clears the entry only if it still points at `session_id`.
    async fn clear_if(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AppError>;
}

pub struct RedisUnfinishedCache {
    client: RedisClient,
    ttl: Duration,
}

impl RedisUnfinishedCache {
    pub fn new(client: RedisClient, ttl: Duration) -> Self {
        Self { client, ttl }
    }
}

#[async_trait]
impl UnfinishedSessionCache for RedisUnfinishedCache {
    async fn get(&self, user_id: Uuid) -> Result<Option<Uuid>, AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(unfinished_key(user_id))
            .query_async(&mut conn)
            .await?;
        // A value we cannot parse is treated as absent.
        Ok(raw.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    async fn set(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("SET")
            .arg(unfinished_key(user_id))
            .arg(session_id.to_string())
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = redis::cmd("DEL")
            .arg(unfinished_key(user_id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear_if(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = Script::new(CLEAR_IF_SCRIPT)
            .key(unfinished_key(user_id))
            .arg(session_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// In-process cache used when no Redis URL is configured, and in tests.
/// Expiry is measured on tokio's clock so it follows a paused test clock.
pub struct MemoryUnfinishedCache {
    ttl: Duration,
    entries: Mutex<HashMap<Uuid, (Uuid, Instant)>>,
}

impl MemoryUnfinishedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, (Uuid, Instant)>> {
        // A poisoned map is still a valid map.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl UnfinishedSessionCache for MemoryUnfinishedCache {
    async fn get(&self, user_id: Uuid) -> Result<Option<Uuid>, AppError> {
        let mut entries = self.entries();
        match entries.get(&user_id) {
            Some(&(session_id, expires_at)) if Instant::now() < expires_at => Ok(Some(session_id)),
            Some(_) => {
                entries.remove(&user_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AppError> {
        let now = Instant::now();
        let mut entries = self.entries();
        // Users who never come back would otherwise stay in the map forever.
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(user_id, (session_id, now + self.ttl));
        Ok(())
    }

    async fn clear(&self, user_id: Uuid) -> Result<(), AppError> {
        self.entries().remove(&user_id);
        Ok(())
    }

    async fn clear_if(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AppError> {
        let mut entries = self.entries();
        if entries.get(&user_id).is_some_and(|(id, _)| *id == session_id) {
            entries.remove(&user_id);
        }
        Ok(())
    }
}
