//! Revocation store - fine-grained, per-token invalidation.
//!
//! One entry per revoked access token jti, kept only until the token would
//! have expired anyway. Presence of a jti here makes that token invalid
//! regardless of the account's token version.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::RedisConfig;

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record a revoked token id. `ttl_seconds` is the token's remaining
    /// life; entries for already-expired tokens need not be stored.
    async fn revoke(
        &self,
        jti: &str,
        account_id: i64,
        ttl_seconds: i64,
    ) -> Result<(), anyhow::Error>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error>;

    /// Drop entries past their expiry. Idempotent; backends with native TTL
    /// support may treat this as a no-op.
    async fn sweep_expired(&self) -> Result<u64, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// Redis-backed store. `SET ... EX` gives every entry a native TTL matching
/// the token's own expiry, so garbage collection is automatic.
#[derive(Clone)]
pub struct RedisRevocationStore {
    manager: ConnectionManager,
}

impl RedisRevocationStore {
    pub async fn connect(config: &RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to get Redis connection manager");
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Connected to Redis");

        Ok(Self { manager })
    }

    fn key(jti: &str) -> String {
        format!("revoked:{}", jti)
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(
        &self,
        jti: &str,
        account_id: i64,
        ttl_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        if ttl_seconds <= 0 {
            return Ok(());
        }

        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(Self::key(jti))
            .arg(account_id)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to record revoked token: {}", e))
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(jti))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check revoked token: {}", e))?;
        Ok(exists)
    }

    async fn sweep_expired(&self) -> Result<u64, anyhow::Error> {
        // Redis expires entries on its own.
        Ok(0)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-memory store for tests. Expiry is enforced on read and pruned by
/// `sweep_expired`.
#[derive(Default)]
pub struct MemoryRevocationStore {
    entries: Mutex<HashMap<String, (i64, DateTime<Utc>)>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("revocation map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(
        &self,
        jti: &str,
        account_id: i64,
        ttl_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        if ttl_seconds <= 0 {
            return Ok(());
        }

        let expiry = Utc::now() + Duration::seconds(ttl_seconds);
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Revocation map poisoned: {}", e))?
            .insert(jti.to_string(), (account_id, expiry));
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Revocation map poisoned: {}", e))?;
        Ok(entries
            .get(jti)
            .map(|(_, expiry)| *expiry > Utc::now())
            .unwrap_or(false))
    }

    async fn sweep_expired(&self) -> Result<u64, anyhow::Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Revocation map poisoned: {}", e))?;
        let before = entries.len();
        let now = Utc::now();
        entries.retain(|_, (_, expiry)| *expiry > now);
        Ok((before - entries.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoked_jti_is_reported_until_expiry() {
        let store = MemoryRevocationStore::new();
        store.revoke("jti-1", 1, 60).await.unwrap();

        assert!(store.is_revoked("jti-1").await.unwrap());
        assert!(!store.is_revoked("jti-2").await.unwrap());
    }

    #[tokio::test]
    async fn expired_token_revocation_is_skipped() {
        let store = MemoryRevocationStore::new();
        store.revoke("jti-1", 1, 0).await.unwrap();
        store.revoke("jti-2", 1, -30).await.unwrap();

        assert!(store.is_empty());
        assert!(!store.is_revoked("jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn sweep_prunes_only_expired_entries() {
        let store = MemoryRevocationStore::new();
        store.revoke("live", 1, 600).await.unwrap();
        {
            let mut entries = store.entries.lock().unwrap();
            entries.insert(
                "stale".to_string(),
                (2, Utc::now() - Duration::seconds(5)),
            );
        }

        let pruned = store.sweep_expired().await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.len(), 1);
        assert!(store.is_revoked("live").await.unwrap());
    }
}
