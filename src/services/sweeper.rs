//! Periodic garbage collection of expired challenge and revocation rows.
//!
//! Expiry itself is enforced at read time; the sweep only reclaims storage.
//! It is best-effort and idempotent, so a failed tick just waits for the
//! next one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::database::ChallengeStore;
use super::revocation::RevocationStore;

pub fn spawn_expiry_sweeper(
    challenges: Arc<dyn ChallengeStore>,
    revocations: Arc<dyn RevocationStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match challenges.delete_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "Swept expired OTP challenges"),
                Err(e) => tracing::warn!(error = %e, "Challenge sweep failed"),
            }

            match revocations.sweep_expired().await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "Swept expired revocation entries"),
                Err(e) => tracing::warn!(error = %e, "Revocation sweep failed"),
            }
        }
    })
}
