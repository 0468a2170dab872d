//! Accounts and sessions
//!
//! - [`PasswordCrypto`] hashes passwords with Argon2id
//! - [`SessionStore`] maps bearer tokens to users, in memory
//! - [`AuthUser`] is the axum extractor that authenticates a request

mod extract;
mod password;
mod session;

pub use extract::{bearer_token, AuthUser};
pub use password::PasswordCrypto;
pub use session::SessionStore;

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Periodically drops expired sessions until shutdown is broadcast
pub fn spawn_session_sweeper(
    sessions: SessionStore,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("🧹 Session sweeper started (every {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Skip first tick (runs immediately otherwise)
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = sessions.purge_expired().await;
                    if removed > 0 {
                        debug!("Purged {} expired sessions", removed);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Session sweeper shutting down");
                    break;
                }
            }
        }
    })
}
