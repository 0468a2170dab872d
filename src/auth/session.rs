//! Bearer-token sessions held in process memory

use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Session {
    user_id: Uuid,
    expires_at: Option<Instant>,
}

impl Session {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Maps opaque tokens to user ids. Clones share the same table.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Option<Duration>,
}

impl SessionStore {
    /// `ttl` of `None` keeps sessions until they are revoked
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Creates a session for `user_id` and returns its token
    pub async fn issue(&self, user_id: Uuid) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let session = Session {
            user_id,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };
        self.sessions.write().await.insert(token.clone(), session);
        token
    }

    /// The user behind `token`, if it is known and not expired
    pub async fn resolve(&self, token: &str) -> Option<Uuid> {
        let session = *self.sessions.read().await.get(token)?;
        if session.is_expired(Instant::now()) {
            self.sessions.write().await.remove(token);
            return None;
        }
        Some(session.user_id)
    }

    /// Returns whether the token existed
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drops every session of `user_id` except `keep`. Returns how many went.
    pub async fn revoke_user(&self, user_id: Uuid, keep: Option<&str>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|token, s| s.user_id != user_id || Some(token.as_str()) == keep);
        before - sessions.len()
    }

    /// Removes expired sessions, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
