use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use super::SessionStore;
use crate::error::Error;

/// The caller, resolved from an `Authorization: Bearer <token>` header.
///
/// Use `Option<AuthUser>` on routes where signing in is optional.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub token: String,
}

/// Token part of a bearer authorization value
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    SessionStore: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::unauthorized("Authentication required"))?;

        let token = bearer_token(header)
            .ok_or_else(|| Error::unauthorized("Malformed authorization header"))?;

        let sessions = SessionStore::from_ref(state);
        let user_id = sessions
            .resolve(token)
            .await
            .ok_or_else(|| Error::unauthorized("Invalid or expired session"))?;

        Ok(AuthUser {
            user_id,
            token: token.to_string(),
        })
    }
}
