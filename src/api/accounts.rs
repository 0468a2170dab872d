//! Signup, login, logout, password change and account deletion

use axum::{extract::State, http::StatusCode, Json};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{ApiJson, AppState};
use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::models::{normalize_email, AccountUser, NewUser};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;
/// Attempts at a free `<base><4 digits>` username before giving up
const USERNAME_SUFFIX_ATTEMPTS: usize = 5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: AccountUser,
}

/// Lowercases a requested username and checks its shape
fn normalize_username(raw: &str) -> Result<String> {
    let username = raw.trim().trim_start_matches('@').to_lowercase();
    let len = username.chars().count();

    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(Error::validation(
            "username",
            format!("must be {} to {} characters", USERNAME_MIN, USERNAME_MAX),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(Error::validation(
            "username",
            "may only contain letters, digits, '_' and '.'",
        ));
    }
    Ok(username)
}

/// Username candidate from the local part of an email address
fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut base: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .map(|c| c.to_ascii_lowercase())
        .take(USERNAME_MAX - 4)
        .collect();
    while base.chars().count() < USERNAME_MIN {
        base.push('_');
    }
    base
}

async fn pick_username(state: &AppState, email: &str) -> Result<String> {
    let base = username_base(email);
    if state.storage.get_user_by_username(&base).await?.is_none() {
        return Ok(base);
    }

    for _ in 0..USERNAME_SUFFIX_ATTEMPTS {
        let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
        let candidate = format!("{}{}", base, suffix);
        if state.storage.get_user_by_username(&candidate).await?.is_none() {
            return Ok(candidate);
        }
    }

    Err(Error::conflict(
        "Could not generate a free username, please choose one",
    ))
}

#[instrument(skip(state, req))]
pub async fn signup(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    let email = normalize_email(&req.email)?;
    state.passwords.check_strength(&req.password)?;

    if state.storage.get_user_by_email(&email).await?.is_some() {
        return Err(Error::conflict("Email already registered"));
    }

    let username = match req.username.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(requested) => {
            let username = normalize_username(requested)?;
            if state.storage.get_user_by_username(&username).await?.is_some() {
                return Err(Error::conflict("Username already taken"));
            }
            username
        }
        None => pick_username(&state, &email).await?,
    };

    let password_hash = state.passwords.hash(&req.password).await?;
    let user = state
        .storage
        .create_user(NewUser {
            username,
            email,
            name: name.to_string(),
            password_hash,
        })
        .await?;

    let token = state.sessions.issue(user.id).await;
    info!("New account {} (@{})", user.id, user.username);

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user: AccountUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, req))]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let invalid = || Error::unauthorized("Invalid email or password");

    let email = normalize_email(&req.email).map_err(|_| invalid())?;
    let user = state
        .storage
        .get_user_by_email(&email)
        .await?
        .ok_or_else(invalid)?;

    if !state.passwords.verify(&req.password, &user.password_hash).await? {
        return Err(invalid());
    }

    let token = state.sessions.issue(user.id).await;
    Ok(Json(SessionResponse {
        token,
        user: AccountUser::from(&user),
    }))
}

pub async fn logout(State(state): State<Arc<AppState>>, auth: AuthUser) -> StatusCode {
    state.sessions.revoke(&auth.token).await;
    StatusCode::NO_CONTENT
}

/// Changes the password and signs out every other session
#[instrument(skip(state, auth, req), fields(user_id = %auth.user_id))]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode> {
    let user = state
        .storage
        .get_user(auth.user_id)
        .await?
        .ok_or_else(|| Error::not_found("user", auth.user_id))?;

    if !state
        .passwords
        .verify(&req.current_password, &user.password_hash)
        .await?
    {
        return Err(Error::bad_request("Current password is incorrect"));
    }
    state.passwords.check_strength(&req.new_password)?;

    let password_hash = state.passwords.hash(&req.new_password).await?;
    state.storage.update_password(user.id, &password_hash).await?;

    let revoked = state.sessions.revoke_user(user.id, Some(&auth.token)).await;
    info!("Password changed, {} other sessions revoked", revoked);

    Ok(StatusCode::NO_CONTENT)
}

/// Deletes the account and everything it owns after re-checking the password
#[instrument(skip(state, auth, req), fields(user_id = %auth.user_id))]
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<DeleteAccountRequest>,
) -> Result<StatusCode> {
    let user = state
        .storage
        .get_user(auth.user_id)
        .await?
        .ok_or_else(|| Error::not_found("user", auth.user_id))?;

    if !state.passwords.verify(&req.password, &user.password_hash).await? {
        return Err(Error::bad_request("Password is incorrect"));
    }

    state.storage.delete_user(user.id).await?;
    state.sessions.revoke_user(user.id, None).await;
    info!("Account deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_base_from_email() {
        assert_eq!(username_base("Ana.Lima+news@example.com"), "ana.limanews");
        assert_eq!(username_base("jo@example.com"), "jo_");
        assert!(username_base(&format!("{}@example.com", "x".repeat(60))).len() <= USERNAME_MAX - 4);
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username(" @Ana_L ").unwrap(), "ana_l");
        assert!(normalize_username("ab").is_err());
        assert!(normalize_username("ana lima").is_err());
    }
}
