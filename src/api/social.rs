//! Search, public profiles and the follow graph

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiPath, ApiQuery, AppState};
use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::models::{FeedPost, ListSearchHit, PublicProfile, UserSearchHit};
use crate::providers::search_term;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// A public profile as seen by the (possibly anonymous) viewer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileResponse {
    #[serde(flatten)]
    pub profile: PublicProfile,
    pub is_following: bool,
    pub follower_count: i64,
    pub following_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResponse {
    pub is_following: bool,
    pub follower_count: i64,
}

pub async fn search_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<UserSearchHit>>> {
    let q = search_term(query.q.as_deref())?;
    Ok(Json(state.storage.search_users(q).await?))
}

pub async fn search_lists(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<ListSearchHit>>> {
    let q = search_term(query.q.as_deref())?;
    Ok(Json(state.storage.search_lists(q).await?))
}

pub async fn get_user_profile(
    State(state): State<Arc<AppState>>,
    viewer: Option<AuthUser>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<UserProfileResponse>> {
    let profile = state.storage.get_public_profile(user_id).await?;

    let is_following = match &viewer {
        Some(viewer) if viewer.user_id != user_id => {
            state.storage.is_following(viewer.user_id, user_id).await?
        }
        _ => false,
    };

    Ok(Json(UserProfileResponse {
        profile,
        is_following,
        follower_count: state.storage.get_follower_count(user_id).await?,
        following_count: state.storage.get_following_count(user_id).await?,
    }))
}

pub async fn get_user_posts(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<Vec<FeedPost>>> {
    if state.storage.get_user(user_id).await?.is_none() {
        return Err(Error::not_found("user", user_id));
    }
    Ok(Json(state.storage.get_user_posts(user_id).await?))
}

async fn follow_target(state: &AppState, auth: &AuthUser, user_id: Uuid) -> Result<()> {
    if auth.user_id == user_id {
        return Err(Error::bad_request("You cannot follow yourself"));
    }
    if state.storage.get_user(user_id).await?.is_none() {
        return Err(Error::not_found("user", user_id));
    }
    Ok(())
}

pub async fn follow(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<FollowResponse>> {
    follow_target(&state, &auth, user_id).await?;
    state.storage.follow_user(auth.user_id, user_id).await?;

    Ok(Json(FollowResponse {
        is_following: true,
        follower_count: state.storage.get_follower_count(user_id).await?,
    }))
}

pub async fn unfollow(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<FollowResponse>> {
    follow_target(&state, &auth, user_id).await?;
    state.storage.unfollow_user(auth.user_id, user_id).await?;

    Ok(Json(FollowResponse {
        is_following: false,
        follower_count: state.storage.get_follower_count(user_id).await?,
    }))
}
