//! Posts, likes and the activity feed

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery, AppState};
use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::models::{FeedPost, FeedScope, NewPost, Post};

const DEFAULT_FEED_LIMIT: i64 = 20;
const MAX_FEED_LIMIT: i64 = 100;

/// Query params for the feed endpoint
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub scope: FeedScope,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_FEED_LIMIT
}

/// Response for the feed endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub items: Vec<FeedPost>,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub like_count: i32,
}

/// Publishes a post. The post doubles as a rating, so the author's rating
/// for the same media is created or replaced.
#[instrument(skip(state, auth, post), fields(user_id = %auth.user_id))]
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(post): ApiJson<NewPost>,
) -> Result<(StatusCode, Json<Post>)> {
    let post = post.validate()?;

    if state
        .storage
        .find_post_by_user_and_media(auth.user_id, &post.media_id, post.media_type)
        .await?
        .is_some()
    {
        return Err(Error::conflict("You already posted about this title"));
    }

    let created = state.storage.create_post(auth.user_id, &post).await?;
    debug!("Post {} created for {} {}", created.id, created.media_type, created.media_id);

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_all_posts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<FeedPost>>> {
    Ok(Json(state.storage.get_all_posts().await?))
}

pub async fn like_post(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<Json<LikeResponse>> {
    let like_count = state.storage.like_post(auth.user_id, post_id).await?;
    Ok(Json(LikeResponse { like_count }))
}

pub async fn unlike_post(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<Json<LikeResponse>> {
    let like_count = state.storage.unlike_post(auth.user_id, post_id).await?;
    Ok(Json(LikeResponse { like_count }))
}

/// Newest-first feed of everyone or of followed users plus the viewer
pub async fn get_feed(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> Result<Json<FeedResponse>> {
    let limit = query.limit.clamp(1, MAX_FEED_LIMIT);
    let offset = query.offset.max(0);

    let page = state
        .storage
        .get_feed(auth.user_id, query.scope, limit, offset)
        .await?;

    let has_more = offset + (page.items.len() as i64) < page.total;
    Ok(Json(FeedResponse {
        items: page.items,
        total: page.total,
        has_more,
    }))
}
