//! The signed-in user's profile, favorites and ratings

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiJson, ApiPath, AppState};
use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::models::{
    AccountUser, Favorite, FeedPost, MediaCategory, NewFavorite, NewRating, ProfileUpdate,
    Rating, RatingStats, User,
};

/// Own profile: account details plus everything the profile screen shows
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnProfile {
    pub user: AccountUser,
    pub favorites: Vec<Favorite>,
    pub stats: RatingStats,
    pub posts: Vec<FeedPost>,
    pub list_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: AccountUser,
}

#[derive(Debug, Deserialize)]
pub struct BioUpdate {
    pub bio: String,
}

async fn current_user(state: &AppState, auth: &AuthUser) -> Result<User> {
    state
        .storage
        .get_user(auth.user_id)
        .await?
        .ok_or_else(|| Error::not_found("user", auth.user_id))
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<OwnProfile>> {
    let user = current_user(&state, &auth).await?;
    let profile = state.storage.get_public_profile(user.id).await?;

    Ok(Json(OwnProfile {
        user: AccountUser::from(&user),
        favorites: profile.favorites,
        stats: profile.stats,
        posts: profile.posts,
        list_count: profile.list_count,
        follower_count: state.storage.get_follower_count(user.id).await?,
        following_count: state.storage.get_following_count(user.id).await?,
    }))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<UserResponse>> {
    let update = update.validate()?;
    let user = state
        .storage
        .update_profile(auth.user_id, &update)
        .await?
        .ok_or_else(|| Error::not_found("user", auth.user_id))?;

    Ok(Json(UserResponse {
        user: AccountUser::from(&user),
    }))
}

pub async fn update_bio(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(update): ApiJson<BioUpdate>,
) -> Result<Json<UserResponse>> {
    let user = state
        .storage
        .update_user_bio(auth.user_id, update.bio.trim())
        .await?
        .ok_or_else(|| Error::not_found("user", auth.user_id))?;

    Ok(Json(UserResponse {
        user: AccountUser::from(&user),
    }))
}

// ----------------------------------------------------------------------------
// Favorites
// ----------------------------------------------------------------------------

pub async fn get_favorites(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<Favorite>>> {
    Ok(Json(state.storage.get_favorites(auth.user_id).await?))
}

pub async fn set_favorite(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(favorite): ApiJson<NewFavorite>,
) -> Result<Json<Favorite>> {
    let favorite = favorite.validate()?;
    Ok(Json(state.storage.set_favorite(auth.user_id, &favorite).await?))
}

pub async fn delete_favorite(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(category): ApiPath<String>,
) -> Result<StatusCode> {
    let category: MediaCategory = category.parse()?;
    state.storage.delete_favorite(auth.user_id, category).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------------
// Ratings
// ----------------------------------------------------------------------------

pub async fn get_ratings(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<Rating>>> {
    Ok(Json(state.storage.get_ratings(auth.user_id).await?))
}

pub async fn upsert_rating(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(rating): ApiJson<NewRating>,
) -> Result<Json<Rating>> {
    let rating = rating.validate()?;
    Ok(Json(state.storage.upsert_rating(auth.user_id, &rating).await?))
}

pub async fn get_rating_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<RatingStats>> {
    Ok(Json(state.storage.get_rating_stats(auth.user_id).await?))
}

pub async fn delete_rating(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath((media_type, media_id)): ApiPath<(String, String)>,
) -> Result<StatusCode> {
    let media_type: MediaCategory = media_type.parse()?;
    state
        .storage
        .delete_rating(auth.user_id, &media_id, media_type)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
