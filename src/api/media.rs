//! Content search passthrough. Bodies are whatever the provider returned.

use axum::{extract::State, Json};
use serde_json::Value;
use std::sync::Arc;

use super::social::SearchQuery;
use super::{ApiQuery, AppState};
use crate::error::Result;
use crate::providers::search_term;

pub async fn trending_movies(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    Ok(Json(state.providers.tmdb_trending().await?))
}

pub async fn search_movies(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Value>> {
    let q = search_term(query.q.as_deref())?;
    Ok(Json(state.providers.tmdb_search(q).await?))
}

pub async fn search_books(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Value>> {
    let q = search_term(query.q.as_deref())?;
    Ok(Json(state.providers.google_books_search(q).await?))
}

pub async fn search_music(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Value>> {
    let q = search_term(query.q.as_deref())?;
    Ok(Json(state.providers.deezer_search(q).await?))
}

pub async fn search_anime(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Value>> {
    let q = search_term(query.q.as_deref())?;
    Ok(Json(state.providers.jikan_anime_search(q).await?))
}

pub async fn search_manga(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Value>> {
    let q = search_term(query.q.as_deref())?;
    Ok(Json(state.providers.jikan_manga_search(q).await?))
}
