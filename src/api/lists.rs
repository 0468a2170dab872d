//! Personal media lists. Lists are private to their owner; another user's
//! list id answers 404.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiJson, ApiPath, AppState};
use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::models::{ListItem, ListSummary, ListUpdate, MediaList, NewList, NewListItem};

#[derive(Debug, Serialize)]
pub struct ListDetail {
    pub list: MediaList,
    pub items: Vec<ListItem>,
}

async fn owned_list(state: &AppState, auth: &AuthUser, list_id: Uuid) -> Result<MediaList> {
    state
        .storage
        .get_list_by_id(list_id)
        .await?
        .filter(|list| list.user_id == auth.user_id)
        .ok_or_else(|| Error::not_found("list", list_id))
}

pub async fn get_lists(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<ListSummary>>> {
    Ok(Json(state.storage.get_lists(auth.user_id).await?))
}

pub async fn create_list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(list): ApiJson<NewList>,
) -> Result<(StatusCode, Json<MediaList>)> {
    let list = list.validate()?;
    let created = state.storage.create_list(auth.user_id, &list).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(list_id): ApiPath<Uuid>,
) -> Result<Json<ListDetail>> {
    let list = owned_list(&state, &auth, list_id).await?;
    let items = state.storage.get_list_items(list.id).await?;
    Ok(Json(ListDetail { list, items }))
}

pub async fn update_list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(list_id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<ListUpdate>,
) -> Result<Json<MediaList>> {
    let update = update.validate()?;
    if update.is_empty() {
        return Ok(Json(owned_list(&state, &auth, list_id).await?));
    }

    state
        .storage
        .update_list(auth.user_id, list_id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| Error::not_found("list", list_id))
}

pub async fn delete_list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(list_id): ApiPath<Uuid>,
) -> Result<StatusCode> {
    if !state.storage.delete_list(auth.user_id, list_id).await? {
        return Err(Error::not_found("list", list_id));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(list_id): ApiPath<Uuid>,
    ApiJson(item): ApiJson<NewListItem>,
) -> Result<(StatusCode, Json<ListItem>)> {
    let item = item.validate()?;
    let list = owned_list(&state, &auth, list_id).await?;
    let added = state.storage.add_list_item(list.id, &item).await?;
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath((list_id, item_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    let list = owned_list(&state, &auth, list_id).await?;
    if !state.storage.remove_list_item(list.id, item_id).await? {
        return Err(Error::not_found("list item", item_id));
    }
    Ok(StatusCode::NO_CONTENT)
}
