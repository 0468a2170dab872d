//! HTTP API server
//!
//! REST endpoints for the CultureHub mobile client: accounts, profiles,
//! lists, posts, the social graph and content search. Every route except
//! signup, login, search and public profiles takes a bearer token.

use async_trait::async_trait;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, FromRef, FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::auth::{PasswordCrypto, SessionStore};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::providers::SearchProviders;
use crate::storage::Storage;

mod accounts;
mod lists;
mod media;
mod posts;
mod profile;
mod social;

/// Shared application state
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub sessions: SessionStore,
    pub passwords: PasswordCrypto,
    pub providers: SearchProviders,
}

impl FromRef<Arc<AppState>> for SessionStore {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.sessions.clone()
    }
}

/// JSON body extractor whose rejections use the API error format
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> Error {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            Error::bad_request("Expected a JSON body with Content-Type: application/json")
        }
        other => Error::bad_request(other.body_text()),
    }
}

/// Path parameters whose parse failures use the API error format
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ApiPath(value)),
            Err(rejection) => Err(Error::bad_request(rejection.body_text())),
        }
    }
}

/// Query string extractor whose rejections use the API error format
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(Error::bad_request(rejection.body_text())),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
}

/// Build the router with every route and the HTTP middleware stack
pub fn router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Accounts
        .route("/api/auth/signup", post(accounts::signup))
        .route("/api/auth/login", post(accounts::login))
        .route("/api/auth/logout", post(accounts::logout))
        // Own profile
        .route("/api/profile", get(profile::get_profile))
        .route("/api/profile/update", put(profile::update_profile))
        .route("/api/profile/bio", patch(profile::update_bio))
        .route("/api/profile/password", put(accounts::change_password))
        .route("/api/profile/account", delete(accounts::delete_account))
        .route(
            "/api/profile/favorites",
            get(profile::get_favorites).put(profile::set_favorite),
        )
        .route(
            "/api/profile/favorites/:category",
            delete(profile::delete_favorite),
        )
        .route(
            "/api/profile/ratings",
            get(profile::get_ratings).post(profile::upsert_rating),
        )
        .route("/api/profile/ratings/stats", get(profile::get_rating_stats))
        .route(
            "/api/profile/ratings/:media_type/:media_id",
            delete(profile::delete_rating),
        )
        // Lists
        .route(
            "/api/profile/lists",
            get(lists::get_lists).post(lists::create_list),
        )
        .route(
            "/api/profile/lists/:id",
            get(lists::get_list)
                .patch(lists::update_list)
                .delete(lists::delete_list),
        )
        .route("/api/profile/lists/:id/items", post(lists::add_item))
        .route(
            "/api/profile/lists/:id/items/:item_id",
            delete(lists::remove_item),
        )
        // Posts and feed
        .route("/api/posts", get(posts::get_all_posts).post(posts::create_post))
        .route(
            "/api/posts/:id/like",
            post(posts::like_post).delete(posts::unlike_post),
        )
        .route("/api/feed", get(posts::get_feed))
        // Social
        .route("/api/users/search", get(social::search_users))
        .route("/api/lists/search", get(social::search_lists))
        .route("/api/users/:id/profile", get(social::get_user_profile))
        .route("/api/users/:id/posts", get(social::get_user_posts))
        .route(
            "/api/users/:id/follow",
            post(social::follow).delete(social::unfollow),
        )
        // Content search
        .route("/api/movies/trending", get(media::trending_movies))
        .route("/api/movies/search", get(media::search_movies))
        .route("/api/books/search", get(media::search_books))
        .route("/api/music/search", get(media::search_music))
        .route("/api/anime/search", get(media::search_anime))
        .route("/api/manga/search", get(media::search_manga))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors_layer(config))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if !config.cors_enabled {
        return CorsLayer::new();
    }

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

/// Start the API server; returns once `shutdown` fires and in-flight
/// requests have drained
pub async fn start_server(
    state: Arc<AppState>,
    config: &ApiConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("🚀 Starting CultureHub API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config {
            message: format!("Failed to bind {}: {}", addr, e).into(),
            source: Some(Box::new(e)),
        })?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("API server draining connections");
        })
        .await
        .map_err(Error::internal)?;

    Ok(())
}

/// Health check endpoint; 503 when storage is unreachable
async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let active_sessions = state.sessions.len().await;

    let (status, code) = match state.storage.health_check().await {
        Ok(()) => ("healthy", StatusCode::OK),
        Err(e) => {
            warn!("Storage health check failed: {}", e);
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
        }
    };

    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        active_sessions,
    };
    (code, Json(body)).into_response()
}
