//! Shared harness: the full router over in-memory storage

#![allow(dead_code)]

use argon2::ParamsBuilder;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use culturehub::auth::{PasswordCrypto, SessionStore};
use culturehub::config::{ApiConfig, ProvidersConfig};
use culturehub::providers::SearchProviders;
use culturehub::{router, AppState, MemoryStorage};

pub fn api_config() -> ApiConfig {
    ApiConfig {
        port: 0,
        host: "127.0.0.1".to_string(),
        request_timeout: Duration::from_secs(10),
        max_body_size: 64 * 1024,
        cors_enabled: true,
        cors_origins: vec!["*".to_string()],
    }
}

pub fn state_with_providers(providers: ProvidersConfig) -> Arc<AppState> {
    let params = ParamsBuilder::new()
        .m_cost(8)
        .t_cost(1)
        .p_cost(1)
        .build()
        .unwrap();

    Arc::new(AppState {
        storage: Arc::new(MemoryStorage::new()),
        sessions: SessionStore::new(None),
        passwords: PasswordCrypto::with_params(6, params),
        providers: SearchProviders::new(providers).unwrap(),
    })
}

pub fn app_with_providers(providers: ProvidersConfig) -> Router {
    router(state_with_providers(providers), &api_config())
}

pub fn app() -> Router {
    app_with_providers(ProvidersConfig::default())
}

/// Sends one request and returns the status plus the JSON body
/// (`Value::Null` for empty bodies)
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Signs up `name` with `<name>@example.com` and returns (token, user id)
pub async fn signup(app: &Router, name: &str) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(serde_json::json!({
            "name": name,
            "email": format!("{}@example.com", name.to_lowercase()),
            "password": "secret123",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);

    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}
