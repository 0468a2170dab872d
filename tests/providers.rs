mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{app, app_with_providers, send};
use culturehub::config::ProvidersConfig;

fn providers_at(server: &MockServer, tmdb_key: Option<&str>) -> ProvidersConfig {
    ProvidersConfig {
        tmdb_api_key: tmdb_key.map(str::to_string),
        tmdb_base_url: server.uri(),
        google_books_base_url: server.uri(),
        deezer_base_url: server.uri(),
        jikan_base_url: server.uri(),
        result_limit: 7,
        ..ProvidersConfig::default()
    }
}

#[tokio::test]
async fn trending_passes_tmdb_body_through() {
    let server = MockServer::start().await;
    let upstream = json!({ "page": 1, "results": [{ "id": 550, "media_type": "movie" }] });
    Mock::given(method("GET"))
        .and(path("/trending/all/week"))
        .and(query_param("api_key", "tmdb-key"))
        .and(query_param("language", "pt-BR"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_with_providers(providers_at(&server, Some("tmdb-key")));
    let (status, body) = send(&app, Method::GET, "/api/movies/trending", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, upstream);
}

#[tokio::test]
async fn movie_search_sends_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/multi"))
        .and(query_param("api_key", "tmdb-key"))
        .and(query_param("query", "fight club"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_with_providers(providers_at(&server, Some("tmdb-key")));
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/movies/search?q=fight%20club",
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn tmdb_without_key_is_unavailable() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api/movies/trending", None, None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "PROVIDER_NOT_CONFIGURED");
    assert_eq!(body["message"], "TMDB API key not configured");
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let app = app_with_providers(providers_at(&server, None));
    let (status, body) = send(&app, Method::GET, "/api/music/search?q=queen", None, None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PROVIDER_ERROR");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Deezer API responded with status: 500"));
}

#[tokio::test]
async fn books_and_music_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/volumes"))
        .and(query_param("q", "dune"))
        .and(query_param("maxResults", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "totalItems": 1 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "queen"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [], "total": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_with_providers(providers_at(&server, None));

    let (status, body) = send(&app, Method::GET, "/api/books/search?q=dune", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalItems"], 1);

    let (status, body) = send(&app, Method::GET, "/api/music/search?q=queen", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn jikan_anime_and_manga_search() {
    let server = MockServer::start().await;
    for kind in ["anime", "manga"] {
        Mock::given(method("GET"))
            .and(path(format!("/{}", kind)))
            .and(query_param("q", "berserk"))
            .and(query_param("limit", "7"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "type": kind }] })),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let app = app_with_providers(providers_at(&server, None));

    let (status, body) = send(&app, Method::GET, "/api/anime/search?q=berserk", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["type"], "anime");

    let (status, body) = send(&app, Method::GET, "/api/manga/search?q=berserk", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["type"], "manga");
}

#[tokio::test]
async fn blank_query_is_rejected_before_any_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let app = app_with_providers(providers_at(&server, Some("tmdb-key")));
    for uri in [
        "/api/movies/search",
        "/api/books/search?q=",
        "/api/music/search?q=%20%20",
        "/api/anime/search",
        "/api/manga/search?q=",
    ] {
        let (status, body) = send(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["message"], "Query parameter 'q' is required");
    }
}
