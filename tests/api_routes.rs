mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{app, send, signup};

#[tokio::test]
async fn health_reports_status() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["activeSessions"], 0);
}

#[tokio::test]
async fn signup_login_logout_flow() {
    let app = app();
    let (token, user_id) = signup(&app, "Ana").await;

    let (status, body) = send(&app, Method::GET, "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], user_id.as_str());
    assert_eq!(body["user"]["email"], "ana@example.com");
    assert_eq!(body["user"]["username"], "ana");
    assert!(body["user"].get("passwordHash").is_none());
    assert_eq!(body["listCount"], 0);
    assert_eq!(body["stats"]["distribution"].as_array().unwrap().len(), 5);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ANA@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["message"], "Invalid email or password");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ana@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second = body["token"].as_str().unwrap().to_string();
    assert_ne!(second, token);

    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, Method::GET, "/api/profile", Some(&second), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn signup_rejects_duplicates_and_bad_input() {
    let app = app();
    signup(&app, "Ana").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({ "name": "Other", "email": "ana@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already registered");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({
            "name": "Other",
            "email": "other@example.com",
            "password": "secret123",
            "username": "ana"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({ "name": "Short", "email": "short@example.com", "password": "123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({ "name": "No password" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn derived_username_gets_suffix_on_collision() {
    let app = app();
    send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({ "name": "Ana", "email": "ana@one.com", "password": "secret123" })),
    )
    .await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({ "name": "Ana Two", "email": "ana@two.com", "password": "secret123" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let username = body["user"]["username"].as_str().unwrap();
    assert!(username.starts_with("ana"));
    assert_eq!(username.len(), "ana".len() + 4);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = app();
    for uri in ["/api/profile", "/api/profile/lists", "/api/feed"] {
        let (status, body) = send(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    let (status, _) = send(&app, Method::GET, "/api/profile", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_edits() {
    let app = app();
    let (token, _) = signup(&app, "Ana").await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/profile/update",
        Some(&token),
        Some(json!({
            "name": "Ana Lima",
            "email": "Ana.Lima@Example.com",
            "bio": "reads a lot",
            "avatarUrl": "https://img.example.com/ana.png"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Ana Lima");
    assert_eq!(body["user"]["email"], "ana.lima@example.com");
    assert_eq!(body["user"]["avatarUrl"], "https://img.example.com/ana.png");

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/api/profile/bio",
        Some(&token),
        Some(json!({ "bio": "  watches more  " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["bio"], "watches more");

    signup(&app, "Bia").await;
    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/profile/update",
        Some(&token),
        Some(json!({ "name": "Ana", "email": "bia@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn favorites_are_one_per_category() {
    let app = app();
    let (token, _) = signup(&app, "Ana").await;

    for title in ["Alien", "Aliens"] {
        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/profile/favorites",
            Some(&token),
            Some(json!({ "category": "film", "title": title, "mediaId": "348" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    send(
        &app,
        Method::PUT,
        "/api/profile/favorites",
        Some(&token),
        Some(json!({ "category": "book", "title": "Dune" })),
    )
    .await;

    let (_, body) = send(&app, Method::GET, "/api/profile/favorites", Some(&token), None).await;
    let favorites = body.as_array().unwrap();
    assert_eq!(favorites.len(), 2);
    let film = favorites.iter().find(|f| f["category"] == "film").unwrap();
    assert_eq!(film["title"], "Aliens");
    let book = favorites.iter().find(|f| f["category"] == "book").unwrap();
    assert!(book["mediaId"].is_null());

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/profile/favorites/film",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/profile/favorites/podcast",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, "/api/profile/favorites", Some(&token), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn ratings_upsert_and_stats() {
    let app = app();
    let (token, _) = signup(&app, "Ana").await;

    let rate = |media_id: &'static str, media_type: &'static str, rating: i32| {
        json!({
            "mediaId": media_id,
            "mediaType": media_type,
            "mediaTitle": format!("Title {}", media_id),
            "rating": rating,
        })
    };

    for body in [rate("1", "film", 3), rate("1", "film", 5), rate("2", "anime", 4)] {
        let (status, _) =
            send(&app, Method::POST, "/api/profile/ratings", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/profile/ratings",
        Some(&token),
        Some(rate("3", "film", 6)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (_, body) = send(&app, Method::GET, "/api/profile/ratings", Some(&token), None).await;
    let ratings = body.as_array().unwrap();
    assert_eq!(ratings.len(), 2);
    let film = ratings.iter().find(|r| r["mediaType"] == "film").unwrap();
    assert_eq!(film["rating"], 5);
    assert_eq!(film["comment"], "");

    let (_, stats) =
        send(&app, Method::GET, "/api/profile/ratings/stats", Some(&token), None).await;
    assert_eq!(stats["distribution"][0], json!({ "stars": 5, "count": 1 }));
    assert_eq!(stats["distribution"][1], json!({ "stars": 4, "count": 1 }));
    assert_eq!(
        stats["categoryStats"],
        json!([{ "category": "film", "count": 1 }, { "category": "anime", "count": 1 }])
    );

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/profile/ratings/film/1",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Method::GET, "/api/profile/ratings", Some(&token), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn lists_are_private_to_their_owner() {
    let app = app();
    let (ana, _) = signup(&app, "Ana").await;
    let (bia, _) = signup(&app, "Bia").await;

    let (status, list) = send(
        &app,
        Method::POST,
        "/api/profile/lists",
        Some(&ana),
        Some(json!({ "name": "Horror nights", "description": "scary" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let list_id = list["id"].as_str().unwrap().to_string();
    let list_uri = format!("/api/profile/lists/{}", list_id);

    let (status, item) = send(
        &app,
        Method::POST,
        &format!("{}/items", list_uri),
        Some(&ana),
        Some(json!({ "mediaId": "694", "mediaType": "movie", "mediaTitle": "The Shining" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let item_id = item["id"].as_str().unwrap().to_string();

    let (_, lists) = send(&app, Method::GET, "/api/profile/lists", Some(&ana), None).await;
    assert_eq!(lists[0]["itemCount"], 1);
    assert_eq!(lists[0]["name"], "Horror nights");

    let (status, detail) = send(&app, Method::GET, &list_uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["list"]["description"], "scary");
    assert_eq!(detail["items"][0]["mediaTitle"], "The Shining");

    // Someone else's list looks like a missing one
    for method in [Method::GET, Method::DELETE] {
        let (status, _) = send(&app, method, &list_uri, Some(&bia), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    let (status, _) = send(
        &app,
        Method::PATCH,
        &list_uri,
        Some(&bia),
        Some(json!({ "name": "Mine now" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, renamed) = send(
        &app,
        Method::PATCH,
        &list_uri,
        Some(&ana),
        Some(json!({ "name": "Horror marathon" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Horror marathon");
    assert_eq!(renamed["description"], "scary");

    let (status, unchanged) =
        send(&app, Method::PATCH, &list_uri, Some(&ana), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unchanged["name"], "Horror marathon");

    let item_uri = format!("{}/items/{}", list_uri, item_id);
    let (status, _) = send(&app, Method::DELETE, &item_uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::DELETE, &item_uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, &list_uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &list_uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn posts_likes_and_feed() {
    let app = app();
    let (ana, _) = signup(&app, "Ana").await;
    let (bia, bia_id) = signup(&app, "Bia").await;
    let (caio, _) = signup(&app, "Caio").await;

    let post = |media_id: &str| {
        json!({
            "mediaId": media_id,
            "mediaType": "series",
            "mediaTitle": format!("Show {}", media_id),
            "rating": 4,
            "comment": "worth it",
            "hasSpoilers": true
        })
    };

    let (status, created) =
        send(&app, Method::POST, "/api/posts", Some(&bia), Some(post("10"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["likeCount"], 0);
    assert_eq!(created["firstTime"], true);
    assert_eq!(created["hasSpoilers"], true);
    let post_id = created["id"].as_str().unwrap().to_string();

    let (status, body) =
        send(&app, Method::POST, "/api/posts", Some(&bia), Some(post("10"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "You already posted about this title");

    // Posting rated the show too
    let (_, ratings) = send(&app, Method::GET, "/api/profile/ratings", Some(&bia), None).await;
    assert_eq!(ratings[0]["mediaId"], "10");
    assert_eq!(ratings[0]["comment"], "worth it");

    send(&app, Method::POST, "/api/posts", Some(&caio), Some(post("20"))).await;
    send(&app, Method::POST, "/api/posts", Some(&ana), Some(post("30"))).await;

    let like_uri = format!("/api/posts/{}/like", post_id);
    for _ in 0..2 {
        let (status, body) = send(&app, Method::POST, &like_uri, Some(&ana), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["likeCount"], 1);
    }
    let (_, body) = send(&app, Method::POST, &like_uri, Some(&caio), None).await;
    assert_eq!(body["likeCount"], 2);
    let (_, body) = send(&app, Method::DELETE, &like_uri, Some(&caio), None).await;
    assert_eq!(body["likeCount"], 1);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/posts/{}/like", uuid::Uuid::new_v4()),
        Some(&ana),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, all) = send(&app, Method::GET, "/api/posts", None, None).await;
    let titles: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["mediaTitle"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Show 30", "Show 20", "Show 10"]);
    assert_eq!(all[2]["userName"], "Bia");

    let follow_uri = format!("/api/users/{}/follow", bia_id);
    send(&app, Method::POST, &follow_uri, Some(&ana), None).await;

    let (status, feed) = send(
        &app,
        Method::GET,
        "/api/feed?scope=following&limit=1",
        Some(&ana),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["total"], 2);
    assert_eq!(feed["hasMore"], true);
    assert_eq!(feed["items"][0]["mediaId"], "30");

    let (_, feed) = send(
        &app,
        Method::GET,
        "/api/feed?scope=following&limit=1&offset=1",
        Some(&ana),
        None,
    )
    .await;
    assert_eq!(feed["items"][0]["mediaId"], "10");
    assert_eq!(feed["items"][0]["likeCount"], 1);
    assert_eq!(feed["hasMore"], false);

    let (_, feed) = send(&app, Method::GET, "/api/feed", Some(&ana), None).await;
    assert_eq!(feed["total"], 3);
}

#[tokio::test]
async fn follow_graph_and_public_profiles() {
    let app = app();
    let (ana, ana_id) = signup(&app, "Ana").await;
    let (_, bia_id) = signup(&app, "Bia").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/users/{}/follow", ana_id),
        Some(&ana),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You cannot follow yourself");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/users/{}/follow", uuid::Uuid::new_v4()),
        Some(&ana),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let follow_uri = format!("/api/users/{}/follow", bia_id);
    for _ in 0..2 {
        let (status, body) = send(&app, Method::POST, &follow_uri, Some(&ana), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isFollowing"], true);
        assert_eq!(body["followerCount"], 1);
    }

    let profile_uri = format!("/api/users/{}/profile", bia_id);
    let (status, profile) = send(&app, Method::GET, &profile_uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user"]["name"], "Bia");
    assert!(profile["user"].get("email").is_none());
    assert_eq!(profile["isFollowing"], true);
    assert_eq!(profile["followerCount"], 1);
    assert_eq!(profile["followingCount"], 0);

    let (_, anonymous) = send(&app, Method::GET, &profile_uri, None, None).await;
    assert_eq!(anonymous["isFollowing"], false);

    let (_, me) = send(&app, Method::GET, "/api/profile", Some(&ana), None).await;
    assert_eq!(me["followingCount"], 1);

    let (_, body) = send(&app, Method::DELETE, &follow_uri, Some(&ana), None).await;
    assert_eq!(body["isFollowing"], false);
    assert_eq!(body["followerCount"], 0);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/profile", uuid::Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, posts) = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/posts", bia_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(posts.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_users_and_lists() {
    let app = app();
    let (ana, _) = signup(&app, "Ana").await;
    signup(&app, "Bruno").await;
    send(
        &app,
        Method::POST,
        "/api/profile/lists",
        Some(&ana),
        Some(json!({ "name": "Best of Ghibli" })),
    )
    .await;

    let (status, users) = send(&app, Method::GET, "/api/users/search?q=BRU", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 1);
    assert_eq!(users[0]["username"], "bruno");

    let (_, lists) = send(&app, Method::GET, "/api/lists/search?q=ghibli", None, None).await;
    assert_eq!(lists[0]["userName"], "Ana");
    assert_eq!(lists[0]["itemCount"], 0);

    let (status, body) = send(&app, Method::GET, "/api/users/search?q=%20", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Query parameter 'q' is required");
}

#[tokio::test]
async fn password_change_signs_out_other_sessions() {
    let app = app();
    let (first, _) = signup(&app, "Ana").await;
    let (_, login) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ana@example.com", "password": "secret123" })),
    )
    .await;
    let second = login["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/profile/password",
        Some(&first),
        Some(json!({ "currentPassword": "nope", "newPassword": "better-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Current password is incorrect");

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/profile/password",
        Some(&first),
        Some(json!({ "currentPassword": "secret123", "newPassword": "better-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/profile", Some(&first), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/profile", Some(&second), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ana@example.com", "password": "better-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn deleting_the_account_removes_everything() {
    let app = app();
    let (ana, ana_id) = signup(&app, "Ana").await;
    let (bia, bia_id) = signup(&app, "Bia").await;

    let (_, post) = send(
        &app,
        Method::POST,
        "/api/posts",
        Some(&bia),
        Some(json!({
            "mediaId": "5",
            "mediaType": "manga",
            "mediaTitle": "Berserk",
            "rating": 5,
            "comment": "peak"
        })),
    )
    .await;
    let like_uri = format!("/api/posts/{}/like", post["id"].as_str().unwrap());
    send(&app, Method::POST, &like_uri, Some(&ana), None).await;
    send(
        &app,
        Method::POST,
        &format!("/api/users/{}/follow", bia_id),
        Some(&ana),
        None,
    )
    .await;

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/profile/account",
        Some(&ana),
        Some(json!({ "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/profile/account",
        Some(&ana),
        Some(json!({ "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/profile", Some(&ana), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/profile", ana_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, bia_profile) = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/profile", bia_id),
        None,
        None,
    )
    .await;
    assert_eq!(bia_profile["followerCount"], 0);
    assert_eq!(bia_profile["posts"][0]["likeCount"], 0);
}

#[tokio::test]
async fn malformed_ids_and_query_values_use_the_error_format() {
    let app = app();
    let (token, _) = signup(&app, "Ana").await;

    let cases = [
        (Method::GET, "/api/users/not-a-uuid/profile"),
        (Method::POST, "/api/posts/not-a-uuid/like"),
        (Method::GET, "/api/profile/lists/xyz"),
        (Method::GET, "/api/feed?scope=bogus"),
        (Method::GET, "/api/feed?limit=abc"),
    ];
    for (method, uri) in cases {
        let (status, body) = send(&app, method, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["code"], "BAD_REQUEST", "{}", uri);
        assert!(!body["message"].as_str().unwrap().is_empty(), "{}", uri);
    }
}
