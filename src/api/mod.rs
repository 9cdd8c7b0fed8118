mod athletes;
pub mod auth;
mod dashboard;
pub mod error;
mod extract;
mod sessions;
mod tags;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use error::ApiError;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use self::extract::Json;
use crate::config::CorsConfig;
use crate::AppState;

pub use sessions::UPLOADS_URL_PREFIX;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    // Any athlete's profile and analytics (public)
    let athlete_routes = Router::new()
        .route(
            "/athletes",
            get(athletes::list_athletes).post(athletes::create_athlete),
        )
        .route("/athletes/:id", get(athletes::get_athlete))
        .route("/athletes/:id/dashboard", get(dashboard::get_athlete_dashboard))
        .route("/athletes/:id/stats", get(dashboard::get_athlete_stats));

    // The caller's own data
    let my_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/my/dashboard", get(dashboard::get_my_dashboard))
        .route("/my/stats", get(dashboard::get_my_stats))
        // Sessions
        .route(
            "/my/sessions",
            get(sessions::list_sessions).post(sessions::create_session).layer(
                DefaultBodyLimit::max(state.config.uploads.max_bytes),
            ),
        )
        .route(
            "/my/sessions/:id",
            get(sessions::get_session)
                .patch(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/my/sessions/:id/tags", post(sessions::add_session_tag))
        .route(
            "/my/sessions/:id/tags/:session_tag_id",
            axum::routing::delete(sessions::remove_session_tag),
        )
        // Tags
        .route("/my/tags", get(tags::list_tags).post(tags::create_tag))
        .route("/my/tags/:id", put(tags::update_tag).delete(tags::delete_tag))
        .route("/my/tags/:id/usage", get(tags::get_tag_usage))
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api",
            auth_routes
                .merge(athlete_routes)
                .merge(my_routes)
                .fallback(api_not_found),
        )
        .nest_service("/uploads", ServeDir::new(&state.config.uploads.dir))
        .layer(cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Combat Analyzer API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Unknown API paths get the error envelope instead of the frontend
async fn api_not_found() -> ApiError {
    ApiError::not_found("Not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{init_in_memory, seed_global_tags, Session, SessionTag, CreateSessionTagRequest};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        _uploads: tempfile::TempDir,
    }

    async fn test_app() -> TestApp {
        let uploads = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.uploads.dir = uploads.path().to_path_buf();
        let db = init_in_memory().await.unwrap();
        let state = Arc::new(AppState::new(config, db));
        TestApp {
            router: create_router(state.clone()),
            state,
            _uploads: uploads,
        }
    }

    impl TestApp {
        async fn request(
            &self,
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
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        /// Register an account and return (token, athlete id)
        async fn register(&self, email: &str, name: &str) -> (String, i64) {
            let (status, body) = self
                .request(
                    Method::POST,
                    "/api/auth/register",
                    None,
                    Some(json!({ "email": email, "password": "hunter2hunter2", "name": name })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            (
                body["token"].as_str().unwrap().to_string(),
                body["athlete"]["id"].as_i64().unwrap(),
            )
        }

        async fn create_tag(&self, token: &str, body: Value) -> i64 {
            let (status, tag) = self
                .request(Method::POST, "/api/my/tags", Some(token), Some(body))
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", tag);
            tag["id"].as_i64().unwrap()
        }

        async fn session(&self, athlete_id: i64) -> i64 {
            Session::create(&self.state.db, athlete_id, "/uploads/missing.mp4", None)
                .await
                .unwrap()
                .id
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let (status, body) = app.request(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_register_login_me_logout() {
        let app = test_app().await;
        let (token, athlete_id) = app.register("Ana@Example.com", "Ana").await;

        let (status, me) = app.request(Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user"]["email"], "ana@example.com");
        assert_eq!(me["athlete"]["id"], athlete_id);
        assert!(me["user"].get("passwordHash").is_none());

        let (status, login) = app
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "ana@example.com", "password": "hunter2hunter2" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["athlete"]["name"], "Ana");

        let (status, _) = app
            .request(Method::POST, "/api/auth/logout", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = app.request(Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input_and_duplicates() {
        let app = test_app().await;
        let (status, body) = app
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": "nope", "password": "short", "name": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
        assert!(body["error"]["details"]["email"].is_array());
        assert!(body["error"]["details"]["password"].is_array());
        assert!(body["error"]["details"]["name"].is_array());

        app.register("bo@example.com", "Bo").await;
        let (status, _) = app
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": "BO@example.com", "password": "hunter2hunter2", "name": "Bo" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "bo@example.com", "password": "wrong-password" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_my_routes_require_token() {
        let app = test_app().await;
        let (status, body) = app.request(Method::GET, "/api/my/dashboard", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, _) = app
            .request(Method::GET, "/api/my/tags", Some("not-a-token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_athletes_public_endpoints() {
        let app = test_app().await;
        let (status, created) = app
            .request(Method::POST, "/api/athletes", None, Some(json!({ "name": "Cy" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();

        let (status, list) = app.request(Method::GET, "/api/athletes", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, dashboard) = app
            .request(Method::GET, &format!("/api/athletes/{}/dashboard", id), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["summary"]["sessionCount"], 0);
        assert_eq!(dashboard["summary"]["averageTagsPerSession"], 0.0);
        assert!(dashboard["summary"]["mostUsedTag"].is_null());
        assert_eq!(dashboard["recentSessions"], json!([]));

        let (status, body) = app
            .request(Method::GET, "/api/athletes/999/dashboard", None, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");

        let (status, _) = app.request(Method::GET, "/api/athletes/999/stats", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tag_kind_rules() {
        let app = test_app().await;
        let (token, _) = app.register("ana@example.com", "Ana").await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/my/tags",
                Some(&token),
                Some(json!({ "name": "Jab", "category": "OFFENSIVE" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");

        let (status, _) = app
            .request(
                Method::POST,
                "/api/my/tags",
                Some(&token),
                Some(json!({ "name": "Calm", "category": "MENTAL", "outcome": "SUCCESS" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .request(
                Method::POST,
                "/api/my/tags",
                Some(&token),
                Some(json!({ "name": "No category" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["details"]["category"][0],
            "Category is required"
        );

        let id = app
            .create_tag(
                &token,
                json!({ "name": "Jab", "category": "OFFENSIVE", "outcome": "SUCCESS" }),
            )
            .await;

        let (status, _) = app
            .request(
                Method::POST,
                "/api/my/tags",
                Some(&token),
                Some(json!({ "name": "jab", "category": "MENTAL" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // A new category needs its own outcome
        let (status, _) = app
            .request(
                Method::PUT,
                &format!("/api/my/tags/{}", id),
                Some(&token),
                Some(json!({ "category": "DEFENSIVE" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, updated) = app
            .request(
                Method::PUT,
                &format!("/api/my/tags/{}", id),
                Some(&token),
                Some(json!({ "name": "Cross", "outcome": "FAIL" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Cross");
        assert_eq!(updated["category"], "OFFENSIVE");
        assert_eq!(updated["outcome"], "FAIL");
    }

    #[tokio::test]
    async fn test_malformed_requests_use_error_envelope() {
        let app = test_app().await;
        let (token, _) = app.register("ana@example.com", "Ana").await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/my/tags",
                Some(&token),
                Some(json!({ "name": "Kick", "category": "KICKS" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
        assert!(body["error"]["details"]["category"].is_array());

        let (status, body) = app
            .request(
                Method::POST,
                "/api/my/tags",
                Some(&token),
                Some(json!({ "category": "MENTAL" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
        assert!(body["error"]["details"]["name"].is_array());

        let (status, body) = app
            .request(Method::GET, "/api/athletes/abc/dashboard", None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");

        let (status, body) = app
            .request(Method::GET, "/api/my/tags?category=KICKS", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("email=ana@example.com"))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "unsupported_media_type");
    }

    #[tokio::test]
    async fn test_unknown_api_path_is_not_found() {
        let app = test_app().await;

        let (status, body) = app.request(Method::GET, "/api/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");

        let (status, _) = app.request(Method::GET, "/api/athletes/1/unknown", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_global_tags_are_read_only() {
        let app = test_app().await;
        seed_global_tags(&app.state.db).await.unwrap();
        let (token, _) = app.register("ana@example.com", "Ana").await;

        let (status, tags) = app.request(Method::GET, "/api/my/tags", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let global_id = tags[0]["id"].as_i64().unwrap();
        assert!(tags[0]["athleteId"].is_null());

        let (status, body) = app
            .request(
                Method::PUT,
                &format!("/api/my/tags/{}", global_id),
                Some(&token),
                Some(json!({ "name": "Renamed" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "forbidden");

        let (status, _) = app
            .request(Method::DELETE, &format!("/api/my/tags/{}", global_id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, filtered) = app
            .request(Method::GET, "/api/my/tags?category=MENTAL", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(filtered
            .as_array()
            .unwrap()
            .iter()
            .all(|t| t["category"] == "MENTAL"));
    }

    #[tokio::test]
    async fn test_other_athletes_data_is_invisible() {
        let app = test_app().await;
        let (ana, ana_id) = app.register("ana@example.com", "Ana").await;
        let (bo, _) = app.register("bo@example.com", "Bo").await;

        let tag_id = app
            .create_tag(&ana, json!({ "name": "Dropped guard", "category": "TECHNICAL_ERROR" }))
            .await;
        let session_id = app.session(ana_id).await;

        let (status, _) = app
            .request(Method::GET, &format!("/api/my/sessions/{}", session_id), Some(&bo), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .request(Method::DELETE, &format!("/api/my/tags/{}", tag_id), Some(&bo), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .request(Method::GET, &format!("/api/my/tags/{}/usage", tag_id), Some(&bo), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Bo cannot apply Ana's tag to a session of his own
        let (_, bo_me) = app.request(Method::GET, "/api/auth/me", Some(&bo), None).await;
        let bo_session = app.session(bo_me["athlete"]["id"].as_i64().unwrap()).await;
        let (status, _) = app
            .request(
                Method::POST,
                &format!("/api/my/sessions/{}/tags", bo_session),
                Some(&bo),
                Some(json!({ "tagId": tag_id })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tagging_feeds_dashboard_and_stats() {
        let app = test_app().await;
        let (token, athlete_id) = app.register("ana@example.com", "Ana").await;

        let guard = app
            .create_tag(&token, json!({ "name": "Dropped guard", "category": "TECHNICAL_ERROR" }))
            .await;
        let landed = app
            .create_tag(
                &token,
                json!({ "name": "Takedown landed", "category": "OFFENSIVE", "outcome": "SUCCESS" }),
            )
            .await;
        let stuffed = app
            .create_tag(
                &token,
                json!({ "name": "Takedown stuffed", "category": "OFFENSIVE", "outcome": "FAIL" }),
            )
            .await;

        let s1 = app.session(athlete_id).await;
        let s2 = app.session(athlete_id).await;
        let s3 = app.session(athlete_id).await;

        let apply = |session: i64, tag: i64, at: i64| {
            let app = &app;
            let token = token.clone();
            async move {
                let (status, body) = app
                    .request(
                        Method::POST,
                        &format!("/api/my/sessions/{}/tags", session),
                        Some(&token),
                        Some(json!({ "tagId": tag, "timestampSec": at, "note": " " })),
                    )
                    .await;
                assert_eq!(status, StatusCode::CREATED, "{}", body);
                body
            }
        };

        let first = apply(s1, guard, 10).await;
        assert_eq!(first["tag"]["name"], "Dropped guard");
        assert!(first["note"].is_null());
        apply(s1, guard, 20).await;
        apply(s1, landed, 30).await;
        apply(s2, landed, 5).await;
        apply(s2, landed, 6).await;
        apply(s3, guard, 40).await;
        let last = apply(s3, stuffed, 50).await;

        let (status, body) = app
            .request(
                Method::POST,
                &format!("/api/my/sessions/{}/tags", s1),
                Some(&token),
                Some(json!({ "tagId": guard, "timestampSec": -3 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

        let (status, dashboard) = app
            .request(Method::GET, "/api/my/dashboard", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["summary"]["sessionCount"], 3);
        assert_eq!(dashboard["summary"]["totalTags"], 7);
        assert_eq!(dashboard["summary"]["distinctTagsCount"], 3);
        assert_eq!(dashboard["recentSessions"][0]["sessionId"], s3);
        let top: Vec<i64> = dashboard["topTags"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["tagId"].as_i64().unwrap())
            .collect();
        // guard and landed tie at 3, lower id first
        assert_eq!(top, vec![guard, landed, stuffed]);
        assert_eq!(dashboard["summary"]["mostUsedTag"]["tagId"], guard);

        let (status, stats) = app.request(Method::GET, "/api/my/stats", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["offensive"]["rate"], 0.75);
        assert!(stats["defensive"]["rate"].is_null());
        assert_eq!(stats["mostFrequentWeakness"], "Dropped guard");
        assert_eq!(stats["weaknessTrend"].as_array().unwrap().len(), 3);
        let trend: Vec<i64> = stats["weaknessTrend"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["count"].as_i64().unwrap())
            .collect();
        assert_eq!(trend, vec![2, 0, 1]);

        let (status, public_stats) = app
            .request(Method::GET, &format!("/api/athletes/{}/stats", athlete_id), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(public_stats, stats);

        let (status, listed) = app
            .request(Method::GET, "/api/my/sessions?includeTags=true", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["sessionTags"].as_array().unwrap().len(), 3);
        assert_eq!(listed[0]["sessionTags"][0]["tag"]["id"], guard);

        let (_, plain) = app.request(Method::GET, "/api/my/sessions", Some(&token), None).await;
        assert!(plain[0].get("sessionTags").is_none());

        let (status, usage) = app
            .request(Method::GET, &format!("/api/my/tags/{}/usage", guard), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(usage, json!({ "tagId": guard, "usageCount": 3 }));

        // Removing one application and then the tag itself
        let last_id = last["id"].as_i64().unwrap();
        let (status, _) = app
            .request(
                Method::DELETE,
                &format!("/api/my/sessions/{}/tags/{}", s3, last_id),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app
            .request(
                Method::DELETE,
                &format!("/api/my/sessions/{}/tags/{}", s3, last_id),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .request(Method::DELETE, &format!("/api/my/tags/{}", guard), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let remaining = SessionTag::list_for_athlete(&app.state.db, athlete_id).await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|st| st.tag_id != guard));
    }

    #[tokio::test]
    async fn test_session_notes_and_delete() {
        let app = test_app().await;
        let (token, athlete_id) = app.register("ana@example.com", "Ana").await;
        let tag = app
            .create_tag(&token, json!({ "name": "Calm", "category": "MENTAL" }))
            .await;

        let video = app.state.config.uploads.dir.join("keep.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        let session = Session::create(&app.state.db, athlete_id, "/uploads/keep.mp4", None)
            .await
            .unwrap();
        SessionTag::create(
            &app.state.db,
            session.id,
            &CreateSessionTagRequest {
                tag_id: tag,
                timestamp_sec: Some(12),
                note: None,
            },
            None,
        )
        .await
        .unwrap();

        let (status, updated) = app
            .request(
                Method::PATCH,
                &format!("/api/my/sessions/{}", session.id),
                Some(&token),
                Some(json!({ "notes": "Southpaw sparring" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["notes"], "Southpaw sparring");

        let (status, fetched) = app
            .request(Method::GET, &format!("/api/my/sessions/{}", session.id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["notes"], "Southpaw sparring");
        assert_eq!(fetched["sessionTags"][0]["timestampSec"], 12);

        let (status, _) = app
            .request(
                Method::DELETE,
                &format!("/api/my/sessions/{}", session.id),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!video.exists());
        assert!(SessionTag::list_for_session(&app.state.db, session.id)
            .await
            .unwrap()
            .is_empty());
    }

    fn multipart_request(token: &str, file_name: &str, notes: &str) -> Request<Body> {
        let boundary = "X-COMBAT-BOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"notes\"\r\n\r\n{notes}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{file}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\nfake video bytes\r\n--{b}--\r\n",
            b = boundary,
            notes = notes,
            file = file_name,
        );
        Request::builder()
            .method(Method::POST)
            .uri("/api/my/sessions")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_video_upload() {
        let app = test_app().await;
        let (token, _) = app.register("ana@example.com", "Ana").await;

        let response = app
            .router
            .clone()
            .oneshot(multipart_request(&token, "round1.mp4", "Round one"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let session: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(session["notes"], "Round one");

        let video_url = session["videoUrl"].as_str().unwrap();
        assert!(video_url.starts_with(UPLOADS_URL_PREFIX));
        assert!(video_url.ends_with(".mp4"));
        let stored = app
            .state
            .config
            .uploads
            .dir
            .join(video_url.trim_start_matches(UPLOADS_URL_PREFIX));
        assert_eq!(std::fs::read(&stored).unwrap(), b"fake video bytes");

        let served = app
            .router
            .clone()
            .oneshot(Request::builder().uri(video_url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(served.status(), StatusCode::OK);

        let rejected = app
            .router
            .clone()
            .oneshot(multipart_request(&token, "notes.txt", ""))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        let files = std::fs::read_dir(&app.state.config.uploads.dir).unwrap().count();
        assert_eq!(files, 1);
    }
}
