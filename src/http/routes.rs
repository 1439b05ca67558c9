//! Axum router configuration

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{health_check, index_page, job_stats, upload, version_check};

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.upload.max_upload_bytes();
    let cors_enabled = state.config.cors_enabled;

    let router = Router::new()
        // Upload form and conversion endpoint
        .route("/", get(index_page))
        .route("/upload", post(upload))
        // Health and version endpoints
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        // Debug endpoints
        .route("/debug/jobs", get(job_stats))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http());

    let router = if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::ORIGIN])
            .expose_headers([header::CONTENT_DISPOSITION])
            .max_age(Duration::from_secs(3600));
        router.layer(cors)
    } else {
        router
    };

    // State
    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt; // Use tower::util::ServiceExt for oneshot

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_create_router() {
        let state = Arc::new(AppState::new(ServerConfig::default()));
        let _router = create_router(state);
    }

    #[tokio::test]
    async fn test_index_page_has_form() {
        let mut config = ServerConfig::default();
        config.upload.field_name = "clip".to_string();
        let app = create_router(Arc::new(AppState::new(config)));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains(r#"action="/upload""#));
        assert!(body.contains(r#"enctype="multipart/form-data""#));
        assert!(body.contains(r#"name="clip""#));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(Arc::new(AppState::with_defaults()));
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK");
    }

    #[tokio::test]
    async fn test_job_stats_endpoint() {
        let state = Arc::new(AppState::with_defaults());
        state.stats.reject();
        let app = create_router(state);

        let request = Request::builder()
            .uri("/debug/jobs")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["rejected"], 1);
        assert_eq!(json["accepted"], 0);
        assert_eq!(json["work_dir"], "uploads");
        assert!(json["started_at"].is_string());
    }

    #[tokio::test]
    async fn test_upload_requires_post() {
        let app = create_router(Arc::new(AppState::with_defaults()));
        let request = Request::builder()
            .uri("/upload")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_cors_disabled_by_default() {
        let app = create_router(Arc::new(AppState::with_defaults()));
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:8080")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_cors_options() {
        let config = ServerConfig {
            cors_enabled: true,
            ..Default::default()
        };
        let app = create_router(Arc::new(AppState::new(config)));

        // Pre-flight OPTIONS request
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/upload")
            .header(header::ORIGIN, "http://localhost:8080")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("POST"));
    }
}
