//! Axum server setup and router configuration.

use crate::api;
use crate::state::AppState;
use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .merge(api::webhooks::router())
        .merge(api::oauth::router())
        .merge(api::events::router())
        // Add state to all routes
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    pages: usize,
    events: usize,
}

/// Simple health check - returns OK if the server is running.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        pages: state.credentials.len(),
        events: state.sink.len(),
    })
}

/// Run the server until `shutdown` completes, then drain connections.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::extractors::ADMIN_AUTH_HEADER;
    use crate::api::oauth::OAuthState;
    use crate::config::file::{LimitsConfig, ServerConfig};
    use crate::config::{AdminSecret, AppSecrets, LoadedConfig};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use evsync_core::graph::GraphClientConfig;
    use evsync_core::processors::RefreshConfig;
    use evsync_sdk::signature::{WEBHOOK_SIGNATURE_HEADER, compute_hmac, format_state_token};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;

    const APP_SECRET: &[u8] = b"app-secret";
    const STATE_SECRET: &[u8] = b"state-secret";
    const ADMIN_SECRET: &str = "admin-secret";

    fn test_config() -> LoadedConfig {
        LoadedConfig {
            server: ServerConfig::default(),
            graph: GraphClientConfig::default(),
            app: AppSecrets {
                app_id: "app".to_string(),
                app_secret: APP_SECRET.into(),
                verify_token: "verify-me".to_string(),
                state_secret: STATE_SECRET.into(),
                state_ttl: Duration::from_secs(600),
                admin_secret: AdminSecret::Plain(ADMIN_SECRET.as_bytes().into()),
            },
            limits: LimitsConfig::default(),
            refresh: RefreshConfig::default(),
            pages: vec![],
        }
    }

    fn app() -> Router {
        build_router(AppState::new(test_config()).unwrap())
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn admin(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(ADMIN_AUTH_HEADER, ADMIN_SECRET)
            .body(Body::empty())
            .unwrap()
    }

    fn signed_delivery(body: &str, secret: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhooks/graph")
            .header("content-type", "application/json")
            .header(
                WEBHOOK_SIGNATURE_HEADER,
                format!("sha256={}", compute_hmac(body, secret)),
            )
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    const DELIVERY: &str = r#"{"object":"page","entry":[{"id":"page-1","time":1700000000,
        "changes":[{"field":"events","value":{"verb":"add","id":"e1","published":1700000000}}]}]}"#;

    #[tokio::test]
    async fn test_health() {
        let response = app().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_handshake() {
        let app = app();
        let ok = app
            .clone()
            .oneshot(get(
                "/webhooks/graph?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=42",
            ))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = axum::body::to_bytes(ok.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"42");

        let wrong = app
            .oneshot(get(
                "/webhooks/graph?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=42",
            ))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_signed_delivery_is_processed_and_listed() {
        let app = app();
        let response = app
            .clone()
            .oneshot(signed_delivery(DELIVERY, APP_SECRET))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["processed"], 1);
        assert_eq!(report["skipped"], 0);

        let listed = body_json(
            app.oneshot(admin("GET", "/api/events?page_id=page-1"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(listed[0]["eventId"], "e1");
        assert_eq!(listed[0]["eventType"], "event.create");
        assert_eq!(listed[0]["occurredAtMs"], 1_700_000_000_000i64);
    }

    #[tokio::test]
    async fn test_repeated_delivery_is_skipped() {
        let app = app();
        let first = body_json(
            app.clone()
                .oneshot(signed_delivery(DELIVERY, APP_SECRET))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(first["processed"], 1);

        let second = body_json(
            app.oneshot(signed_delivery(DELIVERY, APP_SECRET))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(second["processed"], 0);
        assert_eq!(second["skipped"], 1);
    }

    #[tokio::test]
    async fn test_bad_or_missing_signature_is_unauthorized() {
        let app = app();
        let forged = app
            .clone()
            .oneshot(signed_delivery(DELIVERY, b"wrong-secret"))
            .await
            .unwrap();
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

        let unsigned = Request::builder()
            .method("POST")
            .uri("/webhooks/graph")
            .body(Body::from(DELIVERY))
            .unwrap();
        let response = app.oneshot(unsigned).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signed_garbage_is_bad_request() {
        let response = app()
            .oneshot(signed_delivery("not json", APP_SECRET))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let app = app();
        let issued = body_json(
            app.clone()
                .oneshot(get("/oauth/state?return_to=%2Fsettings%3Ftab%3Dpages"))
                .await
                .unwrap(),
        )
        .await;
        let token = issued["state"].as_str().unwrap().to_string();
        assert!(token.contains('|'));
        assert_eq!(issued["expires_in"], 600);

        let uri = format!(
            "/oauth/callback?code=abc&state={}",
            urlencoding::encode(&token)
        );
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["verified"], true);
        assert_eq!(body["code_received"], true);
        assert_eq!(body["return_to"], "/settings?tab=pages");

        let tampered = token.replacen("settings", "admin", 1);
        let uri = format!("/oauth/callback?state={}", urlencoding::encode(&tampered));
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_state_rejections() {
        let app = app();
        let missing = app.clone().oneshot(get("/oauth/callback")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let external = app
            .clone()
            .oneshot(get("/oauth/state?return_to=https%3A%2F%2Fevil.example"))
            .await
            .unwrap();
        assert_eq!(external.status(), StatusCode::BAD_REQUEST);

        let stale = OAuthState {
            nonce: "n".to_string(),
            issued_at: time::OffsetDateTime::now_utc().unix_timestamp() - 3600,
            return_to: None,
        };
        let token = format_state_token(&serde_json::to_string(&stale).unwrap(), STATE_SECRET);
        let uri = format!("/oauth/callback?state={}", urlencoding::encode(&token));
        let expired = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(expired.status(), StatusCode::FORBIDDEN);

        let not_json = format_state_token("plain", STATE_SECRET);
        let uri = format!("/oauth/callback?state={}", urlencoding::encode(&not_json));
        let malformed = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_manual_refresh_without_pages() {
        let request = admin("POST", "/api/refresh");
        let report = body_json(app().oneshot(request).await.unwrap()).await;
        assert_eq!(report["results"], json!([]));
        assert_eq!(report["errors"], json!([]));
    }

    #[tokio::test]
    async fn test_token_refresh_without_pages() {
        let request = admin("POST", "/api/tokens/refresh");
        let report = body_json(app().oneshot(request).await.unwrap()).await;
        assert_eq!(report["results"], json!([]));
        assert_eq!(report["errors"], json!([]));
    }

    #[tokio::test]
    async fn test_admin_routes_require_the_secret() {
        let app = app();
        for (method, uri) in [
            ("GET", "/api/events"),
            ("POST", "/api/refresh"),
            ("POST", "/api/tokens/refresh"),
        ] {
            let missing = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(missing).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");

            let wrong = Request::builder()
                .method(method)
                .uri(uri)
                .header(ADMIN_AUTH_HEADER, "admin-secreT")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(wrong).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");

            let response = app.clone().oneshot(admin(method, uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }
}
