//! Webhook endpoint handlers.
//!
//! The Clerk handler:
//! 1. Checks the Svix headers and verifies the signature over the raw body
//! 2. Decodes the event
//! 3. Applies it to the user store and waits for the result
//!
//! The body is buffered by the `Bytes` extractor before any of these checks
//! run; requests with missing headers or a bad signature are rejected before
//! the body is parsed, not before it is read.
//!
//! Clerk redelivers anything that does not get a 2xx, so success is only
//! returned once the store call has completed.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::event::WebhookEvent;
use crate::store::UserStore;
use crate::sync::{apply_event, SyncOutcome};
use crate::web::error::WebhookError;
use crate::web::signature::{SvixHeaders, WebhookVerifier, SVIX_ID_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn UserStore>,
    verifier: Option<Arc<WebhookVerifier>>,
}

impl AppState {
    /// Build the state, decoding the signing secret once.
    ///
    /// A missing or undecodable secret does not stop the server; every
    /// webhook is rejected with a configuration error instead.
    pub fn new(config: Config, store: Arc<dyn UserStore>) -> Self {
        let verifier = match config.webhook_signing_secret.as_deref() {
            Some(secret) => match WebhookVerifier::new(secret, config.webhook_tolerance_secs) {
                Ok(v) => Some(Arc::new(v)),
                Err(e) => {
                    error!(error = %e, "webhook_signing_secret_invalid");
                    None
                }
            },
            None => {
                warn!("webhook_signing_secret_not_configured");
                None
            }
        };

        Self {
            config: Arc::new(config),
            store,
            verifier,
        }
    }

    fn verifier(&self) -> Result<&WebhookVerifier, WebhookError> {
        self.verifier.as_deref().ok_or(WebhookError::MissingSecret)
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Clerk Webhook
// =============================================================================

/// Clerk webhook endpoint.
///
/// The body is taken as raw bytes because the signature covers the exact
/// bytes that were sent.
pub async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery_id = headers
        .get(SVIX_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    info!(
        svix_id = %delivery_id,
        body_length = body.len(),
        "webhook_received"
    );

    match handle_webhook(&state, &headers, &body).await {
        Ok(outcome) => {
            info!(svix_id = %delivery_id, outcome = ?outcome, "webhook_processed");
            (StatusCode::OK, "Webhook processed").into_response()
        }
        Err(err) => {
            if err.status().is_server_error() {
                error!(svix_id = %delivery_id, reason = err.reason(), error = %err, "webhook_failed");
            } else {
                warn!(svix_id = %delivery_id, reason = err.reason(), error = %err, "webhook_rejected");
            }
            err.into_response()
        }
    }
}

async fn handle_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<SyncOutcome, WebhookError> {
    let verifier = state.verifier()?;

    let svix = SvixHeaders::from_header_map(headers).ok_or(WebhookError::MissingHeaders)?;

    verifier.verify(&svix, body)?;

    let event = WebhookEvent::from_slice(body)?;

    info!(
        svix_id = %svix.id,
        event_type = %event.kind(),
        user_id = event.user_id().unwrap_or_default(),
        "webhook_verified"
    );

    let outcome = apply_event(state.store.as_ref(), &event, state.config.create_mode).await?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    use axum::{body::Body, http::Request, Router};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use url::Url;

    use crate::config::CreateMode;
    use crate::event::UserRecord;
    use crate::store::memory::MemoryStore;
    use crate::web::router;
    use crate::web::signature::{SVIX_SIGNATURE_HEADER, SVIX_TIMESTAMP_HEADER};

    // base64("test-signing-secret")
    const SECRET: &str = "whsec_dGVzdC1zaWduaW5nLXNlY3JldA==";

    fn config(secret: Option<&str>, create_mode: CreateMode) -> Config {
        Config {
            supabase_url: Url::parse("http://localhost:54321").unwrap(),
            supabase_service_role_key: "service-role-key".to_string(),
            webhook_signing_secret: secret.map(str::to_string),
            users_table: "users".to_string(),
            create_mode,
            webhook_tolerance_secs: 300,
            database_timeout_ms: 1000,
            port: 0,
        }
    }

    fn app(store: Arc<MemoryStore>, secret: Option<&str>, create_mode: CreateMode) -> Router {
        router(AppState::new(config(secret, create_mode), store))
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn signed_request(body: &Value) -> Request<Body> {
        let body = body.to_string();
        let timestamp = now();
        let signature = WebhookVerifier::new(SECRET, 300)
            .unwrap()
            .sign("msg_test", timestamp, body.as_bytes())
            .unwrap();

        Request::builder()
            .method("POST")
            .uri("/api/webhooks")
            .header(SVIX_ID_HEADER, "msg_test")
            .header(SVIX_TIMESTAMP_HEADER, timestamp.to_string())
            .header(SVIX_SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn user_event(kind: &str, id: &str, email: &str) -> Value {
        json!({
            "type": kind,
            "object": "event",
            "data": {
                "id": id,
                "username": "ada",
                "email_addresses": [{ "email_address": email }],
                "first_name": "Ada",
                "last_name": "Lovelace",
                "image_url": "https://img.example.com/ada.png"
            }
        })
    }

    #[tokio::test]
    async fn test_health() {
        let store = Arc::new(MemoryStore::default());
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app(store, Some(SECRET), CreateMode::Upsert), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_user_created() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone(), Some(SECRET), CreateMode::Insert);

        let (status, body) = send(app, signed_request(&user_event("user.created", "U1", "a@x.com"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Webhook processed");
        assert_eq!(
            store.get("U1").await,
            Some(UserRecord {
                id: "U1".to_string(),
                email_address: Some("a@x.com".to_string()),
                username: Some("ada".to_string()),
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                profile_image_url: Some("https://img.example.com/ada.png".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_user_created_redelivery_with_insert_is_database_error() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone(), Some(SECRET), CreateMode::Insert);
        let event = user_event("user.created", "U1", "a@x.com");

        let (first, _) = send(app.clone(), signed_request(&event)).await;
        let (second, body) = send(app, signed_request(&event)).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Database error");
    }

    #[tokio::test]
    async fn test_user_created_redelivery_with_upsert_is_ok() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone(), Some(SECRET), CreateMode::Upsert);
        let event = user_event("user.created", "U1", "a@x.com");

        let (first, _) = send(app.clone(), signed_request(&event)).await;
        let once = store.get("U1").await;
        let (second, _) = send(app, signed_request(&event)).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::OK);
        assert_eq!(store.get("U1").await, once);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_user_updated_unknown_user_is_ok() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone(), Some(SECRET), CreateMode::Upsert);

        let (status, _) = send(app, signed_request(&user_event("user.updated", "U404", "a@x.com"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.len().await, 0);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_user_deleted() {
        let store = Arc::new(MemoryStore::default());
        store
            .seed(UserRecord {
                id: "U1".to_string(),
                email_address: Some("a@x.com".to_string()),
                username: None,
                first_name: None,
                last_name: None,
                profile_image_url: None,
            })
            .await;
        let app = app(store.clone(), Some(SECRET), CreateMode::Upsert);

        let event = json!({
            "type": "user.deleted",
            "data": { "id": "U1", "object": "user", "deleted": true }
        });
        let (status, _) = send(app, signed_request(&event)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(store.get("U1").await.is_none());
    }

    #[tokio::test]
    async fn test_unhandled_event_type() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone(), Some(SECRET), CreateMode::Upsert);

        let event = json!({ "type": "organization.created", "data": { "id": "org_1" } });
        let (status, body) = send(app, signed_request(&event)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Webhook processed");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_headers() {
        let headers = [SVIX_ID_HEADER, SVIX_TIMESTAMP_HEADER, SVIX_SIGNATURE_HEADER];

        for missing in headers {
            let store = Arc::new(MemoryStore::default());
            let app = app(store.clone(), Some(SECRET), CreateMode::Upsert);

            let mut request = signed_request(&user_event("user.created", "U1", "a@x.com"));
            request.headers_mut().remove(missing);

            let (status, body) = send(app, request).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "missing {}", missing);
            assert_eq!(body, "Missing Svix headers");
            assert_eq!(store.calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_invalid_signature() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone(), Some(SECRET), CreateMode::Upsert);

        let mut request = signed_request(&user_event("user.created", "U1", "a@x.com"));
        request.headers_mut().insert(
            SVIX_SIGNATURE_HEADER,
            "v1,AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".parse().unwrap(),
        );

        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid webhook signature");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_signed_with_other_secret() {
        let store = Arc::new(MemoryStore::default());
        // base64("other-secret")
        let app = app(store.clone(), Some("whsec_b3RoZXItc2VjcmV0"), CreateMode::Upsert);

        let (status, _) = send(app, signed_request(&user_event("user.created", "U1", "a@x.com"))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone(), None, CreateMode::Upsert);

        let (status, body) = send(app, signed_request(&user_event("user.created", "U1", "a@x.com"))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Webhook error:"));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_secret() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone(), Some("whsec_%%%"), CreateMode::Upsert);

        let (status, _) = send(app, signed_request(&user_event("user.created", "U1", "a@x.com"))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_user_payload() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone(), Some(SECRET), CreateMode::Upsert);

        let event = json!({ "type": "user.created", "data": { "username": "no-id" } });
        let (status, body) = send(app, signed_request(&event)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Webhook error: invalid event payload");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_database_failure() {
        let store = Arc::new(MemoryStore::failing());
        let app = app(store.clone(), Some(SECRET), CreateMode::Upsert);

        let (status, body) = send(app, signed_request(&user_event("user.updated", "U1", "a@x.com"))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Database error");
        assert_eq!(store.calls(), 1);
    }
}
