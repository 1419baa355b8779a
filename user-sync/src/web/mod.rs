//! Web server module for receiving Clerk webhooks.
//!
//! This module provides:
//! - The `/api/webhooks` endpoint, which verifies, decodes and applies events
//! - A `/health` endpoint for liveness checks
//! - The error type that maps each failure to an HTTP response

pub mod error;
pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use error::WebhookError;
pub use handlers::{clerk_webhook, health, AppState, HealthResponse};
pub use signature::{SignatureError, SvixHeaders, WebhookVerifier};

/// Path the identity provider delivers webhooks to.
pub const WEBHOOK_PATH: &str = "/api/webhooks";

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(WEBHOOK_PATH, post(clerk_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
