//! Error taxonomy for the webhook endpoint and its mapping to responses.
//!
//! Response bodies are fixed strings; underlying causes are only logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::event::EventError;
use crate::store::StoreError;
use crate::web::signature::SignatureError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook signing secret is missing or invalid")]
    MissingSecret,

    #[error("missing svix headers")]
    MissingHeaders,

    #[error("signature verification failed: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("invalid event payload: {0}")]
    InvalidPayload(#[from] EventError),

    #[error("database error: {0}")]
    Store(#[from] StoreError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Body returned to the caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            WebhookError::MissingSecret => "Webhook error: signing secret not configured",
            WebhookError::MissingHeaders => "Missing Svix headers",
            WebhookError::InvalidSignature(_) => "Invalid webhook signature",
            WebhookError::InvalidPayload(_) => "Webhook error: invalid event payload",
            WebhookError::Store(_) => "Database error",
        }
    }

    /// Short machine-friendly name used in logs.
    pub fn reason(&self) -> &'static str {
        match self {
            WebhookError::MissingSecret => "missing_secret",
            WebhookError::MissingHeaders => "missing_headers",
            WebhookError::InvalidSignature(_) => "invalid_signature",
            WebhookError::InvalidPayload(_) => "invalid_payload",
            WebhookError::Store(_) => "store_error",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}
