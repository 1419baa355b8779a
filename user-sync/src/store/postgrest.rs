//! User store backed by the Supabase REST (PostgREST) API.
//!
//! Reference: https://postgrest.org/en/stable/references/api/tables_views.html

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use super::{StoreError, UserStore};
use crate::event::UserRecord;

/// Longest error body kept from a rejected request.
const MAX_ERROR_MESSAGE_LEN: usize = 512;

/// Columns written by an update; the key is addressed by the filter.
#[derive(Serialize)]
struct UserColumns<'a> {
    email_address: Option<&'a str>,
    username: Option<&'a str>,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    profile_image_url: Option<&'a str>,
}

impl<'a> From<&'a UserRecord> for UserColumns<'a> {
    fn from(user: &'a UserRecord) -> Self {
        Self {
            email_address: user.email_address.as_deref(),
            username: user.username.as_deref(),
            first_name: user.first_name.as_deref(),
            last_name: user.last_name.as_deref(),
            profile_image_url: user.profile_image_url.as_deref(),
        }
    }
}

/// REST client for one table, shared across requests.
///
/// The underlying `reqwest::Client` pools connections, so a single
/// instance is built at startup and cloned into the application state.
#[derive(Clone)]
pub struct PostgrestStore {
    client: Client,
    endpoint: String,
    service_key: String,
}

impl PostgrestStore {
    /// Create a store for `table` under the project at `base_url`.
    pub fn new(
        base_url: &Url,
        service_key: &str,
        table: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{}", base_url.as_str().trim_end_matches('/'), table),
            service_key: service_key.to_string(),
        })
    }

    /// The table URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: reqwest::Method) -> RequestBuilder {
        self.client
            .request(method, &self.endpoint)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Send a request and map non-2xx responses to `StoreError::Rejected`.
    async fn execute(&self, op: &'static str, req: RequestBuilder) -> Result<(), StoreError> {
        let response = req.send().await.map_err(|e| {
            warn!(op, error = %e, "user_store_request_failed");
            StoreError::Request(e)
        })?;

        let status = response.status();
        if status.is_success() {
            info!(op, status = status.as_u16(), "user_store_request_complete");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);

        warn!(
            op,
            status = status.as_u16(),
            message = %message,
            "user_store_request_rejected"
        );

        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pull PostgREST's `message` field out of an error body, if present.
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

fn id_filter(id: &str) -> [(&'static str, String); 1] {
    [("id", format!("eq.{}", id))]
}

#[async_trait]
impl UserStore for PostgrestStore {
    async fn insert(&self, user: &UserRecord) -> Result<(), StoreError> {
        let req = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(user);
        self.execute("insert", req).await
    }

    async fn upsert(&self, user: &UserRecord) -> Result<(), StoreError> {
        let req = self
            .request(reqwest::Method::POST)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(user);
        self.execute("upsert", req).await
    }

    async fn update(&self, user: &UserRecord) -> Result<(), StoreError> {
        let req = self
            .request(reqwest::Method::PATCH)
            .query(&id_filter(&user.id))
            .header("Prefer", "return=minimal")
            .json(&UserColumns::from(user));
        self.execute("update", req).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let req = self
            .request(reqwest::Method::DELETE)
            .query(&id_filter(id))
            .header("Prefer", "return=minimal");
        self.execute("delete", req).await
    }
}
