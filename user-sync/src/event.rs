//! Clerk webhook event types.
//!
//! Events are decoded in two steps: the envelope (`type` plus an opaque
//! `data` value) first, then the `data` payload for the user event kinds
//! this service mirrors. Other kinds are kept as their tag only.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while decoding a verified webhook body.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("body is not a webhook event: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Outer shape shared by every Clerk event.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// One entry of `data.email_addresses`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailAddress {
    pub email_address: String,
}

/// User payload carried by `user.created` and `user.updated`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Treat an explicit `null` list the same as a missing one.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl UserPayload {
    /// The first listed address is treated as the user's email.
    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .map(|e| e.email_address.as_str())
    }
}

/// Payload carried by `user.deleted`; Clerk sends only the id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeletedUser {
    pub id: String,
}

/// A decoded webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    UserCreated(UserPayload),
    UserUpdated(UserPayload),
    UserDeleted(DeletedUser),
    /// Any event kind this service does not mirror.
    Other(String),
}

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

impl WebhookEvent {
    /// Decode a raw (already verified) request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, EventError> {
        let envelope: Envelope = serde_json::from_slice(body).map_err(EventError::Envelope)?;

        let event = match envelope.kind.as_str() {
            USER_CREATED => WebhookEvent::UserCreated(payload(USER_CREATED, envelope.data)?),
            USER_UPDATED => WebhookEvent::UserUpdated(payload(USER_UPDATED, envelope.data)?),
            USER_DELETED => WebhookEvent::UserDeleted(payload(USER_DELETED, envelope.data)?),
            _ => WebhookEvent::Other(envelope.kind),
        };

        Ok(event)
    }

    /// The event's `type` tag.
    pub fn kind(&self) -> &str {
        match self {
            WebhookEvent::UserCreated(_) => USER_CREATED,
            WebhookEvent::UserUpdated(_) => USER_UPDATED,
            WebhookEvent::UserDeleted(_) => USER_DELETED,
            WebhookEvent::Other(kind) => kind,
        }
    }

    /// The affected user id, for the user event kinds.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::UserCreated(u) | WebhookEvent::UserUpdated(u) => Some(&u.id),
            WebhookEvent::UserDeleted(d) => Some(&d.id),
            WebhookEvent::Other(_) => None,
        }
    }
}

fn payload<T: DeserializeOwned>(kind: &'static str, data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|source| EventError::Payload { kind, source })
}

/// Row shape of the users table.
///
/// Every optional column is written explicitly, so an update replaces the
/// whole row rather than merging fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email_address: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
}

impl From<&UserPayload> for UserRecord {
    fn from(user: &UserPayload) -> Self {
        Self {
            id: user.id.clone(),
            email_address: non_empty(user.primary_email()),
            username: non_empty(user.username.as_deref()),
            first_name: non_empty(user.first_name.as_deref()),
            last_name: non_empty(user.last_name.as_deref()),
            profile_image_url: non_empty(user.image_url.as_deref()),
        }
    }
}

/// Empty strings are stored as NULL.
fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}
