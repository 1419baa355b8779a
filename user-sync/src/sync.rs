//! Applies a decoded webhook event to the user store.
//!
//! Each event results in at most one store call, and the call is awaited so
//! the response status reflects whether the change was committed.

use tracing::info;

use crate::config::CreateMode;
use crate::event::{UserRecord, WebhookEvent};
use crate::store::{StoreError, UserStore};

/// What an event did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { user_id: String },
    Updated { user_id: String },
    Deleted { user_id: String },
    /// Event kind not mirrored; nothing was written.
    Ignored { kind: String },
}

/// Apply `event` to `store`.
pub async fn apply_event(
    store: &dyn UserStore,
    event: &WebhookEvent,
    create_mode: CreateMode,
) -> Result<SyncOutcome, StoreError> {
    let outcome = match event {
        WebhookEvent::UserCreated(user) => {
            let record = UserRecord::from(user);
            match create_mode {
                CreateMode::Insert => store.insert(&record).await?,
                CreateMode::Upsert => store.upsert(&record).await?,
            }
            info!(user_id = %record.id, create_mode = ?create_mode, "user_created");
            SyncOutcome::Created { user_id: record.id }
        }
        WebhookEvent::UserUpdated(user) => {
            let record = UserRecord::from(user);
            store.update(&record).await?;
            info!(user_id = %record.id, "user_updated");
            SyncOutcome::Updated { user_id: record.id }
        }
        WebhookEvent::UserDeleted(user) => {
            store.delete(&user.id).await?;
            info!(user_id = %user.id, "user_deleted");
            SyncOutcome::Deleted {
                user_id: user.id.clone(),
            }
        }
        WebhookEvent::Other(kind) => {
            info!(event_type = %kind, "webhook_event_unhandled");
            SyncOutcome::Ignored { kind: kind.clone() }
        }
    };

    Ok(outcome)
}
