//! UserSync - Clerk user mirror.
//!
//! Receives Clerk webhooks, verifies their Svix signatures and mirrors user
//! lifecycle events into the `users` table of a Supabase project.
//!
//! ## Flow
//!
//! ```text
//! Clerk → POST /api/webhooks → verify → decode → apply → users table
//! ```

pub mod config;
pub mod event;
pub mod store;
pub mod sync;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError, CreateMode};
pub use event::{UserRecord, WebhookEvent};
pub use store::{PostgrestStore, StoreError, UserStore};
pub use sync::{apply_event, SyncOutcome};
pub use web::{router, AppState};
