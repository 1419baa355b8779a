//! Persistence for mirrored user records.
//!
//! The handler only depends on the [`UserStore`] trait; production uses the
//! hosted database's REST API through [`PostgrestStore`].

pub mod postgrest;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::event::UserRecord;

pub use postgrest::PostgrestStore;

/// Errors raised by a user store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("database rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Keyed mutations on the users table.
///
/// Operations addressing a missing row succeed without effect, except
/// `insert` which fails if the row already exists.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new row; fails on a duplicate id.
    async fn insert(&self, user: &UserRecord) -> Result<(), StoreError>;

    /// Insert a row, or replace every column of the existing one.
    async fn upsert(&self, user: &UserRecord) -> Result<(), StoreError>;

    /// Replace every non-key column of the row with `user.id`.
    async fn update(&self, user: &UserRecord) -> Result<(), StoreError>;

    /// Remove the row with `id`.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
