//! In-memory user store for handler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StoreError, UserStore};
use crate::event::UserRecord;

#[derive(Default)]
pub(crate) struct MemoryStore {
    rows: RwLock<HashMap<String, UserRecord>>,
    calls: AtomicUsize,
    fail: bool,
}

impl MemoryStore {
    /// A store whose every call fails, as if the database were unreachable.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) async fn get(&self, id: &str) -> Option<UserRecord> {
        self.rows.read().await.get(id).cloned()
    }

    pub(crate) async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub(crate) async fn seed(&self, user: UserRecord) {
        self.rows.write().await.insert(user.id.clone(), user);
    }

    /// Number of mutations attempted, successful or not.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError::Rejected {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.begin()?;
        let mut rows = self.rows.write().await;
        if rows.contains_key(&user.id) {
            return Err(StoreError::Rejected {
                status: 409,
                message: "duplicate key value violates unique constraint".to_string(),
            });
        }
        rows.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn upsert(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.begin()?;
        self.rows.write().await.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.begin()?;
        if let Some(row) = self.rows.write().await.get_mut(&user.id) {
            *row = user.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.begin()?;
        self.rows.write().await.remove(id);
        Ok(())
    }
}
