//! In-memory message store (tests and throwaway deployments).

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{MessageStore, StoreError};
use crate::message::Message;

/// Insertion-ordered list of records behind a lock.
pub struct MemoryMessageStore {
    inner: Arc<RwLock<Vec<Message>>>,
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, message: &Message) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        if g.iter().any(|m| m.id == message.id) {
            return Err(StoreError::Conflict(message.id.clone()));
        }
        g.push(message.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let g = self.inner.read().await;
        Ok(g.iter().find(|m| m.id == id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let g = self.inner.read().await;
        let mut indexed: Vec<(usize, &Message)> = g.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            b.received_at.cmp(&a.received_at).then(ib.cmp(ia))
        });
        Ok(indexed
            .into_iter()
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect())
    }
}
