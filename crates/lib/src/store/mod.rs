//! Message store: durable, append-only-by-id record of processed messages.
//!
//! Records are inserted once and never updated. Listing is most recent first by `receivedAt`,
//! ties broken by insertion order (later insertion first).

mod memory;
mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, Config, StoreBackend};
use crate::message::Message;

pub use memory::MemoryMessageStore;
pub use sqlite::SqliteMessageStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message already exists: {0}")]
    Conflict(String),
    #[error("store database error: {0}")]
    Db(String),
    #[error("store io error: {0}")]
    Io(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &str;

    /// Insert a new record. A duplicate id is a `Conflict`; existing records are never replaced.
    /// Backends bound their own waits; any error, `Timeout` included, means nothing was written.
    async fn insert(&self, message: &Message) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Message>, StoreError>;

    /// Up to `limit` records, most recent first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Message>, StoreError>;
}

/// Open the configured store backend.
pub fn open_store(config: &Config) -> Result<Arc<dyn MessageStore>, StoreError> {
    match config.store.backend {
        StoreBackend::Memory => {
            log::warn!("using in-memory message store; messages are lost on restart");
            Ok(Arc::new(MemoryMessageStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = config::resolve_store_path(config);
            let store = SqliteMessageStore::open_with_timeout(&path, config.store.timeout())?;
            log::info!("message store opened at {}", path.display());
            Ok(Arc::new(store))
        }
    }
}
