//! Content storage collaborator interface.
//!
//! Bulk payload storage lives outside the transport layer; the cleanup flow
//! only needs to purge content once a message has reached its final state.
//! The in-memory implementation backs tests and single-node deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::domain::{ConnectorMessageId, MessageContent};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Content storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ContentStorage: Send + Sync {
    async fn store(
        &self,
        id: &ConnectorMessageId,
        content: MessageContent,
    ) -> Result<(), StorageError>;

    async fn load(&self, id: &ConnectorMessageId)
        -> Result<Option<MessageContent>, StorageError>;

    /// Remove stored content. Purging content that is already gone is a no-op.
    async fn purge(&self, id: &ConnectorMessageId) -> Result<(), StorageError>;
}

/// In-memory content store.
pub struct InMemoryContentStorage {
    contents: DashMap<ConnectorMessageId, MessageContent>,
}

impl InMemoryContentStorage {
    pub fn new() -> Self {
        Self {
            contents: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl Default for InMemoryContentStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStorage for InMemoryContentStorage {
    async fn store(
        &self,
        id: &ConnectorMessageId,
        content: MessageContent,
    ) -> Result<(), StorageError> {
        self.contents.insert(id.clone(), content);
        Ok(())
    }

    async fn load(
        &self,
        id: &ConnectorMessageId,
    ) -> Result<Option<MessageContent>, StorageError> {
        Ok(self.contents.get(id).map(|entry| entry.value().clone()))
    }

    async fn purge(&self, id: &ConnectorMessageId) -> Result<(), StorageError> {
        if self.contents.remove(id).is_some() {
            tracing::debug!(connector_message_id = %id, "Purged message content");
        }
        Ok(())
    }
}
