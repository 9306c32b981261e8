//! Backend trait for the durable queue substrate.
//!
//! Abstracts the broker so different substrates (in-memory, Redis) can be
//! used interchangeably. The trait models the transactional consume contract:
//! a received message stays invisible to other consumers until the delivery
//! is resolved with `commit` or `rollback`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::Message;

/// Errors that can occur during queue backend operations.
#[derive(Debug, Error)]
pub enum QueueBackendError {
    /// Queue name is not part of the configured queue/DLQ pairs
    #[error("Unknown queue [{0}]")]
    UnknownQueue(String),

    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// A message stored on a queue, together with the broker-owned metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Broker-assigned message ID
    pub id: Uuid,

    /// The transported business message
    pub message: Message,

    /// When the message was enqueued
    pub enqueued_at: DateTime<Utc>,

    /// Times the broker has redelivered this message after a rollback.
    /// Owned by the substrate; reset when a message is moved back from
    /// the DLQ to its origin queue.
    pub redelivery_count: u32,
}

impl QueuedMessage {
    pub fn new(message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            enqueued_at: Utc::now(),
            redelivery_count: 0,
        }
    }
}

/// An in-flight delivery handed to exactly one consumer.
///
/// Must be resolved with `QueueBackend::commit` or `QueueBackend::rollback`;
/// an unresolved delivery keeps the message invisible.
#[derive(Debug, Clone)]
pub struct QueueDelivery {
    /// Origin queue name
    pub queue: String,

    /// The delivered message
    pub message: QueuedMessage,
}

/// Backend trait for the durable queue substrate.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; listeners and the administrative
/// console share one backend instance across tasks.
///
/// # Redelivery
///
/// `rollback` either returns the message for redelivery or, once the
/// configured redelivery budget is exhausted, moves it to the queue's DLQ.
/// No retry policy lives above this trait.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// The DLQ paired with the given queue, if the queue is configured.
    fn dlq_name(&self, queue: &str) -> Option<String>;

    /// Names of all configured queues.
    fn queue_names(&self) -> Vec<String>;

    /// Append a message to a queue. Returns the broker-assigned id.
    async fn enqueue(&self, queue: &str, message: Message) -> Result<Uuid, QueueBackendError>;

    /// Hand the oldest available message to the caller, or `None` if the
    /// queue is empty. The message stays invisible until resolved.
    async fn receive(&self, queue: &str) -> Result<Option<QueueDelivery>, QueueBackendError>;

    /// Resolve a delivery as processed; the message is gone for good.
    async fn commit(&self, delivery: QueueDelivery) -> Result<(), QueueBackendError>;

    /// Resolve a delivery as failed; the substrate redelivers the message or
    /// dead-letters it once the redelivery budget is exhausted.
    async fn rollback(&self, delivery: QueueDelivery) -> Result<(), QueueBackendError>;

    /// Non-destructive peek at all messages waiting on a queue.
    async fn browse(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueBackendError>;

    /// Non-destructive peek at all messages on the queue's DLQ.
    async fn browse_dlq(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueBackendError>;

    /// Delete a message from the queue or its DLQ.
    ///
    /// Returns whether the message was present; deleting an absent message
    /// is not an error.
    async fn delete_message(&self, queue: &str, id: Uuid) -> Result<bool, QueueBackendError>;

    /// Atomically move a message from the DLQ back to its origin queue with
    /// a fresh redelivery budget. Returns whether the message was present.
    async fn move_from_dlq(&self, queue: &str, id: Uuid) -> Result<bool, QueueBackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConnectorMessageId;

    #[test]
    fn test_queued_message_starts_with_zero_redeliveries() {
        let queued = QueuedMessage::new(Message::new(ConnectorMessageId::from("msg-1")));
        assert_eq!(queued.redelivery_count, 0);
        assert!(!queued.id.is_nil());
    }

    #[test]
    fn test_queued_message_serialization_round_trip() {
        let queued = QueuedMessage::new(Message::new(ConnectorMessageId::from("msg-1")));
        let raw = serde_json::to_string(&queued).unwrap();
        let parsed: QueuedMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.id, queued.id);
        assert_eq!(parsed.message.id, queued.message.id);
    }
}
