//! Redis-backed queue backend.
//!
//! Queues are Redis lists; a receive atomically moves the oldest entry onto a
//! per-queue in-flight list (`RPOPLPUSH`), so a crashed consumer leaves the
//! message recoverable instead of lost. Commit and rollback remove the entry
//! from the in-flight list; rollback then either requeues it with a bumped
//! redelivery count or pushes it onto the DLQ list.
//!
//! Multi-step resolution is not transactional across keys; the substrate is
//! at-least-once, matching the delivery contract of the service.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::config::QueuePairConfig;
use crate::domain::Message;
use crate::metrics::{
    QUEUE_CONSUMED_TOTAL, QUEUE_DEAD_LETTERED_TOTAL, QUEUE_ENQUEUED_TOTAL,
    QUEUE_REDELIVERED_TOTAL,
};

use super::backend::{QueueBackend, QueueBackendError, QueueDelivery, QueuedMessage};

const KEY_PREFIX: &str = "relay:queue";

pub struct RedisQueueBackend {
    manager: ConnectionManager,
    dlq_names: HashMap<String, String>,
    max_redeliveries: u32,
}

impl RedisQueueBackend {
    /// Connect to Redis and register the configured queue/DLQ pairs.
    pub async fn connect(
        url: &str,
        pairs: &[QueuePairConfig],
        max_redeliveries: u32,
    ) -> Result<Self, QueueBackendError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        tracing::info!(url = %url, queues = pairs.len(), "Connected Redis queue backend");

        Ok(Self {
            manager,
            dlq_names: pairs
                .iter()
                .map(|p| (p.name.clone(), p.dlq.clone()))
                .collect(),
            max_redeliveries,
        })
    }

    fn check_queue(&self, queue: &str) -> Result<(), QueueBackendError> {
        if self.dlq_names.contains_key(queue) {
            Ok(())
        } else {
            Err(QueueBackendError::UnknownQueue(queue.to_string()))
        }
    }

    fn ready_key(queue: &str) -> String {
        format!("{KEY_PREFIX}:{queue}")
    }

    fn inflight_key(queue: &str) -> String {
        format!("{KEY_PREFIX}:{queue}:inflight")
    }

    fn dlq_key(&self, queue: &str) -> Result<String, QueueBackendError> {
        self.dlq_names
            .get(queue)
            .map(|dlq| format!("{KEY_PREFIX}:{dlq}"))
            .ok_or_else(|| QueueBackendError::UnknownQueue(queue.to_string()))
    }

    async fn list_entries(&self, key: &str) -> Result<Vec<QueuedMessage>, QueueBackendError> {
        let mut conn = self.manager.clone();
        let raw: Vec<String> = conn.lrange(key, 0, -1).await?;
        // LRANGE returns newest first for LPUSH-fed lists; present oldest first
        let mut messages = Vec::with_capacity(raw.len());
        for entry in raw.into_iter().rev() {
            messages.push(serde_json::from_str(&entry)?);
        }
        Ok(messages)
    }

    /// Find a message on a list by broker id; returns its raw entry so it can
    /// be removed by exact value.
    async fn find_entry(
        &self,
        key: &str,
        id: Uuid,
    ) -> Result<Option<(String, QueuedMessage)>, QueueBackendError> {
        let mut conn = self.manager.clone();
        let raw: Vec<String> = conn.lrange(key, 0, -1).await?;
        for entry in raw {
            let queued: QueuedMessage = serde_json::from_str(&entry)?;
            if queued.id == id {
                return Ok(Some((entry, queued)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    fn dlq_name(&self, queue: &str) -> Option<String> {
        self.dlq_names.get(queue).cloned()
    }

    fn queue_names(&self) -> Vec<String> {
        self.dlq_names.keys().cloned().collect()
    }

    async fn enqueue(&self, queue: &str, message: Message) -> Result<Uuid, QueueBackendError> {
        self.check_queue(queue)?;
        let queued = QueuedMessage::new(message);
        let id = queued.id;
        let entry = serde_json::to_string(&queued)?;

        let mut conn = self.manager.clone();
        let _: i64 = conn.lpush(Self::ready_key(queue), entry).await?;
        QUEUE_ENQUEUED_TOTAL.with_label_values(&[queue]).inc();

        tracing::debug!(queue = %queue, message_id = %id, "Message enqueued");
        Ok(id)
    }

    async fn receive(&self, queue: &str) -> Result<Option<QueueDelivery>, QueueBackendError> {
        self.check_queue(queue)?;
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .rpoplpush(Self::ready_key(queue), Self::inflight_key(queue))
            .await?;

        let Some(entry) = raw else {
            return Ok(None);
        };
        let queued: QueuedMessage = serde_json::from_str(&entry)?;

        Ok(Some(QueueDelivery {
            queue: queue.to_string(),
            message: queued,
        }))
    }

    async fn commit(&self, delivery: QueueDelivery) -> Result<(), QueueBackendError> {
        self.check_queue(&delivery.queue)?;
        let entry = serde_json::to_string(&delivery.message)?;

        let mut conn = self.manager.clone();
        let removed: i64 = conn
            .lrem(Self::inflight_key(&delivery.queue), 1, entry)
            .await?;
        if removed == 0 {
            tracing::warn!(
                queue = %delivery.queue,
                message_id = %delivery.message.id,
                "Commit for a delivery that is no longer in flight"
            );
            return Ok(());
        }
        QUEUE_CONSUMED_TOTAL.with_label_values(&[&delivery.queue]).inc();
        Ok(())
    }

    async fn rollback(&self, delivery: QueueDelivery) -> Result<(), QueueBackendError> {
        self.check_queue(&delivery.queue)?;
        let queue = delivery.queue.clone();
        let entry = serde_json::to_string(&delivery.message)?;

        let mut conn = self.manager.clone();
        let removed: i64 = conn.lrem(Self::inflight_key(&queue), 1, entry).await?;
        if removed == 0 {
            tracing::warn!(
                queue = %queue,
                message_id = %delivery.message.id,
                "Rollback for a delivery that is no longer in flight"
            );
            return Ok(());
        }

        let mut queued = delivery.message;
        if queued.redelivery_count >= self.max_redeliveries {
            tracing::warn!(
                queue = %queue,
                message_id = %queued.id,
                connector_message_id = %queued.message.id,
                redeliveries = queued.redelivery_count,
                "Redelivery budget exhausted, moving message to DLQ"
            );
            QUEUE_DEAD_LETTERED_TOTAL.with_label_values(&[&queue]).inc();
            let dlq_entry = serde_json::to_string(&queued)?;
            let _: i64 = conn.lpush(self.dlq_key(&queue)?, dlq_entry).await?;
            return Ok(());
        }

        queued.redelivery_count += 1;
        QUEUE_REDELIVERED_TOTAL.with_label_values(&[&queue]).inc();
        let requeue_entry = serde_json::to_string(&queued)?;
        // back of the queue, consumers pop from the other end
        let _: i64 = conn.lpush(Self::ready_key(&queue), requeue_entry).await?;
        Ok(())
    }

    async fn browse(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueBackendError> {
        self.check_queue(queue)?;
        self.list_entries(&Self::ready_key(queue)).await
    }

    async fn browse_dlq(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueBackendError> {
        self.check_queue(queue)?;
        let dlq_key = self.dlq_key(queue)?;
        self.list_entries(&dlq_key).await
    }

    async fn delete_message(&self, queue: &str, id: Uuid) -> Result<bool, QueueBackendError> {
        self.check_queue(queue)?;
        let mut conn = self.manager.clone();

        for key in [Self::ready_key(queue), self.dlq_key(queue)?] {
            if let Some((entry, _)) = self.find_entry(&key, id).await? {
                let removed: i64 = conn.lrem(&key, 1, entry).await?;
                if removed > 0 {
                    tracing::info!(queue = %queue, message_id = %id, key = %key, "Deleted message");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn move_from_dlq(&self, queue: &str, id: Uuid) -> Result<bool, QueueBackendError> {
        self.check_queue(queue)?;
        let dlq_key = self.dlq_key(queue)?;

        let Some((entry, mut queued)) = self.find_entry(&dlq_key, id).await? else {
            return Ok(false);
        };

        let mut conn = self.manager.clone();
        let removed: i64 = conn.lrem(&dlq_key, 1, entry).await?;
        if removed == 0 {
            // raced with a concurrent console operation
            return Ok(false);
        }

        queued.redelivery_count = 0;
        let requeue_entry = serde_json::to_string(&queued)?;
        let _: i64 = conn.lpush(Self::ready_key(queue), requeue_entry).await?;
        tracing::info!(
            queue = %queue,
            message_id = %id,
            "Moved message from DLQ back to origin queue"
        );
        Ok(true)
    }
}
