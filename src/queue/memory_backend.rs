//! In-memory queue backend using DashMap.
//!
//! Reference implementation of the substrate semantics. Messages are lost on
//! restart; deployments needing durability use the Redis backend.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::QueuePairConfig;
use crate::domain::Message;
use crate::metrics::{
    QUEUE_CONSUMED_TOTAL, QUEUE_DEAD_LETTERED_TOTAL, QUEUE_ENQUEUED_TOTAL,
    QUEUE_REDELIVERED_TOTAL,
};

use super::backend::{QueueBackend, QueueBackendError, QueueDelivery, QueuedMessage};

#[derive(Default)]
struct QueueState {
    /// Messages waiting for a consumer, oldest first
    ready: VecDeque<QueuedMessage>,
    /// In-flight deliveries, keyed by broker message id
    unacked: HashMap<Uuid, QueuedMessage>,
}

/// In-memory queue backend.
///
/// Per-queue state sits behind a `DashMap` entry; receive/commit/rollback
/// mutate one entry under its guard, which serializes consumers of the same
/// queue while leaving different queues independent.
pub struct MemoryQueueBackend {
    queues: DashMap<String, QueueState>,
    dlqs: DashMap<String, VecDeque<QueuedMessage>>,
    /// queue name -> DLQ name, fixed at construction from deployment config
    dlq_names: HashMap<String, String>,
    max_redeliveries: u32,
}

impl MemoryQueueBackend {
    pub fn new(pairs: &[QueuePairConfig], max_redeliveries: u32) -> Self {
        let backend = Self {
            queues: DashMap::new(),
            dlqs: DashMap::new(),
            dlq_names: pairs
                .iter()
                .map(|p| (p.name.clone(), p.dlq.clone()))
                .collect(),
            max_redeliveries,
        };
        for pair in pairs {
            backend.queues.insert(pair.name.clone(), QueueState::default());
            backend.dlqs.insert(pair.name.clone(), VecDeque::new());
        }
        backend
    }

    fn check_queue(&self, queue: &str) -> Result<(), QueueBackendError> {
        if self.dlq_names.contains_key(queue) {
            Ok(())
        } else {
            Err(QueueBackendError::UnknownQueue(queue.to_string()))
        }
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
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

        let mut state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| QueueBackendError::UnknownQueue(queue.to_string()))?;
        state.ready.push_back(queued);
        QUEUE_ENQUEUED_TOTAL.with_label_values(&[queue]).inc();

        tracing::debug!(
            queue = %queue,
            message_id = %id,
            queue_depth = state.ready.len(),
            "Message enqueued"
        );

        Ok(id)
    }

    async fn receive(&self, queue: &str) -> Result<Option<QueueDelivery>, QueueBackendError> {
        self.check_queue(queue)?;
        let mut state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| QueueBackendError::UnknownQueue(queue.to_string()))?;

        let Some(queued) = state.ready.pop_front() else {
            return Ok(None);
        };
        state.unacked.insert(queued.id, queued.clone());

        Ok(Some(QueueDelivery {
            queue: queue.to_string(),
            message: queued,
        }))
    }

    async fn commit(&self, delivery: QueueDelivery) -> Result<(), QueueBackendError> {
        self.check_queue(&delivery.queue)?;
        let mut state = self
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| QueueBackendError::UnknownQueue(delivery.queue.clone()))?;

        if state.unacked.remove(&delivery.message.id).is_none() {
            tracing::warn!(
                queue = %delivery.queue,
                message_id = %delivery.message.id,
                "Commit for a delivery that is no longer in flight"
            );
            return Ok(());
        }
        QUEUE_CONSUMED_TOTAL.with_label_values(&[&delivery.queue]).inc();

        tracing::debug!(
            queue = %delivery.queue,
            message_id = %delivery.message.id,
            "Delivery committed"
        );
        Ok(())
    }

    async fn rollback(&self, delivery: QueueDelivery) -> Result<(), QueueBackendError> {
        self.check_queue(&delivery.queue)?;
        let queue = delivery.queue.clone();

        let mut queued = {
            let mut state = self
                .queues
                .get_mut(&queue)
                .ok_or_else(|| QueueBackendError::UnknownQueue(queue.clone()))?;
            match state.unacked.remove(&delivery.message.id) {
                Some(queued) => queued,
                None => {
                    tracing::warn!(
                        queue = %queue,
                        message_id = %delivery.message.id,
                        "Rollback for a delivery that is no longer in flight"
                    );
                    return Ok(());
                }
            }
        };

        if queued.redelivery_count >= self.max_redeliveries {
            tracing::warn!(
                queue = %queue,
                message_id = %queued.id,
                connector_message_id = %queued.message.id,
                redeliveries = queued.redelivery_count,
                "Redelivery budget exhausted, moving message to DLQ"
            );
            QUEUE_DEAD_LETTERED_TOTAL.with_label_values(&[&queue]).inc();
            self.dlqs
                .get_mut(&queue)
                .ok_or_else(|| QueueBackendError::UnknownQueue(queue.clone()))?
                .push_back(queued);
            return Ok(());
        }

        queued.redelivery_count += 1;
        QUEUE_REDELIVERED_TOTAL.with_label_values(&[&queue]).inc();
        tracing::debug!(
            queue = %queue,
            message_id = %queued.id,
            redelivery = queued.redelivery_count,
            "Delivery rolled back, message redelivered"
        );
        self.queues
            .get_mut(&queue)
            .ok_or_else(|| QueueBackendError::UnknownQueue(queue.clone()))?
            .ready
            .push_back(queued);
        Ok(())
    }

    async fn browse(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueBackendError> {
        self.check_queue(queue)?;
        Ok(self
            .queues
            .get(queue)
            .map(|state| state.ready.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn browse_dlq(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueBackendError> {
        self.check_queue(queue)?;
        Ok(self
            .dlqs
            .get(queue)
            .map(|dlq| dlq.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_message(&self, queue: &str, id: Uuid) -> Result<bool, QueueBackendError> {
        self.check_queue(queue)?;

        if let Some(mut state) = self.queues.get_mut(queue) {
            let before = state.ready.len();
            state.ready.retain(|m| m.id != id);
            if state.ready.len() < before {
                tracing::info!(queue = %queue, message_id = %id, "Deleted message from queue");
                return Ok(true);
            }
        }

        if let Some(mut dlq) = self.dlqs.get_mut(queue) {
            let before = dlq.len();
            dlq.retain(|m| m.id != id);
            if dlq.len() < before {
                tracing::info!(queue = %queue, message_id = %id, "Deleted message from DLQ");
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn move_from_dlq(&self, queue: &str, id: Uuid) -> Result<bool, QueueBackendError> {
        self.check_queue(queue)?;

        let mut queued = {
            let mut dlq = self
                .dlqs
                .get_mut(queue)
                .ok_or_else(|| QueueBackendError::UnknownQueue(queue.to_string()))?;
            let Some(position) = dlq.iter().position(|m| m.id == id) else {
                return Ok(false);
            };
            match dlq.remove(position) {
                Some(queued) => queued,
                None => return Ok(false),
            }
        };

        // fresh redelivery budget on the origin queue
        queued.redelivery_count = 0;
        tracing::info!(
            queue = %queue,
            message_id = %queued.id,
            connector_message_id = %queued.message.id,
            "Moved message from DLQ back to origin queue"
        );
        self.queues
            .get_mut(queue)
            .ok_or_else(|| QueueBackendError::UnknownQueue(queue.to_string()))?
            .ready
            .push_back(queued);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConnectorMessageId;

    fn test_backend(max_redeliveries: u32) -> MemoryQueueBackend {
        MemoryQueueBackend::new(
            &[
                QueuePairConfig::new("to-link"),
                QueuePairConfig::new("to-cleanup"),
            ],
            max_redeliveries,
        )
    }

    fn message(id: &str) -> Message {
        Message::new(ConnectorMessageId::from(id))
    }

    #[tokio::test]
    async fn test_unknown_queue_is_an_error() {
        let backend = test_backend(3);
        let result = backend.enqueue("nope", message("msg-1")).await;
        assert!(matches!(result, Err(QueueBackendError::UnknownQueue(_))));
    }

    #[tokio::test]
    async fn test_enqueue_receive_commit() {
        let backend = test_backend(3);
        backend.enqueue("to-link", message("msg-1")).await.unwrap();

        let delivery = backend.receive("to-link").await.unwrap().unwrap();
        assert_eq!(delivery.message.message.id.as_str(), "msg-1");

        // invisible while in flight
        assert!(backend.receive("to-link").await.unwrap().is_none());

        backend.commit(delivery).await.unwrap();
        assert!(backend.receive("to-link").await.unwrap().is_none());
        assert!(backend.browse("to-link").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_redelivers_with_incremented_count() {
        let backend = test_backend(3);
        backend.enqueue("to-link", message("msg-1")).await.unwrap();

        let delivery = backend.receive("to-link").await.unwrap().unwrap();
        backend.rollback(delivery).await.unwrap();

        let redelivered = backend.receive("to-link").await.unwrap().unwrap();
        assert_eq!(redelivered.message.redelivery_count, 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_moves_to_dlq() {
        let max = 2;
        let backend = test_backend(max);
        backend.enqueue("to-link", message("msg-1")).await.unwrap();

        // initial delivery + `max` redeliveries, each rolled back
        for _ in 0..=max {
            let delivery = backend.receive("to-link").await.unwrap().unwrap();
            backend.rollback(delivery).await.unwrap();
        }

        assert!(backend.receive("to-link").await.unwrap().is_none());
        let dlq = backend.browse_dlq("to-link").await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].message.id.as_str(), "msg-1");
    }

    #[tokio::test]
    async fn test_one_less_rollback_keeps_message_redeliverable() {
        let max = 2;
        let backend = test_backend(max);
        backend.enqueue("to-link", message("msg-1")).await.unwrap();

        for _ in 0..max {
            let delivery = backend.receive("to-link").await.unwrap().unwrap();
            backend.rollback(delivery).await.unwrap();
        }

        assert!(backend.browse_dlq("to-link").await.unwrap().is_empty());
        assert!(backend.receive("to-link").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_poison_message_does_not_block_other_queues() {
        let backend = test_backend(0);
        backend.enqueue("to-link", message("poison")).await.unwrap();
        backend.enqueue("to-cleanup", message("healthy")).await.unwrap();

        let delivery = backend.receive("to-link").await.unwrap().unwrap();
        backend.rollback(delivery).await.unwrap();

        assert_eq!(backend.browse_dlq("to-link").await.unwrap().len(), 1);
        assert!(backend.browse_dlq("to-cleanup").await.unwrap().is_empty());
        assert!(backend.receive("to-cleanup").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = test_backend(3);
        let id = backend.enqueue("to-link", message("msg-1")).await.unwrap();

        assert!(backend.delete_message("to-link", id).await.unwrap());
        // second delete finds nothing, still succeeds
        assert!(!backend.delete_message("to-link", id).await.unwrap());
    }

    #[tokio::test]
    async fn test_move_from_dlq_resets_budget() {
        let backend = test_backend(0);
        let id = backend.enqueue("to-link", message("msg-1")).await.unwrap();

        let delivery = backend.receive("to-link").await.unwrap().unwrap();
        backend.rollback(delivery).await.unwrap();
        assert_eq!(backend.browse_dlq("to-link").await.unwrap().len(), 1);

        assert!(backend.move_from_dlq("to-link", id).await.unwrap());
        assert!(backend.browse_dlq("to-link").await.unwrap().is_empty());

        let queue = backend.browse("to-link").await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].redelivery_count, 0);
    }

    #[tokio::test]
    async fn test_move_absent_message_reports_missing() {
        let backend = test_backend(3);
        assert!(!backend.move_from_dlq("to-link", Uuid::new_v4()).await.unwrap());
    }
}
