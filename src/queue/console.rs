//! Dead-letter recovery console.
//!
//! Read/repair operations scoped to one queue and its DLQ. These are manual
//! remediation primitives for operators; nothing in the automatic pipeline
//! calls them.

use std::sync::Arc;

use uuid::Uuid;

use super::backend::{QueueBackend, QueueBackendError, QueuedMessage};

pub struct DlqConsole {
    backend: Arc<dyn QueueBackend>,
    queue: String,
}

impl DlqConsole {
    pub fn new(backend: Arc<dyn QueueBackend>, queue: impl Into<String>) -> Self {
        Self {
            backend,
            queue: queue.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn dlq_name(&self) -> Option<String> {
        self.backend.dlq_name(&self.queue)
    }

    /// Non-destructive peek at the origin queue.
    pub async fn list_all_messages(&self) -> Result<Vec<QueuedMessage>, QueueBackendError> {
        self.backend.browse(&self.queue).await
    }

    /// Non-destructive peek at the DLQ.
    pub async fn list_all_messages_in_dlq(&self) -> Result<Vec<QueuedMessage>, QueueBackendError> {
        self.backend.browse_dlq(&self.queue).await
    }

    /// Delete a message from the queue or its DLQ. Deleting an already-absent
    /// message is a no-op, not an error.
    pub async fn delete_msg(&self, id: Uuid) -> Result<(), QueueBackendError> {
        let removed = self.backend.delete_message(&self.queue, id).await?;
        if !removed {
            tracing::debug!(
                queue = %self.queue,
                message_id = %id,
                "Delete requested for an absent message"
            );
        }
        Ok(())
    }

    /// Move a message from the DLQ back onto the origin queue, granting it a
    /// fresh redelivery budget. Returns whether the message was present.
    pub async fn move_msg_from_dlq_to_queue(&self, id: Uuid) -> Result<bool, QueueBackendError> {
        self.backend.move_from_dlq(&self.queue, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueuePairConfig;
    use crate::domain::{ConnectorMessageId, Message};
    use crate::queue::memory_backend::MemoryQueueBackend;

    fn console_with_backend(max_redeliveries: u32) -> (DlqConsole, Arc<MemoryQueueBackend>) {
        let backend = Arc::new(MemoryQueueBackend::new(
            &[QueuePairConfig::new("to-cleanup")],
            max_redeliveries,
        ));
        (DlqConsole::new(backend.clone(), "to-cleanup"), backend)
    }

    #[tokio::test]
    async fn test_listing_is_non_destructive() {
        let (console, backend) = console_with_backend(3);
        backend
            .enqueue("to-cleanup", Message::new(ConnectorMessageId::from("msg-1")))
            .await
            .unwrap();

        assert_eq!(console.list_all_messages().await.unwrap().len(), 1);
        assert_eq!(console.list_all_messages().await.unwrap().len(), 1);
        assert!(console.list_all_messages_in_dlq().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_message_succeeds() {
        let (console, _backend) = console_with_backend(3);
        assert!(console.delete_msg(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_move_shows_message_only_in_queue_afterwards() {
        let (console, backend) = console_with_backend(0);
        let id = backend
            .enqueue("to-cleanup", Message::new(ConnectorMessageId::from("msg-1")))
            .await
            .unwrap();

        // burn the budget so the message dead-letters
        let delivery = backend.receive("to-cleanup").await.unwrap().unwrap();
        backend.rollback(delivery).await.unwrap();
        assert_eq!(console.list_all_messages_in_dlq().await.unwrap().len(), 1);

        assert!(console.move_msg_from_dlq_to_queue(id).await.unwrap());

        assert_eq!(console.list_all_messages().await.unwrap().len(), 1);
        assert!(console.list_all_messages_in_dlq().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_absent_message_reports_missing() {
        let (console, _backend) = console_with_backend(3);
        assert!(!console.move_msg_from_dlq_to_queue(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_dlq_name_follows_configuration() {
        let (console, _backend) = console_with_backend(3);
        assert_eq!(console.dlq_name().as_deref(), Some("DLQ.to-cleanup"));
    }
}
