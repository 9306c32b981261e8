//! Inbound queue listener.
//!
//! One listener consumes one queue and hands every delivered message to
//! exactly one business processor. The listener keeps no retry bookkeeping:
//! a processor error rolls the delivery back and the substrate decides
//! between redelivery and the DLQ. Transport-level decode failures and
//! business failures are indistinguishable at this boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::Message;

use super::backend::{QueueBackend, QueueDelivery};
use super::backoff::ExponentialBackoff;

/// Failure signal from a processor back to the substrate integration.
///
/// Deliberately carries only text; the listener treats every failure the
/// same way, regardless of where it originated.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProcessingError(String);

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Business processor invoked for each delivered message.
///
/// Must be safe to run concurrently for different messages; the substrate
/// guarantees a given message is handed to exactly one consumer at a time.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, message: &Message) -> Result<(), ProcessingError>;
}

/// Consume loop for one queue.
pub struct QueueListener {
    backend: Arc<dyn QueueBackend>,
    queue: String,
    processor: Arc<dyn MessageProcessor>,
    poll_interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl QueueListener {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        queue: impl Into<String>,
        processor: Arc<dyn MessageProcessor>,
        poll_interval_ms: u64,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            backend,
            queue: queue.into(),
            processor,
            poll_interval: Duration::from_millis(poll_interval_ms),
            shutdown,
        }
    }

    /// Run until shutdown is signalled.
    pub async fn run(self) {
        let QueueListener {
            backend,
            queue,
            processor,
            poll_interval,
            mut shutdown,
        } = self;

        tracing::info!(queue = %queue, "Queue listener started");
        let mut backoff = ExponentialBackoff::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(queue = %queue, "Queue listener shutting down");
                    break;
                }
                received = backend.receive(&queue) => match received {
                    Ok(Some(delivery)) => {
                        backoff.reset();
                        handle_delivery(backend.as_ref(), processor.as_ref(), delivery).await;
                    }
                    Ok(None) => {
                        backoff.reset();
                        tokio::time::sleep(poll_interval).await;
                    }
                    Err(e) => {
                        let delay = backoff.next_delay();
                        tracing::error!(
                            queue = %queue,
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Queue substrate unavailable, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

async fn handle_delivery(
    backend: &dyn QueueBackend,
    processor: &dyn MessageProcessor,
    delivery: QueueDelivery,
) {
    let queue = delivery.queue.clone();
    let connector_message_id = delivery.message.message.id.clone();
    let redelivery = delivery.message.redelivery_count;

    match processor.process(&delivery.message.message).await {
        Ok(()) => {
            tracing::debug!(
                queue = %queue,
                connector_message_id = %connector_message_id,
                "Message processed"
            );
            if let Err(e) = backend.commit(delivery).await {
                tracing::error!(
                    queue = %queue,
                    connector_message_id = %connector_message_id,
                    error = %e,
                    "Failed to commit processed delivery"
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                queue = %queue,
                connector_message_id = %connector_message_id,
                redelivery = redelivery,
                error = %e,
                "Processing failed, rolling back delivery"
            );
            if let Err(e) = backend.rollback(delivery).await {
                tracing::error!(
                    queue = %queue,
                    connector_message_id = %connector_message_id,
                    error = %e,
                    "Failed to roll back delivery"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueuePairConfig;
    use crate::domain::ConnectorMessageId;
    use crate::queue::memory_backend::MemoryQueueBackend;
    use crate::shutdown::ShutdownSignal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProcessor {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingProcessor {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl MessageProcessor for CountingProcessor {
        async fn process(&self, _message: &Message) -> Result<(), ProcessingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ProcessingError::new("always fails"))
            } else {
                Ok(())
            }
        }
    }

    fn backend(max_redeliveries: u32) -> Arc<MemoryQueueBackend> {
        Arc::new(MemoryQueueBackend::new(
            &[QueuePairConfig::new("to-link")],
            max_redeliveries,
        ))
    }

    async fn wait_until(mut predicate: impl FnMut() -> bool) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_successful_processing_commits() {
        let backend = backend(3);
        let processor = Arc::new(CountingProcessor::new(false));
        let shutdown = ShutdownSignal::new();

        backend
            .enqueue("to-link", Message::new(ConnectorMessageId::from("msg-1")))
            .await
            .unwrap();

        let listener = QueueListener::new(
            backend.clone(),
            "to-link",
            processor.clone(),
            10,
            shutdown.subscribe(),
        );
        let handle = tokio::spawn(listener.run());

        wait_until(|| processor.calls.load(Ordering::SeqCst) == 1).await;
        shutdown.trigger();
        handle.await.unwrap();

        assert!(backend.browse("to-link").await.unwrap().is_empty());
        assert!(backend.browse_dlq("to-link").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_processor_exhausts_budget_into_dlq() {
        let max = 2;
        let backend = backend(max);
        let processor = Arc::new(CountingProcessor::new(true));
        let shutdown = ShutdownSignal::new();

        backend
            .enqueue("to-link", Message::new(ConnectorMessageId::from("msg-1")))
            .await
            .unwrap();

        let listener = QueueListener::new(
            backend.clone(),
            "to-link",
            processor.clone(),
            10,
            shutdown.subscribe(),
        );
        let handle = tokio::spawn(listener.run());

        // initial delivery + `max` redeliveries
        wait_until(|| processor.calls.load(Ordering::SeqCst) == (max as usize) + 1).await;

        for _ in 0..200 {
            if backend.browse_dlq("to-link").await.unwrap().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(backend.browse_dlq("to-link").await.unwrap().len(), 1);

        shutdown.trigger();
        handle.await.unwrap();

        assert!(backend.browse("to-link").await.unwrap().is_empty());
        assert_eq!(processor.calls.load(Ordering::SeqCst), (max as usize) + 1);
    }
}
