//! Factory for queue backends.

use std::sync::Arc;

use crate::config::QueuesConfig;

use super::backend::{QueueBackend, QueueBackendError};
use super::memory_backend::MemoryQueueBackend;
use super::redis_backend::RedisQueueBackend;

/// Create the queue backend selected by configuration.
///
/// Unknown backend names fall back to the in-memory backend with a warning,
/// so a typo degrades durability instead of refusing to boot.
pub async fn create_queue_backend(
    config: &QueuesConfig,
) -> Result<Arc<dyn QueueBackend>, QueueBackendError> {
    let pairs = config.pairs();
    match config.backend.as_str() {
        "redis" => {
            let backend =
                RedisQueueBackend::connect(&config.redis_url, &pairs, config.max_redeliveries)
                    .await?;
            tracing::info!("Using Redis queue backend");
            Ok(Arc::new(backend))
        }
        "memory" => {
            tracing::info!("Using in-memory queue backend");
            Ok(Arc::new(MemoryQueueBackend::new(
                &pairs,
                config.max_redeliveries,
            )))
        }
        other => {
            tracing::warn!(
                backend = %other,
                "Unknown queue backend, falling back to in-memory"
            );
            Ok(Arc::new(MemoryQueueBackend::new(
                &pairs,
                config.max_redeliveries,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_by_default() {
        let config = QueuesConfig::default();
        let backend = create_queue_backend(&config).await.unwrap();
        assert!(backend.dlq_name("to-link").is_some());
    }

    #[tokio::test]
    async fn test_unknown_backend_falls_back_to_memory() {
        let config = QueuesConfig {
            backend: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        let backend = create_queue_backend(&config).await.unwrap();
        assert_eq!(backend.queue_names().len(), 3);
    }
}
