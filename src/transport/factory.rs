//! Factory for transport step stores.

use std::sync::Arc;

use crate::config::TransportConfig;

use super::memory_store::MemoryTransportStepStore;
use super::postgres_store::PostgresTransportStepStore;
use super::store::{TransportStepStore, TransportStoreError};

/// Create the transport step store selected by configuration.
pub async fn create_transport_store(
    config: &TransportConfig,
) -> Result<Arc<dyn TransportStepStore>, TransportStoreError> {
    match config.store.as_str() {
        "postgres" => {
            let url = config.postgres_url.as_deref().ok_or_else(|| {
                TransportStoreError::Postgres(sqlx::Error::Configuration(
                    "transport.postgres_url is required for the postgres store".into(),
                ))
            })?;
            let store = PostgresTransportStepStore::connect(url).await?;
            tracing::info!("Using PostgreSQL transport step store");
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::info!("Using in-memory transport step store");
            Ok(Arc::new(MemoryTransportStepStore::new()))
        }
        other => {
            tracing::warn!(
                store = %other,
                "Unknown transport store, falling back to in-memory"
            );
            Ok(Arc::new(MemoryTransportStepStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_by_default() {
        let config = TransportConfig::default();
        assert!(create_transport_store(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_postgres_without_url_is_rejected() {
        let config = TransportConfig {
            store: "postgres".to_string(),
            postgres_url: None,
        };
        assert!(create_transport_store(&config).await.is_err());
    }
}
