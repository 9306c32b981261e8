//! Push delivery driver.
//!
//! Hands a message to a push partner with one synchronous, time-bounded call
//! to the partner's delivery endpoint and records the outcome as a terminal
//! transport step transition. The driver never retries and never leaves a
//! step pending; a re-attempt is a new, independent submission decided by
//! the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{LinkPartner, Message, TransportState, TransportStep, TransportUpdate};
use crate::metrics::PUSH_DELIVERIES_TOTAL;
use crate::transform::{MessageTransformer, TransportAck, WireMessage};

use super::store::{TransportStepStore, TransportStoreError};

#[derive(Debug, Error)]
pub enum DeliveryClientError {
    #[error("Link partner [{0}] has no delivery endpoint configured")]
    NoEndpoint(String),

    #[error("Delivery call failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Delivery endpoint answered with a malformed response: {0}")]
    InvalidResponse(String),

    #[error("Delivery call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Message could not be transformed for the wire: {0}")]
    Transform(String),
}

/// Client side of the push protocol: deliver one message, get back an
/// acknowledgement with a boolean result, an optional assigned id and
/// optional free text.
#[async_trait]
pub trait DeliveryEndpointClient: Send + Sync {
    async fn deliver(
        &self,
        partner: &LinkPartner,
        message: &WireMessage,
    ) -> Result<TransportAck, DeliveryClientError>;
}

/// HTTP delivery client posting the wire message to the partner's
/// configured endpoint address.
pub struct HttpDeliveryClient {
    client: reqwest::Client,
}

impl HttpDeliveryClient {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryEndpointClient for HttpDeliveryClient {
    async fn deliver(
        &self,
        partner: &LinkPartner,
        message: &WireMessage,
    ) -> Result<TransportAck, DeliveryClientError> {
        let url = partner
            .push_url
            .as_deref()
            .ok_or_else(|| DeliveryClientError::NoEndpoint(partner.name.to_string()))?;

        let response = self.client.post(url).json(message).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryClientError::InvalidResponse(format!(
                "endpoint answered HTTP {status}"
            )));
        }

        response
            .json::<TransportAck>()
            .await
            .map_err(|e| DeliveryClientError::InvalidResponse(e.to_string()))
    }
}

/// Drives one push delivery from step creation to its terminal state.
pub struct PushDeliveryDriver {
    store: Arc<dyn TransportStepStore>,
    transformer: Arc<dyn MessageTransformer>,
    client: Arc<dyn DeliveryEndpointClient>,
    timeout: Duration,
}

impl PushDeliveryDriver {
    pub fn new(
        store: Arc<dyn TransportStepStore>,
        transformer: Arc<dyn MessageTransformer>,
        client: Arc<dyn DeliveryEndpointClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            transformer,
            client,
            timeout,
        }
    }

    /// Push one message to a partner.
    ///
    /// Remote failures are captured into a terminal `Failed` step, never
    /// propagated; only store failures surface as errors.
    #[tracing::instrument(
        name = "push.push_message",
        skip(self, message, partner),
        fields(connector_message_id = %message.id, link_partner = %partner.name)
    )]
    pub async fn push_message(
        &self,
        message: &Message,
        partner: &LinkPartner,
    ) -> Result<TransportStep, TransportStoreError> {
        let step = self.store.create_step(message, &partner.name).await?;

        let update = match self.attempt_delivery(message, partner).await {
            Ok(ack) => {
                let state = if ack.result {
                    TransportState::Accepted
                } else {
                    TransportState::Failed
                };
                PUSH_DELIVERIES_TOTAL
                    .with_label_values(&[state.as_str()])
                    .inc();
                tracing::info!(
                    transport_id = %step.transport_id,
                    accepted = ack.result,
                    remote_message_id = ack.message_id.as_deref().unwrap_or(""),
                    "Push delivery answered"
                );
                let mut update = TransportUpdate::to_state(state);
                update.result_text = ack.result_message;
                update.remote_message_id = ack.message_id;
                update
            }
            Err(e) => {
                PUSH_DELIVERIES_TOTAL.with_label_values(&["error"]).inc();
                tracing::warn!(
                    transport_id = %step.transport_id,
                    error = %e,
                    "Push delivery failed"
                );
                TransportUpdate::to_state(TransportState::Failed).with_text(e.to_string())
            }
        };

        self.store.update_status(&step.transport_id, update).await
    }

    async fn attempt_delivery(
        &self,
        message: &Message,
        partner: &LinkPartner,
    ) -> Result<TransportAck, DeliveryClientError> {
        let wire = self
            .transformer
            .to_wire(message)
            .map_err(|e| DeliveryClientError::Transform(e.to_string()))?;

        match tokio::time::timeout(self.timeout, self.client.deliver(partner, &wire)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryClientError::Timeout(self.timeout.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectorMessageId, LinkMode, LinkPartnerName};
    use crate::transform::JsonMessageTransformer;
    use crate::transport::memory_store::MemoryTransportStepStore;

    enum Behaviour {
        Accept,
        Refuse(&'static str),
        Hang,
        Error,
    }

    struct ScriptedClient {
        behaviour: Behaviour,
    }

    #[async_trait]
    impl DeliveryEndpointClient for ScriptedClient {
        async fn deliver(
            &self,
            _partner: &LinkPartner,
            _message: &WireMessage,
        ) -> Result<TransportAck, DeliveryClientError> {
            match self.behaviour {
                Behaviour::Accept => Ok(TransportAck {
                    result: true,
                    message_id: Some("remote-42".to_string()),
                    result_message: Some("accepted".to_string()),
                }),
                Behaviour::Refuse(text) => Ok(TransportAck {
                    result: false,
                    message_id: None,
                    result_message: Some(text.to_string()),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
                Behaviour::Error => Err(DeliveryClientError::InvalidResponse(
                    "connection refused".to_string(),
                )),
            }
        }
    }

    fn driver(behaviour: Behaviour) -> (PushDeliveryDriver, Arc<MemoryTransportStepStore>) {
        let store = Arc::new(MemoryTransportStepStore::new());
        let driver = PushDeliveryDriver::new(
            store.clone(),
            Arc::new(JsonMessageTransformer),
            Arc::new(ScriptedClient { behaviour }),
            Duration::from_millis(200),
        );
        (driver, store)
    }

    fn push_partner() -> LinkPartner {
        LinkPartner {
            name: LinkPartnerName::from("gateway"),
            certificate_dn: "CN=Gateway".to_string(),
            mode: LinkMode::Push,
            push_url: Some("http://gateway.example/deliver".to_string()),
        }
    }

    #[tokio::test]
    async fn test_accepted_response_yields_accepted_step() {
        let (driver, _store) = driver(Behaviour::Accept);
        let message = Message::new(ConnectorMessageId::from("msg-1"));

        let step = driver.push_message(&message, &push_partner()).await.unwrap();

        assert_eq!(step.state, TransportState::Accepted);
        assert_eq!(step.remote_message_id.as_deref(), Some("remote-42"));
        assert_eq!(step.result_text.as_deref(), Some("accepted"));
    }

    #[tokio::test]
    async fn test_refusal_records_result_text_verbatim() {
        let (driver, _store) = driver(Behaviour::Refuse("schema validation failed"));
        let message = Message::new(ConnectorMessageId::from("msg-1"));

        let step = driver.push_message(&message, &push_partner()).await.unwrap();

        assert_eq!(step.state, TransportState::Failed);
        assert_eq!(step.result_text.as_deref(), Some("schema validation failed"));
    }

    #[tokio::test]
    async fn test_timeout_yields_failed_with_diagnostic_never_pending() {
        let (driver, store) = driver(Behaviour::Hang);
        let message = Message::new(ConnectorMessageId::from("msg-1"));

        let step = driver.push_message(&message, &push_partner()).await.unwrap();

        assert_eq!(step.state, TransportState::Failed);
        assert!(!step.result_text.clone().unwrap_or_default().is_empty());

        let stored = store.get_step(&step.transport_id).await.unwrap().unwrap();
        assert_eq!(stored.state, TransportState::Failed);
    }

    #[tokio::test]
    async fn test_transport_error_is_captured_not_propagated() {
        let (driver, _store) = driver(Behaviour::Error);
        let message = Message::new(ConnectorMessageId::from("msg-1"));

        let step = driver.push_message(&message, &push_partner()).await.unwrap();

        assert_eq!(step.state, TransportState::Failed);
        assert!(step.result_text.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_each_push_creates_a_new_attempt() {
        let (driver, store) = driver(Behaviour::Error);
        let message = Message::new(ConnectorMessageId::from("msg-1"));

        driver.push_message(&message, &push_partner()).await.unwrap();
        let second = driver.push_message(&message, &push_partner()).await.unwrap();

        assert_eq!(second.attempt, 2);
        let all = store
            .find_by_connector_message_id(&ConnectorMessageId::from("msg-1"))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
