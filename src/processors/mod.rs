//! Business processors bound to the three logical queues.
//!
//! Each processor is invoked by one queue listener and signals failure with
//! an error return; the listener rolls the delivery back and the substrate
//! handles redelivery and dead-lettering. None of them keeps retry state.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{LinkPartnerName, Message, TransportState};
use crate::queue::{MessageProcessor, ProcessingError, QueueBackend};
use crate::storage::ContentStorage;
use crate::transport::LinkSubmitService;

/// Processor for the to-link queue: hands each message to its target link
/// partner through the submit service.
///
/// A failed push produces a terminal FAILED step *and* an error here, so the
/// substrate redelivers the message and every redelivery becomes a fresh
/// transport attempt; once the budget is exhausted the message parks in the
/// DLQ for operator-driven re-submission.
pub struct ToLinkProcessor {
    submit: Arc<LinkSubmitService>,
}

impl ToLinkProcessor {
    pub fn new(submit: Arc<LinkSubmitService>) -> Self {
        Self { submit }
    }
}

#[async_trait]
impl MessageProcessor for ToLinkProcessor {
    async fn process(&self, message: &Message) -> Result<(), ProcessingError> {
        let partner = message
            .details
            .target_link_partner
            .as_ref()
            .ok_or_else(|| {
                ProcessingError::new(format!(
                    "message [{}] names no target link partner",
                    message.id
                ))
            })?;

        let step = self
            .submit
            .submit_to_link(message, partner)
            .await
            .map_err(|e| ProcessingError::new(e.to_string()))?;

        if step.state == TransportState::Failed {
            return Err(ProcessingError::new(format!(
                "delivery to [{partner}] failed: {}",
                step.result_text.unwrap_or_else(|| "no diagnostic text".to_string())
            )));
        }
        Ok(())
    }
}

/// Processor for the inbound-router queue: stamps the routing target onto a
/// submitted message and forwards it to the to-link queue.
///
/// Full P-Mode verification lives in the business routing subsystem; this
/// processor only resolves the target partner (from the message or the
/// configured default) and moves the message along.
pub struct InboundRouterProcessor {
    backend: Arc<dyn QueueBackend>,
    to_link_queue: String,
    default_target: Option<LinkPartnerName>,
}

impl InboundRouterProcessor {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        to_link_queue: impl Into<String>,
        default_target: Option<LinkPartnerName>,
    ) -> Self {
        Self {
            backend,
            to_link_queue: to_link_queue.into(),
            default_target,
        }
    }
}

#[async_trait]
impl MessageProcessor for InboundRouterProcessor {
    async fn process(&self, message: &Message) -> Result<(), ProcessingError> {
        let target = message
            .details
            .target_link_partner
            .clone()
            .or_else(|| self.default_target.clone())
            .ok_or_else(|| {
                ProcessingError::new(format!(
                    "message [{}] names no target and no default target is configured",
                    message.id
                ))
            })?;

        let mut routed = message.clone();
        routed.details.target_link_partner = Some(target.clone());

        self.backend
            .enqueue(&self.to_link_queue, routed)
            .await
            .map_err(|e| ProcessingError::new(e.to_string()))?;

        tracing::debug!(
            connector_message_id = %message.id,
            target = %target,
            "Routed inbound message to link queue"
        );
        Ok(())
    }
}

/// Processor for the cleanup queue: purges stored content of messages that
/// reached their final state.
pub struct ContentCleanupProcessor {
    storage: Arc<dyn ContentStorage>,
}

impl ContentCleanupProcessor {
    pub fn new(storage: Arc<dyn ContentStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl MessageProcessor for ContentCleanupProcessor {
    async fn process(&self, message: &Message) -> Result<(), ProcessingError> {
        self.storage
            .purge(&message.id)
            .await
            .map_err(|e| ProcessingError::new(e.to_string()))?;
        tracing::debug!(connector_message_id = %message.id, "Cleaned up message content");
        Ok(())
    }
}
