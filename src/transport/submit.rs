//! Entry point handing a message to the transport layer.
//!
//! Resolves the target partner and dispatches to the delivery mode the
//! partner is configured for: push calls the driver synchronously, pull
//! creates a pending step and waits for the partner to poll it.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::{LinkMode, LinkPartnerName, Message, TransportStep};
use crate::partner::LinkPartnerRegistry;

use super::push::PushDeliveryDriver;
use super::store::{TransportStepStore, TransportStoreError};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("No link partner found with name [{0}]")]
    UnknownPartner(LinkPartnerName),

    #[error(transparent)]
    Store(#[from] TransportStoreError),
}

pub struct LinkSubmitService {
    registry: Arc<LinkPartnerRegistry>,
    store: Arc<dyn TransportStepStore>,
    push_driver: Arc<PushDeliveryDriver>,
}

impl LinkSubmitService {
    pub fn new(
        registry: Arc<LinkPartnerRegistry>,
        store: Arc<dyn TransportStepStore>,
        push_driver: Arc<PushDeliveryDriver>,
    ) -> Self {
        Self {
            registry,
            store,
            push_driver,
        }
    }

    /// Hand one message to a link partner, in the partner's delivery mode.
    #[tracing::instrument(
        name = "submit.submit_to_link",
        skip(self, message),
        fields(connector_message_id = %message.id, link_partner = %partner_name)
    )]
    pub async fn submit_to_link(
        &self,
        message: &Message,
        partner_name: &LinkPartnerName,
    ) -> Result<TransportStep, SubmitError> {
        let partner = self
            .registry
            .get_by_name(partner_name)
            .ok_or_else(|| SubmitError::UnknownPartner(partner_name.clone()))?;

        match partner.mode {
            LinkMode::Push => Ok(self.push_driver.push_message(message, &partner).await?),
            LinkMode::Pull => {
                let step = self.store.create_step(message, partner_name).await?;
                tracing::info!(
                    transport_id = %step.transport_id,
                    "Message ready for pull by client"
                );
                Ok(step)
            }
        }
    }
}
