use std::sync::Arc;

use crate::config::Settings;
use crate::partner::LinkPartnerRegistry;
use crate::queue::QueueBackend;
use crate::transform::{JsonMessageTransformer, MessageTransformer};
use crate::transport::TransportStepStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub partner_registry: Arc<LinkPartnerRegistry>,
    pub queue_backend: Arc<dyn QueueBackend>,
    pub transport_store: Arc<dyn TransportStepStore>,
    pub transformer: Arc<dyn MessageTransformer>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        queue_backend: Arc<dyn QueueBackend>,
        transport_store: Arc<dyn TransportStepStore>,
    ) -> Self {
        let partner_registry = Arc::new(LinkPartnerRegistry::from_partners(&settings.partners));

        Self {
            settings: Arc::new(settings),
            partner_registry,
            queue_backend,
            transport_store,
            transformer: Arc::new(JsonMessageTransformer),
        }
    }
}
