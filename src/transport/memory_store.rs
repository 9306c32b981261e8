//! In-memory transport step store using DashMap.
//!
//! Per-step mutation happens under the step's map entry guard, which gives
//! the linearizable single-writer semantics the state machine relies on.

use dashmap::DashMap;

use async_trait::async_trait;

use crate::domain::{
    ConnectorMessageId, LinkPartnerName, Message, TransportId, TransportState, TransportStep,
    TransportUpdate,
};
use crate::metrics::{
    TRANSPORT_STEPS_CREATED_TOTAL, TRANSPORT_TRANSITIONS_REJECTED_TOTAL,
    TRANSPORT_TRANSITIONS_TOTAL,
};

use super::store::{Page, Pagination, TransportStepStore, TransportStoreError};

pub struct MemoryTransportStepStore {
    steps: DashMap<TransportId, TransportStep>,
    /// Highest attempt number handed out per (message, partner) pair
    attempts: DashMap<(ConnectorMessageId, LinkPartnerName), u32>,
}

impl MemoryTransportStepStore {
    pub fn new() -> Self {
        Self {
            steps: DashMap::new(),
            attempts: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for MemoryTransportStepStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportStepStore for MemoryTransportStepStore {
    async fn create_step(
        &self,
        message: &Message,
        partner: &LinkPartnerName,
    ) -> Result<TransportStep, TransportStoreError> {
        // the entry guard serializes concurrent creates for the same pair
        let attempt = {
            let mut counter = self
                .attempts
                .entry((message.id.clone(), partner.clone()))
                .or_insert(0);
            *counter += 1;
            *counter
        };

        let step = TransportStep::pending(message, partner, attempt);
        TRANSPORT_STEPS_CREATED_TOTAL.inc();
        tracing::debug!(
            transport_id = %step.transport_id,
            connector_message_id = %message.id,
            link_partner = %partner,
            attempt = attempt,
            "Created transport step"
        );
        self.steps.insert(step.transport_id.clone(), step.clone());
        Ok(step)
    }

    async fn update_status(
        &self,
        transport_id: &TransportId,
        update: TransportUpdate,
    ) -> Result<TransportStep, TransportStoreError> {
        let mut entry = self
            .steps
            .get_mut(transport_id)
            .ok_or_else(|| TransportStoreError::NotFound(transport_id.clone()))?;

        let current = entry.state;
        if current.is_terminal() {
            TRANSPORT_TRANSITIONS_REJECTED_TOTAL.inc();
            return Err(TransportStoreError::AlreadyTerminal {
                transport_id: transport_id.clone(),
                state: current,
            });
        }
        if !current.can_transition_to(update.state) {
            TRANSPORT_TRANSITIONS_REJECTED_TOTAL.inc();
            return Err(TransportStoreError::IllegalTransition {
                transport_id: transport_id.clone(),
                from: current,
                to: update.state,
            });
        }

        entry.apply(&update);
        TRANSPORT_TRANSITIONS_TOTAL
            .with_label_values(&[update.state.as_str()])
            .inc();
        tracing::debug!(
            transport_id = %transport_id,
            from = %current,
            to = %update.state,
            "Transport step transitioned"
        );
        Ok(entry.value().clone())
    }

    async fn get_step(
        &self,
        transport_id: &TransportId,
    ) -> Result<Option<TransportStep>, TransportStoreError> {
        Ok(self.steps.get(transport_id).map(|entry| entry.value().clone()))
    }

    async fn find_pending_for_partner(
        &self,
        partner: &LinkPartnerName,
    ) -> Result<Vec<TransportStep>, TransportStoreError> {
        let mut steps: Vec<TransportStep> = self
            .steps
            .iter()
            .filter(|entry| {
                entry.link_partner == *partner && entry.state == TransportState::Pending
            })
            .map(|entry| entry.value().clone())
            .collect();
        steps.sort_by(|a, b| a.created.cmp(&b.created).then(a.attempt.cmp(&b.attempt)));
        Ok(steps)
    }

    async fn find_by_connector_message_id(
        &self,
        id: &ConnectorMessageId,
    ) -> Result<Vec<TransportStep>, TransportStoreError> {
        let mut steps: Vec<TransportStep> = self
            .steps
            .iter()
            .filter(|entry| entry.connector_message_id == *id)
            .map(|entry| entry.value().clone())
            .collect();
        steps.sort_by_key(|step| step.attempt);
        Ok(steps)
    }

    async fn find_last_attempt_with_states(
        &self,
        states: &[TransportState],
        partners: &[LinkPartnerName],
        pagination: Pagination,
    ) -> Result<Page<TransportStep>, TransportStoreError> {
        use std::collections::HashMap;

        // keep only the highest attempt per (message, partner) pair
        let mut latest: HashMap<(ConnectorMessageId, LinkPartnerName), TransportStep> =
            HashMap::new();
        for entry in self.steps.iter() {
            if !partners.contains(&entry.link_partner) {
                continue;
            }
            let key = (entry.connector_message_id.clone(), entry.link_partner.clone());
            match latest.get(&key) {
                Some(existing) if existing.attempt >= entry.attempt => {}
                _ => {
                    latest.insert(key, entry.value().clone());
                }
            }
        }

        let mut matching: Vec<TransportStep> = latest
            .into_values()
            .filter(|step| states.contains(&step.state))
            .collect();
        matching.sort_by(|a, b| b.created.cmp(&a.created).then(b.attempt.cmp(&a.attempt)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.size as usize)
            .collect();

        Ok(Page {
            items,
            page: pagination.page,
            size: pagination.size,
            total,
        })
    }
}
