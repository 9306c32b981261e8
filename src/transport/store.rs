//! Persistence trait for transport steps.
//!
//! The store is the sole writer of transport states. Every implementation
//! enforces the state machine inside its atomic update: the legality check
//! and the write happen under one entry guard (memory) or one row update
//! (PostgreSQL), so concurrent transitions of the same step are linearizable
//! and the second writer fails the non-terminal precondition.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{
    ConnectorMessageId, LinkPartnerName, Message, TransportId, TransportState, TransportStep,
    TransportUpdate,
};

#[derive(Debug, Error)]
pub enum TransportStoreError {
    /// No step with this transport id
    #[error("No transport step found for transport id [{0}]")]
    NotFound(TransportId),

    /// Step already reached a terminal state; terminal states are final
    #[error("Transport step [{transport_id}] is already terminal in state [{state}]")]
    AlreadyTerminal {
        transport_id: TransportId,
        state: TransportState,
    },

    /// The requested transition is not defined by the state machine
    #[error("Transport step [{transport_id}] cannot move from [{from}] to [{to}]")]
    IllegalTransition {
        transport_id: TransportId,
        from: TransportState,
        to: TransportState,
    },

    /// The operation requires the step to be in PENDING
    #[error("Transport step [{transport_id}] is not in pending state but [{state}]")]
    NotPending {
        transport_id: TransportId,
        state: TransportState,
    },

    /// The transported message is no longer readable (downloaded and purged)
    #[error("The message transported by step [{0}] is not available anymore")]
    ContentUnavailable(TransportId),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Page request for the reporting query.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// 0-based page index
    pub page: u32,
    /// Page size; capped by implementations at a sane maximum
    pub size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 0, size: 50 }
    }
}

impl Pagination {
    pub fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }
}

/// One page of a result set.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

/// Backend trait for transport step persistence.
#[async_trait]
pub trait TransportStepStore: Send + Sync {
    /// Create a new step in `Pending` for the next attempt number of the
    /// (message, partner) pair. Attempt numbers are never reused.
    async fn create_step(
        &self,
        message: &Message,
        partner: &LinkPartnerName,
    ) -> Result<TransportStep, TransportStoreError>;

    /// Apply one state transition. Fails (never a silent no-op) when the
    /// step is terminal or the transition is not defined.
    async fn update_status(
        &self,
        transport_id: &TransportId,
        update: TransportUpdate,
    ) -> Result<TransportStep, TransportStoreError>;

    async fn get_step(
        &self,
        transport_id: &TransportId,
    ) -> Result<Option<TransportStep>, TransportStoreError>;

    /// All steps currently `Pending` for one partner, oldest first.
    async fn find_pending_for_partner(
        &self,
        partner: &LinkPartnerName,
    ) -> Result<Vec<TransportStep>, TransportStoreError>;

    async fn find_by_connector_message_id(
        &self,
        id: &ConnectorMessageId,
    ) -> Result<Vec<TransportStep>, TransportStoreError>;

    /// Reporting view: for each (message, partner) pair only the
    /// highest-numbered attempt, filtered to the given state and partner
    /// sets, newest first. Superseded attempts are excluded from the view
    /// but never deleted.
    async fn find_last_attempt_with_states(
        &self,
        states: &[TransportState],
        partners: &[LinkPartnerName],
        pagination: Pagination,
    ) -> Result<Page<TransportStep>, TransportStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        let pagination = Pagination { page: 3, size: 20 };
        assert_eq!(pagination.offset(), 60);
    }

    #[test]
    fn test_default_pagination() {
        let pagination = Pagination::default();
        assert_eq!(pagination.page, 0);
        assert_eq!(pagination.size, 50);
    }
}
