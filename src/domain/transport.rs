//! Transport steps and their state machine.
//!
//! A transport step records one delivery attempt of one message to one link
//! partner. A message may accumulate several steps over retries; the attempt
//! number is never reused for the same (message, partner) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{ConnectorMessageId, Message};
use super::partner::LinkPartnerName;

/// Globally unique identifier of one transport step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportId(pub String);

impl TransportId {
    /// Ids are derived from the owning message, partner and attempt number,
    /// which makes them unique as long as attempt numbers are never reused.
    pub fn derive(
        message_id: &ConnectorMessageId,
        partner: &LinkPartnerName,
        attempt: u32,
    ) -> Self {
        Self(format!("{message_id}_{partner}_{attempt}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TransportId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Delivery state of one transport step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportState {
    /// Handed off but outcome unknown. Pull mode: not yet fetched.
    Pending,
    /// Partner has fetched the payload but not yet acknowledged it (pull only)
    PendingDownloaded,
    /// Terminal success
    Accepted,
    /// Terminal failure
    Failed,
}

impl TransportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransportState::Accepted | TransportState::Failed)
    }

    /// Legal transitions. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: TransportState) -> bool {
        match self {
            TransportState::Pending => matches!(
                next,
                TransportState::PendingDownloaded
                    | TransportState::Accepted
                    | TransportState::Failed
            ),
            TransportState::PendingDownloaded => {
                matches!(next, TransportState::Accepted | TransportState::Failed)
            }
            TransportState::Accepted | TransportState::Failed => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportState::Pending => "PENDING",
            TransportState::PendingDownloaded => "PENDING_DOWNLOADED",
            TransportState::Accepted => "ACCEPTED",
            TransportState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransportState::Pending),
            "PENDING_DOWNLOADED" => Ok(TransportState::PendingDownloaded),
            "ACCEPTED" => Ok(TransportState::Accepted),
            "FAILED" => Ok(TransportState::Failed),
            other => Err(format!("unknown transport state [{other}]")),
        }
    }
}

/// One applied status change, kept as history on the step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportStatusUpdate {
    pub state: TransportState,
    pub created: DateTime<Utc>,
}

/// A state change requested against a transport step.
#[derive(Debug, Clone)]
pub struct TransportUpdate {
    pub state: TransportState,
    pub result_text: Option<String>,
    pub remote_message_id: Option<String>,
}

impl TransportUpdate {
    pub fn to_state(state: TransportState) -> Self {
        Self {
            state,
            result_text: None,
            remote_message_id: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.result_text = Some(text.into());
        self
    }

    pub fn with_remote_message_id(mut self, id: impl Into<String>) -> Self {
        self.remote_message_id = Some(id.into());
        self
    }
}

/// The persisted record of one delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportStep {
    pub transport_id: TransportId,
    pub connector_message_id: ConnectorMessageId,
    pub link_partner: LinkPartnerName,

    /// 1-based attempt number per (message, partner) pair
    pub attempt: u32,

    pub state: TransportState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,

    /// Message id assigned by the counterparty, recorded on acknowledgement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_message_id: Option<String>,

    /// The transported message. May be gone once downloaded and purged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,

    #[serde(default)]
    pub status_history: Vec<TransportStatusUpdate>,
}

impl TransportStep {
    /// Build a fresh step in `Pending` for the given attempt.
    pub fn pending(message: &Message, partner: &LinkPartnerName, attempt: u32) -> Self {
        let now = Utc::now();
        Self {
            transport_id: TransportId::derive(&message.id, partner, attempt),
            connector_message_id: message.id.clone(),
            link_partner: partner.clone(),
            attempt,
            state: TransportState::Pending,
            result_text: None,
            remote_message_id: None,
            message: Some(message.clone()),
            created: now,
            updated: now,
            status_history: vec![TransportStatusUpdate {
                state: TransportState::Pending,
                created: now,
            }],
        }
    }

    /// Apply an update in place. The caller is responsible for holding the
    /// step exclusively while this runs; legality must already be checked.
    pub fn apply(&mut self, update: &TransportUpdate) {
        let now = Utc::now();
        self.state = update.state;
        if update.result_text.is_some() {
            self.result_text = update.result_text.clone();
        }
        // the first remote id wins; a counterparty does not reassign ids
        if self.remote_message_id.is_none() {
            self.remote_message_id = update.remote_message_id.clone();
        }
        self.updated = now;
        self.status_history.push(TransportStatusUpdate {
            state: update.state,
            created: now,
        });
    }
}
