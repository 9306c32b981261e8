//! The business message as seen by the transport layer.
//!
//! The transport layer owns a message only for the duration of delivery;
//! content may have been moved to external storage and purged, in which case
//! only the identity and details survive.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::partner::LinkPartnerName;

/// Connector-assigned unique identifier of a business message.
///
/// Distinct from any id a counterparty assigns on its side of the link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorMessageId(pub String);

impl ConnectorMessageId {
    /// Mint a fresh connector message id for an inbound submission.
    pub fn generate() -> Self {
        Self(format!("relay-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectorMessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectorMessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Routing and correlation details of a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDetails {
    /// Link partner this message is to be transported to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_link_partner: Option<LinkPartnerName>,

    /// Link partner this message was received from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_link_partner: Option<LinkPartnerName>,

    /// Message id assigned by the remote side of the link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_message_id: Option<String>,

    /// Message id assigned by the national backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_message_id: Option<String>,
}

/// Payload of a message. Opaque to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    pub document_name: String,
    pub payload: serde_json::Value,
}

/// A business message handed to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: ConnectorMessageId,

    #[serde(default)]
    pub details: MessageDetails,

    /// Content is absent once it has been downloaded and purged from storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

impl Message {
    pub fn new(id: ConnectorMessageId) -> Self {
        Self {
            id,
            details: MessageDetails::default(),
            content: None,
        }
    }

    pub fn with_target(mut self, partner: LinkPartnerName) -> Self {
        self.details.target_link_partner = Some(partner);
        self
    }

    pub fn with_origin(mut self, partner: LinkPartnerName) -> Self {
        self.details.origin_link_partner = Some(partner);
        self
    }

    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content = Some(content);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ConnectorMessageId::generate();
        let b = ConnectorMessageId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_round_trips_through_json() {
        let message = Message::new(ConnectorMessageId::from("msg-1"))
            .with_target(LinkPartnerName::from("gateway"))
            .with_content(MessageContent {
                document_name: "form-a.xml".to_string(),
                payload: json!({"body": "hello"}),
            });

        let raw = serde_json::to_string(&message).unwrap();
        let parsed: Message = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.id, message.id);
        assert_eq!(
            parsed.details.target_link_partner,
            Some(LinkPartnerName::from("gateway"))
        );
        assert!(parsed.content.is_some());
    }

    #[test]
    fn test_absent_content_is_not_serialized() {
        let message = Message::new(ConnectorMessageId::from("msg-2"));
        let raw = serde_json::to_string(&message).unwrap();
        assert!(!raw.contains("content"));
    }
}
