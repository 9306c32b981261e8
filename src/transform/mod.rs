//! Wire representation of messages and the transformation collaborator.
//!
//! Converting between the internal domain message and the representation a
//! link partner understands is owned by a separate subsystem; the transport
//! layer only consumes it through the `MessageTransformer` trait. The JSON
//! transformer here is the plain pass-through used in deployments where both
//! sides speak the connector's own schema.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConnectorMessageId, LinkPartnerName, Message, MessageContent};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Invalid wire message: {0}")]
    Invalid(String),
}

/// A business message as it crosses the link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_message_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_link_partner: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_message_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_message_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Acknowledgement record answered to a delivery or submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportAck {
    pub result: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_message: Option<String>,
}

/// Transformation collaborator interface.
pub trait MessageTransformer: Send + Sync {
    fn to_wire(&self, message: &Message) -> Result<WireMessage, TransformError>;

    /// Build a domain message from its wire form, under the connector id the
    /// caller has minted for it.
    fn from_wire(
        &self,
        wire: WireMessage,
        id: ConnectorMessageId,
    ) -> Result<Message, TransformError>;
}

/// Pass-through transformer for partners speaking the connector schema.
pub struct JsonMessageTransformer;

impl MessageTransformer for JsonMessageTransformer {
    fn to_wire(&self, message: &Message) -> Result<WireMessage, TransformError> {
        Ok(WireMessage {
            connector_message_id: Some(message.id.to_string()),
            target_link_partner: message
                .details
                .target_link_partner
                .as_ref()
                .map(|p| p.to_string()),
            remote_message_id: message.details.remote_message_id.clone(),
            backend_message_id: message.details.backend_message_id.clone(),
            document_name: message.content.as_ref().map(|c| c.document_name.clone()),
            payload: message.content.as_ref().map(|c| c.payload.clone()),
        })
    }

    fn from_wire(
        &self,
        wire: WireMessage,
        id: ConnectorMessageId,
    ) -> Result<Message, TransformError> {
        let mut message = Message::new(id);
        if let Some(target) = wire.target_link_partner {
            if target.trim().is_empty() {
                return Err(TransformError::Invalid(
                    "target link partner must not be blank".to_string(),
                ));
            }
            message.details.target_link_partner = Some(LinkPartnerName(target));
        }
        message.details.remote_message_id = wire.remote_message_id;
        message.details.backend_message_id = wire.backend_message_id;
        if let Some(payload) = wire.payload {
            message.content = Some(MessageContent {
                document_name: wire
                    .document_name
                    .unwrap_or_else(|| "document".to_string()),
                payload,
            });
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_wire_carries_identity_and_payload() {
        let message = Message::new(ConnectorMessageId::from("msg-1"))
            .with_target(LinkPartnerName::from("backend-1"))
            .with_content(MessageContent {
                document_name: "form.xml".to_string(),
                payload: json!({"k": 1}),
            });

        let wire = JsonMessageTransformer.to_wire(&message).unwrap();
        assert_eq!(wire.connector_message_id.as_deref(), Some("msg-1"));
        assert_eq!(wire.target_link_partner.as_deref(), Some("backend-1"));
        assert_eq!(wire.payload, Some(json!({"k": 1})));
    }

    #[test]
    fn test_from_wire_rejects_blank_target() {
        let wire = WireMessage {
            connector_message_id: None,
            target_link_partner: Some("  ".to_string()),
            remote_message_id: None,
            backend_message_id: None,
            document_name: None,
            payload: None,
        };

        let result =
            JsonMessageTransformer.from_wire(wire, ConnectorMessageId::from("msg-1"));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_wire_uses_minted_id() {
        let wire = WireMessage {
            connector_message_id: Some("partner-side-id".to_string()),
            target_link_partner: None,
            remote_message_id: Some("remote-9".to_string()),
            backend_message_id: None,
            document_name: Some("doc.pdf".to_string()),
            payload: Some(json!({"body": true})),
        };

        let message = JsonMessageTransformer
            .from_wire(wire, ConnectorMessageId::from("minted-1"))
            .unwrap();
        assert_eq!(message.id, ConnectorMessageId::from("minted-1"));
        assert_eq!(message.details.remote_message_id.as_deref(), Some("remote-9"));
        assert_eq!(message.content.unwrap().document_name, "doc.pdf");
    }
}
