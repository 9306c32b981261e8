//! Link partner identity and configuration.

use serde::{Deserialize, Serialize};

/// Name of one counterparty endpoint. Routing key for transport steps,
/// distinct from the business parties named inside a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkPartnerName(pub String);

impl LinkPartnerName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LinkPartnerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LinkPartnerName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// How messages are handed to this partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// The connector calls the partner's delivery endpoint
    Push,
    /// The partner polls the connector and fetches pending messages
    Pull,
}

/// Configuration of one counterparty endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkPartner {
    pub name: LinkPartnerName,

    /// Subject DN of the client certificate the partner authenticates with
    pub certificate_dn: String,

    pub mode: LinkMode,

    /// Delivery endpoint address; required for push partners
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_url: Option<String>,
}
