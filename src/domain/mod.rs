//! Domain model shared by the transport layer.

pub mod message;
pub mod partner;
pub mod transport;

pub use message::{ConnectorMessageId, Message, MessageContent, MessageDetails};
pub use partner::{LinkMode, LinkPartner, LinkPartnerName};
pub use transport::{TransportId, TransportState, TransportStatusUpdate, TransportStep, TransportUpdate};
