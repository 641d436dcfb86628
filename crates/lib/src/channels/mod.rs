//! Delivery channel (WhatsApp Cloud API).
//!
//! The sender trait is the seam between the relay and the outbound HTTP
//! client, so tests can substitute a recording implementation.

use async_trait::async_trait;

mod inbound;
mod whatsapp;

pub use inbound::InboundMessage;
pub use whatsapp::{
    extract_inbound, NotificationError, NotificationPayload, SendError, WhatsAppChannel,
};

/// Sends a text message to a recipient id.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, recipient_id: &str, text: &str) -> Result<(), SendError>;
}
