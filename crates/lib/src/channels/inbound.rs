//! Inbound message extracted from a webhook notification: delivered to the relay.

/// A message from a sender to be answered by one relay cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// WhatsApp account id of the sender (wa_id), also the reply recipient.
    pub sender_id: String,
    pub text: String,
}
