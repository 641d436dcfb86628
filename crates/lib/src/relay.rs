//! Relay cycle: extract the inbound message, keep the rolling conversation,
//! call the completion backend, and deliver the reply to the sender.

use crate::channels::{
    extract_inbound, InboundMessage, MessageSender, NotificationError, NotificationPayload,
    SendError,
};
use crate::conversation::{Conversation, ConversationStore};
use crate::llm::{CompletionBackend, CompletionError, GenerationParams};

/// Message text that clears the sender's history instead of generating a reply.
/// Exact, case-sensitive match.
pub const RESET_COMMAND: &str = "reset";

/// Acknowledgement sent after a reset.
pub const RESET_ACK: &str = "The conversation has been reset.";

/// Marker preceding the generated reply inside the raw completion text.
const REPLY_DELIMITER: &str = "\nSimon: ";

const PERSONA_PREAMBLE: &str = "The following is a conversation with my best friend named Simon. He is the most inteligent person, is creative, clever, and very friendly, but his atitude is a little bit sarcastig and knows good jokes.\n";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("malformed notification: {0}")]
    MalformedNotification(#[from] NotificationError),
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
    #[error("delivery failed: {0}")]
    Delivery(#[from] SendError),
    #[error("conversation store failure: {0}")]
    Store(#[from] std::io::Error),
}

/// Terminal outcome of a successful relay cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Normal turn: reply generated, persisted, and delivered.
    Replied,
    /// Reset command: history cleared and acknowledgement sent.
    Reset,
}

/// The fixed generation parameter set used for every cycle.
pub fn generation_params() -> GenerationParams {
    GenerationParams {
        temperature: 0.9,
        max_tokens: 400,
        top_p: 1.0,
        frequency_penalty: 0.0,
        presence_penalty: 0.6,
        stop: vec![" Human:".to_string(), " Simon:".to_string()],
    }
}

/// A human turn as recorded in the conversation.
pub fn human_turn(message: &str) -> String {
    format!("\nHuman: {}", message)
}

/// Persona preamble followed by the space-joined retained turns.
pub fn assemble_prompt(conversation: &Conversation) -> String {
    format!("{}{}", PERSONA_PREAMBLE, conversation.joined())
}

/// The user-visible reply: the substring after the last reply delimiter when
/// present, otherwise the full completion text.
pub fn extract_reply(completion: &str) -> &str {
    match completion.rfind(REPLY_DELIMITER) {
        Some(i) => &completion[i + REPLY_DELIMITER.len()..],
        None => completion,
    }
}

/// Parse a webhook notification and run one relay cycle for it.
pub async fn process_notification<B: CompletionBackend>(
    store: &ConversationStore,
    backend: &B,
    sender: &dyn MessageSender,
    payload: &NotificationPayload,
) -> Result<RelayOutcome, RelayError> {
    let inbound = extract_inbound(payload)?;
    run_cycle(store, backend, sender, &inbound).await
}

/// Run one relay cycle for an already-extracted inbound message.
///
/// A completion failure aborts before any save, so the persisted history never
/// contains a human turn without its reply. The history is persisted before
/// delivery; a delivery failure is reported but does not roll it back.
pub async fn run_cycle<B: CompletionBackend>(
    store: &ConversationStore,
    backend: &B,
    sender: &dyn MessageSender,
    inbound: &InboundMessage,
) -> Result<RelayOutcome, RelayError> {
    if inbound.text == RESET_COMMAND {
        store.reset(&inbound.sender_id).await?;
        sender.send_message(&inbound.sender_id, RESET_ACK).await?;
        log::info!("conversation reset for sender {}", inbound.sender_id);
        return Ok(RelayOutcome::Reset);
    }

    let mut conversation = store.load(&inbound.sender_id).await;
    conversation.push(human_turn(&inbound.text));
    let prompt = assemble_prompt(&conversation);
    let completion = backend.complete(&prompt, &generation_params()).await?;
    conversation.push(completion.clone());
    store.save(&inbound.sender_id, &conversation).await?;

    let reply = extract_reply(&completion);
    sender.send_message(&inbound.sender_id, reply).await?;
    log::debug!(
        "relayed turn for sender {} ({} turns retained)",
        inbound.sender_id,
        conversation.retained().len()
    );
    Ok(RelayOutcome::Replied)
}
