//! WhatsApp Cloud API channel: webhook notification schema and sendMessage
//! via the Graph API.

use crate::channels::inbound::InboundMessage;
use crate::channels::MessageSender;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v15.0";
const SEND_TIMEOUT_SECS: u64 = 30;

/// Webhook notification body. Two incompatible shapes exist in the wild: the
/// nested Cloud API shape (canonical, accepted) and an older flattened record
/// list (recognized so it can be rejected explicitly instead of probed).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NotificationPayload {
    Provider(ProviderNotification),
    Flattened(Vec<FlattenedRecord>),
}

/// Nested Cloud API notification: `entry[].changes[].value`.
#[derive(Debug, Deserialize)]
pub struct ProviderNotification {
    #[serde(default)]
    pub entry: Vec<NotificationEntry>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationEntry {
    #[serde(default)]
    pub changes: Vec<NotificationChange>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationChange {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<NotificationContact>,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationContact {
    pub wa_id: String,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    /// Present for text messages only; media messages carry other keys.
    #[serde(default)]
    pub text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
pub struct MessageText {
    pub body: String,
}

/// Flattened record form used by an older webhook relay. Not supported.
#[derive(Debug, Deserialize)]
pub struct FlattenedRecord {
    #[serde(rename = "type")]
    pub typ: String,
    pub from: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification missing required field: {0}")]
    MissingField(&'static str),
    #[error("unsupported notification schema (flattened record form)")]
    UnsupportedSchema,
}

/// Extract sender id and message text from a notification. Fails with a
/// precise field error on the canonical shape, and rejects the flattened
/// shape outright.
pub fn extract_inbound(payload: &NotificationPayload) -> Result<InboundMessage, NotificationError> {
    let notification = match payload {
        NotificationPayload::Provider(n) => n,
        NotificationPayload::Flattened(_) => return Err(NotificationError::UnsupportedSchema),
    };
    let value = &notification
        .entry
        .first()
        .ok_or(NotificationError::MissingField("entry"))?
        .changes
        .first()
        .ok_or(NotificationError::MissingField("changes"))?
        .value;
    let sender_id = value
        .contacts
        .first()
        .ok_or(NotificationError::MissingField("contacts"))?
        .wa_id
        .clone();
    let text = value
        .messages
        .first()
        .ok_or(NotificationError::MissingField("messages"))?
        .text
        .as_ref()
        .ok_or(NotificationError::MissingField("text"))?
        .body
        .clone();
    Ok(InboundMessage { sender_id, text })
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("send request failed: {0}")]
    Request(reqwest::Error),
    #[error("send rejected: HTTP status {status} {body}")]
    Status { status: u16, body: String },
    #[error("send request timed out")]
    Timeout,
}

/// WhatsApp channel: sends text messages through the Cloud API messages call.
#[derive(Clone)]
pub struct WhatsAppChannel {
    api_token: String,
    number_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(api_token: String, number_id: String, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| GRAPH_API_BASE.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_token,
            number_id,
            api_base,
            client,
        }
    }

    /// POST {api_base}/{number_id}/messages — send a text message. Returns
    /// the HTTP status code. The provider reports delivery problems as 400,
    /// 401, 404, or 500; those map to `SendError::Status`.
    pub async fn send_message(&self, recipient_id: &str, text: &str) -> Result<u16, SendError> {
        let url = format!("{}/{}/messages", self.api_base, self.number_id);
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": recipient_id,
            "type": "text",
            "text": { "body": text }
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout
                } else {
                    SendError::Request(e)
                }
            })?;
        let status = res.status().as_u16();
        if matches!(status, 400 | 401 | 404 | 500) {
            let body = res.text().await.unwrap_or_default();
            return Err(SendError::Status { status, body });
        }
        Ok(status)
    }
}

#[async_trait]
impl MessageSender for WhatsAppChannel {
    async fn send_message(&self, recipient_id: &str, text: &str) -> Result<(), SendError> {
        WhatsAppChannel::send_message(self, recipient_id, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_payload(wa_id: &str, body: &str) -> String {
        format!(
            r#"{{
                "entry": [{{
                    "changes": [{{
                        "value": {{
                            "contacts": [{{"wa_id": "{}"}}],
                            "messages": [{{"text": {{"body": "{}"}}}}]
                        }}
                    }}]
                }}]
            }}"#,
            wa_id, body
        )
    }

    #[test]
    fn extracts_sender_and_text_from_nested_shape() {
        let payload: NotificationPayload =
            serde_json::from_str(&nested_payload("123", "Hello!")).expect("parse");
        let inbound = extract_inbound(&payload).expect("extract");
        assert_eq!(inbound.sender_id, "123");
        assert_eq!(inbound.text, "Hello!");
    }

    #[test]
    fn empty_object_is_missing_entry() {
        let payload: NotificationPayload = serde_json::from_str("{}").expect("parse");
        let err = extract_inbound(&payload).expect_err("must fail");
        assert!(matches!(err, NotificationError::MissingField("entry")));
    }

    #[test]
    fn missing_contacts_is_reported_precisely() {
        let json = r#"{"entry": [{"changes": [{"value": {"messages": [{"text": {"body": "hi"}}]}}]}]}"#;
        let payload: NotificationPayload = serde_json::from_str(json).expect("parse");
        let err = extract_inbound(&payload).expect_err("must fail");
        assert!(matches!(err, NotificationError::MissingField("contacts")));
    }

    #[test]
    fn media_message_without_text_is_rejected() {
        let json = r#"{"entry": [{"changes": [{"value": {
            "contacts": [{"wa_id": "123"}],
            "messages": [{"image": {"id": "img-1"}}]
        }}]}]}"#;
        let payload: NotificationPayload = serde_json::from_str(json).expect("parse");
        let err = extract_inbound(&payload).expect_err("must fail");
        assert!(matches!(err, NotificationError::MissingField("text")));
    }

    #[test]
    fn flattened_shape_is_rejected_not_probed() {
        let json = r#"[{"type": "text", "from": "123", "body": "Hello!"}]"#;
        let payload: NotificationPayload = serde_json::from_str(json).expect("parse");
        let err = extract_inbound(&payload).expect_err("must fail");
        assert!(matches!(err, NotificationError::UnsupportedSchema));
    }
}
