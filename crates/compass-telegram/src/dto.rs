//! Wire types for the Bot API subset this service consumes.

use serde::Deserialize;

/// The envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<i64>,
}

/// `getMe` result.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default)]
pub struct GetUpdatesParams {
    pub offset: i64,
    pub timeout_sec: i64,
    pub allowed_updates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub reply_to_message_id: Option<i64>,
}

/// Flattened view of a message-bearing update.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub update_id: i64,
    pub message_id: i64,
    pub chat_id: i64,
    pub text: String,
}

/// `None` for update kinds this worker does not handle (no `message`).
pub fn incoming_from_update(update: &Update) -> Option<IncomingMessage> {
    let message = update.message.as_ref()?;
    Some(IncomingMessage {
        update_id: update.update_id,
        message_id: message.message_id,
        chat_id: message.chat.id,
        text: message.text.clone(),
    })
}
