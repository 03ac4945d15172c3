//! Telegram Bot API types.
//!
//! These types represent the subset of the Bot API the ledger needs:
//! long-polled updates, text messages with inline keyboards, and callback
//! query acknowledgement.
//!
//! See: <https://core.telegram.org/bots/api>

use serde::{Deserialize, Serialize};

use crewstore_core::UserId;

use super::super::{Button, CallbackAction, InboundEvent, OutboundMessage, TextMessage};

/// Envelope every Bot API method responds with.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

/// One incoming update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub data: Option<String>,
}

impl Update {
    /// Normalise into a transport-neutral event.
    ///
    /// Returns `None` for updates the ledger does not handle (edits, stickers,
    /// messages from bots, callbacks without data).
    #[must_use]
    pub fn into_event(self) -> Option<InboundEvent> {
        if let Some(query) = self.callback_query {
            let payload = query.data?;
            return Some(InboundEvent::Callback(CallbackAction {
                id: query.id,
                sender: UserId::new(query.from.id),
                payload,
            }));
        }

        let message = self.message?;
        let from = message.from.filter(|u| !u.is_bot)?;
        let text = message.text?;
        let command = command_name(&text, &message.entities);

        Some(InboundEvent::Message(TextMessage {
            sender: UserId::new(from.id),
            username: from.username.unwrap_or_default(),
            text,
            command,
        }))
    }
}

/// Command at the start of `text`, without the slash and any `@botname`.
fn command_name(text: &str, entities: &[MessageEntity]) -> Option<String> {
    let entity = entities
        .iter()
        .find(|e| e.kind == "bot_command" && e.offset == 0)?;

    // Entity offsets count UTF-16 units; commands are ASCII in practice.
    let raw: String = text.chars().take(entity.length).collect();
    let name = raw.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);

    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub timeout: u64,
    pub allowed_updates: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl From<&Button> for InlineKeyboardButton {
    fn from(button: &Button) -> Self {
        Self {
            text: button.label.clone(),
            callback_data: button.payload.clone(),
        }
    }
}

impl From<OutboundMessage> for SendMessage {
    fn from(message: OutboundMessage) -> Self {
        let reply_markup = (!message.buttons.is_empty()).then(|| InlineKeyboardMarkup {
            inline_keyboard: message
                .buttons
                .iter()
                .map(|row| row.iter().map(InlineKeyboardButton::from).collect())
                .collect(),
        });

        Self {
            chat_id: message.to.as_i64(),
            text: message.text,
            reply_markup,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerCallbackQuery {
    pub callback_query_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotCommand {
    pub command: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetMyCommands {
    pub commands: Vec<BotCommand>,
}
