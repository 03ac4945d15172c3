//! Messaging gateway: the seam between the ledger and the chat transport.
//!
//! This module provides:
//! - [`Gateway`], the outbound side the services talk to
//! - [`InboundEvent`], the transport-neutral form of incoming updates
//! - [`Reply`]/[`OutboundMessage`] with rows of labeled action buttons
//! - [`telegram`], the Telegram Bot API adapter
//!
//! A button's payload comes back as a [`CallbackAction`] when pressed.

mod error;
pub mod telegram;

use std::future::Future;

use crewstore_core::UserId;

pub use error::GatewayError;

/// A labeled button; pressing it sends `payload` back as a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    #[must_use]
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Message content addressed to whoever triggered the action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
    /// Short toast shown when the reply answers a button press.
    pub toast: Option<String>,
}

impl Reply {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Append a row of buttons.
    #[must_use]
    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.buttons.push(row);
        }
        self
    }

    #[must_use]
    pub fn with_toast(mut self, toast: impl Into<String>) -> Self {
        self.toast = Some(toast.into());
        self
    }

    /// Address the reply to `to`.
    #[must_use]
    pub fn to(self, to: UserId) -> OutboundMessage {
        OutboundMessage {
            to,
            text: self.text,
            buttons: self.buttons,
        }
    }
}

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: UserId,
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

impl OutboundMessage {
    #[must_use]
    pub fn text(to: UserId, text: impl Into<String>) -> Self {
        Reply::text(text).to(to)
    }

    /// Payloads of every button, row by row.
    pub fn payloads(&self) -> impl Iterator<Item = &str> {
        self.buttons.iter().flatten().map(|b| b.payload.as_str())
    }
}

/// A free-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub sender: UserId,
    pub username: String,
    pub text: String,
    /// Command name without the leading slash, e.g. `start`.
    pub command: Option<String>,
}

/// A button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAction {
    /// Transport identifier used to acknowledge the press.
    pub id: String,
    pub sender: UserId,
    pub payload: String,
}

/// Transport-neutral inbound update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(TextMessage),
    Callback(CallbackAction),
}

impl InboundEvent {
    #[must_use]
    pub const fn sender(&self) -> UserId {
        match self {
            Self::Message(m) => m.sender,
            Self::Callback(c) => c.sender,
        }
    }
}

/// Outbound side of the chat transport.
pub trait Gateway: Send + Sync + 'static {
    /// Deliver one message.
    fn send(
        &self,
        message: OutboundMessage,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}
