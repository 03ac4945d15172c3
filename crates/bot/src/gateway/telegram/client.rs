//! Telegram Bot API client.
//!
//! Provides long polling for updates, message delivery with inline keyboards,
//! callback acknowledgement and command registration.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};

use super::super::{Gateway, GatewayError, OutboundMessage};
use super::types::{
    AnswerCallbackQuery, ApiResponse, BotCommand, GetUpdates, SendMessage, SetMyCommands, Update,
};

/// Telegram Bot API base URL.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Extra time on top of the long-poll timeout before the HTTP request gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Telegram API client.
#[derive(Clone)]
pub struct TelegramClient {
    /// HTTP client.
    client: Client,
    /// Bot token, part of every method URL.
    bot_token: SecretString,
    /// Long-poll timeout passed to `getUpdates`.
    poll_timeout: Duration,
    base_url: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("bot_token", &"[REDACTED]")
            .field("poll_timeout", &self.poll_timeout)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Create a new Telegram client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if the HTTP client cannot be built.
    pub fn new(bot_token: SecretString, poll_timeout: Duration) -> Result<Self, GatewayError> {
        Self::with_base_url(bot_token, poll_timeout, TELEGRAM_API_BASE)
    }

    /// Create a client against another Bot API server (e.g. a local one).
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if the HTTP client cannot be built.
    pub fn with_base_url(
        bot_token: SecretString,
        poll_timeout: Duration,
        base_url: &str,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(poll_timeout + POLL_GRACE)
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            client,
            bot_token,
            poll_timeout,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Call a Bot API method and unwrap the response envelope.
    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!(
            "{}/bot{}/{method}",
            self.base_url,
            self.bot_token.expose_secret()
        );

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            // reqwest errors carry the URL, and with it the token.
            .map_err(|e| GatewayError::Request(e.without_url().to_string()))?;

        let result: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Response(e.without_url().to_string()))?;

        if !result.ok {
            error!(
                method,
                error_code = ?result.error_code,
                description = ?result.description,
                "Telegram API error"
            );
            if result.error_code == Some(401) {
                return Err(GatewayError::Unauthorized);
            }
            return Err(GatewayError::Api(
                result
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        result
            .result
            .ok_or_else(|| GatewayError::Response(format!("{method}: missing result")))
    }

    /// Long-poll for updates after `offset`.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Telegram returns an error.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, GatewayError> {
        let request = GetUpdates {
            offset,
            limit: None,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: vec!["message", "callback_query"],
        };

        let updates: Vec<Update> = self.call("getUpdates", &request).await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), "Received updates");
        }
        Ok(updates)
    }

    /// Confirm every update before `offset` without waiting for new ones,
    /// so they are not delivered again after a restart.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Telegram returns an error.
    pub async fn acknowledge(&self, offset: i64) -> Result<(), GatewayError> {
        let request = GetUpdates {
            offset: Some(offset),
            limit: Some(1),
            timeout: 0,
            allowed_updates: vec!["message", "callback_query"],
        };
        let _: Vec<serde_json::Value> = self.call("getUpdates", &request).await?;
        Ok(())
    }

    /// Send a text message with optional inline keyboard.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Telegram returns an error.
    #[instrument(skip(self, message), fields(chat_id = %message.to))]
    pub async fn send_message(&self, message: OutboundMessage) -> Result<(), GatewayError> {
        let request = SendMessage::from(message);
        let _: serde_json::Value = self.call("sendMessage", &request).await?;
        debug!("Message sent");
        Ok(())
    }

    /// Acknowledge a button press, optionally with a toast.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Telegram returns an error.
    #[instrument(skip(self, text))]
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<String>,
    ) -> Result<(), GatewayError> {
        let request = AnswerCallbackQuery {
            callback_query_id: callback_query_id.to_string(),
            text,
        };
        let _: bool = self.call("answerCallbackQuery", &request).await?;
        Ok(())
    }

    /// Register the command list shown in the chat's menu.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Telegram returns an error.
    pub async fn set_my_commands(&self, commands: Vec<BotCommand>) -> Result<(), GatewayError> {
        let _: bool = self
            .call("setMyCommands", &SetMyCommands { commands })
            .await?;
        Ok(())
    }
}

impl Gateway for TelegramClient {
    async fn send(&self, message: OutboundMessage) -> Result<(), GatewayError> {
        self.send_message(message).await
    }
}
