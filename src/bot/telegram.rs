//! Telegram Bot API transport.
//!
//! API: `https://api.telegram.org/bot<token>/<method>`
//! Methods used: `getUpdates`, `sendMessage`, `editMessageText`,
//! `deleteMessage`, `answerCallbackQuery`.
//!
//! The token is part of the URL, so request errors are stripped of their
//! URL before they reach a log line.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{ChatTransport, EventKind, InboundEvent, InlineKeyboard, Update};
use crate::types::{DeskError, UserId};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Slack added to the HTTP timeout on top of the long-poll wait.
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
    #[serde(default)]
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    #[serde(default)]
    from: Option<TgUser>,
    chat: TgChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    #[serde(default)]
    message: Option<TgMessage>,
    #[serde(default)]
    data: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct TelegramTransport {
    http: Client,
    api_base: String,
    token: SecretString,
}

impl TelegramTransport {
    /// `poll_timeout` is the longest long-poll wait that will be requested.
    pub fn new(api_base: impl Into<String>, token: SecretString, poll_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(poll_timeout + HTTP_TIMEOUT_MARGIN)
            .user_agent("BullionDesk/0.1.0")
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, DeskError> {
        let url = format!("{}/bot{}/{method}", self.api_base, self.token.expose_secret());
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeskError::Transport(format!("{method}: {}", e.without_url())))?;

        let status = resp.status();
        let parsed: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| DeskError::Transport(format!("{method}: bad response ({status}): {}", e.without_url())))?;

        if !parsed.ok {
            let reason = parsed.description.unwrap_or_else(|| status.to_string());
            return Err(DeskError::Transport(format!("{method}: {reason}")));
        }
        parsed
            .result
            .ok_or_else(|| DeskError::Transport(format!("{method}: missing result")))
    }

    fn keyboard_markup(keyboard: &InlineKeyboard) -> Value {
        let rows: Vec<Vec<Value>> = keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| json!({ "text": b.label, "callback_data": b.payload }))
                    .collect()
            })
            .collect();
        json!({ "inline_keyboard": rows })
    }

    fn to_update(raw: TgUpdate) -> Update {
        let event = if let Some(cb) = raw.callback_query {
            cb.data.map(|payload| {
                let chat_id = cb.message.as_ref().map(|m| m.chat.id).unwrap_or(cb.from.id);
                InboundEvent {
                    user_id: UserId(cb.from.id),
                    chat_id,
                    message_id: cb.message.as_ref().map(|m| m.message_id),
                    kind: EventKind::Callback {
                        query_id: cb.id,
                        payload,
                    },
                }
            })
        } else {
            raw.message.and_then(Self::message_event)
        };
        Update {
            update_id: raw.update_id,
            event,
        }
    }

    fn message_event(msg: TgMessage) -> Option<InboundEvent> {
        let user_id = UserId(msg.from.as_ref()?.id);
        let text = msg.text?;
        Some(InboundEvent {
            user_id,
            chat_id: msg.chat.id,
            message_id: Some(msg.message_id),
            kind: parse_text(&text),
        })
    }
}

/// Split `/cmd@bot args` into a command, anything else is plain text.
fn parse_text(text: &str) -> EventKind {
    let Some(rest) = text.strip_prefix('/') else {
        return EventKind::Text(text.to_string());
    };
    let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return EventKind::Text(text.to_string());
    }
    EventKind::Command {
        name: name.to_string(),
        args: args.trim().to_string(),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn poll_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, DeskError> {
        let raw: Vec<TgUpdate> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": timeout.as_secs(),
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;
        debug!(count = raw.len(), offset, "Updates received");
        Ok(raw.into_iter().map(Self::to_update).collect())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), DeskError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(kb) = keyboard {
            body["reply_markup"] = Self::keyboard_markup(kb);
        }
        self.call::<Value>("sendMessage", body).await.map(|_| ())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), DeskError> {
        let mut body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        if let Some(kb) = keyboard {
            body["reply_markup"] = Self::keyboard_markup(kb);
        }
        self.call::<Value>("editMessageText", body).await.map(|_| ())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), DeskError> {
        self.call::<Value>("deleteMessage", json!({ "chat_id": chat_id, "message_id": message_id }))
            .await
            .map(|_| ())
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), DeskError> {
        let mut body = json!({ "callback_query_id": query_id });
        if let Some(t) = text {
            body["text"] = json!(t);
        }
        self.call::<Value>("answerCallbackQuery", body).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
