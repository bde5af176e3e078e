//! Chat front end.
//!
//! Defines the `ChatTransport` trait plus the inbound event and outbound
//! intent types. The router turns events into intents; the event loop
//! pulls events from a transport and applies the intents back to it.

pub mod event_loop;
pub mod router;
pub mod telegram;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{DeskError, UserId};

pub use event_loop::{EventLoop, LoopTiming};
pub use router::CommandRouter;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// One update pulled from the transport. `event` is `None` for update kinds
/// the desk does not handle; the id still advances the poll offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub update_id: i64,
    pub event: Option<InboundEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub chat_id: i64,
    /// Message the event refers to: the user's own message for commands and
    /// text, the bot's menu message for button presses.
    pub message_id: Option<i64>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `/name args`, with the slash and any `@botname` suffix stripped.
    Command { name: String, args: String },
    /// Inline button press.
    Callback { query_id: String, payload: String },
    /// Any other text message.
    Text(String),
}

/// Button payloads the desk emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Login(String),
    ShowRate,
}

pub const SHOW_RATE_PAYLOAD: &str = "show_rate";
const LOGIN_PREFIX: &str = "login_";

impl CallbackAction {
    pub fn parse(payload: &str) -> Option<Self> {
        if payload == SHOW_RATE_PAYLOAD {
            return Some(CallbackAction::ShowRate);
        }
        payload
            .strip_prefix(LOGIN_PREFIX)
            .filter(|id| !id.is_empty())
            .map(|id| CallbackAction::Login(id.to_string()))
    }

    pub fn payload(&self) -> String {
        match self {
            CallbackAction::Login(id) => format!("{LOGIN_PREFIX}{id}"),
            CallbackAction::ShowRate => SHOW_RATE_PAYLOAD.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: &CallbackAction) -> Self {
        Self {
            label: label.into(),
            payload: action.payload(),
        }
    }
}

/// Rows of inline buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<Button>>,
}

impl InlineKeyboard {
    pub fn single(button: Button) -> Self {
        Self { rows: vec![vec![button]] }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// Something the desk wants the transport to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Send {
        chat_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    Edit {
        chat_id: i64,
        message_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    /// Best effort: failures are ignored.
    Delete { chat_id: i64, message_id: i64 },
    /// Best effort: failures are ignored.
    AnswerCallback { query_id: String, text: Option<String> },
}

impl Intent {
    /// Whether a failure to apply this intent is expected and harmless.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, Intent::Delete { .. } | Intent::AnswerCallback { .. })
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Abstraction over the chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Long-poll for updates with id >= `offset`, waiting up to `timeout`.
    async fn poll_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, DeskError>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), DeskError>;

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), DeskError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), DeskError>;

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), DeskError>;
}
