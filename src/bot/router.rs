//! Command router and login gate.
//!
//! Maps each inbound event onto session transitions and cache reads, and
//! returns the intents to apply. The router never talks to the transport
//! itself, which keeps every reply testable without a chat service.

use std::sync::Arc;
use tracing::{debug, info};

use super::{Button, CallbackAction, EventKind, InboundEvent, InlineKeyboard, Intent};
use crate::format::{format_change, format_secondary, format_usd, SecondaryCurrency};
use crate::market::{MarketDataCache, RateUpdater};
use crate::registry::Registry;
use crate::session::{SessionState, SessionStore};
use crate::types::{DealerIdentity, DeskError, MarketSnapshot};

const START_COMMAND: &str = "start";
const SHOW_RATE_LABEL: &str = "Show current rate";
const REFRESH_LABEL: &str = "Refresh";

pub struct CommandRouter {
    registry: Arc<Registry>,
    sessions: Arc<SessionStore>,
    cache: Arc<MarketDataCache>,
    refresher: Option<Arc<RateUpdater>>,
    currency: SecondaryCurrency,
}

impl CommandRouter {
    pub fn new(
        registry: Arc<Registry>,
        sessions: Arc<SessionStore>,
        cache: Arc<MarketDataCache>,
        currency: SecondaryCurrency,
    ) -> Self {
        Self {
            registry,
            sessions,
            cache,
            refresher: None,
            currency,
        }
    }

    /// Kick off a background refresh whenever a user opens the menu.
    pub fn with_refresher(mut self, refresher: Arc<RateUpdater>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Decide what to do with one inbound event.
    pub fn handle(&self, event: &InboundEvent) -> Vec<Intent> {
        match &event.kind {
            EventKind::Command { name, .. } if name.eq_ignore_ascii_case(START_COMMAND) => self.on_start(event),
            EventKind::Command { name, .. } => {
                debug!(user = %event.user_id, command = %name, "Unsupported command");
                vec![send(event.chat_id, "Unknown command. Send /start to open the menu.", None)]
            }
            EventKind::Callback { query_id, payload } => self.on_callback(event, query_id, payload),
            EventKind::Text(text) => self.on_text(event, text),
        }
    }

    // -- Entry --------------------------------------------------------------

    fn on_start(&self, event: &InboundEvent) -> Vec<Intent> {
        self.sessions.reset(event.user_id);
        if let Some(refresher) = &self.refresher {
            refresher.trigger_refresh();
        }
        info!(user = %event.user_id, "Menu opened");
        vec![send(
            event.chat_id,
            "Welcome to the gold desk.\nSelect your dealer profile to log in:",
            Some(self.main_menu()),
        )]
    }

    fn main_menu(&self) -> InlineKeyboard {
        let mut rows: Vec<Vec<Button>> = self
            .registry
            .active_dealers()
            .into_iter()
            .map(|d| vec![Button::new(d.to_string(), &CallbackAction::Login(d.id.clone()))])
            .collect();
        rows.push(vec![show_rate_button()]);
        InlineKeyboard { rows }
    }

    // -- Buttons ------------------------------------------------------------

    fn on_callback(&self, event: &InboundEvent, query_id: &str, payload: &str) -> Vec<Intent> {
        let ack = Intent::AnswerCallback {
            query_id: query_id.to_string(),
            text: None,
        };
        match CallbackAction::parse(payload) {
            Some(CallbackAction::Login(dealer_id)) => {
                let mut intents = vec![ack];
                intents.push(self.on_login(event, &dealer_id));
                intents
            }
            Some(CallbackAction::ShowRate) => {
                let text = self.quote_text(&self.cache.read());
                let keyboard = InlineKeyboard::single(Button::new(REFRESH_LABEL, &CallbackAction::ShowRate));
                vec![ack, reply_or_edit(event, text, Some(keyboard))]
            }
            None => {
                debug!(user = %event.user_id, payload, "Unknown callback payload");
                vec![Intent::AnswerCallback {
                    query_id: query_id.to_string(),
                    text: Some("Unknown action".to_string()),
                }]
            }
        }
    }

    fn on_login(&self, event: &InboundEvent, dealer_id: &str) -> Intent {
        match self.sessions.begin_login(event.user_id, dealer_id) {
            Ok(dealer) => reply_or_edit(
                event,
                format!(
                    "Dealer: {} ({})\nPlease send your PIN as a plain message.",
                    dealer.display_name, dealer.level
                ),
                None,
            ),
            Err(e) => {
                info!(user = %event.user_id, dealer_id, error = %e, "Login rejected");
                send(event.chat_id, e.user_message(), None)
            }
        }
    }

    // -- Free text ----------------------------------------------------------

    fn on_text(&self, event: &InboundEvent, text: &str) -> Vec<Intent> {
        match self.sessions.current_state(event.user_id) {
            SessionState::Anonymous => {
                vec![send(event.chat_id, DeskError::NoActiveSession.user_message(), None)]
            }
            SessionState::AwaitingPin => self.on_pin(event, text),
            SessionState::Authenticated => {
                let name = self
                    .sessions
                    .session(event.user_id)
                    .map(|s| s.dealer().display_name.clone())
                    .unwrap_or_default();
                vec![send(
                    event.chat_id,
                    format!("You are logged in as {name}. Use the button below to see the current rate, or /start to switch dealer."),
                    Some(InlineKeyboard::single(show_rate_button())),
                )]
            }
        }
    }

    fn on_pin(&self, event: &InboundEvent, pin: &str) -> Vec<Intent> {
        let mut intents = Vec::with_capacity(2);
        // Scrub the PIN from the chat before replying.
        if let Some(message_id) = event.message_id {
            intents.push(Intent::Delete {
                chat_id: event.chat_id,
                message_id,
            });
        }

        match self.sessions.submit_pin(event.user_id, pin) {
            Ok(dealer) => intents.push(send(
                event.chat_id,
                self.welcome_text(&dealer),
                Some(InlineKeyboard::single(show_rate_button())),
            )),
            Err(e) => intents.push(send(event.chat_id, e.user_message(), None)),
        }
        intents
    }

    // -- Rendering ----------------------------------------------------------

    fn welcome_text(&self, dealer: &DealerIdentity) -> String {
        let snap = self.cache.read();
        format!(
            "Welcome, {dealer}.\nCurrent gold price: {} / oz",
            format_usd(Some(snap.price_usd_per_ounce))
        )
    }

    fn quote_text(&self, snap: &MarketSnapshot) -> String {
        let price = Some(snap.price_usd_per_ounce);
        format!(
            "Gold spot (XAU/USD)\n\
             Price: {} / oz\n\
             In {}: {}\n\
             Trend: {} ({})\n\
             Updated: {}",
            format_usd(price),
            self.currency.label,
            format_secondary(price, &self.currency),
            snap.trend.label(),
            format_change(snap.change),
            snap.last_update.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

fn show_rate_button() -> Button {
    Button::new(SHOW_RATE_LABEL, &CallbackAction::ShowRate)
}

fn send(chat_id: i64, text: impl Into<String>, keyboard: Option<InlineKeyboard>) -> Intent {
    Intent::Send {
        chat_id,
        text: text.into(),
        keyboard,
    }
}

/// Update the pressed menu in place when we know which message it was.
fn reply_or_edit(event: &InboundEvent, text: String, keyboard: Option<InlineKeyboard>) -> Intent {
    match event.message_id {
        Some(message_id) => Intent::Edit {
            chat_id: event.chat_id,
            message_id,
            text,
            keyboard,
        },
        None => send(event.chat_id, text, keyboard),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
