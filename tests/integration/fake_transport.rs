//! In-memory chat transport and quote source for integration testing.
//!
//! `FakeTransport` serves scripted poll results (update batches, transport
//! errors, or a panic) and records every outbound call. `FakeQuoteSource`
//! returns whatever price or error the test sets. No network involved.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bullion_desk::bot::{ChatTransport, EventKind, InboundEvent, InlineKeyboard, Update};
use bullion_desk::market::QuoteSource;
use bullion_desk::types::{DeskError, UserId};

/// What the next `poll_updates` call should do.
#[derive(Debug, Clone)]
pub enum PollStep {
    Batch(Vec<Update>),
    Fail(String),
    Panic(String),
}

/// A recorded outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Send { chat_id: i64, text: String, keyboard: Option<InlineKeyboard> },
    Edit { chat_id: i64, message_id: i64, text: String, keyboard: Option<InlineKeyboard> },
    Delete { chat_id: i64, message_id: i64 },
    Answer { query_id: String, text: Option<String> },
}

impl Outbound {
    pub fn text(&self) -> Option<&str> {
        match self {
            Outbound::Send { text, .. } | Outbound::Edit { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn keyboard(&self) -> Option<&InlineKeyboard> {
        match self {
            Outbound::Send { keyboard, .. } | Outbound::Edit { keyboard, .. } => keyboard.as_ref(),
            _ => None,
        }
    }
}

pub struct FakeTransport {
    script: Arc<Mutex<VecDeque<PollStep>>>,
    outbound: Arc<Mutex<Vec<Outbound>>>,
    offsets: Arc<Mutex<Vec<i64>>>,
    /// When set, deletes fail like a chat that forbids them.
    fail_deletes: bool,
    /// Sends whose text contains this marker panic mid-delivery.
    panic_on_send: Option<String>,
    /// How long an empty poll blocks, standing in for the long-poll wait.
    idle_wait: Duration,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            outbound: Arc::new(Mutex::new(Vec::new())),
            offsets: Arc::new(Mutex::new(Vec::new())),
            fail_deletes: false,
            panic_on_send: None,
            idle_wait: Duration::from_millis(5),
        }
    }

    pub fn with_failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn with_panicking_send(mut self, marker: &str) -> Self {
        self.panic_on_send = Some(marker.to_string());
        self
    }

    pub fn push(&self, step: PollStep) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn push_batch(&self, updates: Vec<Update>) {
        self.push(PollStep::Batch(updates));
    }

    pub fn outbound(&self) -> Vec<Outbound> {
        self.outbound.lock().unwrap().clone()
    }

    pub fn take_outbound(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.outbound.lock().unwrap())
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }

    pub fn pending_steps(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    fn record(&self, out: Outbound) {
        self.outbound.lock().unwrap().push(out);
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn poll_updates(&self, offset: i64, _timeout: Duration) -> Result<Vec<Update>, DeskError> {
        self.offsets.lock().unwrap().push(offset);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(PollStep::Batch(updates)) => Ok(updates),
            Some(PollStep::Fail(msg)) => Err(DeskError::Transport(msg)),
            Some(PollStep::Panic(msg)) => panic!("{msg}"),
            None => {
                tokio::time::sleep(self.idle_wait).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str, keyboard: Option<&InlineKeyboard>) -> Result<(), DeskError> {
        if let Some(marker) = &self.panic_on_send {
            if text.contains(marker.as_str()) {
                panic!("send crashed on {marker:?}");
            }
        }
        self.record(Outbound::Send {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), DeskError> {
        self.record(Outbound::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), DeskError> {
        if self.fail_deletes {
            return Err(DeskError::Transport("Bad Request: message can't be deleted".into()));
        }
        self.record(Outbound::Delete { chat_id, message_id });
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), DeskError> {
        self.record(Outbound::Answer {
            query_id: query_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Update builders
// ---------------------------------------------------------------------------

pub const CHAT: i64 = 555;
pub const USER: UserId = UserId(555);

pub fn command(update_id: i64, name: &str) -> Update {
    Update {
        update_id,
        event: Some(InboundEvent {
            user_id: USER,
            chat_id: CHAT,
            message_id: Some(update_id),
            kind: EventKind::Command {
                name: name.to_string(),
                args: String::new(),
            },
        }),
    }
}

pub fn press(update_id: i64, payload: &str, menu_message_id: i64) -> Update {
    Update {
        update_id,
        event: Some(InboundEvent {
            user_id: USER,
            chat_id: CHAT,
            message_id: Some(menu_message_id),
            kind: EventKind::Callback {
                query_id: format!("cb-{update_id}"),
                payload: payload.to_string(),
            },
        }),
    }
}

pub fn text(update_id: i64, body: &str) -> Update {
    Update {
        update_id,
        event: Some(InboundEvent {
            user_id: USER,
            chat_id: CHAT,
            message_id: Some(update_id),
            kind: EventKind::Text(body.to_string()),
        }),
    }
}

// ---------------------------------------------------------------------------
// Quote source
// ---------------------------------------------------------------------------

pub struct FakeQuoteSource {
    next: Mutex<Result<f64, DeskError>>,
    calls: Mutex<usize>,
}

impl FakeQuoteSource {
    pub fn new(price: f64) -> Self {
        Self {
            next: Mutex::new(Ok(price)),
            calls: Mutex::new(0),
        }
    }

    pub fn set_price(&self, price: f64) {
        *self.next.lock().unwrap() = Ok(price);
    }

    pub fn set_error(&self, msg: &str) {
        *self.next.lock().unwrap() = Err(DeskError::QuoteFetch(msg.to_string()));
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl QuoteSource for FakeQuoteSource {
    async fn fetch_price(&self) -> Result<f64, DeskError> {
        *self.calls.lock().unwrap() += 1;
        self.next.lock().unwrap().clone()
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_transport_follows_script() {
        let t = FakeTransport::new();
        t.push_batch(vec![text(1, "hi")]);
        t.push(PollStep::Fail("boom".into()));

        assert_eq!(t.poll_updates(0, Duration::ZERO).await.unwrap().len(), 1);
        assert!(t.poll_updates(2, Duration::ZERO).await.is_err());
        assert!(t.poll_updates(2, Duration::ZERO).await.unwrap().is_empty());
        assert_eq!(t.offsets(), vec![0, 2, 2]);
        assert_eq!(t.pending_steps(), 0);
    }

    #[tokio::test]
    async fn test_fake_transport_records_calls() {
        let t = FakeTransport::new().with_failing_deletes();
        t.send_message(CHAT, "hello", None).await.unwrap();
        assert!(t.delete_message(CHAT, 3).await.is_err());
        t.answer_callback("cb-1", None).await.unwrap();
        let out = t.take_outbound();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text(), Some("hello"));
        assert!(t.outbound().is_empty());
    }

    #[tokio::test]
    async fn test_fake_quote_source() {
        let q = FakeQuoteSource::new(2400.0);
        assert_eq!(q.fetch_price().await.unwrap(), 2400.0);
        q.set_error("down");
        assert!(q.fetch_price().await.is_err());
        q.set_price(2500.0);
        assert_eq!(q.fetch_price().await.unwrap(), 2500.0);
        assert_eq!(q.calls(), 3);
    }
}
