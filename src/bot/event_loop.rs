//! Resilient long-poll event loop.
//!
//! Two layers keep the desk alive:
//!
//! - `run_polling` long-polls the transport forever. A transport error in one
//!   cycle is logged, followed by a short pause, and polling resumes.
//! - `run_forever` supervises `run_polling`. Anything that escapes it (a
//!   non-transport error or a panic) is logged, and after a pause a fresh
//!   run starts. Restarts are iterations of a loop, never nested calls.
//!
//! The poll offset lives on the loop itself so a restarted run does not
//! replay updates that were already handled. Because the offset moves past a
//! whole batch up front, each update is handled in isolation: a panic while
//! routing or delivering one update is logged and the rest of the batch still
//! runs.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ChatTransport, CommandRouter, Intent};
use crate::market::RateUpdater;
use crate::types::DeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Long-poll wait per request.
    pub poll_timeout: Duration,
    /// Pause after a transport error before polling again.
    pub transport_error_pause: Duration,
    /// Pause before the supervisor restarts a failed run.
    pub restart_pause: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(30),
            transport_error_pause: Duration::from_secs(10),
            restart_pause: Duration::from_secs(5),
        }
    }
}

pub struct EventLoop {
    transport: Arc<dyn ChatTransport>,
    router: CommandRouter,
    updater: Option<Arc<RateUpdater>>,
    timing: LoopTiming,
    next_offset: AtomicI64,
}

impl EventLoop {
    pub fn new(transport: Arc<dyn ChatTransport>, router: CommandRouter, timing: LoopTiming) -> Self {
        Self {
            transport,
            router,
            updater: None,
            timing,
            next_offset: AtomicI64::new(0),
        }
    }

    /// Updater warmed up before polling starts and then left refreshing in
    /// the background.
    pub fn with_updater(mut self, updater: Arc<RateUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn next_offset(&self) -> i64 {
        self.next_offset.load(Ordering::SeqCst)
    }

    /// One synchronous refresh so the first dealer sees a recent quote.
    /// Failure only logs. Returns how long the background refresher should
    /// wait before its first attempt, or `None` without an updater.
    pub async fn warm_up(&self) -> Option<Duration> {
        let updater = self.updater.as_ref()?;
        Some(updater.refresh_cycle().await)
    }

    /// Warm up, hand the updater over to its background task, then
    /// supervise polling until the task is dropped.
    pub async fn run_forever(&self) {
        if let Some(first_pause) = self.warm_up().await {
            if let Some(updater) = &self.updater {
                updater.clone().spawn_after(first_pause);
            }
        }

        loop {
            let run_id = Uuid::new_v4();
            info!(%run_id, offset = self.next_offset(), "Polling run starting");

            let outcome = AssertUnwindSafe(self.run_polling()).catch_unwind().await;
            match outcome {
                Ok(Ok(never)) => match never {},
                Ok(Err(e)) => error!(%run_id, error = %e, "Polling run failed"),
                Err(panic) => error!(%run_id, panic = %panic_message(panic.as_ref()), "Polling run panicked"),
            }

            info!(
                %run_id,
                pause_secs = self.timing.restart_pause.as_secs_f64(),
                "Restarting polling run after pause"
            );
            tokio::time::sleep(self.timing.restart_pause).await;
        }
    }

    /// Poll forever. Transport errors are absorbed here; anything else is
    /// handed to the supervisor.
    pub async fn run_polling(&self) -> Result<std::convert::Infallible, DeskError> {
        loop {
            match self.poll_once().await {
                Ok(_) => {}
                Err(e @ DeskError::Transport(_)) => {
                    warn!(
                        error = %e,
                        pause_secs = self.timing.transport_error_pause.as_secs_f64(),
                        "Poll failed, pausing before retry"
                    );
                    tokio::time::sleep(self.timing.transport_error_pause).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One long-poll cycle: fetch updates, advance the offset past all of
    /// them, then route and apply each event. Returns the number of updates.
    pub async fn poll_once(&self) -> Result<usize, DeskError> {
        let offset = self.next_offset();
        let updates = self
            .transport
            .poll_updates(offset, self.timing.poll_timeout)
            .await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.next_offset.fetch_max(last + 1, Ordering::SeqCst);
        }

        for update in &updates {
            let Some(event) = &update.event else {
                debug!(update_id = update.update_id, "Skipping unsupported update");
                continue;
            };
            let handled = AssertUnwindSafe(async {
                let intents = self.router.handle(event);
                self.dispatch(intents).await;
            })
            .catch_unwind()
            .await;
            if let Err(panic) = handled {
                error!(
                    update_id = update.update_id,
                    user_id = event.user_id.0,
                    panic = %panic_message(panic.as_ref()),
                    "Update handling panicked, continuing with batch"
                );
            }
        }
        Ok(updates.len())
    }

    /// Apply intents in order. Failures are logged and never stop the rest.
    pub async fn dispatch(&self, intents: Vec<Intent>) {
        for intent in intents {
            let best_effort = intent.is_best_effort();
            let result = match &intent {
                Intent::Send { chat_id, text, keyboard } => {
                    self.transport.send_message(*chat_id, text, keyboard.as_ref()).await
                }
                Intent::Edit {
                    chat_id,
                    message_id,
                    text,
                    keyboard,
                } => {
                    self.transport
                        .edit_message(*chat_id, *message_id, text, keyboard.as_ref())
                        .await
                }
                Intent::Delete { chat_id, message_id } => self.transport.delete_message(*chat_id, *message_id).await,
                Intent::AnswerCallback { query_id, text } => {
                    self.transport.answer_callback(query_id, text.as_deref()).await
                }
            };

            if let Err(e) = result {
                if best_effort {
                    debug!(error = %e, "Best-effort action failed, ignoring");
                } else {
                    warn!(error = %e, "Failed to deliver reply");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
