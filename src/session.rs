//! Per-user login state machine.
//!
//! ```text
//! Anonymous --begin_login--> AwaitingPin --submit_pin(match)--> Authenticated
//!                            AwaitingPin --submit_pin(mismatch)--> AwaitingPin
//! AwaitingPin | Authenticated --reset--> Anonymous
//! ```
//!
//! Sessions live in a `DashMap`, so operations on different users touch
//! different shards and never block one another. Every transition happens
//! under the entry's own lock. Nothing is persisted.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::registry::Registry;
use crate::types::{DealerIdentity, DeskError, UserId};

/// A user's login session. Absence of an entry means anonymous.
#[derive(Debug, Clone, PartialEq)]
pub enum DealerSession {
    AwaitingPin { dealer_id: String, dealer: DealerIdentity },
    Authenticated { dealer: DealerIdentity },
}

impl DealerSession {
    pub fn state(&self) -> SessionState {
        match self {
            DealerSession::AwaitingPin { .. } => SessionState::AwaitingPin,
            DealerSession::Authenticated { .. } => SessionState::Authenticated,
        }
    }

    pub fn dealer(&self) -> &DealerIdentity {
        match self {
            DealerSession::AwaitingPin { dealer, .. } | DealerSession::Authenticated { dealer } => dealer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    AwaitingPin,
    Authenticated,
}

/// Number of live sessions per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    pub awaiting_pin: usize,
    pub authenticated: usize,
}

pub struct SessionStore {
    registry: Arc<Registry>,
    sessions: DashMap<UserId, DealerSession>,
}

impl SessionStore {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            sessions: DashMap::new(),
        }
    }

    /// Drop any session for `user`. No-op when none exists.
    pub fn reset(&self, user: UserId) {
        if self.sessions.remove(&user).is_some() {
            debug!(%user, "Session reset");
        }
    }

    /// Start a login for `dealer_id`, overwriting whatever the user had.
    pub fn begin_login(&self, user: UserId, dealer_id: &str) -> Result<DealerIdentity, DeskError> {
        let dealer = self
            .registry
            .active_dealer(dealer_id)
            .cloned()
            .ok_or_else(|| DeskError::UnknownDealer(dealer_id.to_string()))?;

        self.sessions.insert(
            user,
            DealerSession::AwaitingPin {
                dealer_id: dealer_id.to_string(),
                dealer: dealer.clone(),
            },
        );
        info!(%user, dealer_id, "Login started");
        Ok(dealer)
    }

    /// Check a PIN attempt. A mismatch keeps the session waiting; there is
    /// no attempt limit.
    pub fn submit_pin(&self, user: UserId, pin: &str) -> Result<DealerIdentity, DeskError> {
        let mut entry = self.sessions.get_mut(&user).ok_or(DeskError::NoActiveSession)?;

        let dealer = match &*entry {
            DealerSession::AwaitingPin { dealer_id, dealer } if dealer_id == pin => dealer.clone(),
            DealerSession::AwaitingPin { dealer_id, .. } => {
                debug!(%user, dealer_id = %dealer_id, "PIN mismatch");
                return Err(DeskError::WrongPin);
            }
            DealerSession::Authenticated { .. } => return Err(DeskError::NoActiveSession),
        };

        *entry = DealerSession::Authenticated { dealer: dealer.clone() };
        info!(%user, dealer_id = %dealer.id, "Dealer authenticated");
        Ok(dealer)
    }

    pub fn current_state(&self, user: UserId) -> SessionState {
        self.sessions
            .get(&user)
            .map(|s| s.state())
            .unwrap_or(SessionState::Anonymous)
    }

    /// A copy of the user's session, if any.
    pub fn session(&self, user: UserId) -> Option<DealerSession> {
        self.sessions.get(&user).map(|s| s.clone())
    }

    pub fn counts(&self) -> SessionCounts {
        self.sessions
            .iter()
            .fold(SessionCounts::default(), |mut acc, entry| {
                match entry.value().state() {
                    SessionState::AwaitingPin => acc.awaiting_pin += 1,
                    SessionState::Authenticated => acc.authenticated += 1,
                    SessionState::Anonymous => {}
                }
                acc
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
