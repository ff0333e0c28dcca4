//! Identity and session types shared by the auth provider and HTTP layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A signed-in user as seen by the rest of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

/// The identity resolved for one request, if any.
///
/// Resolved once by middleware and handed to handlers explicitly.
#[derive(Debug, Clone, Default)]
pub struct Session(pub Option<Identity>);

impl Session {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

/// Session-change notifications pushed to subscribed clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Current state, sent when a client subscribes (and after a lag re-sync).
    SessionState { user: Option<Identity> },
    SignedOut { user_id: Uuid },
}

/// A [`SessionEvent`] addressed to one session. Internal to the broadcast
/// channel; `session_key` is the stored token hash and never leaves the
/// process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNotice {
    pub session_key: String,
    pub event: SessionEvent,
}
