//! Session lifecycle events emitted by the identity provider

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Session;

/// Auth state change notification.
///
/// Events that carry a session replace the mirrored one; `SignedOut` and
/// `UserDeleted` clear everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "session", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    UserUpdated(Session),
    UserDeleted,
}

impl AuthEvent {
    /// The new session, for events that carry one
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) | AuthEvent::UserUpdated(s) => {
                Some(s)
            }
            AuthEvent::SignedOut | AuthEvent::UserDeleted => None,
        }
    }

    /// True for events after which no identity remains
    pub fn clears_session(&self) -> bool {
        matches!(self, AuthEvent::SignedOut | AuthEvent::UserDeleted)
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthEvent::SignedIn(_) => write!(f, "SIGNED_IN"),
            AuthEvent::SignedOut => write!(f, "SIGNED_OUT"),
            AuthEvent::TokenRefreshed(_) => write!(f, "TOKEN_REFRESHED"),
            AuthEvent::UserUpdated(_) => write!(f, "USER_UPDATED"),
            AuthEvent::UserDeleted => write!(f, "USER_DELETED"),
        }
    }
}
