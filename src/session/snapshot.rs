//! Consumer-facing view of the auth state

use uuid::Uuid;

use crate::models::{AuthUser, Profile, Session};

/// Point-in-time copy of the mirrored auth state.
///
/// `profile` and `is_admin` are only meaningful while `user` is set; every
/// write that clears the session clears them too.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSnapshot {
    pub session: Option<Session>,
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub is_admin: bool,
    pub is_loading: bool,
    /// Last session-fetch failure
    pub error: Option<String>,
}

impl AuthSnapshot {
    /// State before bootstrap has finished
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Default::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }

    /// Drop identity and everything derived from it in one step
    pub(crate) fn clear_identity(&mut self) {
        self.session = None;
        self.user = None;
        self.profile = None;
        self.is_admin = false;
    }

    /// Install a session; derived state is reset when it belongs to someone else
    pub(crate) fn set_session(&mut self, session: Session) {
        if self.user_id() != Some(session.user.id) {
            self.profile = None;
            self.is_admin = false;
        }
        self.user = Some(session.user.clone());
        self.session = Some(session);
        self.error = None;
    }
}
