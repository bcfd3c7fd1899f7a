//! Business logic services
//!
//! This module contains the service layer that sits between the views and
//! the backend:
//! - Auth service: sign-up (with profile creation), sign-in/out, refresh
//! - Profile service: own profile editing, admin listing and role changes
//! - Hero and skin services: catalog reads, admin-only mutations, ownership toggle
//! - Chat service: history with author labels, sending, live feed
//! - Checklist service: collection progress aggregation
//! - Notice service: transient success/error messages

pub mod auth;
pub mod chat;
pub mod checklist;
pub mod hero;
pub mod notice;
pub mod profile;
pub mod skin;

pub use auth::{AuthService, AuthServiceError, SignUpInput};
pub use chat::{ChatFeed, ChatService, ChatServiceError};
pub use checklist::ChecklistService;
pub use hero::{CatalogServiceError, HeroService};
pub use notice::{Notice, NoticeKind, NoticeService};
pub use profile::{filter_profiles, ProfileForm, ProfileService, ProfileServiceError};
pub use skin::SkinService;

use uuid::Uuid;

use crate::session::AuthSnapshot;

/// Why a snapshot may not perform an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Denied {
    NotAuthenticated,
    Forbidden,
}

/// Id of the signed-in player
pub(crate) fn require_user(snapshot: &AuthSnapshot) -> Result<Uuid, Denied> {
    snapshot.user_id().ok_or(Denied::NotAuthenticated)
}

/// Id of the signed-in player, who must be an administrator
pub(crate) fn require_admin(snapshot: &AuthSnapshot) -> Result<Uuid, Denied> {
    let user_id = require_user(snapshot)?;
    if snapshot.is_admin {
        Ok(user_id)
    } else {
        Err(Denied::Forbidden)
    }
}

/// Trim a required text field, rejecting blanks
pub(crate) fn required(value: &str, field: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Trim an optional text field; blank becomes `None`
pub(crate) fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for service tests

    use std::sync::Arc;

    use crate::backend::{Backend, MemoryBackend};
    use crate::models::{AuthUser, Session};
    use crate::session::AuthSnapshot;
    use chrono::{Duration, Utc};

    pub fn backend() -> (Arc<MemoryBackend>, Backend) {
        let memory = Arc::new(MemoryBackend::new());
        let backend = Backend::from_shared(memory.clone());
        (memory, backend)
    }

    /// Snapshot of a signed-in player
    pub fn snapshot_for(user: &AuthUser, is_admin: bool) -> AuthSnapshot {
        let mut snapshot = AuthSnapshot::default();
        snapshot.set_session(Session {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user: user.clone(),
        });
        snapshot.is_admin = is_admin;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthUser;

    #[test]
    fn test_require_user_and_admin() {
        let user = AuthUser::new(Uuid::new_v4(), "a@example.com");
        let signed_out = AuthSnapshot::default();
        let player = test_support::snapshot_for(&user, false);
        let admin = test_support::snapshot_for(&user, true);

        assert_eq!(require_user(&signed_out), Err(Denied::NotAuthenticated));
        assert_eq!(require_admin(&signed_out), Err(Denied::NotAuthenticated));
        assert_eq!(require_user(&player), Ok(user.id));
        assert_eq!(require_admin(&player), Err(Denied::Forbidden));
        assert_eq!(require_admin(&admin), Ok(user.id));
    }

    #[test]
    fn test_field_helpers() {
        assert_eq!(required("  Levi ", "Name"), Ok("Levi".to_string()));
        assert_eq!(required("   ", "Name"), Err("Name is required".to_string()));
        assert_eq!(optional(" "), None);
        assert_eq!(optional(" Wolves "), Some("Wolves".to_string()));
    }
}
