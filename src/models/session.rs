//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::AuthUser;

/// Credential bundle issued by the identity provider.
///
/// The application never creates sessions on its own; it only mirrors the
/// one the provider hands out on sign-in or refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token sent with every table request
    pub access_token: String,
    /// Token exchanged for a new session when the access token runs out
    pub refresh_token: String,
    /// Expiration timestamp of the access token
    pub expires_at: DateTime<Utc>,
    /// The account the session belongs to
    pub user: AuthUser,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Time left before the access token expires, zero once expired
    pub fn remaining(&self) -> Duration {
        let left = self.expires_at - Utc::now();
        if left < Duration::zero() {
            Duration::zero()
        } else {
            left
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session_expiring_in(seconds: i64) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + Duration::seconds(seconds),
            user: AuthUser::new(Uuid::new_v4(), "player@example.com"),
        }
    }

    #[test]
    fn test_session_not_expired() {
        let session = session_expiring_in(3600);
        assert!(!session.is_expired());
        assert!(session.remaining() > Duration::minutes(59));
    }

    #[test]
    fn test_session_expired() {
        let session = session_expiring_in(-10);
        assert!(session.is_expired());
        assert_eq!(session.remaining(), Duration::zero());
    }
}
