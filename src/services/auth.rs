//! Auth service
//!
//! Account flows on top of the identity provider:
//! - Sign-up: validate, register the account, create its profile
//! - Sign-in / sign-out / refresh
//!
//! Session state itself is not kept here; the synchronizer picks up the
//! provider's auth events.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::backend::{BackendError, IdentityProvider, ProfileStore};
use crate::models::{AuthUser, NewProfile, Profile, Session};
use crate::session::SessionHandle;

/// Default minimum password length
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid e-mail pattern"));

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Error types for auth service operations
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Wrong e-mail or password
    #[error("Invalid e-mail or password")]
    InvalidCredentials,

    /// E-mail or username already registered
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Backend failure
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Sign-up form
#[derive(Debug, Clone)]
pub struct SignUpInput {
    pub email: String,
    pub password: String,
    pub username: String,
}

/// Validate sign-up input
pub fn validate_sign_up_input(input: &SignUpInput, min_password_length: usize) -> Result<(), AuthServiceError> {
    if input.email.trim().is_empty() || input.password.is_empty() || input.username.trim().is_empty() {
        return Err(AuthServiceError::ValidationError(
            "E-mail, password and username are required".to_string(),
        ));
    }
    if !is_valid_email(input.email.trim()) {
        return Err(AuthServiceError::ValidationError(
            "Invalid e-mail format".to_string(),
        ));
    }
    if input.password.chars().count() < min_password_length {
        return Err(AuthServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            min_password_length
        )));
    }
    Ok(())
}

/// Auth service for account flows
pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    min_password_length: usize,
    session: Option<SessionHandle>,
}

impl AuthService {
    /// Create a new auth service with the default password rule
    pub fn new(identity: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self::with_min_password_length(identity, profiles, DEFAULT_MIN_PASSWORD_LENGTH)
    }

    /// Create a new auth service with a custom minimum password length
    pub fn with_min_password_length(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        min_password_length: usize,
    ) -> Self {
        Self {
            identity,
            profiles,
            min_password_length,
            session: None,
        }
    }

    /// Refresh this session's snapshot once a new account's profile exists
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    /// Register an account and create its profile (role `user`, 0 trophies).
    ///
    /// The player is not signed in afterwards unless the provider does so on
    /// its own.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for blank fields, a malformed e-mail or a short password
    /// - `UserExists` if the e-mail or username is taken
    /// - `Backend` for anything else the backend reports
    pub async fn sign_up(&self, input: SignUpInput) -> Result<(AuthUser, Profile), AuthServiceError> {
        validate_sign_up_input(&input, self.min_password_length)?;

        let user = self
            .identity
            .sign_up(input.email.trim(), &input.password)
            .await
            .map_err(|e| match e {
                BackendError::Conflict(msg) => AuthServiceError::UserExists(msg),
                other => AuthServiceError::Backend(other),
            })?;

        let profile = self
            .profiles
            .create_profile(NewProfile::for_registration(user.id, input.username.trim()))
            .await
            .map_err(|e| {
                tracing::error!("Account {} registered but profile creation failed: {}", user.id, e);
                match e {
                    BackendError::Conflict(msg) => AuthServiceError::UserExists(msg),
                    other => AuthServiceError::Backend(other),
                }
            })?;

        tracing::info!("Registered {} ({})", profile.username, user.id);

        // A provider that signs new accounts in announces it before the profile row exists
        if let Some(ref session) = self.session {
            session.reload();
        }
        Ok((user, profile))
    }

    /// Sign in with e-mail and password
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthServiceError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthServiceError::ValidationError(
                "E-mail and password are required".to_string(),
            ));
        }

        self.identity
            .sign_in(email.trim(), password)
            .await
            .map_err(|e| match e {
                BackendError::InvalidCredentials => AuthServiceError::InvalidCredentials,
                other => AuthServiceError::Backend(other),
            })
    }

    /// Sign out of the current session
    pub async fn sign_out(&self) -> Result<(), AuthServiceError> {
        self.identity.sign_out().await?;
        Ok(())
    }

    /// Exchange the refresh token for a new session
    pub async fn refresh(&self) -> Result<Session, AuthServiceError> {
        Ok(self.identity.refresh_session().await?)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Passwords shorter than the minimum are always rejected.
        #[test]
        fn property_short_passwords_rejected(password in "[a-zA-Z0-9]{1,5}") {
            let input = SignUpInput {
                email: "amy@example.com".to_string(),
                password,
                username: "amy".to_string(),
            };
            prop_assert!(validate_sign_up_input(&input, 6).is_err());
        }

        /// Well-formed input is accepted.
        #[test]
        fn property_valid_input_accepted(
            local in "[a-z][a-z0-9]{0,10}",
            domain in "[a-z]{2,10}",
            password in "[a-zA-Z0-9]{6,20}",
            username in "[a-zA-Z][a-zA-Z0-9_]{0,15}",
        ) {
            let input = SignUpInput {
                email: format!("{}@{}.com", local, domain),
                password,
                username,
            };
            prop_assert!(validate_sign_up_input(&input, 6).is_ok());
        }
    }
}
