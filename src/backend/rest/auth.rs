//! GoTrue identity provider

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::RestBackend;
use crate::backend::{AuthSubscription, BackendError, BackendResult, IdentityProvider};
use crate::models::{AuthEvent, AuthUser, Session};

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    expires_at: Option<i64>,
    user: Value,
}

impl TokenResponse {
    fn into_session(self) -> BackendResult<Session> {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in));

        Ok(Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: auth_user_from_value(self.user)?,
        })
    }
}

/// Build an identity from a GoTrue user object, keeping the raw record
fn auth_user_from_value(value: Value) -> BackendResult<AuthUser> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| BackendError::Decode("user object without a valid id".to_string()))?;
    let email = value
        .get("email")
        .and_then(Value::as_str)
        .map(str::to_string);
    let created_at = value
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(AuthUser {
        id,
        email,
        created_at,
        raw: value,
    })
}

impl RestBackend {
    async fn store_session(&self, session: Option<Session>) {
        *self.client.session.write().await = session;
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> BackendResult<Session> {
        let res = self
            .client
            .auth_post(&format!("token?grant_type={}", grant_type), &body, None)
            .await
            .map_err(|e| match e {
                BackendError::Http { status: 400, .. } => BackendError::InvalidCredentials,
                other => other,
            })?;
        let token: TokenResponse = res
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        token.into_session()
    }
}

#[async_trait]
impl IdentityProvider for RestBackend {
    async fn current_session(&self) -> BackendResult<Option<Session>> {
        let session = self.client.session.read().await.clone();
        match session {
            Some(s) if s.is_expired() => {
                tracing::debug!("Stored session expired, refreshing");
                self.refresh_session().await.map(Some)
            }
            other => Ok(other),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<AuthUser> {
        let res = self
            .client
            .auth_post("signup", &json!({ "email": email, "password": password }), None)
            .await
            .map_err(|e| match e {
                BackendError::Http { status: 422, message } => BackendError::Conflict(message),
                other => other,
            })?;
        let body: Value = res
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        // Auto-confirmed projects answer with a full session
        if body.get("access_token").is_some() {
            let token: TokenResponse =
                serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
            let session = token.into_session()?;
            let user = session.user.clone();
            self.store_session(Some(session.clone())).await;
            self.emit(AuthEvent::SignedIn(session));
            return Ok(user);
        }

        match body.get("user") {
            Some(user) => auth_user_from_value(user.clone()),
            None => auth_user_from_value(body),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;

        self.store_session(Some(session.clone())).await;
        tracing::info!("Signed in as {}", session.user.id);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let token = self.client.session.read().await.as_ref().map(|s| s.access_token.clone());

        if let Some(token) = token {
            match self.client.auth_post("logout", &json!({}), Some(token)).await {
                // Already revoked server-side
                Ok(_) | Err(BackendError::Unauthorized) | Err(BackendError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.store_session(None).await;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn refresh_session(&self) -> BackendResult<Session> {
        let refresh_token = self
            .client
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(BackendError::Unauthorized)?;

        match self
            .token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(session) => {
                self.store_session(Some(session.clone())).await;
                self.emit(AuthEvent::TokenRefreshed(session.clone()));
                Ok(session)
            }
            Err(BackendError::InvalidCredentials) | Err(BackendError::Unauthorized) => {
                tracing::warn!("Refresh token rejected, signing out");
                self.store_session(None).await;
                self.emit(AuthEvent::SignedOut);
                Err(BackendError::Unauthorized)
            }
            Err(e) => Err(e),
        }
    }

    async fn is_admin(&self, user_id: Uuid) -> BackendResult<bool> {
        self.client
            .rpc("is_admin", &json!({ "user_id": user_id }))
            .await
    }

    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.auth_events.subscribe())
    }
}
