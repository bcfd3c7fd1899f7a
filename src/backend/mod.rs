//! Backend layer
//!
//! Everything durable lives in a hosted backend. This module defines the four
//! collaborators the rest of the crate talks to:
//! - `IdentityProvider` - sessions, sign-up/in/out, auth events, admin lookup
//! - `ProfileStore` - player profiles
//! - `CatalogStore` - heroes, skins and collection membership
//! - `MessageChannel` - global chat
//!
//! Two implementations are provided:
//! - In-memory backend (default, also used by tests)
//! - REST backend for a Supabase-compatible deployment
//!
//! The driver is selected based on configuration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use skintrack::backend::create_backend;
//! use skintrack::config::Config;
//!
//! let backend = create_backend(&Config::default())?;
//! let session = backend.identity.current_session().await?;
//! ```

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{BackendDriver, Config};
use crate::models::{
    AuthEvent, AuthUser, ChatMessage, CreateHeroInput, CreateSkinInput, Hero, NewProfile,
    OwnedSkin, Profile, ProfileRole, ProfileSummary, Session, Skin, UpdateHeroInput,
    UpdateProfileInput, UpdateSkinInput,
};

pub use memory::MemoryBackend;
pub use rest::RestBackend;

/// Error type for backend calls
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Not authenticated")]
    Unauthorized,

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

// ============================================================================
// Subscriptions
// ============================================================================

/// Live feed of auth events.
///
/// Dropping the subscription (or calling `unsubscribe`) detaches it from the
/// provider.
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    pub fn new(receiver: broadcast::Receiver<AuthEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event. Returns `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Auth subscription lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Detach from the provider
    pub fn unsubscribe(self) {}
}

/// Live feed of newly inserted chat messages.
#[derive(Debug)]
pub struct MessageSubscription {
    source: MessageSource,
}

#[derive(Debug)]
enum MessageSource {
    Broadcast(broadcast::Receiver<ChatMessage>),
    Polling {
        receiver: mpsc::Receiver<ChatMessage>,
        task: JoinHandle<()>,
    },
}

impl MessageSubscription {
    /// Subscription fed directly by an in-process broadcast channel
    pub fn from_broadcast(receiver: broadcast::Receiver<ChatMessage>) -> Self {
        Self {
            source: MessageSource::Broadcast(receiver),
        }
    }

    /// Subscription fed by a background polling task; the task stops with the subscription
    pub fn from_polling(receiver: mpsc::Receiver<ChatMessage>, task: JoinHandle<()>) -> Self {
        Self {
            source: MessageSource::Polling { receiver, task },
        }
    }

    /// Wait for the next message. Returns `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        match &mut self.source {
            MessageSource::Broadcast(receiver) => loop {
                match receiver.recv().await {
                    Ok(message) => return Some(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Chat subscription lagged, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            MessageSource::Polling { receiver, .. } => receiver.recv().await,
        }
    }

    /// Stop receiving messages
    pub fn unsubscribe(self) {}
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        if let MessageSource::Polling { task, .. } = &self.source {
            task.abort();
        }
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Identity provider trait
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Session currently held by the provider, if any
    async fn current_session(&self) -> BackendResult<Option<Session>>;

    /// Register a new account
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<AuthUser>;

    /// Sign in with e-mail and password
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session>;

    /// End the current session
    async fn sign_out(&self) -> BackendResult<()>;

    /// Exchange the refresh token for a new session
    async fn refresh_session(&self) -> BackendResult<Session>;

    /// Administrator lookup for an identity
    async fn is_admin(&self, user_id: Uuid) -> BackendResult<bool>;

    /// Subscribe to auth state changes
    fn subscribe(&self) -> AuthSubscription;
}

/// Profile store trait
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert the profile created at registration
    async fn create_profile(&self, profile: NewProfile) -> BackendResult<Profile>;

    /// Get profile by user id
    async fn get_profile(&self, id: Uuid) -> BackendResult<Option<Profile>>;

    /// Update a profile
    async fn update_profile(&self, id: Uuid, input: &UpdateProfileInput) -> BackendResult<Profile>;

    /// List all profiles ordered by username
    async fn list_profiles(&self) -> BackendResult<Vec<Profile>>;

    /// Change a profile's role
    async fn set_role(&self, id: Uuid, role: ProfileRole) -> BackendResult<Profile>;

    /// Author labels for a set of user ids; unknown ids are skipped
    async fn profile_summaries(&self, ids: &[Uuid]) -> BackendResult<Vec<ProfileSummary>>;
}

/// Catalog store trait
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// List heroes ordered by name
    async fn list_heroes(&self) -> BackendResult<Vec<Hero>>;

    /// Get hero by id
    async fn get_hero(&self, id: i64) -> BackendResult<Option<Hero>>;

    /// Create a hero
    async fn create_hero(&self, input: &CreateHeroInput) -> BackendResult<Hero>;

    /// Update a hero
    async fn update_hero(&self, id: i64, input: &UpdateHeroInput) -> BackendResult<Hero>;

    /// Delete a hero together with its skins
    async fn delete_hero(&self, id: i64) -> BackendResult<()>;

    /// List all skins ordered by hero id, then name
    async fn list_skins(&self) -> BackendResult<Vec<Skin>>;

    /// List skins of one hero ordered by name
    async fn list_skins_by_hero(&self, hero_id: i64) -> BackendResult<Vec<Skin>>;

    /// Get skin by id
    async fn get_skin(&self, id: i64) -> BackendResult<Option<Skin>>;

    /// Create a skin
    async fn create_skin(&self, input: &CreateSkinInput) -> BackendResult<Skin>;

    /// Update a skin
    async fn update_skin(&self, id: i64, input: &UpdateSkinInput) -> BackendResult<Skin>;

    /// Delete a skin
    async fn delete_skin(&self, id: i64) -> BackendResult<()>;

    /// Ids of the skins a player owns
    async fn owned_skin_ids(&self, user_id: Uuid) -> BackendResult<Vec<i64>>;

    /// Membership row for a player and skin
    async fn find_owned(&self, user_id: Uuid, skin_id: i64) -> BackendResult<Option<OwnedSkin>>;

    /// Add a skin to a player's collection
    async fn add_owned(&self, user_id: Uuid, skin_id: i64) -> BackendResult<OwnedSkin>;

    /// Remove a membership row
    async fn remove_owned(&self, id: i64) -> BackendResult<()>;
}

/// Message channel trait
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Post a message
    async fn send(&self, user_id: Uuid, content: &str) -> BackendResult<ChatMessage>;

    /// Most recent messages, newest first
    async fn list_recent(&self, limit: usize) -> BackendResult<Vec<ChatMessage>>;

    /// Subscribe to newly inserted messages
    fn subscribe(&self) -> MessageSubscription;
}

// ============================================================================
// Factory
// ============================================================================

/// The four collaborators, shared across the app
#[derive(Clone)]
pub struct Backend {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub messages: Arc<dyn MessageChannel>,
}

impl Backend {
    /// Bundle a single object implementing every collaborator
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: IdentityProvider + ProfileStore + CatalogStore + MessageChannel + 'static,
    {
        Self {
            identity: backend.clone(),
            profiles: backend.clone(),
            catalog: backend.clone(),
            messages: backend,
        }
    }
}

/// Create a backend based on configuration
///
/// Returns the in-memory backend by default. The REST driver needs
/// `backend.url` and `backend.anon_key`.
pub fn create_backend(config: &Config) -> anyhow::Result<Backend> {
    match config.backend.driver {
        BackendDriver::Memory => {
            tracing::info!("Using in-memory backend");
            Ok(Backend::from_shared(Arc::new(MemoryBackend::new())))
        }
        BackendDriver::Rest => {
            let url = config.backend.url.as_deref().ok_or_else(|| {
                anyhow::anyhow!(
                    "Backend URL is required when using the rest driver. \
                     Set 'url' in backend configuration or use SKINTRACK_BACKEND_URL environment variable."
                )
            })?;
            let anon_key = config.backend.anon_key.as_deref().ok_or_else(|| {
                anyhow::anyhow!(
                    "Anon key is required when using the rest driver. \
                     Set 'anon_key' in backend configuration or use SKINTRACK_BACKEND_ANON_KEY environment variable."
                )
            })?;
            tracing::info!("Using REST backend at {}", url);
            let backend = RestBackend::new(
                url,
                anon_key,
                std::time::Duration::from_secs(config.backend.timeout_secs),
                std::time::Duration::from_millis(config.chat.poll_interval_ms),
            )?;
            Ok(Backend::from_shared(Arc::new(backend)))
        }
    }
}
