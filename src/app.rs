//! Application state
//!
//! Composition root: builds the backend from configuration, starts the
//! session synchronizer and wires every service to the shared collaborators.
//! Views receive an `AppState` (or pieces of it) instead of reaching for
//! globals.

use std::sync::Arc;

use crate::backend::{create_backend, Backend};
use crate::config::Config;
use crate::routes::{GuardDecision, RouteGuard};
use crate::services::{
    AuthService, ChatService, ChecklistService, HeroService, NoticeService, ProfileService,
    SkinService,
};
use crate::session::SessionHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Backend,
    pub session: SessionHandle,
    pub guard: Arc<RouteGuard>,
    pub auth_service: Arc<AuthService>,
    pub profile_service: Arc<ProfileService>,
    pub hero_service: Arc<HeroService>,
    pub skin_service: Arc<SkinService>,
    pub checklist_service: Arc<ChecklistService>,
    pub chat_service: Arc<ChatService>,
    pub notices: Arc<NoticeService>,
}

impl AppState {
    /// Build the backend selected by `config` and start the app on it.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let backend = create_backend(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Start the app on an existing backend
    pub fn with_backend(config: Config, backend: Backend) -> Self {
        let session = SessionHandle::start(backend.identity.clone(), backend.profiles.clone());
        tracing::info!("Session synchronizer started");

        let auth_service = Arc::new(AuthService::with_min_password_length(
            backend.identity.clone(),
            backend.profiles.clone(),
            config.auth.min_password_length,
        )
        .with_session(session.clone()));
        let profile_service =
            Arc::new(ProfileService::new(backend.profiles.clone()).with_session(session.clone()));
        let hero_service = Arc::new(HeroService::new(backend.catalog.clone()));
        let skin_service = Arc::new(SkinService::new(backend.catalog.clone()));
        let checklist_service = Arc::new(ChecklistService::new(backend.catalog.clone()));
        let chat_service = Arc::new(ChatService::new(
            backend.messages.clone(),
            backend.profiles.clone(),
            config.chat.history_limit,
            config.chat.max_message_length,
        ));
        let notices = Arc::new(NoticeService::new(config.notices.ttl_ms));

        Self {
            guard: Arc::new(RouteGuard::new(&config.auth)),
            config: Arc::new(config),
            backend,
            session,
            auth_service,
            profile_service,
            hero_service,
            skin_service,
            checklist_service,
            chat_service,
            notices,
        }
    }

    /// Guard decision for `location` against the current session
    pub fn navigate(&self, location: &str) -> GuardDecision {
        self.guard.check(&self.session.snapshot(), location)
    }

    /// Stop background work
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
        tracing::info!("Session synchronizer stopped");
    }
}
