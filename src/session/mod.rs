//! Session synchronizer
//!
//! Mirrors the identity provider's session into an `AuthSnapshot` and derives
//! the profile and administrator flag for the signed-in identity.
//!
//! One background task is the only writer; readers get clones or a
//! `watch::Receiver`. The task:
//! 1. subscribes to auth events (before anything else, so none is missed)
//! 2. bootstraps from the provider's current session
//! 3. applies events in arrival order until shut down
//!
//! Every write checks the liveness flag first, so results that resolve after
//! teardown never reach the snapshot.

mod snapshot;

pub use snapshot::AuthSnapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{AuthSubscription, IdentityProvider, ProfileStore};
use crate::models::AuthEvent;

/// Handle to the running synchronizer.
///
/// Cheap to clone. Dropping the last clone tears the synchronizer down.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionHandleInner>,
}

struct SessionHandleInner {
    state: watch::Receiver<AuthSnapshot>,
    reload: mpsc::UnboundedSender<()>,
    alive: Arc<AtomicBool>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    /// Subscribe to the provider and start the synchronizer task
    pub fn start(identity: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        let (state_tx, state_rx) = watch::channel(AuthSnapshot::loading());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        // Taken here, before bootstrap runs
        let subscription = identity.subscribe();

        let synchronizer = Synchronizer {
            identity,
            profiles,
            state: state_tx,
            alive: alive.clone(),
        };
        let join = tokio::spawn(synchronizer.run(subscription, reload_rx, shutdown_rx));

        Self {
            inner: Arc::new(SessionHandleInner {
                state: state_rx,
                reload: reload_tx,
                alive,
                shutdown: Mutex::new(Some(shutdown_tx)),
                join: Mutex::new(Some(join)),
            }),
        }
    }

    /// Current state
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every published state
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.state.clone()
    }

    /// Resolve once bootstrap has finished
    pub async fn wait_until_loaded(&self) -> AuthSnapshot {
        let mut rx = self.inner.state.clone();
        let snapshot = match rx.wait_for(|s| !s.is_loading).await {
            Ok(snapshot) => snapshot.clone(),
            // Synchronizer gone: whatever was last published is final
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    /// Ask the synchronizer to re-fetch the profile and admin flag.
    ///
    /// Used after the signed-in player's profile or role was changed here,
    /// since no auth event announces that.
    pub fn reload(&self) {
        let _ = self.inner.reload.send(());
    }

    pub fn is_running(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Stop the synchronizer and wait for its task to finish
    pub async fn shutdown(&self) {
        self.inner.request_shutdown();
        let join = self
            .inner
            .join
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(join) = join {
            if let Err(err) = join.await {
                if !err.is_cancelled() {
                    tracing::warn!("Session synchronizer task failed: {}", err);
                }
            }
        }
    }
}

impl SessionHandleInner {
    fn request_shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(tx) = self.shutdown.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for SessionHandleInner {
    fn drop(&mut self) {
        self.request_shutdown();
        if let Some(join) = self.join.lock().unwrap_or_else(|e| e.into_inner()).take() {
            join.abort();
        }
    }
}

// ============================================================================
// Synchronizer task
// ============================================================================

struct Synchronizer {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    state: watch::Sender<AuthSnapshot>,
    alive: Arc<AtomicBool>,
}

impl Synchronizer {
    async fn run(
        self,
        subscription: AuthSubscription,
        reload: mpsc::UnboundedReceiver<()>,
        shutdown: oneshot::Receiver<()>,
    ) {
        tokio::select! {
            _ = shutdown => {}
            _ = self.sync(subscription, reload) => {}
        }
        // Subscription dropped with the losing branch: unsubscribed
        tracing::debug!("Session synchronizer stopped");
    }

    async fn sync(&self, mut subscription: AuthSubscription, mut reload: mpsc::UnboundedReceiver<()>) {
        self.bootstrap().await;

        loop {
            tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) if self.is_alive() => self.handle_event(event).await,
                    _ => break,
                },
                request = reload.recv() => match request {
                    Some(()) if self.is_alive() => {
                        let user_id = self.state.borrow().user_id();
                        if let Some(user_id) = user_id {
                            self.load_derived(user_id).await;
                        }
                    }
                    _ => break,
                },
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Apply a state change unless torn down. Returns whether it was applied.
    fn publish(&self, modify: impl FnOnce(&mut AuthSnapshot)) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.state.send_modify(modify);
        true
    }

    async fn bootstrap(&self) {
        match self.identity.current_session().await {
            Ok(Some(session)) => {
                let user_id = session.user.id;
                tracing::info!("Restored session for {}", user_id);
                if self.publish(|s| s.set_session(session)) {
                    self.load_derived(user_id).await;
                }
                self.publish(|s| s.is_loading = false);
            }
            Ok(None) => {
                tracing::debug!("No session to restore");
                self.publish(|s| {
                    s.clear_identity();
                    s.error = None;
                    s.is_loading = false;
                });
            }
            Err(e) => {
                tracing::warn!("Failed to fetch session: {}", e);
                self.publish(|s| {
                    s.clear_identity();
                    s.error = Some(e.to_string());
                    s.is_loading = false;
                });
            }
        }
    }

    async fn handle_event(&self, event: AuthEvent) {
        tracing::debug!("Auth event: {}", event);
        match event {
            AuthEvent::SignedIn(session)
            | AuthEvent::TokenRefreshed(session)
            | AuthEvent::UserUpdated(session) => {
                let user_id = session.user.id;
                if self.publish(|s| s.set_session(session)) {
                    self.load_derived(user_id).await;
                }
            }
            AuthEvent::SignedOut | AuthEvent::UserDeleted => {
                self.publish(|s| {
                    s.clear_identity();
                    s.error = None;
                });
            }
        }
    }

    /// Fetch profile and admin flag for `user_id`; failures keep the previous values
    async fn load_derived(&self, user_id: Uuid) {
        let (profile, is_admin) = futures::join!(
            self.profiles.get_profile(user_id),
            self.identity.is_admin(user_id)
        );

        match profile {
            Ok(profile) => {
                self.publish(|s| {
                    if s.user_id() == Some(user_id) {
                        s.profile = profile;
                    }
                });
            }
            Err(e) => tracing::warn!("Failed to fetch profile for {}: {}", user_id, e),
        }

        match is_admin {
            Ok(is_admin) => {
                self.publish(|s| {
                    if s.user_id() == Some(user_id) {
                        s.is_admin = is_admin;
                    }
                });
            }
            Err(e) => tracing::warn!("Failed to check admin flag for {}: {}", user_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult, MemoryBackend};
    use crate::models::{AuthUser, NewProfile, Profile, ProfileRole, ProfileSummary, Session, UpdateProfileInput};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Memory backend with switchable failures
    struct Flaky {
        inner: MemoryBackend,
        fail_session: AtomicBool,
        fail_profile: AtomicBool,
    }

    impl Flaky {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryBackend::new(),
                fail_session: AtomicBool::new(false),
                fail_profile: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl IdentityProvider for Flaky {
        async fn current_session(&self) -> BackendResult<Option<Session>> {
            if self.fail_session.load(Ordering::SeqCst) {
                return Err(BackendError::Transport("connection refused".to_string()));
            }
            self.inner.current_session().await
        }
        async fn sign_up(&self, email: &str, password: &str) -> BackendResult<AuthUser> {
            self.inner.sign_up(email, password).await
        }
        async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
            self.inner.sign_in(email, password).await
        }
        async fn sign_out(&self) -> BackendResult<()> {
            self.inner.sign_out().await
        }
        async fn refresh_session(&self) -> BackendResult<Session> {
            self.inner.refresh_session().await
        }
        async fn is_admin(&self, user_id: Uuid) -> BackendResult<bool> {
            self.inner.is_admin(user_id).await
        }
        fn subscribe(&self) -> AuthSubscription {
            IdentityProvider::subscribe(&self.inner)
        }
    }

    #[async_trait]
    impl ProfileStore for Flaky {
        async fn create_profile(&self, profile: NewProfile) -> BackendResult<Profile> {
            self.inner.create_profile(profile).await
        }
        async fn get_profile(&self, id: Uuid) -> BackendResult<Option<Profile>> {
            if self.fail_profile.load(Ordering::SeqCst) {
                return Err(BackendError::Http {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            self.inner.get_profile(id).await
        }
        async fn update_profile(&self, id: Uuid, input: &UpdateProfileInput) -> BackendResult<Profile> {
            self.inner.update_profile(id, input).await
        }
        async fn list_profiles(&self) -> BackendResult<Vec<Profile>> {
            self.inner.list_profiles().await
        }
        async fn set_role(&self, id: Uuid, role: ProfileRole) -> BackendResult<Profile> {
            self.inner.set_role(id, role).await
        }
        async fn profile_summaries(&self, ids: &[Uuid]) -> BackendResult<Vec<ProfileSummary>> {
            self.inner.profile_summaries(ids).await
        }
    }

    async fn register(backend: &Flaky, name: &str, role: ProfileRole) -> AuthUser {
        let user = backend
            .sign_up(&format!("{}@example.com", name), "secret-pass")
            .await
            .unwrap();
        backend
            .create_profile(NewProfile::for_registration(user.id, name))
            .await
            .unwrap();
        backend.set_role(user.id, role).await.unwrap();
        user
    }

    fn start(backend: &Arc<Flaky>) -> SessionHandle {
        SessionHandle::start(backend.clone(), backend.clone())
    }

    async fn wait_for(handle: &SessionHandle, pred: impl Fn(&AuthSnapshot) -> bool) -> AuthSnapshot {
        let mut rx = handle.subscribe();
        let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for snapshot")
            .expect("synchronizer stopped")
            .clone();
        snapshot
    }

    #[tokio::test]
    async fn test_bootstrap_without_session() {
        let backend = Flaky::new();
        let handle = start(&backend);

        let snapshot = handle.wait_until_loaded().await;

        assert!(!snapshot.is_loading);
        assert!(snapshot.user.is_none());
        assert!(snapshot.session.is_none());
        assert!(!snapshot.is_admin);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_with_existing_session() {
        let backend = Flaky::new();
        let user = register(&backend, "amy", ProfileRole::Admin).await;
        backend.sign_in("amy@example.com", "secret-pass").await.unwrap();

        let handle = start(&backend);
        let snapshot = handle.wait_until_loaded().await;

        assert_eq!(snapshot.user_id(), Some(user.id));
        assert!(snapshot.is_admin);
        assert_eq!(snapshot.profile.map(|p| p.username), Some("amy".to_string()));
    }

    #[tokio::test]
    async fn test_bootstrap_session_fetch_failure() {
        let backend = Flaky::new();
        backend.fail_session.store(true, Ordering::SeqCst);

        let handle = start(&backend);
        let snapshot = handle.wait_until_loaded().await;

        assert!(!snapshot.is_loading);
        assert!(!snapshot.is_authenticated());
        assert!(snapshot.error.as_deref().unwrap_or_default().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_signed_in_populates_identity_and_flag() {
        let backend = Flaky::new();
        let admin = register(&backend, "amy", ProfileRole::Admin).await;
        let handle = start(&backend);
        handle.wait_until_loaded().await;

        backend.sign_in("amy@example.com", "secret-pass").await.unwrap();
        let snapshot = wait_for(&handle, |s| s.is_admin).await;

        assert_eq!(snapshot.user_id(), Some(admin.id));
        assert!(!snapshot.is_loading);
        assert!(snapshot.session.is_some());
    }

    #[tokio::test]
    async fn test_signed_in_non_admin() {
        let backend = Flaky::new();
        let user = register(&backend, "kim", ProfileRole::User).await;
        let handle = start(&backend);
        handle.wait_until_loaded().await;

        backend.sign_in("kim@example.com", "secret-pass").await.unwrap();
        let snapshot = wait_for(&handle, |s| s.profile.is_some()).await;

        assert_eq!(snapshot.user_id(), Some(user.id));
        assert!(!snapshot.is_admin);
    }

    #[tokio::test]
    async fn test_signed_out_clears_everything() {
        let backend = Flaky::new();
        register(&backend, "amy", ProfileRole::Admin).await;
        let handle = start(&backend);
        handle.wait_until_loaded().await;
        backend.sign_in("amy@example.com", "secret-pass").await.unwrap();
        wait_for(&handle, |s| s.is_admin && s.profile.is_some()).await;

        backend.sign_out().await.unwrap();
        let snapshot = wait_for(&handle, |s| !s.is_authenticated()).await;

        assert!(snapshot.session.is_none());
        assert!(snapshot.profile.is_none());
        assert!(!snapshot.is_admin);
    }

    #[tokio::test]
    async fn test_user_deleted_clears_everything() {
        let backend = Flaky::new();
        register(&backend, "amy", ProfileRole::Admin).await;
        let handle = start(&backend);
        handle.wait_until_loaded().await;
        backend.sign_in("amy@example.com", "secret-pass").await.unwrap();
        wait_for(&handle, |s| s.is_admin).await;

        backend.inner.delete_current_user().await.unwrap();
        let snapshot = wait_for(&handle, |s| !s.is_authenticated()).await;

        assert!(!snapshot.is_admin);
        assert!(snapshot.profile.is_none());
    }

    #[tokio::test]
    async fn test_profile_failure_keeps_previous_profile() {
        let backend = Flaky::new();
        register(&backend, "amy", ProfileRole::User).await;
        let handle = start(&backend);
        handle.wait_until_loaded().await;
        backend.sign_in("amy@example.com", "secret-pass").await.unwrap();
        let before = wait_for(&handle, |s| s.profile.is_some()).await;

        backend.fail_profile.store(true, Ordering::SeqCst);
        let refreshed = backend.refresh_session().await.unwrap();
        let token = refreshed.access_token.clone();
        let after = wait_for(&handle, |s| {
            s.session.as_ref().map(|x| x.access_token.as_str()) == Some(token.as_str())
        })
        .await;

        assert!(after.is_authenticated());
        assert_eq!(after.profile, before.profile);
    }

    #[tokio::test]
    async fn test_user_updated_replaces_session() {
        let backend = Flaky::new();
        register(&backend, "amy", ProfileRole::User).await;
        let handle = start(&backend);
        handle.wait_until_loaded().await;
        backend.sign_in("amy@example.com", "secret-pass").await.unwrap();
        wait_for(&handle, |s| s.profile.is_some()).await;

        backend.inner.update_email("amy@new.example.com").await.unwrap();
        let snapshot = wait_for(&handle, |s| {
            s.user.as_ref().and_then(|u| u.email.as_deref()) == Some("amy@new.example.com")
        })
        .await;

        assert!(snapshot.profile.is_some());
    }

    #[tokio::test]
    async fn test_switching_user_never_shows_previous_privileges() {
        let backend = Flaky::new();
        register(&backend, "amy", ProfileRole::Admin).await;
        let kim = register(&backend, "kim", ProfileRole::User).await;
        let handle = start(&backend);
        handle.wait_until_loaded().await;
        backend.sign_in("amy@example.com", "secret-pass").await.unwrap();
        wait_for(&handle, |s| s.is_admin && s.profile.is_some()).await;

        let mut rx = handle.subscribe();
        backend.sign_in("kim@example.com", "secret-pass").await.unwrap();

        loop {
            tokio::time::timeout(Duration::from_secs(2), rx.changed())
                .await
                .expect("timed out")
                .expect("synchronizer stopped");
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.user_id() == Some(kim.id) {
                assert!(!snapshot.is_admin);
                if let Some(profile) = &snapshot.profile {
                    assert_eq!(profile.id, kim.id);
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_reload_picks_up_role_change() {
        let backend = Flaky::new();
        let user = register(&backend, "kim", ProfileRole::User).await;
        let handle = start(&backend);
        handle.wait_until_loaded().await;
        backend.sign_in("kim@example.com", "secret-pass").await.unwrap();
        wait_for(&handle, |s| s.profile.is_some()).await;
        assert!(!handle.snapshot().is_admin);

        backend.set_role(user.id, ProfileRole::Admin).await.unwrap();
        handle.reload();
        let snapshot = wait_for(&handle, |s| s.is_admin).await;

        assert_eq!(snapshot.profile.map(|p| p.role), Some(ProfileRole::Admin));
    }

    #[tokio::test]
    async fn test_no_changes_after_shutdown() {
        let backend = Flaky::new();
        register(&backend, "amy", ProfileRole::Admin).await;
        let handle = start(&backend);
        let before = handle.wait_until_loaded().await;

        handle.shutdown().await;
        assert!(!handle.is_running());

        backend.sign_in("amy@example.com", "secret-pass").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.snapshot(), before);
    }

    #[tokio::test]
    async fn test_wait_until_loaded_returns_after_shutdown() {
        let backend = Flaky::new();
        let handle = start(&backend);
        handle.shutdown().await;

        let snapshot = tokio::time::timeout(Duration::from_secs(2), handle.wait_until_loaded())
            .await
            .expect("wait_until_loaded hung after shutdown");

        assert_eq!(snapshot, handle.snapshot());
    }

    #[tokio::test]
    async fn test_drop_last_handle_unsubscribes() {
        let backend = Flaky::new();
        let handle = start(&backend);
        let rx = handle.subscribe();
        handle.wait_until_loaded().await;

        drop(handle);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Task aborted, so the sender side is gone
        assert!(rx.has_changed().is_err());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let backend = Flaky::new();
        let handle = start(&backend);
        let clone = handle.clone();

        handle.wait_until_loaded().await;
        drop(handle);

        assert!(clone.is_running());
        assert!(!clone.snapshot().is_loading);
    }
}
