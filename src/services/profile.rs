//! Profile service
//!
//! - Own profile: read and edit (username required, blank optional fields cleared)
//! - Admin panel: list all players, filter, promote and demote

use std::sync::Arc;
use uuid::Uuid;

use super::{optional, require_admin, require_user, required, Denied};
use crate::backend::{BackendError, ProfileStore};
use crate::models::{Profile, ProfileRole, UpdateProfileInput};
use crate::session::{AuthSnapshot, SessionHandle};

/// Error types for profile service operations
#[derive(Debug, thiserror::Error)]
pub enum ProfileServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No signed-in player
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Signed in, but not allowed
    #[error("Forbidden")]
    Forbidden,

    /// Profile does not exist
    #[error("Profile not found")]
    NotFound,

    /// Username taken by someone else
    #[error("Username already taken")]
    UsernameTaken,

    /// Backend failure
    #[error(transparent)]
    Backend(BackendError),
}

impl From<Denied> for ProfileServiceError {
    fn from(denied: Denied) -> Self {
        match denied {
            Denied::NotAuthenticated => Self::NotAuthenticated,
            Denied::Forbidden => Self::Forbidden,
        }
    }
}

impl From<BackendError> for ProfileServiceError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(_) => Self::NotFound,
            BackendError::Conflict(_) => Self::UsernameTaken,
            other => Self::Backend(other),
        }
    }
}

/// Profile edit form as entered by the player
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileForm {
    pub username: String,
    pub syndicate: String,
    pub about: String,
    pub avatar_url: String,
    pub trophies: i32,
}

impl ProfileForm {
    /// Form pre-filled from an existing profile
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            username: profile.username.clone(),
            syndicate: profile.syndicate.clone().unwrap_or_default(),
            about: profile.about.clone().unwrap_or_default(),
            avatar_url: profile.avatar_url.clone().unwrap_or_default(),
            trophies: profile.trophies,
        }
    }

    /// Validate and convert to an update touching every editable field
    pub fn into_update(self) -> Result<UpdateProfileInput, ProfileServiceError> {
        let username = required(&self.username, "Username").map_err(ProfileServiceError::ValidationError)?;
        if self.trophies < 0 {
            return Err(ProfileServiceError::ValidationError(
                "Trophies cannot be negative".to_string(),
            ));
        }

        Ok(UpdateProfileInput {
            username: Some(username),
            syndicate: Some(optional(&self.syndicate)),
            about: Some(optional(&self.about)),
            avatar_url: Some(optional(&self.avatar_url)),
            trophies: Some(self.trophies),
        })
    }
}

/// Profiles whose username or syndicate contains `query` (case-insensitive)
pub fn filter_profiles<'a>(profiles: &'a [Profile], query: &str) -> Vec<&'a Profile> {
    let needle = query.trim().to_lowercase();
    profiles
        .iter()
        .filter(|p| {
            needle.is_empty()
                || p.username.to_lowercase().contains(&needle)
                || p
                    .syndicate
                    .as_deref()
                    .is_some_and(|s| s.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Profile service
pub struct ProfileService {
    profiles: Arc<dyn ProfileStore>,
    session: Option<SessionHandle>,
}

impl ProfileService {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            profiles,
            session: None,
        }
    }

    /// Refresh this session's snapshot after the signed-in player's own profile changes
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    fn reload_session(&self) {
        if let Some(ref session) = self.session {
            session.reload();
        }
    }

    /// Get a profile by user id
    pub async fn get(&self, id: Uuid) -> Result<Profile, ProfileServiceError> {
        self.profiles
            .get_profile(id)
            .await?
            .ok_or(ProfileServiceError::NotFound)
    }

    /// Profile of the signed-in player
    pub async fn current(&self, snapshot: &AuthSnapshot) -> Result<Profile, ProfileServiceError> {
        let user_id = require_user(snapshot)?;
        self.get(user_id).await
    }

    /// Save the signed-in player's edit form
    pub async fn update_own(
        &self,
        snapshot: &AuthSnapshot,
        form: ProfileForm,
    ) -> Result<Profile, ProfileServiceError> {
        let user_id = require_user(snapshot)?;
        let input = form.into_update()?;

        let profile = self.profiles.update_profile(user_id, &input).await?;
        tracing::info!("Profile {} updated", user_id);
        self.reload_session();
        Ok(profile)
    }

    /// All profiles ordered by username (admin only)
    pub async fn list_all(&self, snapshot: &AuthSnapshot) -> Result<Vec<Profile>, ProfileServiceError> {
        require_admin(snapshot)?;
        Ok(self.profiles.list_profiles().await?)
    }

    /// Change a player's role (admin only)
    pub async fn set_role(
        &self,
        snapshot: &AuthSnapshot,
        target: Uuid,
        role: ProfileRole,
    ) -> Result<Profile, ProfileServiceError> {
        let admin_id = require_admin(snapshot)?;

        let profile = self.profiles.set_role(target, role).await?;
        tracing::info!("{} set role of {} to {}", admin_id, target, role);
        if target == admin_id {
            self.reload_session();
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::IdentityProvider;
    use crate::models::{AuthUser, NewProfile};
    use crate::services::test_support;

    async fn setup() -> (ProfileService, crate::backend::Backend, AuthUser) {
        let (_, backend) = test_support::backend();
        let user = backend
            .identity
            .sign_up("amy@example.com", "secret1")
            .await
            .unwrap();
        backend
            .profiles
            .create_profile(NewProfile::for_registration(user.id, "amy"))
            .await
            .unwrap();
        (ProfileService::new(backend.profiles.clone()), backend, user)
    }

    fn profile(username: &str, syndicate: Option<&str>) -> Profile {
        let mut p = NewProfile::for_registration(Uuid::new_v4(), username).into_profile();
        p.syndicate = syndicate.map(str::to_string);
        p
    }

    #[test]
    fn test_form_blank_optionals_become_none() {
        let form = ProfileForm {
            username: " amy ".to_string(),
            syndicate: "  ".to_string(),
            about: "".to_string(),
            avatar_url: "https://img.example.com/a.png".to_string(),
            trophies: 1500,
        };

        let update = form.into_update().unwrap();

        assert_eq!(update.username.as_deref(), Some("amy"));
        assert_eq!(update.syndicate, Some(None));
        assert_eq!(update.about, Some(None));
        assert_eq!(update.avatar_url, Some(Some("https://img.example.com/a.png".to_string())));
        assert_eq!(update.trophies, Some(1500));
    }

    #[test]
    fn test_form_validation() {
        let blank = ProfileForm::default();
        assert!(matches!(blank.into_update(), Err(ProfileServiceError::ValidationError(_))));

        let negative = ProfileForm {
            username: "amy".to_string(),
            trophies: -1,
            ..Default::default()
        };
        assert!(matches!(negative.into_update(), Err(ProfileServiceError::ValidationError(_))));
    }

    #[test]
    fn test_filter_profiles() {
        let profiles = vec![
            profile("Amy", Some("Wolves")),
            profile("kim", None),
            profile("Zed", Some("wolfpack")),
        ];

        let names = |q: &str| -> Vec<String> {
            filter_profiles(&profiles, q).iter().map(|p| p.username.clone()).collect()
        };

        assert_eq!(names(""), vec!["Amy", "kim", "Zed"]);
        assert_eq!(names("WOL"), vec!["Amy", "Zed"]);
        assert_eq!(names(" kI "), vec!["kim"]);
        assert!(names("nobody").is_empty());
    }

    #[tokio::test]
    async fn test_update_own_profile() {
        let (service, _, user) = setup().await;
        let snapshot = test_support::snapshot_for(&user, false);
        let current = service.current(&snapshot).await.unwrap();

        let mut form = ProfileForm::from_profile(&current);
        form.syndicate = "Wolves".to_string();
        form.trophies = 2200;
        let updated = service.update_own(&snapshot, form).await.unwrap();

        assert_eq!(updated.username, "amy");
        assert_eq!(updated.syndicate.as_deref(), Some("Wolves"));
        assert_eq!(updated.trophies, 2200);
    }

    #[tokio::test]
    async fn test_update_own_refreshes_session_snapshot() {
        let (_, backend, _) = setup().await;
        let session = SessionHandle::start(backend.identity.clone(), backend.profiles.clone());
        session.wait_until_loaded().await;
        backend.identity.sign_in("amy@example.com", "secret1").await.unwrap();
        let mut rx = session.subscribe();
        rx.wait_for(|s| s.profile.is_some()).await.unwrap();

        let service = ProfileService::new(backend.profiles.clone()).with_session(session.clone());
        let mut form = ProfileForm::from_profile(&service.current(&session.snapshot()).await.unwrap());
        form.username = "amy2".to_string();
        service.update_own(&session.snapshot(), form).await.unwrap();

        let renamed = matches!(
            tokio::time::timeout(
                std::time::Duration::from_secs(2),
                rx.wait_for(|s| s.profile.as_ref().is_some_and(|p| p.username == "amy2")),
            )
            .await,
            Ok(Ok(_))
        );
        assert!(renamed, "snapshot kept the old profile");
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_self_demotion_refreshes_admin_flag() {
        let (_, backend, user) = setup().await;
        backend.profiles.set_role(user.id, ProfileRole::Admin).await.unwrap();
        let session = SessionHandle::start(backend.identity.clone(), backend.profiles.clone());
        session.wait_until_loaded().await;
        backend.identity.sign_in("amy@example.com", "secret1").await.unwrap();
        let mut rx = session.subscribe();
        rx.wait_for(|s| s.is_admin).await.unwrap();

        let service = ProfileService::new(backend.profiles.clone()).with_session(session.clone());
        service
            .set_role(&session.snapshot(), user.id, ProfileRole::User)
            .await
            .unwrap();

        let demoted = matches!(
            tokio::time::timeout(std::time::Duration::from_secs(2), rx.wait_for(|s| !s.is_admin)).await,
            Ok(Ok(_))
        );
        assert!(demoted, "snapshot kept the admin flag");
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_requires_session() {
        let (service, _, _) = setup().await;
        let form = ProfileForm {
            username: "amy".to_string(),
            ..Default::default()
        };

        let result = service.update_own(&AuthSnapshot::default(), form).await;
        assert!(matches!(result, Err(ProfileServiceError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_admin_only_operations() {
        let (service, _, user) = setup().await;
        let player = test_support::snapshot_for(&user, false);
        let admin = test_support::snapshot_for(&AuthUser::new(Uuid::new_v4(), "root@example.com"), true);

        assert!(matches!(service.list_all(&player).await, Err(ProfileServiceError::Forbidden)));
        assert!(matches!(
            service.set_role(&player, user.id, ProfileRole::Admin).await,
            Err(ProfileServiceError::Forbidden)
        ));

        assert_eq!(service.list_all(&admin).await.unwrap().len(), 1);
        let promoted = service.set_role(&admin, user.id, ProfileRole::Admin).await.unwrap();
        assert!(promoted.is_admin());

        assert!(matches!(
            service.set_role(&admin, Uuid::new_v4(), ProfileRole::User).await,
            Err(ProfileServiceError::NotFound)
        ));
    }
}
