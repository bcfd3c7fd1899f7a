//! In-memory backend
//!
//! Implements every backend trait inside the process:
//! - accounts with Argon2id password hashes and a single current session
//! - auth events and new chat messages on broadcast channels
//! - tables kept in `RwLock`-guarded maps, with hero deletion cascading to
//!   skins and collection rows like the remote foreign keys do
//!
//! Used by the `memory` driver and throughout the test suite.

mod password;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{
    AuthSubscription, BackendError, BackendResult, CatalogStore, IdentityProvider,
    MessageChannel, MessageSubscription, ProfileStore,
};
use crate::models::{
    AuthEvent, AuthUser, ChatMessage, CreateHeroInput, CreateSkinInput, Hero, NewProfile,
    OwnedSkin, Profile, ProfileRole, ProfileSummary, Session, Skin, UpdateHeroInput,
    UpdateProfileInput, UpdateSkinInput,
};

/// Capacity of the event channels; slow subscribers see `Lagged` beyond this
const CHANNEL_CAPACITY: usize = 64;

/// Lifetime of an issued access token
const SESSION_TTL_SECS: i64 = 3600;

struct Account {
    user: AuthUser,
    password_hash: String,
}

/// In-process implementation of all four collaborators
pub struct MemoryBackend {
    /// Accounts keyed by lowercased e-mail
    accounts: RwLock<HashMap<String, Account>>,
    current: RwLock<Option<Session>>,
    auth_events: broadcast::Sender<AuthEvent>,
    profiles: RwLock<HashMap<Uuid, Profile>>,
    heroes: RwLock<BTreeMap<i64, Hero>>,
    skins: RwLock<BTreeMap<i64, Skin>>,
    owned: RwLock<BTreeMap<i64, OwnedSkin>>,
    /// Chat log in insertion order
    messages: RwLock<Vec<ChatMessage>>,
    message_events: broadcast::Sender<ChatMessage>,
    next_id: AtomicI64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        let (auth_events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (message_events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            accounts: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            auth_events,
            profiles: RwLock::new(HashMap::new()),
            heroes: RwLock::new(BTreeMap::new()),
            skins: RwLock::new(BTreeMap::new()),
            owned: RwLock::new(BTreeMap::new()),
            messages: RwLock::new(Vec::new()),
            message_events,
            next_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn issue_session(user: AuthUser) -> Session {
        Session {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + Duration::seconds(SESSION_TTL_SECS),
            user,
        }
    }

    fn emit(&self, event: AuthEvent) {
        tracing::debug!("Auth event: {}", event);
        // No subscribers is fine
        let _ = self.auth_events.send(event);
    }

    /// Change the signed-in account's e-mail, emitting `UserUpdated`
    pub async fn update_email(&self, email: &str) -> BackendResult<Session> {
        let mut current = self.current.write().await;
        let session = current.as_mut().ok_or(BackendError::Unauthorized)?;

        let mut accounts = self.accounts.write().await;
        let old_key = session.user.email.clone().unwrap_or_default().to_lowercase();
        let new_key = email.to_lowercase();
        if new_key != old_key && accounts.contains_key(&new_key) {
            return Err(BackendError::Conflict("E-mail already registered".to_string()));
        }
        let mut account = accounts
            .remove(&old_key)
            .ok_or_else(|| BackendError::NotFound("account".to_string()))?;
        account.user.email = Some(email.to_string());
        session.user = account.user.clone();
        accounts.insert(new_key, account);

        let session = session.clone();
        self.emit(AuthEvent::UserUpdated(session.clone()));
        Ok(session)
    }

    /// Delete the signed-in account, emitting `UserDeleted`. The profile row stays.
    pub async fn delete_current_user(&self) -> BackendResult<()> {
        let session = self
            .current
            .write()
            .await
            .take()
            .ok_or(BackendError::Unauthorized)?;

        let key = session.user.email.unwrap_or_default().to_lowercase();
        self.accounts.write().await.remove(&key);
        self.emit(AuthEvent::UserDeleted);
        Ok(())
    }
}

// ============================================================================
// Identity
// ============================================================================

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn current_session(&self) -> BackendResult<Option<Session>> {
        Ok(self.current.read().await.clone())
    }

    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<AuthUser> {
        let key = email.trim().to_lowercase();
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(BackendError::Conflict("User already registered".to_string()));
        }

        let password_hash = password::hash_password(password)?;
        let user = AuthUser::new(Uuid::new_v4(), email.trim());
        accounts.insert(
            key,
            Account {
                user: user.clone(),
                password_hash,
            },
        );

        tracing::info!("Registered account {}", user.id);
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        let user = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .get(&email.trim().to_lowercase())
                .ok_or(BackendError::InvalidCredentials)?;
            if !password::verify_password(password, &account.password_hash)? {
                return Err(BackendError::InvalidCredentials);
            }
            account.user.clone()
        };

        let session = Self::issue_session(user);
        *self.current.write().await = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        *self.current.write().await = None;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn refresh_session(&self) -> BackendResult<Session> {
        let mut current = self.current.write().await;
        let user = current
            .as_ref()
            .map(|s| s.user.clone())
            .ok_or(BackendError::Unauthorized)?;

        let session = Self::issue_session(user);
        *current = Some(session.clone());
        drop(current);

        self.emit(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    async fn is_admin(&self, user_id: Uuid) -> BackendResult<bool> {
        Ok(self
            .profiles
            .read()
            .await
            .get(&user_id)
            .map(|p| p.is_admin())
            .unwrap_or(false))
    }

    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.auth_events.subscribe())
    }
}

// ============================================================================
// Profiles
// ============================================================================

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn create_profile(&self, profile: NewProfile) -> BackendResult<Profile> {
        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(&profile.id) {
            return Err(BackendError::Conflict("Profile already exists".to_string()));
        }
        if profiles.values().any(|p| p.username == profile.username) {
            return Err(BackendError::Conflict("Username already taken".to_string()));
        }

        let profile = profile.into_profile();
        profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, id: Uuid) -> BackendResult<Option<Profile>> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn update_profile(&self, id: Uuid, input: &UpdateProfileInput) -> BackendResult<Profile> {
        let mut profiles = self.profiles.write().await;
        if let Some(ref username) = input.username {
            if profiles.values().any(|p| p.id != id && &p.username == username) {
                return Err(BackendError::Conflict("Username already taken".to_string()));
            }
        }

        let profile = profiles
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("profile {}", id)))?;
        profile.apply(input);
        Ok(profile.clone())
    }

    async fn list_profiles(&self) -> BackendResult<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self.profiles.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(profiles)
    }

    async fn set_role(&self, id: Uuid, role: ProfileRole) -> BackendResult<Profile> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("profile {}", id)))?;
        profile.role = role;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn profile_summaries(&self, ids: &[Uuid]) -> BackendResult<Vec<ProfileSummary>> {
        let profiles = self.profiles.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| profiles.get(id))
            .map(Profile::summary)
            .collect())
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[async_trait]
impl CatalogStore for MemoryBackend {
    async fn list_heroes(&self) -> BackendResult<Vec<Hero>> {
        let mut heroes: Vec<Hero> = self.heroes.read().await.values().cloned().collect();
        heroes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(heroes)
    }

    async fn get_hero(&self, id: i64) -> BackendResult<Option<Hero>> {
        Ok(self.heroes.read().await.get(&id).cloned())
    }

    async fn create_hero(&self, input: &CreateHeroInput) -> BackendResult<Hero> {
        let hero = Hero {
            id: self.next_id(),
            name: input.name.clone(),
            description: input.description.clone(),
            image_url: input.image_url.clone(),
            created_at: Utc::now(),
        };
        self.heroes.write().await.insert(hero.id, hero.clone());
        Ok(hero)
    }

    async fn update_hero(&self, id: i64, input: &UpdateHeroInput) -> BackendResult<Hero> {
        let mut heroes = self.heroes.write().await;
        let hero = heroes
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("hero {}", id)))?;
        hero.apply(input);
        Ok(hero.clone())
    }

    async fn delete_hero(&self, id: i64) -> BackendResult<()> {
        if self.heroes.write().await.remove(&id).is_none() {
            return Err(BackendError::NotFound(format!("hero {}", id)));
        }

        let mut skins = self.skins.write().await;
        let removed: Vec<i64> = skins
            .values()
            .filter(|s| s.hero_id == id)
            .map(|s| s.id)
            .collect();
        for skin_id in &removed {
            skins.remove(skin_id);
        }
        self.owned
            .write()
            .await
            .retain(|_, row| !removed.contains(&row.skin_id));

        tracing::debug!("Deleted hero {} and {} skins", id, removed.len());
        Ok(())
    }

    async fn list_skins(&self) -> BackendResult<Vec<Skin>> {
        let mut skins: Vec<Skin> = self.skins.read().await.values().cloned().collect();
        skins.sort_by(|a, b| a.hero_id.cmp(&b.hero_id).then_with(|| a.name.cmp(&b.name)));
        Ok(skins)
    }

    async fn list_skins_by_hero(&self, hero_id: i64) -> BackendResult<Vec<Skin>> {
        let mut skins: Vec<Skin> = self
            .skins
            .read()
            .await
            .values()
            .filter(|s| s.hero_id == hero_id)
            .cloned()
            .collect();
        skins.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(skins)
    }

    async fn get_skin(&self, id: i64) -> BackendResult<Option<Skin>> {
        Ok(self.skins.read().await.get(&id).cloned())
    }

    async fn create_skin(&self, input: &CreateSkinInput) -> BackendResult<Skin> {
        if !self.heroes.read().await.contains_key(&input.hero_id) {
            return Err(BackendError::NotFound(format!("hero {}", input.hero_id)));
        }

        let skin = Skin {
            id: self.next_id(),
            hero_id: input.hero_id,
            name: input.name.clone(),
            rarity: input.rarity.clone(),
            image_url: input.image_url.clone(),
            created_at: Utc::now(),
        };
        self.skins.write().await.insert(skin.id, skin.clone());
        Ok(skin)
    }

    async fn update_skin(&self, id: i64, input: &UpdateSkinInput) -> BackendResult<Skin> {
        if let Some(hero_id) = input.hero_id {
            if !self.heroes.read().await.contains_key(&hero_id) {
                return Err(BackendError::NotFound(format!("hero {}", hero_id)));
            }
        }

        let mut skins = self.skins.write().await;
        let skin = skins
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("skin {}", id)))?;
        skin.apply(input);
        Ok(skin.clone())
    }

    async fn delete_skin(&self, id: i64) -> BackendResult<()> {
        if self.skins.write().await.remove(&id).is_none() {
            return Err(BackendError::NotFound(format!("skin {}", id)));
        }
        self.owned.write().await.retain(|_, row| row.skin_id != id);
        Ok(())
    }

    async fn owned_skin_ids(&self, user_id: Uuid) -> BackendResult<Vec<i64>> {
        Ok(self
            .owned
            .read()
            .await
            .values()
            .filter(|row| row.user_id == user_id)
            .map(|row| row.skin_id)
            .collect())
    }

    async fn find_owned(&self, user_id: Uuid, skin_id: i64) -> BackendResult<Option<OwnedSkin>> {
        Ok(self
            .owned
            .read()
            .await
            .values()
            .find(|row| row.user_id == user_id && row.skin_id == skin_id)
            .cloned())
    }

    async fn add_owned(&self, user_id: Uuid, skin_id: i64) -> BackendResult<OwnedSkin> {
        if !self.skins.read().await.contains_key(&skin_id) {
            return Err(BackendError::NotFound(format!("skin {}", skin_id)));
        }

        let mut owned = self.owned.write().await;
        if owned
            .values()
            .any(|row| row.user_id == user_id && row.skin_id == skin_id)
        {
            return Err(BackendError::Conflict("Skin already collected".to_string()));
        }

        let row = OwnedSkin {
            id: self.next_id(),
            user_id,
            skin_id,
            acquired_at: Utc::now(),
        };
        owned.insert(row.id, row.clone());
        Ok(row)
    }

    async fn remove_owned(&self, id: i64) -> BackendResult<()> {
        self.owned
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("collection row {}", id)))
    }
}

// ============================================================================
// Chat
// ============================================================================

#[async_trait]
impl MessageChannel for MemoryBackend {
    async fn send(&self, user_id: Uuid, content: &str) -> BackendResult<ChatMessage> {
        let message = ChatMessage::new(user_id, content);
        self.messages.write().await.push(message.clone());
        let _ = self.message_events.send(message.clone());
        Ok(message)
    }

    async fn list_recent(&self, limit: usize) -> BackendResult<Vec<ChatMessage>> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> MessageSubscription {
        MessageSubscription::from_broadcast(self.message_events.subscribe())
    }
}
