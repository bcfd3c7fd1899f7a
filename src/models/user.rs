//! User identity and profile models
//!
//! Two records describe a player:
//! - `AuthUser` is the identity provider's account record (id, e-mail, raw metadata)
//! - `Profile` is the application-owned record keyed by the same id
//!
//! The administrator flag is never stored here; it is derived per session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account record owned by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable identifier, shared with the profile
    pub id: Uuid,
    /// E-mail address used to sign in
    pub email: Option<String>,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Everything else the provider returned, kept verbatim
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl AuthUser {
    /// Create an identity with no extra metadata
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: Some(email.into()),
            created_at: Utc::now(),
            raw: serde_json::Value::Null,
        }
    }
}

/// Profile role.
///
/// - Admin: may manage heroes, skins and other players' roles
/// - User: regular player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfileRole {
    /// Administrator - content management and moderation
    Admin,
    /// Regular player
    #[default]
    User,
}

impl fmt::Display for ProfileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileRole::Admin => write!(f, "admin"),
            ProfileRole::User => write!(f, "user"),
        }
    }
}

impl FromStr for ProfileRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(ProfileRole::Admin),
            "user" => Ok(ProfileRole::User),
            _ => Err(anyhow::anyhow!("Invalid profile role: {}", s)),
        }
    }
}

/// Application-level player profile (`user_profiles` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Same id as the identity provider's account
    pub id: Uuid,
    /// Display name
    pub username: String,
    /// Role flag
    #[serde(default)]
    pub role: ProfileRole,
    /// In-game trophy count
    #[serde(default)]
    pub trophies: i32,
    /// Syndicate (clan) name
    pub syndicate: Option<String>,
    /// Free-form bio
    pub about: Option<String>,
    /// Avatar image URL
    pub avatar_url: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Check if the profile carries the administrator role
    pub fn is_admin(&self) -> bool {
        self.role == ProfileRole::Admin
    }

    /// Short form used to label chat messages
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, input: &UpdateProfileInput) {
        if let Some(ref username) = input.username {
            self.username = username.clone();
        }
        if let Some(ref syndicate) = input.syndicate {
            self.syndicate = syndicate.clone();
        }
        if let Some(ref about) = input.about {
            self.about = about.clone();
        }
        if let Some(ref avatar_url) = input.avatar_url {
            self.avatar_url = avatar_url.clone();
        }
        if let Some(trophies) = input.trophies {
            self.trophies = trophies;
        }
        self.updated_at = Utc::now();
    }
}

/// Row inserted once at registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub username: String,
    pub trophies: i32,
    pub role: ProfileRole,
}

impl NewProfile {
    /// Profile for a freshly registered player: role `user`, no trophies
    pub fn for_registration(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            trophies: 0,
            role: ProfileRole::User,
        }
    }

    /// Materialize the full profile the way the store fills in defaults
    pub fn into_profile(self) -> Profile {
        let now = Utc::now();
        Profile {
            id: self.id,
            username: self.username,
            role: self.role,
            trophies: self.trophies,
            syndicate: None,
            about: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial profile update.
///
/// The outer `Option` says whether a field is touched; for nullable columns
/// the inner `Option` carries the new value (`None` clears it).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateProfileInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syndicate: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trophies: Option<i32>,
}

impl UpdateProfileInput {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.syndicate.is_none()
            && self.about.is_none()
            && self.avatar_url.is_none()
            && self.trophies.is_none()
    }
}

/// Author label attached to chat messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_defaults() {
        let id = Uuid::new_v4();
        let profile = NewProfile::for_registration(id, "sniper").into_profile();

        assert_eq!(profile.id, id);
        assert_eq!(profile.username, "sniper");
        assert_eq!(profile.role, ProfileRole::User);
        assert_eq!(profile.trophies, 0);
        assert!(!profile.is_admin());
    }

    #[test]
    fn test_profile_role_display() {
        assert_eq!(ProfileRole::Admin.to_string(), "admin");
        assert_eq!(ProfileRole::User.to_string(), "user");
    }

    #[test]
    fn test_profile_role_from_str() {
        assert_eq!(ProfileRole::from_str("admin").unwrap(), ProfileRole::Admin);
        assert_eq!(ProfileRole::from_str("ADMIN").unwrap(), ProfileRole::Admin);
        assert_eq!(ProfileRole::from_str("User").unwrap(), ProfileRole::User);
        assert!(ProfileRole::from_str("editor").is_err());
    }

    #[test]
    fn test_profile_role_serde_lowercase() {
        let json = serde_json::to_string(&ProfileRole::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let role: ProfileRole = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, ProfileRole::User);
    }

    #[test]
    fn test_apply_partial_update() {
        let mut profile = NewProfile::for_registration(Uuid::new_v4(), "old").into_profile();
        profile.syndicate = Some("Wolves".to_string());

        let input = UpdateProfileInput {
            username: Some("new".to_string()),
            syndicate: Some(None),
            trophies: Some(1200),
            ..Default::default()
        };
        profile.apply(&input);

        assert_eq!(profile.username, "new");
        assert_eq!(profile.syndicate, None);
        assert_eq!(profile.trophies, 1200);
        assert_eq!(profile.about, None);
    }

    #[test]
    fn test_update_input_serializes_only_touched_fields() {
        let input = UpdateProfileInput {
            about: Some(None),
            ..Default::default()
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value, serde_json::json!({ "about": null }));
        assert!(!input.is_empty());
        assert!(UpdateProfileInput::default().is_empty());
    }
}
