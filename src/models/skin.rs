//! Skin and collection membership models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cosmetic skin for one hero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skin {
    /// Unique identifier
    pub id: i64,
    /// Owning hero
    pub hero_id: i64,
    /// Skin name
    pub name: String,
    /// Rarity label as shown in game (free text)
    pub rarity: String,
    /// Preview image URL
    pub image_url: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Skin {
    /// Apply a partial update in place
    pub fn apply(&mut self, input: &UpdateSkinInput) {
        if let Some(hero_id) = input.hero_id {
            self.hero_id = hero_id;
        }
        if let Some(ref name) = input.name {
            self.name = name.clone();
        }
        if let Some(ref rarity) = input.rarity {
            self.rarity = rarity.clone();
        }
        if let Some(ref image_url) = input.image_url {
            self.image_url = image_url.clone();
        }
    }
}

/// Input for creating a skin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSkinInput {
    pub hero_id: i64,
    pub name: String,
    pub rarity: String,
    pub image_url: Option<String>,
}

impl CreateSkinInput {
    pub fn new(hero_id: i64, name: impl Into<String>, rarity: impl Into<String>) -> Self {
        Self {
            hero_id,
            name: name.into(),
            rarity: rarity.into(),
            image_url: None,
        }
    }
}

/// Input for updating a skin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSkinInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Option<String>>,
}

/// A skin in a player's collection (`user_skins` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedSkin {
    pub id: i64,
    pub user_id: Uuid,
    pub skin_id: i64,
    pub acquired_at: DateTime<Utc>,
}

/// Result of flipping collection membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    /// The skin was not owned and has been added
    Added,
    /// The skin was owned and has been removed
    Removed,
}
