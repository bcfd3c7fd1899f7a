//! Hero model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A playable hero; skins hang off heroes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hero {
    /// Unique identifier
    pub id: i64,
    /// Hero name
    pub name: String,
    /// Hero description
    pub description: String,
    /// Portrait image URL
    pub image_url: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Input for creating a hero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateHeroInput {
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
}

impl CreateHeroInput {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            image_url: None,
        }
    }
}

/// Input for updating a hero
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateHeroInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Option<String>>,
}

impl Hero {
    /// Apply a partial update in place
    pub fn apply(&mut self, input: &UpdateHeroInput) {
        if let Some(ref name) = input.name {
            self.name = name.clone();
        }
        if let Some(ref description) = input.description {
            self.description = description.clone();
        }
        if let Some(ref image_url) = input.image_url {
            self.image_url = image_url.clone();
        }
    }
}
