//! Hero service
//!
//! Catalog reads are public; create, update and delete need an administrator.

use std::sync::Arc;

use super::{optional, require_admin, required, Denied};
use crate::backend::{BackendError, CatalogStore};
use crate::models::{CreateHeroInput, Hero, Skin, UpdateHeroInput};
use crate::session::AuthSnapshot;

/// Error types for hero and skin operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No signed-in player
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Signed in, but not an administrator
    #[error("Forbidden")]
    Forbidden,

    /// Hero or skin does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error(transparent)]
    Backend(BackendError),
}

impl From<Denied> for CatalogServiceError {
    fn from(denied: Denied) -> Self {
        match denied {
            Denied::NotAuthenticated => Self::NotAuthenticated,
            Denied::Forbidden => Self::Forbidden,
        }
    }
}

impl From<BackendError> for CatalogServiceError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(what) => Self::NotFound(what),
            other => Self::Backend(other),
        }
    }
}

/// Hero service
pub struct HeroService {
    catalog: Arc<dyn CatalogStore>,
}

impl HeroService {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// All heroes ordered by name
    pub async fn list(&self) -> Result<Vec<Hero>, CatalogServiceError> {
        Ok(self.catalog.list_heroes().await?)
    }

    /// Get a hero by id
    pub async fn get(&self, id: i64) -> Result<Hero, CatalogServiceError> {
        self.catalog
            .get_hero(id)
            .await?
            .ok_or_else(|| CatalogServiceError::NotFound(format!("hero {}", id)))
    }

    /// Hero detail page: the hero and its skins, loaded together
    pub async fn detail(&self, id: i64) -> Result<(Hero, Vec<Skin>), CatalogServiceError> {
        let (hero, skins) = futures::future::try_join(
            self.get(id),
            async {
                self.catalog
                    .list_skins_by_hero(id)
                    .await
                    .map_err(CatalogServiceError::from)
            },
        )
        .await?;
        Ok((hero, skins))
    }

    /// Create a hero (admin only)
    pub async fn create(
        &self,
        snapshot: &AuthSnapshot,
        input: CreateHeroInput,
    ) -> Result<Hero, CatalogServiceError> {
        require_admin(snapshot)?;
        let input = CreateHeroInput {
            name: required(&input.name, "Hero name").map_err(CatalogServiceError::ValidationError)?,
            description: input.description.trim().to_string(),
            image_url: input.image_url.as_deref().and_then(optional),
        };

        let hero = self.catalog.create_hero(&input).await?;
        tracing::info!("Created hero {} ({})", hero.name, hero.id);
        Ok(hero)
    }

    /// Update a hero (admin only)
    pub async fn update(
        &self,
        snapshot: &AuthSnapshot,
        id: i64,
        mut input: UpdateHeroInput,
    ) -> Result<Hero, CatalogServiceError> {
        require_admin(snapshot)?;
        if let Some(name) = input.name.take() {
            input.name = Some(required(&name, "Hero name").map_err(CatalogServiceError::ValidationError)?);
        }

        Ok(self.catalog.update_hero(id, &input).await?)
    }

    /// Delete a hero and, with it, its skins (admin only)
    pub async fn delete(&self, snapshot: &AuthSnapshot, id: i64) -> Result<(), CatalogServiceError> {
        require_admin(snapshot)?;
        self.catalog.delete_hero(id).await?;
        tracing::info!("Deleted hero {}", id);
        Ok(())
    }
}
