//! Skin service
//!
//! Catalog reads, admin-only skin management, and the player's collection:
//! toggling a skin adds it when missing and removes it when owned.

use std::sync::Arc;

use super::{optional, require_admin, require_user, required};
use crate::backend::CatalogStore;
use crate::models::{CreateSkinInput, Skin, Toggle, UpdateSkinInput};
use crate::services::CatalogServiceError;
use crate::session::AuthSnapshot;

/// Skin service
pub struct SkinService {
    catalog: Arc<dyn CatalogStore>,
}

impl SkinService {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// All skins ordered by hero, then name
    pub async fn list(&self) -> Result<Vec<Skin>, CatalogServiceError> {
        Ok(self.catalog.list_skins().await?)
    }

    /// Skins of one hero ordered by name
    pub async fn list_by_hero(&self, hero_id: i64) -> Result<Vec<Skin>, CatalogServiceError> {
        Ok(self.catalog.list_skins_by_hero(hero_id).await?)
    }

    /// Get a skin by id
    pub async fn get(&self, id: i64) -> Result<Skin, CatalogServiceError> {
        self.catalog
            .get_skin(id)
            .await?
            .ok_or_else(|| CatalogServiceError::NotFound(format!("skin {}", id)))
    }

    /// Create a skin (admin only)
    pub async fn create(
        &self,
        snapshot: &AuthSnapshot,
        input: CreateSkinInput,
    ) -> Result<Skin, CatalogServiceError> {
        require_admin(snapshot)?;
        let input = CreateSkinInput {
            hero_id: input.hero_id,
            name: required(&input.name, "Skin name").map_err(CatalogServiceError::ValidationError)?,
            rarity: required(&input.rarity, "Rarity").map_err(CatalogServiceError::ValidationError)?,
            image_url: input.image_url.as_deref().and_then(optional),
        };

        let skin = self.catalog.create_skin(&input).await?;
        tracing::info!("Created skin {} for hero {}", skin.name, skin.hero_id);
        Ok(skin)
    }

    /// Update a skin (admin only)
    pub async fn update(
        &self,
        snapshot: &AuthSnapshot,
        id: i64,
        mut input: UpdateSkinInput,
    ) -> Result<Skin, CatalogServiceError> {
        require_admin(snapshot)?;
        if let Some(name) = input.name.take() {
            input.name = Some(required(&name, "Skin name").map_err(CatalogServiceError::ValidationError)?);
        }
        if let Some(rarity) = input.rarity.take() {
            input.rarity = Some(required(&rarity, "Rarity").map_err(CatalogServiceError::ValidationError)?);
        }

        Ok(self.catalog.update_skin(id, &input).await?)
    }

    /// Delete a skin (admin only)
    pub async fn delete(&self, snapshot: &AuthSnapshot, id: i64) -> Result<(), CatalogServiceError> {
        require_admin(snapshot)?;
        self.catalog.delete_skin(id).await?;
        tracing::info!("Deleted skin {}", id);
        Ok(())
    }

    /// Ids of the skins the signed-in player owns
    pub async fn owned_ids(&self, snapshot: &AuthSnapshot) -> Result<Vec<i64>, CatalogServiceError> {
        let user_id = require_user(snapshot)?;
        Ok(self.catalog.owned_skin_ids(user_id).await?)
    }

    /// Flip membership of a skin in the signed-in player's collection
    pub async fn toggle_owned(
        &self,
        snapshot: &AuthSnapshot,
        skin_id: i64,
    ) -> Result<Toggle, CatalogServiceError> {
        let user_id = require_user(snapshot)?;

        match self.catalog.find_owned(user_id, skin_id).await? {
            Some(row) => {
                self.catalog.remove_owned(row.id).await?;
                tracing::debug!("{} removed skin {}", user_id, skin_id);
                Ok(Toggle::Removed)
            }
            None => {
                self.catalog.add_owned(user_id, skin_id).await?;
                tracing::debug!("{} collected skin {}", user_id, skin_id);
                Ok(Toggle::Added)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthUser, CreateHeroInput};
    use crate::services::test_support;
    use uuid::Uuid;

    async fn setup() -> (SkinService, AuthSnapshot, AuthSnapshot, i64) {
        let (_, backend) = test_support::backend();
        let hero = backend
            .catalog
            .create_hero(&CreateHeroInput::new("Levi", ""))
            .await
            .unwrap();
        let user = AuthUser::new(Uuid::new_v4(), "a@example.com");
        (
            SkinService::new(backend.catalog.clone()),
            test_support::snapshot_for(&user, true),
            test_support::snapshot_for(&user, false),
            hero.id,
        )
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let (service, admin, player, hero_id) = setup().await;
        let skin = service
            .create(&admin, CreateSkinInput::new(hero_id, "Neon", "epic"))
            .await
            .unwrap();

        assert_eq!(service.toggle_owned(&player, skin.id).await.unwrap(), Toggle::Added);
        assert_eq!(service.owned_ids(&player).await.unwrap(), vec![skin.id]);

        assert_eq!(service.toggle_owned(&player, skin.id).await.unwrap(), Toggle::Removed);
        assert!(service.owned_ids(&player).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_requires_session() {
        let (service, _, _, _) = setup().await;
        assert!(matches!(
            service.toggle_owned(&AuthSnapshot::default(), 1).await,
            Err(CatalogServiceError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_toggle_unknown_skin() {
        let (service, _, player, _) = setup().await;
        assert!(matches!(
            service.toggle_owned(&player, 9999).await,
            Err(CatalogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_validation_and_permissions() {
        let (service, admin, player, hero_id) = setup().await;

        assert!(matches!(
            service.create(&player, CreateSkinInput::new(hero_id, "Neon", "epic")).await,
            Err(CatalogServiceError::Forbidden)
        ));
        assert!(matches!(
            service.create(&admin, CreateSkinInput::new(hero_id, "Neon", " ")).await,
            Err(CatalogServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create(&admin, CreateSkinInput::new(hero_id + 100, "Neon", "epic")).await,
            Err(CatalogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (service, admin, _, hero_id) = setup().await;
        let skin = service
            .create(&admin, CreateSkinInput::new(hero_id, "Neon", "epic"))
            .await
            .unwrap();

        let update = UpdateSkinInput {
            rarity: Some(" legendary ".to_string()),
            ..Default::default()
        };
        let updated = service.update(&admin, skin.id, update).await.unwrap();
        assert_eq!(updated.rarity, "legendary");
        assert_eq!(service.list_by_hero(hero_id).await.unwrap(), vec![updated]);

        service.delete(&admin, skin.id).await.unwrap();
        assert!(service.list().await.unwrap().is_empty());
        assert!(matches!(service.get(skin.id).await, Err(CatalogServiceError::NotFound(_))));
    }
}
