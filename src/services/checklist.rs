//! Checklist service

use std::sync::Arc;

use super::require_user;
use crate::backend::CatalogStore;
use crate::models::Checklist;
use crate::services::CatalogServiceError;
use crate::session::AuthSnapshot;

/// Loads the catalog and the signed-in player's collection into a `Checklist`
pub struct ChecklistService {
    catalog: Arc<dyn CatalogStore>,
}

impl ChecklistService {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Heroes, skins and owned ids are fetched in parallel
    pub async fn load(&self, snapshot: &AuthSnapshot) -> Result<Checklist, CatalogServiceError> {
        let user_id = require_user(snapshot)?;

        let (heroes, skins, owned) = futures::future::try_join3(
            self.catalog.list_heroes(),
            self.catalog.list_skins(),
            self.catalog.owned_skin_ids(user_id),
        )
        .await?;

        tracing::debug!(
            "Checklist for {}: {} of {} skins",
            user_id,
            owned.len(),
            skins.len()
        );
        Ok(Checklist::build(heroes, &skins, &owned))
    }
}
