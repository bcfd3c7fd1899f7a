//! PostgREST-backed profile and catalog stores

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use super::{Query, RestBackend};
use crate::backend::{BackendResult, CatalogStore, ProfileStore};
use crate::models::{
    CreateHeroInput, CreateSkinInput, Hero, NewProfile, OwnedSkin, Profile, ProfileRole,
    ProfileSummary, Skin, UpdateHeroInput, UpdateProfileInput, UpdateSkinInput,
};

const PROFILES: &str = "user_profiles";
const HEROES: &str = "heroes";
const SKINS: &str = "skins";
const OWNED: &str = "user_skins";

#[async_trait]
impl ProfileStore for RestBackend {
    async fn create_profile(&self, profile: NewProfile) -> BackendResult<Profile> {
        self.client.insert(PROFILES, &[profile]).await
    }

    async fn get_profile(&self, id: Uuid) -> BackendResult<Option<Profile>> {
        self.client
            .select_one(PROFILES, Query::new().select("*").eq("id", id))
            .await
    }

    async fn update_profile(&self, id: Uuid, input: &UpdateProfileInput) -> BackendResult<Profile> {
        self.client
            .update(PROFILES, Query::new().eq("id", id), input)
            .await
    }

    async fn list_profiles(&self) -> BackendResult<Vec<Profile>> {
        self.client
            .select(PROFILES, Query::new().select("*").order("username.asc"))
            .await
    }

    async fn set_role(&self, id: Uuid, role: ProfileRole) -> BackendResult<Profile> {
        self.client
            .update(PROFILES, Query::new().eq("id", id), &json!({ "role": role }))
            .await
    }

    async fn profile_summaries(&self, ids: &[Uuid]) -> BackendResult<Vec<ProfileSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.client
            .select(
                PROFILES,
                Query::new().select("id,username,avatar_url").in_list("id", ids),
            )
            .await
    }
}

#[async_trait]
impl CatalogStore for RestBackend {
    async fn list_heroes(&self) -> BackendResult<Vec<Hero>> {
        self.client
            .select(HEROES, Query::new().select("*").order("name.asc"))
            .await
    }

    async fn get_hero(&self, id: i64) -> BackendResult<Option<Hero>> {
        self.client
            .select_one(HEROES, Query::new().select("*").eq("id", id))
            .await
    }

    async fn create_hero(&self, input: &CreateHeroInput) -> BackendResult<Hero> {
        self.client.insert(HEROES, &[input]).await
    }

    async fn update_hero(&self, id: i64, input: &UpdateHeroInput) -> BackendResult<Hero> {
        self.client
            .update(HEROES, Query::new().eq("id", id), input)
            .await
    }

    async fn delete_hero(&self, id: i64) -> BackendResult<()> {
        // Skins and collection rows go with it via ON DELETE CASCADE
        self.client.delete(HEROES, Query::new().eq("id", id)).await
    }

    async fn list_skins(&self) -> BackendResult<Vec<Skin>> {
        self.client
            .select(SKINS, Query::new().select("*").order("hero_id.asc,name.asc"))
            .await
    }

    async fn list_skins_by_hero(&self, hero_id: i64) -> BackendResult<Vec<Skin>> {
        self.client
            .select(
                SKINS,
                Query::new()
                    .select("*")
                    .eq("hero_id", hero_id)
                    .order("name.asc"),
            )
            .await
    }

    async fn get_skin(&self, id: i64) -> BackendResult<Option<Skin>> {
        self.client
            .select_one(SKINS, Query::new().select("*").eq("id", id))
            .await
    }

    async fn create_skin(&self, input: &CreateSkinInput) -> BackendResult<Skin> {
        self.client.insert(SKINS, &[input]).await
    }

    async fn update_skin(&self, id: i64, input: &UpdateSkinInput) -> BackendResult<Skin> {
        self.client
            .update(SKINS, Query::new().eq("id", id), input)
            .await
    }

    async fn delete_skin(&self, id: i64) -> BackendResult<()> {
        self.client.delete(SKINS, Query::new().eq("id", id)).await
    }

    async fn owned_skin_ids(&self, user_id: Uuid) -> BackendResult<Vec<i64>> {
        #[derive(serde::Deserialize)]
        struct Row {
            skin_id: i64,
        }

        let rows: Vec<Row> = self
            .client
            .select(OWNED, Query::new().select("skin_id").eq("user_id", user_id))
            .await?;
        Ok(rows.into_iter().map(|r| r.skin_id).collect())
    }

    async fn find_owned(&self, user_id: Uuid, skin_id: i64) -> BackendResult<Option<OwnedSkin>> {
        self.client
            .select_one(
                OWNED,
                Query::new()
                    .select("*")
                    .eq("user_id", user_id)
                    .eq("skin_id", skin_id),
            )
            .await
    }

    async fn add_owned(&self, user_id: Uuid, skin_id: i64) -> BackendResult<OwnedSkin> {
        self.client
            .insert(OWNED, &[json!({ "user_id": user_id, "skin_id": skin_id })])
            .await
    }

    async fn remove_owned(&self, id: i64) -> BackendResult<()> {
        self.client.delete(OWNED, Query::new().eq("id", id)).await
    }
}
