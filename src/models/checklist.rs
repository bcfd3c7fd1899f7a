//! Collection checklist aggregation
//!
//! Combines the hero catalog, the skin catalog and a player's owned skin ids
//! into per-hero progress and overall totals.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use super::{Hero, Skin};

/// Which heroes to show on the checklist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistFilter {
    /// Every hero
    #[default]
    All,
    /// Heroes with at least one collected skin
    Collected,
    /// Heroes with at least one skin still missing
    Missing,
}

impl FromStr for ChecklistFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "collected" => Ok(Self::Collected),
            "missing" => Ok(Self::Missing),
            _ => Err(format!("Invalid checklist filter: {}", s)),
        }
    }
}

/// Progress for one hero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroProgress {
    pub hero: Hero,
    pub total_skins: usize,
    pub collected_skins: usize,
}

impl HeroProgress {
    /// Every skin of the hero is owned; a hero with no skins is never complete
    pub fn is_complete(&self) -> bool {
        self.total_skins > 0 && self.collected_skins == self.total_skins
    }

    fn matches(&self, filter: ChecklistFilter, search: &str) -> bool {
        let by_filter = match filter {
            ChecklistFilter::All => true,
            ChecklistFilter::Collected => self.collected_skins > 0,
            ChecklistFilter::Missing => self.collected_skins < self.total_skins,
        };
        by_filter && self.hero.name.to_lowercase().contains(search)
    }
}

/// Whole-collection view backing the checklist page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    /// Heroes in catalog order with their counts
    pub heroes: Vec<HeroProgress>,
    /// Number of skins in the catalog
    pub total_skins: usize,
    /// Number of skins the player owns
    pub collected_skins: usize,
}

impl Checklist {
    /// Build the checklist from catalog rows and owned skin ids.
    ///
    /// Owned ids that no longer match a catalog skin still count toward
    /// `collected_skins`, mirroring how the totals are shown in game.
    pub fn build(heroes: Vec<Hero>, skins: &[Skin], owned: &[i64]) -> Self {
        let owned_set: HashSet<i64> = owned.iter().copied().collect();

        let mut per_hero: HashMap<i64, (usize, usize)> = HashMap::new();
        for skin in skins {
            let entry = per_hero.entry(skin.hero_id).or_insert((0, 0));
            entry.0 += 1;
            if owned_set.contains(&skin.id) {
                entry.1 += 1;
            }
        }

        let heroes = heroes
            .into_iter()
            .map(|hero| {
                let (total, collected) = per_hero.get(&hero.id).copied().unwrap_or((0, 0));
                HeroProgress {
                    hero,
                    total_skins: total,
                    collected_skins: collected,
                }
            })
            .collect();

        Self {
            heroes,
            total_skins: skins.len(),
            collected_skins: owned_set.len(),
        }
    }

    /// Collection percentage, rounded; 0 for an empty catalog
    pub fn percentage(&self) -> u32 {
        let total = self.total_skins.max(1) as f64;
        ((self.collected_skins as f64 / total) * 100.0).round() as u32
    }

    /// Heroes passing the filter whose name contains `search` (case-insensitive)
    pub fn filtered(&self, filter: ChecklistFilter, search: &str) -> Vec<&HeroProgress> {
        let needle = search.trim().to_lowercase();
        self.heroes
            .iter()
            .filter(|p| p.matches(filter, &needle))
            .collect()
    }
}
