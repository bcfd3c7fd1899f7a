//! Data models
//!
//! This module contains all data structures shared across the crate.
//! Models represent:
//! - Rows of the remote tables (Profile, Hero, Skin, OwnedSkin, ChatMessage)
//! - Identity provider records (Session, AuthUser, AuthEvent)
//! - Derived views (Checklist)

mod auth_event;
mod checklist;
mod hero;
mod message;
mod session;
mod skin;
mod user;

pub use auth_event::AuthEvent;
pub use checklist::{Checklist, ChecklistFilter, HeroProgress};
pub use hero::{CreateHeroInput, Hero, UpdateHeroInput};
pub use message::ChatMessage;
pub use session::Session;
pub use skin::{CreateSkinInput, OwnedSkin, Skin, Toggle, UpdateSkinInput};
pub use user::{AuthUser, NewProfile, Profile, ProfileRole, ProfileSummary, UpdateProfileInput};
