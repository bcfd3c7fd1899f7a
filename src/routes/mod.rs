//! Route table
//!
//! Maps locations to the application's views and the access each requires.
//! The guard in [`guard`] combines a route's requirement with the current
//! `AuthSnapshot`.

mod guard;

pub use guard::{GuardDecision, RouteGuard};

use std::fmt;

/// Access requirement of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anyone
    Public,
    /// Only visitors without a session (login, register)
    GuestOnly,
    /// Any signed-in player
    Authenticated,
    /// Signed-in administrators
    Admin,
}

/// Application views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Register,
    Heroes,
    HeroDetail(i64),
    /// Hero editor in create mode
    HeroCreate,
    HeroEdit(i64),
    Checklist,
    Chat,
    Admin,
    Profile,
    NotFound,
}

impl Route {
    /// Resolve a location (path with optional query or fragment)
    pub fn resolve(location: &str) -> Self {
        let path = strip_query(location);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if !path.starts_with('/') {
            return Route::NotFound;
        }

        match segments.as_slice() {
            [] => Route::Home,
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            ["heroes"] => Route::Heroes,
            ["hero", "new"] | ["hero", "new", "edit"] => Route::HeroCreate,
            ["hero", id] => parse_id(id).map(Route::HeroDetail).unwrap_or(Route::NotFound),
            ["hero", id, "edit"] => parse_id(id).map(Route::HeroEdit).unwrap_or(Route::NotFound),
            ["checklist"] => Route::Checklist,
            ["chat"] => Route::Chat,
            ["admin"] => Route::Admin,
            ["profile"] => Route::Profile,
            _ => Route::NotFound,
        }
    }

    /// Requirement for reaching this route
    pub fn access(&self) -> Access {
        match self {
            Route::Home | Route::Heroes | Route::HeroDetail(_) | Route::NotFound => Access::Public,
            Route::Login | Route::Register => Access::GuestOnly,
            Route::Checklist | Route::Chat | Route::Profile => Access::Authenticated,
            Route::HeroCreate | Route::HeroEdit(_) | Route::Admin => Access::Admin,
        }
    }

    /// Canonical path
    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::Heroes => "/heroes".to_string(),
            Route::HeroDetail(id) => format!("/hero/{}", id),
            Route::HeroCreate => "/hero/new/edit".to_string(),
            Route::HeroEdit(id) => format!("/hero/{}/edit", id),
            Route::Checklist => "/checklist".to_string(),
            Route::Chat => "/chat".to_string(),
            Route::Admin => "/admin".to_string(),
            Route::Profile => "/profile".to_string(),
            Route::NotFound => "/404".to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

fn strip_query(location: &str) -> &str {
    let end = location
        .find(|c| c == '?' || c == '#')
        .unwrap_or(location.len());
    &location[..end]
}

fn parse_id(segment: &str) -> Option<i64> {
    segment.parse::<i64>().ok().filter(|id| *id > 0)
}
