//! Skintrack - skin collection checklist for Bullet Echo
//!
//! This library provides the client core: session synchronization, route
//! guarding, and the services behind the catalog, checklist, profile, admin
//! and chat views.

pub mod app;
pub mod backend;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
