//! Skintrack - skin collection checklist for Bullet Echo

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skintrack::{app::AppState, config::Config, routes::GuardDecision};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skintrack=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting skintrack...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded (backend: {:?})", config.backend.driver);

    let location = std::env::args().nth(1).unwrap_or_else(|| "/".to_string());

    let state = AppState::new(config)?;
    let snapshot = state.session.wait_until_loaded().await;
    match snapshot.user.as_ref() {
        Some(user) => tracing::info!("Signed in as {}", user.id),
        None => tracing::info!("No session"),
    }
    if let Some(ref error) = snapshot.error {
        tracing::warn!("Session could not be restored: {}", error);
    }
    report(&location, state.navigate(&location));

    // Follow session changes until interrupted
    let mut changes = state.session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = changes.borrow_and_update().clone();
                tracing::info!(
                    "Session changed: authenticated={}, admin={}",
                    snapshot.is_authenticated(),
                    snapshot.is_admin
                );
                report(&location, state.navigate(&location));
            }
        }
    }

    state.shutdown().await;
    Ok(())
}

fn report(location: &str, decision: GuardDecision) {
    match decision {
        GuardDecision::Loading => tracing::info!("{}: waiting for session", location),
        GuardDecision::Render(route) => tracing::info!("{}: render {:?}", location, route),
        GuardDecision::Redirect { to, from } => {
            tracing::info!("{}: redirect to {} (from: {:?})", location, to, from)
        }
    }
}
