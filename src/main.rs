//! Warden - shared authentication core for the hospital services
//!
//! Reference server mounting the auth core in front of a handful of routes.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden::{
    config::{Args, LogFormat},
    server,
    store::InMemoryCredentialStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let json = args.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("warden={},info", log_level).into()),
        )
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .init();

    // Validate configuration
    let settings = match args.security_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // Print startup banner
    info!("======================================");
    info!("  Warden - Authentication Core");
    info!("======================================");
    info!("Service: {}", settings.service_name);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Token algorithm: {:?}", settings.token_policy.algorithm);
    info!(
        "Token lifetimes: access {}m, refresh {}d",
        settings.token_policy.access_ttl.num_minutes(),
        settings.token_policy.refresh_ttl.num_days()
    );
    info!("Public prefixes: {}", settings.public_paths.join(", "));
    info!("======================================");

    let store = Arc::new(InMemoryCredentialStore::new());
    let state = Arc::new(server::AppState::new(&settings, store.clone())?);

    if args.seed_demo_users {
        warn!("Seeding demo users - never enable outside development");
        store.seed_demo_users(state.security.passwords()).await?;
    }

    // Run the server
    if let Err(e) = server::run(args.listen, state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
