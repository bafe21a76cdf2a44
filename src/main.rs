use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use beacon_server::config::{generate_config_template, Config};
use beacon_server::store::{memory::MemoryStore, Collaborators, RoomVisibility};
use beacon_server::{auth, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "beacon_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "beacon_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("beacon-server v{} starting", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    // In-memory durable-state collaborators, with one public room so fresh
    // deployments have somewhere to land.
    let memory = Arc::new(MemoryStore::new());
    memory.insert_room("general", "General", RoomVisibility::Public);
    tracing::info!("seeded public room \"general\"");

    let app_state = state::AppState::new(
        jwt_secret,
        Arc::new(Collaborators::from_memory(memory)),
        Duration::from_secs(config.idle_timeout_secs),
        Duration::from_secs(config.idle_warning_secs),
    );

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
