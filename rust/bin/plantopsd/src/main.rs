//! `plantopsd`: the plant operations QR resolution server.
//!
//! Usage:
//!   plantopsd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/plantops/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod auth;
mod bootstrap;
mod config;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use plantops_core::{Module, ServiceConfig};
use tracing::info;

use auth::JwtAuthenticator;
use config::ServerConfig;

/// Plant operations server.
#[derive(Parser, Debug)]
#[command(name = "plantopsd", about = "Plant operations QR resolution server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides default 0.0.0.0:8080).
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Load server configuration.
    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;

    // Verify configuration is valid.
    bootstrap::verify_config(&server_config)?;

    // Initialize storage.
    let data_dir = PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = ServiceConfig {
        data_dir: Some(data_dir),
        sqlite_path: server_config.storage.sqlite_path.as_ref().map(PathBuf::from),
        listen: cli.listen.clone(),
    };

    let sql: Arc<dyn plantops_sql::SQLStore> = Arc::new(
        plantops_sql::SqliteStore::open(&core_config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );

    let authenticator: Arc<dyn plantops_core::Authenticator> = Arc::new(JwtAuthenticator::new(
        &server_config.jwt.secret,
        server_config.auth.operational_roles.clone(),
    ));

    let qr_module = qr::QrModule::new(
        Arc::clone(&sql),
        server_config.qr.clone(),
        authenticator,
    )?;
    info!("QR module initialized");

    // Bootstrap: default redirect.
    bootstrap::ensure_default_redirect(&server_config, qr_module.service())?;

    let module_routes = vec![(qr_module.name(), qr_module.routes())];
    let app = routes::build_router(module_routes);

    // Start server.
    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("plantopsd listening on {}", core_config.listen);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
