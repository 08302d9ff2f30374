//! Bootstrap: first-start checks and default redirect seeding.
//!
//! When plantopsd starts:
//! 1. Verify the config is usable. If not, refuse to start.
//! 2. Ensure the system-wide default redirect exists when one is configured.

use tracing::info;

use qr::QrService;

use crate::config::ServerConfig;

/// Verify server configuration is ready for production use.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.jwt.secret.is_empty() {
        anyhow::bail!("JWT secret is empty in configuration.");
    }
    if config.storage.data_dir.is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    config
        .qr
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid [qr] configuration: {}", e))?;
    if let Some(url) = &config.qr.default_redirect_url {
        if url.trim().is_empty() {
            anyhow::bail!("qr.default_redirect_url is set but empty.");
        }
    }
    Ok(())
}

/// Seed the FALLBACK rule from `qr.default_redirect_url` if none exists.
pub fn ensure_default_redirect(config: &ServerConfig, service: &QrService) -> anyhow::Result<()> {
    let Some(url) = &config.qr.default_redirect_url else {
        info!("no default redirect configured");
        return Ok(());
    };
    let created = service
        .ensure_default_redirect(url)
        .map_err(|e| anyhow::anyhow!("failed to create default redirect: {}", e))?;
    if !created {
        info!("default redirect already exists");
    }
    Ok(())
}
