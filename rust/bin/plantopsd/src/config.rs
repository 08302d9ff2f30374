//! Server-side configuration, read from `/etc/plantops/<context>.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use qr::QrConfig;

/// Directory holding per-context server configs.
const CONFIG_DIR: &str = "/etc/plantops";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub qr: QrConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Overrides `{data_dir}/data.sqlite`.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Roles that carry every QR permission (operational scans, calibration
    /// stream, token administration).
    #[serde(default)]
    pub operational_roles: Vec<String>,
}

impl ServerConfig {
    /// A bare context name maps to `/etc/plantops/<name>.toml`; anything
    /// containing `/` or `.` is used as a path.
    pub fn resolve_path(context: &str) -> PathBuf {
        if context.contains('/') || context.contains('.') {
            PathBuf::from(context)
        } else {
            Path::new(CONFIG_DIR).join(format!("{context}.toml"))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
