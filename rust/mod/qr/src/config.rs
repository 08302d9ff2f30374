use serde::Deserialize;

use crate::format::TokenFormat;

/// Configuration for the QR resolution subsystem (`[qr]` in the server config).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    /// Reserved prefix every printed scan token starts with.
    pub token_prefix: String,

    /// Fixed, never-persisted token used for live visual tuning.
    pub calibration_token: String,

    /// Ring buffer size for calibration events.
    pub calibration_capacity: usize,

    /// Observer poll interval, which is also the keep-alive cadence.
    pub calibration_poll_ms: u64,

    /// How often the expiry sweeper runs.
    pub expiry_sweep_secs: u64,

    /// Seeds the system-wide FALLBACK rule at startup when none exists.
    pub default_redirect_url: Option<String>,

    pub routes: RouteConfig,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            token_prefix: "qr_".into(),
            calibration_token: "qr_calibration".into(),
            calibration_capacity: 50,
            calibration_poll_ms: 500,
            expiry_sweep_secs: 60,
            default_redirect_url: None,
            routes: RouteConfig::default(),
        }
    }
}

impl QrConfig {
    pub fn token_format(&self) -> TokenFormat {
        TokenFormat::new(&self.token_prefix)
    }

    /// Check the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_prefix.is_empty() {
            return Err("qr.token_prefix must not be empty".into());
        }
        if !self.token_format().is_valid(&self.calibration_token) {
            return Err(format!(
                "qr.calibration_token '{}' does not match the token format",
                self.calibration_token
            ));
        }
        if self.calibration_capacity == 0 {
            return Err("qr.calibration_capacity must be positive".into());
        }
        if self.calibration_poll_ms == 0 {
            return Err("qr.calibration_poll_ms must be positive".into());
        }
        Ok(())
    }
}

/// Path bases for the pages a scan can land on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub verification: String,
    pub transparency: String,
    pub production_run: String,
    pub product: String,
    pub batch: String,
    pub inventory: String,
    pub home: String,
    /// Internal token record page, used as the audited destination of
    /// operational status views.
    pub token: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            verification: "/verify".into(),
            transparency: "/transparency".into(),
            production_run: "/production/runs".into(),
            product: "/products".into(),
            batch: "/batches".into(),
            inventory: "/inventory".into(),
            home: "/".into(),
            token: "/qr/tokens".into(),
        }
    }
}
