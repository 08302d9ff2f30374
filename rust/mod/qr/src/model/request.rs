use serde::Deserialize;

use super::EntityType;

/// Body of `POST /qr/v1/tokens`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    pub entity_type: EntityType,
    pub entity_id: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Body of `POST /qr/v1/tokens/{id}/revoke`.
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeTokenRequest {
    pub reason: String,
}

/// Body of `POST /qr/v1/calibration/scans`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationNotify {
    pub token: String,
    #[serde(default)]
    pub user_agent: String,
}
