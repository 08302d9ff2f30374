use serde::{Deserialize, Serialize};

/// A scan of the calibration token. Lives only in the in-memory buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationScanEvent {
    pub timestamp: String,
    pub token: String,
    pub user_agent: String,
    pub success: bool,
}
