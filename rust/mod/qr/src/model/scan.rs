use serde::{Deserialize, Serialize};

use super::{EntityType, MatchedBy, TokenStatus};

/// How a scan's destination was decided. Recorded on every audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionType {
    /// Token-level override, or a production-run binding.
    Token,
    Transparency,
    Version,
    Batch,
    Product,
    Entity,
    Fallback,
    /// Canonical per-entity route, nothing else matched.
    Default,
    /// Public scan of an ACTIVE token.
    Verification,
    Revoked,
    Expired,
}

impl ResolutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "TOKEN",
            Self::Transparency => "TRANSPARENCY",
            Self::Version => "VERSION",
            Self::Batch => "BATCH",
            Self::Product => "PRODUCT",
            Self::Entity => "ENTITY",
            Self::Fallback => "FALLBACK",
            Self::Default => "DEFAULT",
            Self::Verification => "VERIFICATION",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "TOKEN" => Some(Self::Token),
            "TRANSPARENCY" => Some(Self::Transparency),
            "VERSION" => Some(Self::Version),
            "BATCH" => Some(Self::Batch),
            "PRODUCT" => Some(Self::Product),
            "ENTITY" => Some(Self::Entity),
            "FALLBACK" => Some(Self::Fallback),
            "DEFAULT" => Some(Self::Default),
            "VERIFICATION" => Some(Self::Verification),
            "REVOKED" => Some(Self::Revoked),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Resolution type recorded for a token in a terminal state.
    pub fn for_terminal(status: TokenStatus) -> Option<Self> {
        match status {
            TokenStatus::Revoked => Some(Self::Revoked),
            TokenStatus::Expired => Some(Self::Expired),
            TokenStatus::Active => None,
        }
    }
}

impl From<MatchedBy> for ResolutionType {
    fn from(m: MatchedBy) -> Self {
        match m {
            MatchedBy::Version => Self::Version,
            MatchedBy::Batch => Self::Batch,
            MatchedBy::Product => Self::Product,
            MatchedBy::Entity => Self::Entity,
            MatchedBy::Fallback => Self::Fallback,
        }
    }
}

impl std::fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scanning context. Public is the default; operational is only granted to
/// authenticated internal actors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    #[default]
    Public,
    Operational,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Operational => "operational",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "operational" => Some(Self::Operational),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse location hints supplied by the edge in front of the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// One audited scan. Append-only; maps 1:1 to the `scan_events` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub id: String,
    pub timestamp: String,

    pub token_id: String,
    pub token_value: String,
    pub entity_type: EntityType,
    pub entity_id: String,

    pub resolution_type: ResolutionType,
    /// What the scanner was shown: redirect target or rendered page path.
    pub destination: String,
    pub mode: ScanMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub geo: GeoHints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Set when the scan was routed to a bound production run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// The run's current step at scan time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_step: Option<String>,

    /// Token scan count including this scan.
    pub scan_count_at_resolution: i64,
}
