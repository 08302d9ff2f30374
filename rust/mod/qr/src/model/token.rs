use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plantops_core::parse_rfc3339;

/// Lifecycle state of a printed token.
///
/// ```text
/// ACTIVE → REVOKED   (operator action)
///        → EXPIRED   (expiresAt passed)
/// ```
///
/// Transitions are one-directional; terminal tokens are never reactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    Active,
    Revoked,
    Expired,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "REVOKED" => Some(Self::Revoked),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked | Self::Expired)
    }
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of record a token is printed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Product,
    Batch,
    Inventory,
    Custom,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "PRODUCT",
            Self::Batch => "BATCH",
            Self::Inventory => "INVENTORY",
            Self::Custom => "CUSTOM",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PRODUCT" => Some(Self::Product),
            "BATCH" => Some(Self::Batch),
            "INVENTORY" => Some(Self::Inventory),
            "CUSTOM" => Some(Self::Custom),
            _ => None,
        }
    }

    /// URL path segment (`product`, `batch`, ...).
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Batch => "batch",
            Self::Inventory => "inventory",
            Self::Custom => "custom",
        }
    }

    /// Entities that carry public transparency records.
    pub fn has_transparency(&self) -> bool {
        matches!(self, Self::Product | Self::Batch)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A printed scan token. Maps 1:1 to the `tokens` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,

    /// Opaque printed value, always starting with the reserved prefix.
    pub value: String,

    pub status: TokenStatus,

    pub entity_type: EntityType,
    pub entity_id: String,

    /// Direct destination override; wins over every other routing source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,

    /// Label version this token was printed for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,

    pub printed_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,

    #[serde(default)]
    pub scan_count: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scanned_at: Option<String>,
}

impl Token {
    /// An ACTIVE token whose expiry has passed. Stored but not yet
    /// transitioned to EXPIRED.
    ///
    /// An unparseable expiry counts as lapsed.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        if self.status != TokenStatus::Active {
            return false;
        }
        match self.expires_at.as_deref() {
            None => false,
            Some(raw) => parse_rfc3339(raw).map_or(true, |exp| exp <= now),
        }
    }

    /// The token-level override, if one is set and non-empty.
    pub fn override_url(&self) -> Option<&str> {
        self.redirect_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}
