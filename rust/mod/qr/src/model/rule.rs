use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plantops_core::parse_rfc3339;

use super::EntityType;

/// Scope a redirect rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchedBy {
    Version,
    Batch,
    Product,
    Entity,
    Fallback,
}

impl MatchedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Version => "VERSION",
            Self::Batch => "BATCH",
            Self::Product => "PRODUCT",
            Self::Entity => "ENTITY",
            Self::Fallback => "FALLBACK",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "VERSION" => Some(Self::Version),
            "BATCH" => Some(Self::Batch),
            "PRODUCT" => Some(Self::Product),
            "ENTITY" => Some(Self::Entity),
            "FALLBACK" => Some(Self::Fallback),
            _ => None,
        }
    }

    /// Specificity tier, lower wins: VERSION, then exact entity, then FALLBACK.
    pub fn tier(&self) -> u8 {
        match self {
            Self::Version => 0,
            Self::Batch | Self::Product | Self::Entity => 1,
            Self::Fallback => 2,
        }
    }
}

impl std::fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a rule lookup is keyed on: the scanned token's target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleKey {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub version_id: Option<String>,
}

/// A configured redirect. Maps 1:1 to the `redirect_rules` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRule {
    pub id: String,
    pub matched_by: MatchedBy,

    /// Target entity; `None` for VERSION and FALLBACK rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Target label version; only meaningful for VERSION rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,

    pub redirect_url: String,
    pub active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,

    pub create_at: String,
}

impl RedirectRule {
    /// Whether `now` lies inside `[startsAt, endsAt]`. Open bounds are
    /// unbounded; an unparseable bound closes the window.
    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        let after_start = match self.starts_at.as_deref() {
            None => true,
            Some(raw) => parse_rfc3339(raw).is_some_and(|start| start <= now),
        };
        let before_end = match self.ends_at.as_deref() {
            None => true,
            Some(raw) => parse_rfc3339(raw).is_some_and(|end| now <= end),
        };
        after_start && before_end
    }

    /// Whether the rule's scope covers `key`.
    pub fn applies_to(&self, key: &RuleKey) -> bool {
        match self.matched_by {
            MatchedBy::Version => match (&self.version_id, &key.version_id) {
                (Some(rule_v), Some(key_v)) => rule_v == key_v,
                _ => false,
            },
            MatchedBy::Batch | MatchedBy::Product | MatchedBy::Entity => {
                self.entity_type == Some(key.entity_type)
                    && self.entity_id.as_deref() == Some(key.entity_id.as_str())
            }
            MatchedBy::Fallback => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(matched_by: MatchedBy) -> RedirectRule {
        RedirectRule {
            id: "r1".into(),
            matched_by,
            entity_type: None,
            entity_id: None,
            version_id: None,
            redirect_url: "https://x/y".into(),
            active: true,
            starts_at: None,
            ends_at: None,
            create_at: "2025-01-01T00:00:00.000Z".into(),
        }
    }

    fn key() -> RuleKey {
        RuleKey {
            entity_type: EntityType::Product,
            entity_id: "p1".into(),
            version_id: Some("v2".into()),
        }
    }

    #[test]
    fn tiers() {
        assert!(MatchedBy::Version.tier() < MatchedBy::Product.tier());
        assert_eq!(MatchedBy::Batch.tier(), MatchedBy::Entity.tier());
        assert!(MatchedBy::Entity.tier() < MatchedBy::Fallback.tier());
    }

    #[test]
    fn window_is_inclusive() {
        let now = parse_rfc3339("2025-06-01T12:00:00Z").unwrap();
        let mut r = rule(MatchedBy::Fallback);
        assert!(r.in_window(now));

        r.starts_at = Some("2025-06-01T12:00:00.000Z".into());
        r.ends_at = Some("2025-06-01T12:00:00.000Z".into());
        assert!(r.in_window(now));

        r.ends_at = Some("2025-06-01T11:59:59.999Z".into());
        assert!(!r.in_window(now));

        r.starts_at = Some("2025-07-01T00:00:00.000Z".into());
        r.ends_at = None;
        assert!(!r.in_window(now));

        r.starts_at = Some("not a date".into());
        assert!(!r.in_window(now));
    }

    #[test]
    fn scope_matching() {
        let mut version = rule(MatchedBy::Version);
        version.version_id = Some("v2".into());
        assert!(version.applies_to(&key()));
        version.version_id = Some("v1".into());
        assert!(!version.applies_to(&key()));

        let mut product = rule(MatchedBy::Product);
        product.entity_type = Some(EntityType::Product);
        product.entity_id = Some("p1".into());
        assert!(product.applies_to(&key()));
        product.entity_type = Some(EntityType::Batch);
        assert!(!product.applies_to(&key()));

        assert!(rule(MatchedBy::Fallback).applies_to(&key()));
    }
}
