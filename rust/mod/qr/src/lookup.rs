//! Read-only contracts for data owned by other modules.
//!
//! The precedence engine only sees these traits. SQL-backed implementations
//! live in [`crate::store`]; tests substitute in-memory ones.

use chrono::{DateTime, Utc};

use plantops_core::ServiceError;

use crate::model::{EntityType, RedirectRule, RuleKey, RunProjection};

/// Whether an entity has a publicly visible transparency record.
pub trait TransparencyDirectory: Send + Sync {
    fn is_publicly_visible(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<bool, ServiceError>;
}

/// The single winning redirect rule for a key at a point in time.
pub trait RedirectRuleSource: Send + Sync {
    fn find_active_redirect_rule(
        &self,
        key: &RuleKey,
        now: DateTime<Utc>,
    ) -> Result<Option<RedirectRule>, ServiceError>;
}

/// The production run a token is bound to, if any.
pub trait ProductionRunDirectory: Send + Sync {
    fn bound_production_run(&self, token_id: &str) -> Result<Option<RunProjection>, ServiceError>;
}
