use std::sync::Arc;

use chrono::{DateTime, Utc};

use plantops_core::ServiceError;
use plantops_sql::{Row, SQLStore, Value};

use crate::lookup::RedirectRuleSource;
use crate::model::{EntityType, MatchedBy, RedirectRule, RuleKey};
use crate::precedence::select_winning_rule;

use super::storage_err;

const RULE_COLUMNS: &str = "id, matched_by, entity_type, entity_id, version_id, \
     redirect_url, active, starts_at, ends_at, create_at";

/// Redirect rules backed by SQLite.
///
/// Rules are authored elsewhere; this store reads them for resolution and
/// offers the minimal writes needed to seed the default redirect.
pub struct SqlRuleStore {
    db: Arc<dyn SQLStore>,
}

impl SqlRuleStore {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }

    /// Insert a rule after checking its scope fields are consistent.
    ///
    /// A second FALLBACK rule is rejected with `Conflict`.
    pub fn insert(&self, rule: &RedirectRule) -> Result<(), ServiceError> {
        check_scope(rule)?;
        self.db
            .exec(
                &format!(
                    "INSERT INTO redirect_rules ({RULE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                &[
                    Value::Text(rule.id.clone()),
                    Value::Text(rule.matched_by.as_str().to_string()),
                    Value::opt_text(rule.entity_type.map(|t| t.as_str())),
                    Value::opt_text(rule.entity_id.as_deref()),
                    Value::opt_text(rule.version_id.as_deref()),
                    Value::Text(rule.redirect_url.clone()),
                    Value::Integer(rule.active as i64),
                    Value::opt_text(rule.starts_at.as_deref()),
                    Value::opt_text(rule.ends_at.as_deref()),
                    Value::Text(rule.create_at.clone()),
                ],
            )
            .map_err(storage_err)?;
        Ok(())
    }

    /// The system-wide default redirect, enabled or not.
    pub fn fallback(&self) -> Result<Option<RedirectRule>, ServiceError> {
        let rows = self
            .db
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM redirect_rules WHERE matched_by = 'FALLBACK'"),
                &[],
            )
            .map_err(storage_err)?;
        rows.first().map(row_to_rule).transpose()
    }

    /// Enable or disable a rule without deleting it.
    pub fn set_active(&self, id: &str, active: bool) -> Result<(), ServiceError> {
        let affected = self
            .db
            .exec(
                "UPDATE redirect_rules SET active = ?1 WHERE id = ?2",
                &[Value::Integer(active as i64), Value::Text(id.to_string())],
            )
            .map_err(storage_err)?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("redirect_rules/{id}")));
        }
        Ok(())
    }

    /// Active rules whose scope could cover `key`. Window and ranking are
    /// applied by [`select_winning_rule`].
    fn candidates(&self, key: &RuleKey) -> Result<Vec<RedirectRule>, ServiceError> {
        let rows = self
            .db
            .query(
                &format!(
                    "SELECT {RULE_COLUMNS} FROM redirect_rules WHERE active = 1 AND ( \
                       (matched_by = 'VERSION' AND version_id IS NOT NULL AND version_id = ?1) \
                       OR (matched_by IN ('BATCH', 'PRODUCT', 'ENTITY') \
                           AND entity_type = ?2 AND entity_id = ?3) \
                       OR matched_by = 'FALLBACK')"
                ),
                &[
                    Value::opt_text(key.version_id.as_deref()),
                    Value::Text(key.entity_type.as_str().to_string()),
                    Value::Text(key.entity_id.clone()),
                ],
            )
            .map_err(storage_err)?;
        rows.iter().map(row_to_rule).collect()
    }
}

impl RedirectRuleSource for SqlRuleStore {
    fn find_active_redirect_rule(
        &self,
        key: &RuleKey,
        now: DateTime<Utc>,
    ) -> Result<Option<RedirectRule>, ServiceError> {
        let candidates = self.candidates(key)?;
        Ok(select_winning_rule(candidates, key, now))
    }
}

fn check_scope(rule: &RedirectRule) -> Result<(), ServiceError> {
    let has_entity = rule.entity_type.is_some() && rule.entity_id.is_some();
    let ok = match rule.matched_by {
        MatchedBy::Version => rule.version_id.is_some(),
        MatchedBy::Batch => has_entity && rule.entity_type == Some(EntityType::Batch),
        MatchedBy::Product => has_entity && rule.entity_type == Some(EntityType::Product),
        MatchedBy::Entity => has_entity,
        MatchedBy::Fallback => rule.entity_type.is_none() && rule.entity_id.is_none(),
    };
    if !ok {
        return Err(ServiceError::Validation(format!(
            "redirect rule {} has an inconsistent {} scope",
            rule.id, rule.matched_by
        )));
    }
    if rule.redirect_url.trim().is_empty() {
        return Err(ServiceError::Validation(format!(
            "redirect rule {} has an empty redirect url",
            rule.id
        )));
    }
    Ok(())
}

fn row_to_rule(row: &Row) -> Result<RedirectRule, ServiceError> {
    let bad = |what: &str| ServiceError::Storage(format!("redirect_rules: bad {what}"));
    let matched_by = row
        .get_str("matched_by")
        .and_then(MatchedBy::from_str)
        .ok_or_else(|| bad("matched_by"))?;
    let entity_type = match row.get_str("entity_type") {
        Some(s) => Some(EntityType::from_str(s).ok_or_else(|| bad("entity_type"))?),
        None => None,
    };
    Ok(RedirectRule {
        id: row.get_str("id").ok_or_else(|| bad("id"))?.to_string(),
        matched_by,
        entity_type,
        entity_id: row.get_str("entity_id").map(String::from),
        version_id: row.get_str("version_id").map(String::from),
        redirect_url: row
            .get_str("redirect_url")
            .ok_or_else(|| bad("redirect_url"))?
            .to_string(),
        active: row.get_i64("active").unwrap_or(0) != 0,
        starts_at: row.get_str("starts_at").map(String::from),
        ends_at: row.get_str("ends_at").map(String::from),
        create_at: row
            .get_str("create_at")
            .ok_or_else(|| bad("create_at"))?
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tokens::tests::test_db;
    use plantops_core::parse_rfc3339;

    fn fallback() -> RedirectRule {
        rule("fb", MatchedBy::Fallback, "https://fallback", "2025-01-01T00:00:00.000Z")
    }

    fn rule(id: &str, matched_by: MatchedBy, url: &str, create_at: &str) -> RedirectRule {
        let (entity_type, entity_id, version_id) = match matched_by {
            MatchedBy::Version => (None, None, Some("v2".to_string())),
            MatchedBy::Batch => (Some(EntityType::Batch), Some("b1".to_string()), None),
            MatchedBy::Product | MatchedBy::Entity => {
                (Some(EntityType::Product), Some("p1".to_string()), None)
            }
            MatchedBy::Fallback => (None, None, None),
        };
        RedirectRule {
            id: id.into(),
            matched_by,
            entity_type,
            entity_id,
            version_id,
            redirect_url: url.into(),
            active: true,
            starts_at: None,
            ends_at: None,
            create_at: create_at.into(),
        }
    }

    fn product_key(version: Option<&str>) -> RuleKey {
        RuleKey {
            entity_type: EntityType::Product,
            entity_id: "p1".into(),
            version_id: version.map(String::from),
        }
    }

    fn now() -> DateTime<Utc> {
        parse_rfc3339("2025-06-01T00:00:00Z").unwrap()
    }

    #[test]
    fn version_beats_entity_beats_fallback() {
        let store = SqlRuleStore::new(test_db());
        store.insert(&fallback()).unwrap();
        store
            .insert(&rule("prod", MatchedBy::Product, "https://x/y", "2025-01-02T00:00:00.000Z"))
            .unwrap();
        store
            .insert(&rule("ver", MatchedBy::Version, "https://version", "2025-01-01T00:00:00.000Z"))
            .unwrap();

        let win = store
            .find_active_redirect_rule(&product_key(Some("v2")), now())
            .unwrap()
            .unwrap();
        assert_eq!(win.id, "ver");

        let win = store
            .find_active_redirect_rule(&product_key(None), now())
            .unwrap()
            .unwrap();
        assert_eq!(win.id, "prod");

        let other = RuleKey {
            entity_type: EntityType::Inventory,
            entity_id: "i9".into(),
            version_id: None,
        };
        let win = store.find_active_redirect_rule(&other, now()).unwrap().unwrap();
        assert_eq!(win.id, "fb");
    }

    #[test]
    fn disabled_fallback_is_not_selected() {
        let store = SqlRuleStore::new(test_db());
        store.insert(&fallback()).unwrap();
        store.set_active("fb", false).unwrap();

        assert!(store
            .find_active_redirect_rule(&product_key(None), now())
            .unwrap()
            .is_none());
        assert!(!store.fallback().unwrap().unwrap().active);
        assert!(matches!(store.set_active("nope", true), Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn only_one_fallback() {
        let store = SqlRuleStore::new(test_db());
        store
            .insert(&rule("fb1", MatchedBy::Fallback, "https://a", "2025-01-01T00:00:00.000Z"))
            .unwrap();
        let err = store
            .insert(&rule("fb2", MatchedBy::Fallback, "https://b", "2025-01-02T00:00:00.000Z"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn inconsistent_scope_is_rejected() {
        let store = SqlRuleStore::new(test_db());
        let mut r = rule("b", MatchedBy::Batch, "https://b", "2025-01-01T00:00:00.000Z");
        r.entity_type = Some(EntityType::Product);
        assert!(matches!(store.insert(&r), Err(ServiceError::Validation(_))));

        let mut v = rule("v", MatchedBy::Version, "https://v", "2025-01-01T00:00:00.000Z");
        v.version_id = None;
        assert!(matches!(store.insert(&v), Err(ServiceError::Validation(_))));

        let blank = rule("f", MatchedBy::Fallback, " ", "2025-01-01T00:00:00.000Z");
        assert!(matches!(store.insert(&blank), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn expired_window_falls_through() {
        let store = SqlRuleStore::new(test_db());
        let mut prod = rule("prod", MatchedBy::Product, "https://x/y", "2025-01-02T00:00:00.000Z");
        prod.ends_at = Some("2025-05-31T23:59:59.999Z".into());
        store.insert(&prod).unwrap();
        store.insert(&fallback()).unwrap();

        let win = store
            .find_active_redirect_rule(&product_key(None), now())
            .unwrap()
            .unwrap();
        assert_eq!(win.id, "fb");
    }
}
