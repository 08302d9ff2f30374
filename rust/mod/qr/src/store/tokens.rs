use std::sync::Arc;

use plantops_core::ServiceError;
use plantops_sql::{Row, SQLStore, Value};

use crate::model::{EntityType, Token, TokenStatus};

use super::storage_err;

const TOKEN_COLUMNS: &str = "id, value, status, entity_type, entity_id, redirect_url, \
     version_id, printed_at, expires_at, revoked_at, revoked_reason, scan_count, \
     last_scanned_at";

/// Persistent token records.
pub struct TokenStore {
    db: Arc<dyn SQLStore>,
}

impl TokenStore {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }

    /// Insert a freshly printed token.
    pub fn insert(&self, token: &Token) -> Result<(), ServiceError> {
        self.db
            .exec(
                &format!(
                    "INSERT INTO tokens ({TOKEN_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                &[
                    Value::Text(token.id.clone()),
                    Value::Text(token.value.clone()),
                    Value::Text(token.status.as_str().to_string()),
                    Value::Text(token.entity_type.as_str().to_string()),
                    Value::Text(token.entity_id.clone()),
                    Value::opt_text(token.redirect_url.as_deref()),
                    Value::opt_text(token.version_id.as_deref()),
                    Value::Text(token.printed_at.clone()),
                    Value::opt_text(token.expires_at.as_deref()),
                    Value::opt_text(token.revoked_at.as_deref()),
                    Value::opt_text(token.revoked_reason.as_deref()),
                    Value::Integer(token.scan_count),
                    Value::opt_text(token.last_scanned_at.as_deref()),
                ],
            )
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a token by record id.
    pub fn get(&self, id: &str) -> Result<Token, ServiceError> {
        let rows = self
            .db
            .query(
                &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE id = ?1"),
                &[Value::Text(id.to_string())],
            )
            .map_err(storage_err)?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("tokens/{id}")))?;
        row_to_token(row)
    }

    /// Look up a token by its printed value.
    pub fn find_by_value(&self, value: &str) -> Result<Option<Token>, ServiceError> {
        let rows = self
            .db
            .query(
                &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE value = ?1"),
                &[Value::Text(value.to_string())],
            )
            .map_err(storage_err)?;
        rows.first().map(row_to_token).transpose()
    }

    /// ACTIVE → REVOKED (compare-and-swap on status).
    pub fn revoke(&self, id: &str, reason: &str, now: &str) -> Result<Token, ServiceError> {
        let affected = self
            .db
            .exec(
                "UPDATE tokens SET status = 'REVOKED', revoked_at = ?1, revoked_reason = ?2 \
                 WHERE id = ?3 AND status = 'ACTIVE'",
                &[
                    Value::Text(now.to_string()),
                    Value::Text(reason.to_string()),
                    Value::Text(id.to_string()),
                ],
            )
            .map_err(storage_err)?;

        let token = self.get(id)?;
        if affected == 0 {
            return Err(ServiceError::Validation(format!(
                "token {} cannot be revoked (status: {})",
                id, token.status
            )));
        }
        Ok(token)
    }

    /// Transition every ACTIVE token whose expiry is at or before `now`.
    ///
    /// Returns the number of tokens expired.
    pub fn expire_lapsed(&self, now: &str) -> Result<u64, ServiceError> {
        self.db
            .exec(
                "UPDATE tokens SET status = 'EXPIRED' \
                 WHERE status = 'ACTIVE' AND expires_at IS NOT NULL AND expires_at <= ?1",
                &[Value::Text(now.to_string())],
            )
            .map_err(storage_err)
    }
}

fn required<'a>(row: &'a Row, col: &str) -> Result<&'a str, ServiceError> {
    row.get_str(col)
        .ok_or_else(|| ServiceError::Storage(format!("tokens: missing column {col}")))
}

pub(crate) fn row_to_token(row: &Row) -> Result<Token, ServiceError> {
    let status = required(row, "status")?;
    let entity_type = required(row, "entity_type")?;
    Ok(Token {
        id: required(row, "id")?.to_string(),
        value: required(row, "value")?.to_string(),
        status: TokenStatus::from_str(status)
            .ok_or_else(|| ServiceError::Storage(format!("tokens: bad status {status}")))?,
        entity_type: EntityType::from_str(entity_type).ok_or_else(|| {
            ServiceError::Storage(format!("tokens: bad entity type {entity_type}"))
        })?,
        entity_id: required(row, "entity_id")?.to_string(),
        redirect_url: row.get_str("redirect_url").map(String::from),
        version_id: row.get_str("version_id").map(String::from),
        printed_at: required(row, "printed_at")?.to_string(),
        expires_at: row.get_str("expires_at").map(String::from),
        revoked_at: row.get_str("revoked_at").map(String::from),
        revoked_reason: row.get_str("revoked_reason").map(String::from),
        scan_count: row.get_i64("scan_count").unwrap_or(0),
        last_scanned_at: row.get_str("last_scanned_at").map(String::from),
    })
}
