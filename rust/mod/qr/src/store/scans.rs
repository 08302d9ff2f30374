use std::sync::Arc;

use plantops_core::{new_id, ListParams, ListResult, ServiceError};
use plantops_sql::{Row, SQLError, SQLStore, SqlTx, Value};

use crate::model::{EntityType, GeoHints, ResolutionType, ScanEvent, ScanMode, Token, TokenStatus};

use super::storage_err;

const SCAN_COLUMNS: &str = "id, timestamp, token_id, token_value, entity_type, entity_id, \
     resolution_type, destination, mode, ip_address, geo_country, geo_region, geo_city, \
     user_agent, run_id, run_step, scan_count";

/// Everything known about a scan before it is committed. The scan count is
/// assigned inside the commit transaction.
#[derive(Debug, Clone)]
pub struct ScanDraft {
    pub timestamp: String,
    pub token_id: String,
    pub token_value: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Status the scan was classified under. The commit only counts the
    /// scan while the stored token still has it.
    pub status: TokenStatus,
    pub resolution_type: ResolutionType,
    pub destination: String,
    pub mode: ScanMode,
    pub ip_address: Option<String>,
    pub geo: GeoHints,
    pub user_agent: Option<String>,
    pub run_id: Option<String>,
    pub run_step: Option<String>,
}

impl ScanDraft {
    /// A draft for `token` with no destination or client context yet.
    pub fn for_token(token: &Token, timestamp: String, mode: ScanMode) -> Self {
        Self {
            timestamp,
            token_id: token.id.clone(),
            token_value: token.value.clone(),
            entity_type: token.entity_type,
            entity_id: token.entity_id.clone(),
            status: token.status,
            resolution_type: ResolutionType::Default,
            destination: String::new(),
            mode,
            ip_address: None,
            geo: GeoHints::default(),
            user_agent: None,
            run_id: None,
            run_step: None,
        }
    }

    fn into_event(self, id: String, scan_count: i64) -> ScanEvent {
        ScanEvent {
            id,
            timestamp: self.timestamp,
            token_id: self.token_id,
            token_value: self.token_value,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            resolution_type: self.resolution_type,
            destination: self.destination,
            mode: self.mode,
            ip_address: self.ip_address,
            geo: self.geo,
            user_agent: self.user_agent,
            run_id: self.run_id,
            run_step: self.run_step,
            scan_count_at_resolution: scan_count,
        }
    }
}

/// Append-only scan audit log.
pub struct ScanLog {
    db: Arc<dyn SQLStore>,
}

impl ScanLog {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }

    /// Commit one scan: optionally move the token ACTIVE → EXPIRED, bump its
    /// scan count and append the audit row, all in one transaction.
    ///
    /// Either every write lands or none does. Returns `Ok(None)` without
    /// writing anything when the stored status no longer matches
    /// `draft.status` (the token was revoked or expired after it was read);
    /// the caller resolves the scan again.
    pub fn commit(
        &self,
        draft: ScanDraft,
        expire: bool,
    ) -> Result<Option<ScanEvent>, ServiceError> {
        let id = new_id();
        let mut scan_count = None;

        self.db
            .transaction(&mut |tx: &dyn SqlTx| {
                if expire {
                    tx.exec(
                        "UPDATE tokens SET status = 'EXPIRED' WHERE id = ?1 AND status = 'ACTIVE'",
                        &[Value::Text(draft.token_id.clone())],
                    )?;
                }

                let rows = tx.query(
                    "UPDATE tokens SET scan_count = scan_count + 1, last_scanned_at = ?1 \
                     WHERE id = ?2 AND status = ?3 RETURNING scan_count",
                    &[
                        Value::Text(draft.timestamp.clone()),
                        Value::Text(draft.token_id.clone()),
                        Value::Text(draft.status.as_str().to_string()),
                    ],
                )?;
                let Some(count) = rows.first().and_then(|r| r.get_i64("scan_count")) else {
                    let exists = tx.query(
                        "SELECT status FROM tokens WHERE id = ?1",
                        &[Value::Text(draft.token_id.clone())],
                    )?;
                    if exists.is_empty() {
                        return Err(SQLError::Execution(format!(
                            "token {} vanished during scan",
                            draft.token_id
                        )));
                    }
                    return Ok(());
                };
                scan_count = Some(count);

                tx.exec(
                    &format!(
                        "INSERT INTO scan_events ({SCAN_COLUMNS}) VALUES \
                         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
                         ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                    ),
                    &[
                        Value::Text(id.clone()),
                        Value::Text(draft.timestamp.clone()),
                        Value::Text(draft.token_id.clone()),
                        Value::Text(draft.token_value.clone()),
                        Value::Text(draft.entity_type.as_str().to_string()),
                        Value::Text(draft.entity_id.clone()),
                        Value::Text(draft.resolution_type.as_str().to_string()),
                        Value::Text(draft.destination.clone()),
                        Value::Text(draft.mode.as_str().to_string()),
                        Value::opt_text(draft.ip_address.as_deref()),
                        Value::opt_text(draft.geo.country.as_deref()),
                        Value::opt_text(draft.geo.region.as_deref()),
                        Value::opt_text(draft.geo.city.as_deref()),
                        Value::opt_text(draft.user_agent.as_deref()),
                        Value::opt_text(draft.run_id.as_deref()),
                        Value::opt_text(draft.run_step.as_deref()),
                        Value::Integer(count),
                    ],
                )?;
                Ok(())
            })
            .map_err(storage_err)?;

        Ok(scan_count.map(|count| draft.into_event(id, count)))
    }

    /// Scans of one token, newest first.
    pub fn list_for_token(
        &self,
        token_id: &str,
        params: &ListParams,
    ) -> Result<ListResult<ScanEvent>, ServiceError> {
        let total = self
            .db
            .query(
                "SELECT COUNT(*) AS n FROM scan_events WHERE token_id = ?1",
                &[Value::Text(token_id.to_string())],
            )
            .map_err(storage_err)?
            .first()
            .and_then(|r| r.get_i64("n"))
            .unwrap_or(0) as usize;

        let rows = self
            .db
            .query(
                &format!(
                    "SELECT {SCAN_COLUMNS} FROM scan_events WHERE token_id = ?1 \
                     ORDER BY timestamp DESC, rowid DESC LIMIT ?2 OFFSET ?3"
                ),
                &[
                    Value::Text(token_id.to_string()),
                    Value::Integer(params.limit as i64),
                    Value::Integer(params.offset as i64),
                ],
            )
            .map_err(storage_err)?;

        let items = rows.iter().map(row_to_scan).collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total })
    }
}

fn row_to_scan(row: &Row) -> Result<ScanEvent, ServiceError> {
    let text = |col: &str| {
        row.get_str(col)
            .map(String::from)
            .ok_or_else(|| ServiceError::Storage(format!("scan_events: missing column {col}")))
    };
    let opt = |col: &str| row.get_str(col).map(String::from);
    let bad = |col: &str| ServiceError::Storage(format!("scan_events: bad {col}"));

    Ok(ScanEvent {
        id: text("id")?,
        timestamp: text("timestamp")?,
        token_id: text("token_id")?,
        token_value: text("token_value")?,
        entity_type: EntityType::from_str(&text("entity_type")?)
            .ok_or_else(|| bad("entity_type"))?,
        entity_id: text("entity_id")?,
        resolution_type: ResolutionType::from_str(&text("resolution_type")?)
            .ok_or_else(|| bad("resolution_type"))?,
        destination: text("destination")?,
        mode: ScanMode::from_str(&text("mode")?).ok_or_else(|| bad("mode"))?,
        ip_address: opt("ip_address"),
        geo: GeoHints {
            country: opt("geo_country"),
            region: opt("geo_region"),
            city: opt("geo_city"),
        },
        user_agent: opt("user_agent"),
        run_id: opt("run_id"),
        run_step: opt("run_step"),
        scan_count_at_resolution: row.get_i64("scan_count").unwrap_or(0),
    })
}
