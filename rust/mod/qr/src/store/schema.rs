use plantops_core::ServiceError;
use plantops_sql::SQLStore;

/// SQL DDL statements for the QR subsystem.
///
/// Tokens and scan events use explicit columns so the scan-count increment
/// and the audit insert are plain SQL inside one transaction. Production
/// runs keep their step list as a JSON `data` column.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tokens (
        id              TEXT PRIMARY KEY,
        value           TEXT NOT NULL UNIQUE,
        status          TEXT NOT NULL,
        entity_type     TEXT NOT NULL,
        entity_id       TEXT NOT NULL,
        redirect_url    TEXT,
        version_id      TEXT,
        printed_at      TEXT NOT NULL,
        expires_at      TEXT,
        revoked_at      TEXT,
        revoked_reason  TEXT,
        scan_count      INTEGER NOT NULL DEFAULT 0,
        last_scanned_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS redirect_rules (
        id           TEXT PRIMARY KEY,
        matched_by   TEXT NOT NULL,
        entity_type  TEXT,
        entity_id    TEXT,
        version_id   TEXT,
        redirect_url TEXT NOT NULL,
        active       INTEGER NOT NULL,
        starts_at    TEXT,
        ends_at      TEXT,
        create_at    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS transparency_records (
        id          TEXT PRIMARY KEY,
        entity_type TEXT NOT NULL,
        entity_id   TEXT NOT NULL,
        test_result TEXT NOT NULL,
        published   INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS production_runs (
        id        TEXT PRIMARY KEY,
        data      TEXT NOT NULL,
        token_id  TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS scan_events (
        id                TEXT PRIMARY KEY,
        timestamp         TEXT NOT NULL,
        token_id          TEXT NOT NULL,
        token_value       TEXT NOT NULL,
        entity_type       TEXT NOT NULL,
        entity_id         TEXT NOT NULL,
        resolution_type   TEXT NOT NULL,
        destination       TEXT NOT NULL,
        mode              TEXT NOT NULL,
        ip_address        TEXT,
        geo_country       TEXT,
        geo_region        TEXT,
        geo_city          TEXT,
        user_agent        TEXT,
        run_id            TEXT,
        run_step          TEXT,
        scan_count        INTEGER NOT NULL
    )",
    // Indexes
    "CREATE INDEX IF NOT EXISTS idx_token_status ON tokens(status)",
    "CREATE INDEX IF NOT EXISTS idx_token_entity ON tokens(entity_type, entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_rule_entity ON redirect_rules(entity_type, entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_rule_version ON redirect_rules(version_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_rule_single_fallback
        ON redirect_rules(matched_by) WHERE matched_by = 'FALLBACK'",
    "CREATE INDEX IF NOT EXISTS idx_transparency_entity
        ON transparency_records(entity_type, entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_scan_token ON scan_events(token_id, timestamp)",
];

pub fn init_schema(sql: &dyn SQLStore) -> Result<(), ServiceError> {
    for stmt in SCHEMA {
        sql.exec(stmt, &[])
            .map_err(|e| ServiceError::Storage(format!("schema init failed: {}", e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plantops_sql::SqliteStore;

    #[test]
    fn init_is_idempotent() {
        let db = SqliteStore::open_in_memory().unwrap();
        init_schema(&db).unwrap();
        init_schema(&db).unwrap();
        let rows = db
            .query("SELECT COUNT(*) as cnt FROM scan_events", &[])
            .unwrap();
        assert_eq!(rows[0].get_i64("cnt"), Some(0));
    }
}
