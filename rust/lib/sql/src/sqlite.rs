use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::SQLError;
use crate::traits::{Row, SQLStore, SqlTx, Value};

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
///
/// A single connection behind a mutex: statements and transactions are
/// serialized, which is what gives `transaction` its isolation guarantee.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        let conn = Connection::open(path)
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
                Value::Blob(b) => Box::new(b.as_slice()),
            }
        })
        .collect()
}

fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            let mut columns = Vec::new();
            for (i, name) in column_names.iter().enumerate() {
                let val = row_value_at(row, i);
                columns.push((name.clone(), val));
            }
            Ok(Row { columns })
        })
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| SQLError::Query(e.to_string()))?);
    }
    Ok(result)
}

fn exec_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let affected = conn
        .execute(sql, param_refs.as_slice())
        .map_err(|e| SQLError::Execution(e.to_string()))?;

    Ok(affected as u64)
}

/// Statement handle lent to a transaction body.
struct TxHandle<'a> {
    conn: &'a Connection,
}

impl SqlTx for TxHandle<'_> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        query_on(self.conn, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        exec_on(self.conn, sql, params)
    }
}

impl SQLStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Query(e.to_string()))?;
        query_on(&conn, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Execution(e.to_string()))?;
        exec_on(&conn, sql, params)
    }

    fn transaction(
        &self,
        body: &mut dyn FnMut(&dyn SqlTx) -> Result<(), SQLError>,
    ) -> Result<(), SQLError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Transaction(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| SQLError::Transaction(e.to_string()))?;

        let outcome = body(&TxHandle { conn: &tx });
        match outcome {
            Ok(()) => tx
                .commit()
                .map_err(|e| SQLError::Transaction(e.to_string())),
            Err(e) => {
                // Dropping the transaction also rolls back; be explicit so a
                // failing rollback is not silently ignored.
                tx.rollback()
                    .map_err(|re| SQLError::Transaction(format!("{e}; rollback failed: {re}")))?;
                Err(e)
            }
        }
    }
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> Value {
    // Try integer first, then real, then text, then blob, then null.
    if let Ok(i) = row.get::<_, i64>(idx) {
        return Value::Integer(i);
    }
    if let Ok(f) = row.get::<_, f64>(idx) {
        return Value::Real(f);
    }
    if let Ok(s) = row.get::<_, String>(idx) {
        return Value::Text(s);
    }
    if let Ok(b) = row.get::<_, Vec<u8>>(idx) {
        return Value::Blob(b);
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let db = SqliteStore::open_in_memory().unwrap();
        db.exec(
            "CREATE TABLE counters (id TEXT PRIMARY KEY, n INTEGER NOT NULL)",
            &[],
        )
        .unwrap();
        db.exec(
            "INSERT INTO counters (id, n) VALUES (?1, ?2)",
            &[Value::Text("a".into()), Value::Integer(0)],
        )
        .unwrap();
        db
    }

    fn count(db: &SqliteStore) -> i64 {
        db.query("SELECT n FROM counters WHERE id = 'a'", &[])
            .unwrap()[0]
            .get_i64("n")
            .unwrap()
    }

    #[test]
    fn query_and_exec() {
        let db = store();
        let affected = db
            .exec("UPDATE counters SET n = n + 1 WHERE id = ?1", &[Value::Text("a".into())])
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(count(&db), 1);
    }

    #[test]
    fn transaction_commits_and_returns_rows() {
        let db = store();
        let mut seen = 0;
        db.transaction(&mut |tx| {
            let rows = tx.query(
                "UPDATE counters SET n = n + 5 WHERE id = 'a' RETURNING n",
                &[],
            )?;
            seen = rows[0].get_i64("n").unwrap_or(-1);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 5);
        assert_eq!(count(&db), 5);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = store();
        let result = db.transaction(&mut |tx| {
            tx.exec("UPDATE counters SET n = 42 WHERE id = 'a'", &[])?;
            Err(SQLError::Execution("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn unique_violation_is_detected() {
        let db = store();
        let err = db
            .exec(
                "INSERT INTO counters (id, n) VALUES ('a', 1)",
                &[],
            )
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.sqlite");
        {
            let db = SqliteStore::open(&path).unwrap();
            db.exec("CREATE TABLE t (v TEXT)", &[]).unwrap();
            db.exec("INSERT INTO t (v) VALUES ('x')", &[]).unwrap();
        }
        let db = SqliteStore::open(&path).unwrap();
        let rows = db.query("SELECT v FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_str("v"), Some("x"));
    }
}
