use std::sync::Arc;

use plantops_core::ServiceError;
use plantops_sql::{SQLStore, Value};

use crate::lookup::TransparencyDirectory;
use crate::model::{EntityType, TransparencyRecord};

use super::storage_err;

/// Transparency record headers backed by SQLite.
pub struct SqlTransparencyDirectory {
    db: Arc<dyn SQLStore>,
}

impl SqlTransparencyDirectory {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }

    pub fn upsert(&self, record: &TransparencyRecord) -> Result<(), ServiceError> {
        self.db
            .exec(
                "INSERT INTO transparency_records \
                 (id, entity_type, entity_id, test_result, published) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(id) DO UPDATE SET entity_type = excluded.entity_type, \
                   entity_id = excluded.entity_id, test_result = excluded.test_result, \
                   published = excluded.published",
                &[
                    Value::Text(record.id.clone()),
                    Value::Text(record.entity_type.as_str().to_string()),
                    Value::Text(record.entity_id.clone()),
                    Value::Text(record.test_result.as_str().to_string()),
                    Value::Integer(record.published as i64),
                ],
            )
            .map_err(storage_err)?;
        Ok(())
    }
}

impl TransparencyDirectory for SqlTransparencyDirectory {
    fn is_publicly_visible(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<bool, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT COUNT(*) AS n FROM transparency_records \
                 WHERE entity_type = ?1 AND entity_id = ?2 \
                   AND test_result = 'PASS' AND published = 1",
                &[
                    Value::Text(entity_type.as_str().to_string()),
                    Value::Text(entity_id.to_string()),
                ],
            )
            .map_err(storage_err)?;
        Ok(rows.first().and_then(|r| r.get_i64("n")).unwrap_or(0) > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestResult;
    use crate::store::tokens::tests::test_db;

    fn record(id: &str, test_result: TestResult, published: bool) -> TransparencyRecord {
        TransparencyRecord {
            id: id.into(),
            entity_type: EntityType::Batch,
            entity_id: "b1".into(),
            test_result,
            published,
        }
    }

    #[test]
    fn visible_only_when_passed_and_published() {
        let dir = SqlTransparencyDirectory::new(test_db());
        assert!(!dir.is_publicly_visible(EntityType::Batch, "b1").unwrap());

        dir.upsert(&record("tr1", TestResult::Pass, false)).unwrap();
        assert!(!dir.is_publicly_visible(EntityType::Batch, "b1").unwrap());

        dir.upsert(&record("tr2", TestResult::Fail, true)).unwrap();
        assert!(!dir.is_publicly_visible(EntityType::Batch, "b1").unwrap());

        dir.upsert(&record("tr1", TestResult::Pass, true)).unwrap();
        assert!(dir.is_publicly_visible(EntityType::Batch, "b1").unwrap());
        assert!(!dir.is_publicly_visible(EntityType::Product, "b1").unwrap());
    }
}
