use std::sync::Arc;

use plantops_core::ServiceError;
use plantops_sql::{SQLStore, Value};

use crate::lookup::ProductionRunDirectory;
use crate::model::{ProductionRun, RunProjection};

use super::storage_err;

/// Production runs stored as JSON documents keyed by id, with the bound
/// token id lifted into its own unique column.
pub struct SqlRunDirectory {
    db: Arc<dyn SQLStore>,
}

impl SqlRunDirectory {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }

    /// Create or replace a run. Binding a second run to the same token is
    /// a `Conflict`.
    pub fn upsert(&self, run: &ProductionRun) -> Result<(), ServiceError> {
        let data = serde_json::to_string(run)
            .map_err(|e| ServiceError::Internal(format!("encode run: {e}")))?;
        self.db
            .exec(
                "INSERT INTO production_runs (id, data, token_id) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, token_id = excluded.token_id",
                &[
                    Value::Text(run.id.clone()),
                    Value::Text(data),
                    Value::Text(run.token_id.clone()),
                ],
            )
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn find_by_token(&self, token_id: &str) -> Result<Option<ProductionRun>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM production_runs WHERE token_id = ?1",
                &[Value::Text(token_id.to_string())],
            )
            .map_err(storage_err)?;
        let Some(data) = rows.first().and_then(|r| r.get_str("data")) else {
            return Ok(None);
        };
        let run = serde_json::from_str(data)
            .map_err(|e| ServiceError::Storage(format!("decode run: {e}")))?;
        Ok(Some(run))
    }
}

impl ProductionRunDirectory for SqlRunDirectory {
    fn bound_production_run(&self, token_id: &str) -> Result<Option<RunProjection>, ServiceError> {
        Ok(self.find_by_token(token_id)?.map(|run| run.projection()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunStep, StepStatus};
    use crate::store::tokens::tests::test_db;

    fn run(id: &str, token_id: &str, steps: &[(&str, StepStatus)]) -> ProductionRun {
        ProductionRun {
            id: id.into(),
            token_id: token_id.into(),
            steps: steps
                .iter()
                .map(|(name, status)| RunStep {
                    name: name.to_string(),
                    status: *status,
                })
                .collect(),
        }
    }

    #[test]
    fn bound_run_projects_current_step() {
        let dir = SqlRunDirectory::new(test_db());
        dir.upsert(&run(
            "run1",
            "t1",
            &[("cut", StepStatus::Completed), ("sew", StepStatus::InProgress)],
        ))
        .unwrap();

        let p = dir.bound_production_run("t1").unwrap().unwrap();
        assert_eq!(p.run_id, "run1");
        assert_eq!(p.current_step.unwrap().name, "sew");
        assert!(dir.bound_production_run("t2").unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_steps() {
        let dir = SqlRunDirectory::new(test_db());
        dir.upsert(&run("run1", "t1", &[("cut", StepStatus::Pending)]))
            .unwrap();
        dir.upsert(&run("run1", "t1", &[("cut", StepStatus::Completed)]))
            .unwrap();

        let p = dir.bound_production_run("t1").unwrap().unwrap();
        assert!(p.current_step.is_none());
    }

    #[test]
    fn one_run_per_token() {
        let dir = SqlRunDirectory::new(test_db());
        dir.upsert(&run("run1", "t1", &[])).unwrap();
        let err = dir.upsert(&run("run2", "t1", &[])).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
