use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AegisError, AegisResult};
use crate::models::ExecutionRun;

use super::RunStore;

const RUN_COLUMNS: &str =
    "id, playbook_id, alert_id, state, step_results, failure, created_at, started_at, finished_at";

pub struct RunRepository {
    pool: PgPool,
}

impl RunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for RunRepository {
    async fn insert(&self, run: &ExecutionRun) -> AegisResult<()> {
        sqlx::query(
            r#"
            INSERT INTO runs (id, playbook_id, alert_id, state, step_results, failure,
                              created_at, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run.id)
        .bind(run.playbook_id)
        .bind(run.alert_id)
        .bind(run.state)
        .bind(Json(&run.step_results))
        .bind(run.failure.as_ref().map(Json))
        .bind(run.created_at)
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, run: &ExecutionRun) -> AegisResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET state = $2, step_results = $3, failure = $4, started_at = $5, finished_at = $6
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.state)
        .bind(Json(&run.step_results))
        .bind(run.failure.as_ref().map(Json))
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AegisError::RunNotFound(run.id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AegisResult<Option<ExecutionRun>> {
        let record = sqlx::query_as::<_, ExecutionRun>(&format!(
            "SELECT {} FROM runs WHERE id = $1",
            RUN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_for_alert(&self, alert_id: Uuid) -> AegisResult<Vec<ExecutionRun>> {
        let records = sqlx::query_as::<_, ExecutionRun>(&format!(
            "SELECT {} FROM runs WHERE alert_id = $1 ORDER BY created_at",
            RUN_COLUMNS
        ))
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
