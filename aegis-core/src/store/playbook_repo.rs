use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AegisError, AegisResult};
use crate::models::Playbook;

use super::PlaybookStore;

const PLAYBOOK_COLUMNS: &str = "id, name, description, enabled, trigger, steps, execution_count, success_count, failure_count, avg_duration_ms, last_executed_at, created_at, updated_at";

pub struct PlaybookRepository {
    pool: PgPool,
}

impl PlaybookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlaybookStore for PlaybookRepository {
    async fn save(&self, playbook: &Playbook) -> AegisResult<()> {
        sqlx::query(
            r#"
            INSERT INTO playbooks (id, name, description, enabled, trigger, steps,
                                   execution_count, success_count, failure_count,
                                   avg_duration_ms, last_executed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                enabled = EXCLUDED.enabled,
                trigger = EXCLUDED.trigger,
                steps = EXCLUDED.steps,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(playbook.id)
        .bind(&playbook.name)
        .bind(&playbook.description)
        .bind(playbook.enabled)
        .bind(Json(&playbook.trigger))
        .bind(Json(&playbook.steps))
        .bind(playbook.execution_count)
        .bind(playbook.success_count)
        .bind(playbook.failure_count)
        .bind(playbook.avg_duration_ms)
        .bind(playbook.last_executed_at)
        .bind(playbook.created_at)
        .bind(playbook.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> AegisResult<Option<Playbook>> {
        let record = sqlx::query_as::<_, Playbook>(&format!(
            "SELECT {} FROM playbooks WHERE id = $1",
            PLAYBOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list(&self) -> AegisResult<Vec<Playbook>> {
        let records = sqlx::query_as::<_, Playbook>(&format!(
            "SELECT {} FROM playbooks ORDER BY name",
            PLAYBOOK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_enabled(&self) -> AegisResult<Vec<Playbook>> {
        let records = sqlx::query_as::<_, Playbook>(&format!(
            "SELECT {} FROM playbooks WHERE enabled ORDER BY name",
            PLAYBOOK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn record_execution(
        &self,
        id: Uuid,
        success: bool,
        duration_ms: f64,
    ) -> AegisResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE playbooks
            SET execution_count = execution_count + 1,
                success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END,
                avg_duration_ms = CASE
                    WHEN avg_duration_ms IS NULL THEN $3
                    ELSE (avg_duration_ms * execution_count + $3) / (execution_count + 1)
                END,
                last_executed_at = now(),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(success)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AegisError::PlaybookNotFound(id));
        }
        Ok(())
    }
}
