use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AegisError, AegisResult};
use crate::models::Alert;

use super::{AlertFilter, AlertStore};

const ALERT_COLUMNS: &str = "id, title, description, severity, status, source, attributes, tags, version, created_at, updated_at";

pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for AlertRepository {
    async fn insert(&self, alert: &Alert) -> AegisResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (id, title, description, severity, status, source, attributes, tags, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(alert.id)
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(alert.severity)
        .bind(alert.status)
        .bind(&alert.source)
        .bind(Json(&alert.attributes))
        .bind(Json(&alert.tags))
        .bind(alert.version)
        .bind(alert.created_at)
        .bind(alert.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> AegisResult<Option<Alert>> {
        let record = sqlx::query_as::<_, Alert>(&format!(
            "SELECT {} FROM alerts WHERE id = $1",
            ALERT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list(&self, filter: &AlertFilter) -> AegisResult<Vec<Alert>> {
        let records = sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {}
            FROM alerts
            WHERE ($1::severity IS NULL OR severity = $1)
              AND ($2::alert_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR source = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            ALERT_COLUMNS
        ))
        .bind(filter.severity)
        .bind(filter.status)
        .bind(filter.source.as_deref())
        .bind(filter.limit)
        .bind(filter.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn update_versioned(&self, alert: &Alert, expected_version: i64) -> AegisResult<Alert> {
        let record = sqlx::query_as::<_, Alert>(&format!(
            r#"
            UPDATE alerts
            SET title = $3, description = $4, severity = $5, status = $6,
                attributes = $7, tags = $8, version = version + 1, updated_at = now()
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(alert.id)
        .bind(expected_version)
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(alert.severity)
        .bind(alert.status)
        .bind(Json(&alert.attributes))
        .bind(Json(&alert.tags))
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(updated) => Ok(updated),
            // Distinguish a lost optimistic check from an unknown id.
            None => {
                if self.get(alert.id).await?.is_some() {
                    Err(AegisError::Conflict {
                        alert_id: alert.id,
                        expected: expected_version,
                    })
                } else {
                    Err(AegisError::AlertNotFound(alert.id))
                }
            }
        }
    }

    async fn delete(&self, id: Uuid) -> AegisResult<bool> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
