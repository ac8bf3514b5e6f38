use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseSettings;
use crate::error::{AegisError, AegisResult};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(settings: &DatabaseSettings) -> AegisResult<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(settings.pool_max_connections)
            .min_connections(settings.pool_min_connections)
            .acquire_timeout(Duration::from_secs(settings.pool_acquire_timeout_secs))
            .connect(&settings.url)
            .await
            .map_err(|e| AegisError::DatabaseConnectionFailed(e.to_string()))?;

        info!("Database connection pool established");

        Ok(Self { pool })
    }

    pub async fn connect_from_env() -> AegisResult<Self> {
        dotenvy::dotenv().ok();

        let url = std::env::var("DATABASE_URL")
            .map_err(|_| AegisError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let settings = DatabaseSettings {
            url,
            ..Default::default()
        };
        Self::connect(&settings).await
    }

    pub async fn run_migrations(&self) -> AegisResult<()> {
        info!("Running database migrations...");
        MIGRATOR.run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> AegisResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
