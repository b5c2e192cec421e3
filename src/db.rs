use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::errors::{AppError, ResultExt};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Creates the pool and ensures the schema exists.
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        tracing::info!("✓ Database connection established");

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS phone_analyses (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                phone_number VARCHAR(20) NOT NULL,
                country_code VARCHAR(8),
                carrier VARCHAR(128),
                line_type VARCHAR(32),
                risk_score DOUBLE PRECISION NOT NULL,
                risk_level VARCHAR(16) NOT NULL,
                social_media_presence JSONB,
                rich_metadata JSONB,
                spam_reports_count INTEGER NOT NULL DEFAULT 0,
                fraud_mentions_count INTEGER NOT NULL DEFAULT 0,
                data_sources_used JSONB NOT NULL DEFAULT '[]'::jsonb,
                analysis_date TIMESTAMPTZ NOT NULL DEFAULT now(),
                analysis_duration DOUBLE PRECISION NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create phone_analyses table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_factors (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                analysis_id UUID NOT NULL REFERENCES phone_analyses(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                category VARCHAR(64) NOT NULL,
                factor_type VARCHAR(64) NOT NULL,
                severity VARCHAR(16) NOT NULL,
                weight DOUBLE PRECISION NOT NULL,
                score_contribution DOUBLE PRECISION NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                evidence JSONB NOT NULL DEFAULT '{}'::jsonb,
                source VARCHAR(64) NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create risk_factors table")?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_phone_analyses_number ON phone_analyses (phone_number)",
            "CREATE INDEX IF NOT EXISTS idx_phone_analyses_level ON phone_analyses (risk_level)",
            "CREATE INDEX IF NOT EXISTS idx_phone_analyses_date ON phone_analyses (analysis_date DESC)",
            "CREATE INDEX IF NOT EXISTS idx_risk_factors_analysis ON risk_factors (analysis_id)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create index")?;
        }

        tracing::info!("✓ Database schema ready");
        Ok(())
    }
}
