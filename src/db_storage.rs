/// Persistence of analysis records.
///
/// The `AnalysisStore` trait is the seam between the analysis pipeline and
/// Postgres; the HTTP layer and the analyzer only see the trait, so tests
/// run against an in-memory store.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{AnalysisRecord, RiskFactor, RiskLevel, RiskStatistics};

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Persists a record with its factors. Returns the assigned id.
    async fn save(&self, record: &AnalysisRecord) -> Result<Uuid, AppError>;

    async fn load(&self, id: Uuid) -> Result<Option<AnalysisRecord>, AppError>;

    /// Newest-first page of records plus the total count.
    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<AnalysisRecord>, i64), AppError>;

    /// Filtered search; both filters are optional and combined with AND.
    async fn search(
        &self,
        number_contains: Option<&str>,
        risk_level: Option<RiskLevel>,
    ) -> Result<Vec<AnalysisRecord>, AppError>;

    /// Returns false when no such record existed.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Deletes everything. Returns the number of records removed.
    async fn delete_all(&self) -> Result<u64, AppError>;

    async fn statistics(&self) -> Result<RiskStatistics, AppError>;
}

pub struct PgAnalysisStorage {
    pool: PgPool,
}

impl PgAnalysisStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_factors(&self, analysis_id: Uuid) -> Result<Vec<RiskFactor>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT category, factor_type, severity, weight, score_contribution,
                   description, evidence, source
            FROM risk_factors
            WHERE analysis_id = $1
            ORDER BY position
            "#,
        )
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load risk factors")?;

        rows.iter().map(factor_from_row).collect()
    }

    async fn records_with_factors(
        &self,
        rows: Vec<PgRow>,
    ) -> Result<Vec<AnalysisRecord>, AppError> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = record_from_row(&row)?;
            if let Some(id) = record.id {
                record.risk_factors = self.load_factors(id).await?;
            }
            records.push(record);
        }
        Ok(records)
    }
}

const RECORD_COLUMNS: &str = "id, phone_number, country_code, carrier, line_type, risk_score, \
     risk_level, social_media_presence, rich_metadata, spam_reports_count, \
     fraud_mentions_count, data_sources_used, analysis_date, analysis_duration";

fn record_from_row(row: &PgRow) -> Result<AnalysisRecord, AppError> {
    let risk_level_raw: String = row.try_get("risk_level")?;
    let risk_level = RiskLevel::parse(&risk_level_raw).ok_or_else(|| {
        AppError::InternalError(format!("Unknown risk level in storage: {}", risk_level_raw))
    })?;

    let social: Option<Value> = row.try_get("social_media_presence")?;
    let metadata: Option<Value> = row.try_get("rich_metadata")?;
    let sources: Value = row.try_get("data_sources_used")?;
    let analysis_date: DateTime<Utc> = row.try_get("analysis_date")?;

    Ok(AnalysisRecord {
        id: Some(row.try_get("id")?),
        phone_number: row.try_get("phone_number")?,
        country_code: row.try_get("country_code")?,
        carrier: row.try_get("carrier")?,
        line_type: row.try_get("line_type")?,
        risk_score: row.try_get("risk_score")?,
        risk_level,
        risk_factors: Vec::new(),
        social_media_presence: social.and_then(|v| serde_json::from_value(v).ok()),
        rich_metadata: metadata.and_then(|v| serde_json::from_value(v).ok()),
        spam_reports_count: row.try_get("spam_reports_count")?,
        fraud_mentions_count: row.try_get("fraud_mentions_count")?,
        data_sources_used: serde_json::from_value(sources).unwrap_or_default(),
        analysis_date,
        analysis_duration: row.try_get("analysis_duration")?,
    })
}

fn factor_from_row(row: &PgRow) -> Result<RiskFactor, AppError> {
    let severity_raw: String = row.try_get("severity")?;
    let severity = serde_json::from_value(Value::String(severity_raw.clone())).map_err(|_| {
        AppError::InternalError(format!("Unknown severity in storage: {}", severity_raw))
    })?;

    Ok(RiskFactor {
        category: row.try_get("category")?,
        factor_type: row.try_get("factor_type")?,
        severity,
        weight: row.try_get("weight")?,
        score_contribution: row.try_get("score_contribution")?,
        description: row.try_get("description")?,
        evidence: row.try_get("evidence")?,
        source: row.try_get("source")?,
    })
}

#[async_trait]
impl AnalysisStore for PgAnalysisStorage {
    async fn save(&self, record: &AnalysisRecord) -> Result<Uuid, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let social = record
            .social_media_presence
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::InternalError(format!("Serialization failed: {}", e)))?;
        let metadata = record
            .rich_metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::InternalError(format!("Serialization failed: {}", e)))?;
        let sources = serde_json::to_value(&record.data_sources_used)
            .map_err(|e| AppError::InternalError(format!("Serialization failed: {}", e)))?;

        let row = sqlx::query(
            r#"
            INSERT INTO phone_analyses (
                phone_number, country_code, carrier, line_type, risk_score,
                risk_level, social_media_presence, rich_metadata,
                spam_reports_count, fraud_mentions_count, data_sources_used,
                analysis_date, analysis_duration
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(&record.phone_number)
        .bind(&record.country_code)
        .bind(&record.carrier)
        .bind(&record.line_type)
        .bind(record.risk_score)
        .bind(record.risk_level.as_str())
        .bind(social)
        .bind(metadata)
        .bind(record.spam_reports_count)
        .bind(record.fraud_mentions_count)
        .bind(sources)
        .bind(record.analysis_date)
        .bind(record.analysis_duration)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert analysis record")?;

        let id: Uuid = row.try_get("id")?;

        for (position, factor) in record.risk_factors.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO risk_factors (
                    analysis_id, position, category, factor_type, severity,
                    weight, score_contribution, description, evidence, source
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(id)
            .bind(position as i32)
            .bind(&factor.category)
            .bind(&factor.factor_type)
            .bind(factor.severity.as_str())
            .bind(factor.weight)
            .bind(factor.score_contribution)
            .bind(&factor.description)
            .bind(&factor.evidence)
            .bind(&factor.source)
            .execute(&mut *tx)
            .await
            .context("Failed to insert risk factor")?;
        }

        tx.commit().await.context("Failed to commit analysis")?;

        tracing::debug!("✓ Saved analysis {} for {}", id, record.phone_number);
        Ok(id)
    }

    async fn load(&self, id: Uuid) -> Result<Option<AnalysisRecord>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM phone_analyses WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load analysis record")?;

        match row {
            Some(row) => {
                let mut record = record_from_row(&row)?;
                record.risk_factors = self.load_factors(id).await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<AnalysisRecord>, i64), AppError> {
        let per_page = per_page.clamp(1, 100) as i64;
        let offset = (page.max(1) as i64 - 1) * per_page;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM phone_analyses")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count analyses")?
            .try_get("count")?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM phone_analyses ORDER BY analysis_date DESC LIMIT $1 OFFSET $2",
            RECORD_COLUMNS
        ))
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list analyses")?;

        Ok((self.records_with_factors(rows).await?, total))
    }

    async fn search(
        &self,
        number_contains: Option<&str>,
        risk_level: Option<RiskLevel>,
    ) -> Result<Vec<AnalysisRecord>, AppError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM phone_analyses
            WHERE ($1::text IS NULL OR phone_number ILIKE '%' || $1 || '%')
              AND ($2::text IS NULL OR risk_level = $2)
            ORDER BY analysis_date DESC
            LIMIT 100
            "#,
            RECORD_COLUMNS
        ))
        .bind(number_contains)
        .bind(risk_level.map(|l| l.as_str()))
        .fetch_all(&self.pool)
        .await
        .context("Failed to search analyses")?;

        self.records_with_factors(rows).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM phone_analyses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete analysis")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM phone_analyses")
            .execute(&self.pool)
            .await
            .context("Failed to clear analyses")?;
        Ok(result.rows_affected())
    }

    async fn statistics(&self) -> Result<RiskStatistics, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE risk_level = 'CRITICAL') AS critical,
                COUNT(*) FILTER (WHERE risk_level = 'HIGH') AS high,
                COUNT(*) FILTER (WHERE risk_level = 'MEDIUM') AS medium,
                COUNT(*) FILTER (WHERE risk_level = 'LOW') AS low,
                COUNT(*) FILTER (WHERE risk_level = 'MINIMAL') AS minimal
            FROM phone_analyses
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute statistics")?;

        Ok(RiskStatistics {
            total_analyses: row.try_get("total")?,
            critical_risk_count: row.try_get("critical")?,
            high_risk_count: row.try_get("high")?,
            medium_risk_count: row.try_get("medium")?,
            low_risk_count: row.try_get("low")?,
            minimal_risk_count: row.try_get("minimal")?,
        })
    }
}
