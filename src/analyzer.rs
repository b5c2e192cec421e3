/// Analysis orchestration: the cache -> dedup -> collect -> derive ->
/// aggregate -> build -> persist pipeline behind `POST /api/v1/analyze`.
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::builder::build_record;
use crate::cache::AnalysisCache;
use crate::collector::EvidenceCollector;
use crate::db_storage::AnalysisStore;
use crate::errors::AppError;
use crate::models::{AnalysisRecord, PhoneNumber};
use crate::rules::{derive_risk_factors, RiskPolicy};
use crate::scoring::aggregate;

pub struct AnalysisOutcome {
    pub record: AnalysisRecord,
    /// True when the record came from the cache rather than a fresh run.
    pub cached: bool,
}

pub struct Analyzer {
    collector: Arc<EvidenceCollector>,
    policy: RiskPolicy,
    cache: Arc<AnalysisCache>,
    storage: Arc<dyn AnalysisStore>,
}

impl Analyzer {
    pub fn new(
        collector: Arc<EvidenceCollector>,
        policy: RiskPolicy,
        cache: Arc<AnalysisCache>,
        storage: Arc<dyn AnalysisStore>,
    ) -> Self {
        Self {
            collector,
            policy,
            cache,
            storage,
        }
    }

    /// Runs one analysis end to end.
    ///
    /// Invalid numbers fail before any provider call. Concurrent requests
    /// for the same `(number, deep_scan)` key serialize on a per-key lock:
    /// only the first fans out to providers, the rest read its cached
    /// result. A run with zero usable signals produces an error and
    /// persists nothing.
    pub async fn analyze(&self, raw: &str, deep_scan: bool) -> Result<AnalysisOutcome, AppError> {
        let phone = PhoneNumber::parse(raw)?;
        let key = AnalysisCache::key(&phone, deep_scan);

        if let Some(record) = self.cache.get(&key).await {
            tracing::debug!("Cache hit for {}", key);
            return Ok(AnalysisOutcome {
                record,
                cached: true,
            });
        }

        let lock = self.cache.entry_lock(&key).await;
        let _guard = lock.lock().await;

        // A waiter that queued behind the first analysis finds it here.
        if let Some(record) = self.cache.get(&key).await {
            tracing::debug!("Cache hit for {} after dedup wait", key);
            return Ok(AnalysisOutcome {
                record,
                cached: true,
            });
        }

        tracing::info!("Analyzing {} (deep_scan={})", phone.e164(), deep_scan);
        let started = Instant::now();
        let analysis_date = Utc::now();

        let evidence = self.collector.collect(&phone, deep_scan).await;
        let factors = derive_risk_factors(&evidence, &self.policy);
        let (score, level) = aggregate(&factors, &evidence, &self.policy.buckets)?;

        let mut record = build_record(
            &phone,
            &evidence,
            factors,
            score,
            level,
            analysis_date,
            started.elapsed().as_secs_f64(),
        );

        let id = self.storage.save(&record).await?;
        record.id = Some(id);
        self.cache.insert(key, &record).await;

        tracing::info!(
            "✓ {} scored {:.1} ({}) from {} sources",
            phone.e164(),
            record.risk_score,
            record.risk_level.as_str(),
            record.data_sources_used.len()
        );

        Ok(AnalysisOutcome {
            record,
            cached: false,
        })
    }
}
