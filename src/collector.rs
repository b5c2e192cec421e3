/// Evidence collector: fans one analysis request out to all eligible
/// provider adapters concurrently and merges the results.
///
/// Per-source failures degrade the evidence instead of aborting the run;
/// the caller decides what to do with zero signals. Each dispatch is gated
/// by the source's rolling quota and circuit breaker, and bounded by both a
/// per-source timeout and an overall collection deadline.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::circuit_breaker::ProviderBreaker;
use crate::config::Config;
use crate::errors::{AppError, FailureKind, ProviderError};
use crate::models::{CollectedEvidence, PhoneNumber, ProviderSignal, SourceFailure};
use crate::providers::{
    BreachDirectoryAdapter, IpqsAdapter, NumverifyAdapter, ProviderAdapter, SocialScanAdapter,
};
use crate::quota::QuotaTracker;

pub struct EvidenceCollector {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    breakers: HashMap<&'static str, ProviderBreaker>,
    quota: QuotaTracker,
    per_source_timeout: Duration,
    collection_timeout: Duration,
}

impl EvidenceCollector {
    pub fn new(
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        quota: QuotaTracker,
        per_source_timeout: Duration,
        collection_timeout: Duration,
    ) -> Self {
        let breakers = adapters
            .iter()
            .map(|a| (a.source_id(), ProviderBreaker::new()))
            .collect();
        Self {
            adapters,
            breakers,
            quota,
            per_source_timeout,
            collection_timeout,
        }
    }

    /// Builds the collector from configuration. Sources without an API key
    /// are left out entirely.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.provider_timeout_secs);
        let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

        if let Some(key) = &config.ipqs_api_key {
            adapters.push(Arc::new(IpqsAdapter::new(
                config.ipqs_base_url.clone(),
                key.clone(),
                timeout,
            )?));
        }
        if let Some(key) = &config.numverify_api_key {
            adapters.push(Arc::new(NumverifyAdapter::new(
                config.numverify_base_url.clone(),
                key.clone(),
                timeout,
            )?));
        }
        if let Some(key) = &config.breach_api_key {
            adapters.push(Arc::new(BreachDirectoryAdapter::new(
                config.breach_base_url.clone(),
                key.clone(),
                timeout,
            )?));
        }
        if let Some(key) = &config.social_scan_api_key {
            adapters.push(Arc::new(SocialScanAdapter::new(
                config.social_scan_base_url.clone(),
                key.clone(),
                timeout,
            )?));
        }

        tracing::info!("Evidence collector initialized with {} providers", adapters.len());

        Ok(Self::new(
            adapters,
            QuotaTracker::new(config.provider_quota_per_hour, Duration::from_secs(3600)),
            timeout,
            Duration::from_secs(config.collection_timeout_secs),
        ))
    }

    /// Runs one collection pass for `phone`.
    ///
    /// Deep-scan-only sources are skipped unless `deep_scan` is set. A
    /// source contributes either a signal or a failure record, never both.
    pub async fn collect(&self, phone: &PhoneNumber, deep_scan: bool) -> CollectedEvidence {
        let mut evidence = CollectedEvidence::default();
        let mut tasks: JoinSet<(&'static str, Result<ProviderSignal, ProviderError>)> =
            JoinSet::new();
        let mut dispatched: HashSet<&'static str> = HashSet::new();

        for adapter in &self.adapters {
            let source = adapter.source_id();
            if adapter.deep_scan_only() && !deep_scan {
                continue;
            }

            if !self.quota.try_acquire(source) {
                tracing::warn!("Skipping {}: quota exhausted", source);
                evidence.failures.push(SourceFailure {
                    source: source.to_string(),
                    error_kind: FailureKind::QuotaExceeded,
                });
                continue;
            }

            let permitted = self
                .breakers
                .get(source)
                .map(|b| b.is_call_permitted())
                .unwrap_or(true);
            if !permitted {
                tracing::warn!("Skipping {}: circuit breaker open", source);
                evidence.failures.push(SourceFailure {
                    source: source.to_string(),
                    error_kind: FailureKind::CircuitOpen,
                });
                continue;
            }

            dispatched.insert(source);
            let adapter = Arc::clone(adapter);
            let phone = phone.clone();
            let per_source_timeout = self.per_source_timeout;
            tasks.spawn(async move {
                let result =
                    match tokio::time::timeout(per_source_timeout, adapter.fetch(&phone)).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::timeout(adapter.source_id())),
                    };
                (adapter.source_id(), result)
            });
        }

        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                let Ok((source, result)) = joined else {
                    // Task panicked; treated as a malformed-source failure.
                    continue;
                };
                dispatched.remove(source);
                self.record_outcome(&mut evidence, source, result);
            }
        };

        if tokio::time::timeout(self.collection_timeout, drain).await.is_err() {
            tracing::warn!(
                "Collection deadline exceeded, abandoning {} in-flight sources",
                dispatched.len()
            );
            tasks.abort_all();
            for source in dispatched {
                if let Some(breaker) = self.breakers.get(source) {
                    breaker.record(false);
                }
                evidence.failures.push(SourceFailure {
                    source: source.to_string(),
                    error_kind: FailureKind::Timeout,
                });
            }
        }

        evidence.failures.sort_by(|a, b| a.source.cmp(&b.source));
        tracing::info!(
            "Collected {} signals, {} failures for {}",
            evidence.signals.len(),
            evidence.failures.len(),
            phone.e164()
        );
        evidence
    }

    fn record_outcome(
        &self,
        evidence: &mut CollectedEvidence,
        source: &'static str,
        result: Result<ProviderSignal, ProviderError>,
    ) {
        match result {
            Ok(signal) => {
                if let Some(breaker) = self.breakers.get(source) {
                    breaker.record(true);
                }
                tracing::debug!("✓ {} returned a signal", source);
                evidence.signals.insert(source.to_string(), signal);
            }
            Err(err) => {
                if let Some(breaker) = self.breakers.get(source) {
                    breaker.record(false);
                }
                tracing::warn!("❌ {}", err);
                evidence.failures.push(SourceFailure {
                    source: source.to_string(),
                    error_kind: err.kind,
                });
            }
        }
    }
}
