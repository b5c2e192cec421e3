/// In-memory analysis cache plus per-key in-flight deduplication.
///
/// Entries are keyed by `(E.164, deep_scan)` so formatting variants of the
/// same number share an entry while shallow and deep results stay separate.
/// Stored values carry an integrity checksum (see `cache_validator`); a
/// corrupted entry reads as a miss.
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::cache_validator;
use crate::models::{AnalysisRecord, PhoneNumber};

const MAX_CACHE_ENTRIES: u64 = 50_000;
const LOCK_MAP_SWEEP_THRESHOLD: usize = 10_000;

pub struct AnalysisCache {
    entries: Cache<String, String>,
    /// One mutex per in-flight cache key. Concurrent requests for the same
    /// key serialize here so only the first triggers provider fan-out.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AnalysisCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(ttl)
                .build(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(phone: &PhoneNumber, deep_scan: bool) -> String {
        format!("{}:{}", phone.e164(), deep_scan)
    }

    pub async fn get(&self, key: &str) -> Option<AnalysisRecord> {
        let sealed = self.entries.get(key).await?;
        let record = cache_validator::open(&sealed);
        if record.is_none() {
            // Corrupted entry; drop it so the next writer replaces it.
            self.entries.invalidate(key).await;
        }
        record
    }

    pub async fn insert(&self, key: String, record: &AnalysisRecord) {
        if let Some(sealed) = cache_validator::seal(record) {
            self.entries.insert(key, sealed).await;
        }
    }

    /// Returns the dedup lock for `key`, creating it on first use.
    ///
    /// Callers must re-check the cache after acquiring the lock: a waiter
    /// that blocked behind the first analysis finds the fresh record there.
    pub async fn entry_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.in_flight.lock().await;
        if map.len() > LOCK_MAP_SWEEP_THRESHOLD {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(map.entry(key.to_string()).or_default())
    }

    /// Drops both scan variants for a number, e.g. after its record is
    /// deleted from storage.
    pub async fn invalidate_phone(&self, e164: &str) {
        self.entries.invalidate(&format!("{}:false", e164)).await;
        self.entries.invalidate(&format!("{}:true", e164)).await;
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use chrono::Utc;

    fn record(e164: &str) -> AnalysisRecord {
        AnalysisRecord {
            id: None,
            phone_number: e164.to_string(),
            country_code: Some("+1".to_string()),
            carrier: None,
            line_type: None,
            risk_score: 0.0,
            risk_level: RiskLevel::Minimal,
            risk_factors: vec![],
            social_media_presence: None,
            rich_metadata: None,
            spam_reports_count: 0,
            fraud_mentions_count: 0,
            data_sources_used: vec![],
            analysis_date: Utc::now(),
            analysis_duration: 0.1,
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let cache = AnalysisCache::new(Duration::from_secs(60));
        let rec = record("+14158586273");

        cache.insert("+14158586273:false".to_string(), &rec).await;
        let got = cache.get("+14158586273:false").await.unwrap();
        assert_eq!(got.phone_number, "+14158586273");
    }

    #[tokio::test]
    async fn deep_and_shallow_keys_are_distinct() {
        let phone = PhoneNumber::parse("+14158586273").unwrap();
        assert_ne!(
            AnalysisCache::key(&phone, false),
            AnalysisCache::key(&phone, true)
        );
    }

    #[tokio::test]
    async fn invalidate_phone_drops_both_variants() {
        let cache = AnalysisCache::new(Duration::from_secs(60));
        let rec = record("+14158586273");

        cache.insert("+14158586273:false".to_string(), &rec).await;
        cache.insert("+14158586273:true".to_string(), &rec).await;
        cache.invalidate_phone("+14158586273").await;

        assert!(cache.get("+14158586273:false").await.is_none());
        assert!(cache.get("+14158586273:true").await.is_none());
    }

    #[tokio::test]
    async fn entry_lock_is_shared_per_key() {
        let cache = AnalysisCache::new(Duration::from_secs(60));
        let a = cache.entry_lock("+14158586273:false").await;
        let b = cache.entry_lock("+14158586273:false").await;
        let c = cache.entry_lock("+14158586273:true").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
