use chrono::{DateTime, Utc};
use phonenumber::Mode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::{AppError, FailureKind};

// ============ Phone Number ============

/// A validated, E.164-normalized phone number.
///
/// Invariant: the normalized form always matches `^\+[1-9]\d{1,14}$`.
/// Formatting variations of the same number normalize to the same value, so
/// cache keys built from this type collide as required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    e164: String,
    country_code: String,
    national_number: String,
}

impl PhoneNumber {
    /// Parses and normalizes a raw phone number string.
    ///
    /// Uses the phonenumber library (port of Google's libphonenumber) for
    /// parsing and validity, then enforces the strict E.164 shape.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidNumber("phone number is required".to_string()));
        }

        let number = phonenumber::parse(None, trimmed).map_err(|e| {
            AppError::InvalidNumber(format!("could not parse '{}': {:?}", trimmed, e))
        })?;

        if !phonenumber::is_valid(&number) {
            return Err(AppError::InvalidNumber(format!(
                "'{}' is not a valid phone number",
                trimmed
            )));
        }

        let e164 = number.format().mode(Mode::E164).to_string();

        let e164_regex = Regex::new(r"^\+[1-9]\d{1,14}$").unwrap();
        if !e164_regex.is_match(&e164) {
            return Err(AppError::InvalidNumber(format!(
                "'{}' does not normalize to E.164",
                trimmed
            )));
        }

        let country_code = format!("+{}", number.code().value());
        let national_number = e164[country_code.len()..].to_string();

        Ok(Self {
            e164,
            country_code,
            national_number,
        })
    }

    pub fn e164(&self) -> &str {
        &self.e164
    }

    /// The calling-code prefix, e.g. `+1` or `+55`.
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn national_number(&self) -> &str {
        &self.national_number
    }

    /// Digits-only form some providers expect (E.164 without the `+`).
    pub fn digits(&self) -> &str {
        &self.e164[1..]
    }
}

// ============ Tri-State Flags ============

/// A boolean a provider may not know the answer to.
///
/// Absence of information must never be conflated with a negative finding,
/// so this is a three-valued enumeration rather than a nullable bool that
/// defaults to false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Yes,
    No,
    #[default]
    Unknown,
}

impl TriState {
    pub fn from_bool(b: bool) -> Self {
        if b {
            TriState::Yes
        } else {
            TriState::No
        }
    }

    /// Maps a possibly-absent JSON boolean. Missing or non-boolean values
    /// become `Unknown`, never `No`.
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value.and_then(|v| v.as_bool()) {
            Some(b) => Self::from_bool(b),
            None => TriState::Unknown,
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, TriState::Yes)
    }

    pub fn is_no(&self) -> bool {
        matches!(self, TriState::No)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TriState::Unknown)
    }
}

// ============ Provider Signals & Evidence ============

/// One provider's normalized output.
///
/// Every field is optional: any provider may omit any field, and the engine
/// never assumes presence. Raw provider JSON must not leak past the adapter
/// that produced this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSignal {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraud_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spam_score: Option<f64>,
    #[serde(default)]
    pub is_voip: TriState,
    #[serde(default)]
    pub is_prepaid: TriState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_original: Option<String>,
    #[serde(default)]
    pub ported: TriState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub active: TriState,
    #[serde(default)]
    pub valid: TriState,
    #[serde(default)]
    pub do_not_call: TriState,
    #[serde(default)]
    pub risky: TriState,
    #[serde(default)]
    pub recent_abuse: TriState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breach_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms_checked: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_profiles_found: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_accounts: Option<u32>,
}

impl ProviderSignal {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            fraud_score: None,
            spam_score: None,
            is_voip: TriState::Unknown,
            is_prepaid: TriState::Unknown,
            line_type: None,
            carrier_current: None,
            carrier_original: None,
            ported: TriState::Unknown,
            country: None,
            city: None,
            region: None,
            timezone: None,
            active: TriState::Unknown,
            valid: TriState::Unknown,
            do_not_call: TriState::Unknown,
            risky: TriState::Unknown,
            recent_abuse: TriState::Unknown,
            breach_count: None,
            platforms_checked: None,
            public_profiles_found: None,
            total_accounts: None,
        }
    }
}

/// Record of one source that failed during collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub error_kind: FailureKind,
}

/// Everything one analysis run collected from its providers.
///
/// Signals are keyed by source id in a `BTreeMap`, so iteration order is
/// deterministic regardless of task completion order. Partial results are
/// valid: 0..N signals plus 0..N failure records, sources never overlapping.
#[derive(Debug, Clone, Default)]
pub struct CollectedEvidence {
    pub signals: BTreeMap<String, ProviderSignal>,
    pub failures: Vec<SourceFailure>,
}

impl CollectedEvidence {
    pub fn has_signals(&self) -> bool {
        !self.signals.is_empty()
    }

    /// Source ids that actually produced a signal, in deterministic order.
    pub fn sources_used(&self) -> Vec<String> {
        self.signals.keys().cloned().collect()
    }

    /// First present value for a field, scanning signals in source-id order.
    pub fn first<T>(&self, pick: impl Fn(&ProviderSignal) -> Option<T>) -> Option<T> {
        self.signals.values().find_map(|s| pick(s))
    }

    /// Largest reported value for a numeric field. Used for reputation
    /// scores where the most pessimistic provider wins.
    pub fn max_score(&self, pick: impl Fn(&ProviderSignal) -> Option<f64>) -> Option<f64> {
        self.signals
            .values()
            .filter_map(|s| pick(s))
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }

    /// Merged tri-state: any `Yes` wins, otherwise any `No`, otherwise
    /// `Unknown`.
    pub fn flag(&self, pick: impl Fn(&ProviderSignal) -> TriState) -> TriState {
        let mut merged = TriState::Unknown;
        for signal in self.signals.values() {
            match pick(signal) {
                TriState::Yes => return TriState::Yes,
                TriState::No => merged = TriState::No,
                TriState::Unknown => {}
            }
        }
        merged
    }
}

// ============ Risk Classification ============

/// Severity of a single risk factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Discrete bucket of the overall 0-100 risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "MINIMAL",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MINIMAL" => Some(RiskLevel::Minimal),
            "LOW" => Some(RiskLevel::Low),
            "MEDIUM" => Some(RiskLevel::Medium),
            "HIGH" => Some(RiskLevel::High),
            "CRITICAL" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

/// One discrete, explainable contributor to the overall risk score.
///
/// Owned exclusively by one `AnalysisRecord`; never shared or mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub category: String,
    pub factor_type: String,
    pub severity: Severity,
    pub weight: f64,
    pub score_contribution: f64,
    pub description: String,
    /// Free-form structured payload referencing the triggering signal.
    pub evidence: serde_json::Value,
    pub source: String,
}

// ============ Rich Metadata ============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarrierDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_carrier: Option<String>,
    pub porting_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_type: Option<String>,
    #[serde(default)]
    pub is_voip: TriState,
    #[serde(default)]
    pub is_prepaid: TriState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeographicData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumberStatus {
    #[serde(default)]
    pub active: TriState,
    #[serde(default)]
    pub valid: TriState,
    #[serde(default)]
    pub risky: TriState,
    #[serde(default)]
    pub do_not_call: TriState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationIndicators {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraud_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spam_score: Option<f64>,
    #[serde(default)]
    pub recent_abuse: TriState,
    pub leak_detected: bool,
}

/// Optional nested carrier/geographic/reputation detail on a record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RichMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_details: Option<CarrierDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geographic_data: Option<GeographicData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_status: Option<NumberStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reputation_indicators: Option<ReputationIndicators>,
}

/// Aggregate of social-platform findings from a deep scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialMediaPresence {
    pub platforms_checked: Vec<String>,
    pub public_profiles_found: u32,
    pub total_accounts: u32,
    pub breach_count: u32,
}

// ============ Analysis Record ============

/// The immutable result of one completed analysis run.
///
/// `risk_score` is always the deterministic clamp-sum of `risk_factors`,
/// and `risk_level` its bucket. The `id` is assigned by the persistence
/// layer at save time, not by the builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_type: Option<String>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    /// Insertion order is derivation order.
    pub risk_factors: Vec<RiskFactor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_media_presence: Option<SocialMediaPresence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rich_metadata: Option<RichMetadata>,
    pub spam_reports_count: i32,
    pub fraud_mentions_count: i32,
    pub data_sources_used: Vec<String>,
    pub analysis_date: DateTime<Utc>,
    /// Wall-clock seconds the collection phase took.
    pub analysis_duration: f64,
}

// ============ API Request/Response Models ============

/// Request payload for `POST /api/v1/analyze`.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub phone_number: String,
    #[serde(default)]
    pub deep_scan: bool,
}

/// Response payload for an analysis request.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub message: String,
    pub cached: bool,
    pub analysis: AnalysisRecord,
}

/// Pagination parameters for the history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    10
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub analyses: Vec<AnalysisRecord>,
    pub total: i64,
    pub pages: i64,
    pub current_page: u32,
}

/// Request payload for `POST /api/v1/analyses/search`.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub phone_number: Option<String>,
    pub risk_level: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub count: usize,
    pub analyses: Vec<AnalysisRecord>,
}

/// Per-level counts for the statistics endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskStatistics {
    pub total_analyses: i64,
    pub critical_risk_count: i64,
    pub high_risk_count: i64,
    pub medium_risk_count: i64,
    pub low_risk_count: i64,
    pub minimal_risk_count: i64,
}
