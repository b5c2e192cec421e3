/// Provider adapters: one per integrated OSINT/validation source.
///
/// Each adapter owns the HTTP call to its upstream and a pure `normalize`
/// step that maps the provider-specific payload into a `ProviderSignal`.
/// Raw provider JSON never leaks past this module; absent fields map to
/// field-absent (or `TriState::Unknown`), never to a false/zero value.
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::errors::{AppError, FailureKind, ProviderError};
use crate::models::{PhoneNumber, ProviderSignal, TriState};

/// One external evidence source.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable source id used to key signals and failures.
    fn source_id(&self) -> &'static str;

    /// Slow sources gated behind `deep_scan=true`.
    fn deep_scan_only(&self) -> bool {
        false
    }

    /// Fetches and normalizes this source's view of the number.
    async fn fetch(&self, phone: &PhoneNumber) -> Result<ProviderSignal, ProviderError>;
}

fn build_client(source: &str, timeout: Duration) -> Result<Client, AppError> {
    Client::builder().timeout(timeout).build().map_err(|e| {
        AppError::InternalError(format!("Failed to create {} client: {}", source, e))
    })
}

/// Filters provider placeholder strings that mean "no data".
fn clean_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "Unknown" && *s != "N/A")
        .map(str::to_string)
}

async fn get_json(
    client: &Client,
    source: &'static str,
    url: &str,
) -> Result<Value, ProviderError> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::timeout(source)
        } else {
            ProviderError::new(source, FailureKind::Http, e.to_string())
        }
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::new(
            source,
            FailureKind::QuotaExceeded,
            "upstream returned 429",
        ));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::new(
            source,
            FailureKind::Auth,
            format!("upstream returned {}", status),
        ));
    }
    if !status.is_success() {
        return Err(ProviderError::new(
            source,
            FailureKind::Http,
            format!("upstream returned {}", status),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::new(source, FailureKind::Malformed, e.to_string()))
}

// ============ IPQualityScore ============

pub const IPQS_SOURCE: &str = "ipqualityscore";

/// Fraud-score and reputation lookup via IPQualityScore.
pub struct IpqsAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl IpqsAdapter {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(IPQS_SOURCE, timeout)?,
            base_url,
            api_key,
        })
    }

    /// Pure normalization of a raw IPQualityScore phone payload.
    ///
    /// `prepaid` in particular is frequently null on the free tier; null or
    /// missing maps to `Unknown`, never to `No`.
    pub fn normalize(raw: &Value) -> Result<ProviderSignal, ProviderError> {
        if !raw.get("success").and_then(Value::as_bool).unwrap_or(false) {
            let message = raw
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("provider reported failure");
            let kind = if message.to_ascii_lowercase().contains("key") {
                FailureKind::Auth
            } else {
                FailureKind::Malformed
            };
            return Err(ProviderError::new(IPQS_SOURCE, kind, message));
        }

        let mut signal = ProviderSignal::new(IPQS_SOURCE);
        signal.fraud_score = raw.get("fraud_score").and_then(Value::as_f64);
        signal.spam_score = raw.get("spam_score").and_then(Value::as_f64);
        signal.is_voip = TriState::from_json(raw.get("VOIP"));
        signal.is_prepaid = TriState::from_json(raw.get("prepaid"));
        signal.active = TriState::from_json(raw.get("active"));
        signal.valid = TriState::from_json(raw.get("valid"));
        signal.do_not_call = TriState::from_json(raw.get("do_not_call"));
        signal.risky = TriState::from_json(raw.get("risky"));
        signal.recent_abuse = TriState::from_json(raw.get("recent_abuse"));
        signal.line_type = clean_str(raw.get("line_type"));
        signal.carrier_current = clean_str(raw.get("carrier"));
        signal.country = clean_str(raw.get("country"));
        signal.city = clean_str(raw.get("city"));
        signal.region = clean_str(raw.get("region"));
        signal.timezone = clean_str(raw.get("timezone"));
        Ok(signal)
    }
}

#[async_trait]
impl ProviderAdapter for IpqsAdapter {
    fn source_id(&self) -> &'static str {
        IPQS_SOURCE
    }

    async fn fetch(&self, phone: &PhoneNumber) -> Result<ProviderSignal, ProviderError> {
        let url = format!(
            "{}/api/json/phone/{}/{}",
            self.base_url,
            self.api_key,
            phone.digits()
        );
        tracing::debug!("Querying IPQualityScore for {}", phone.e164());

        let raw = get_json(&self.client, IPQS_SOURCE, &url).await?;
        Self::normalize(&raw)
    }
}

// ============ Numverify ============

pub const NUMVERIFY_SOURCE: &str = "numverify";

/// Line validation and original-carrier lookup via Numverify.
pub struct NumverifyAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NumverifyAdapter {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(NUMVERIFY_SOURCE, timeout)?,
            base_url,
            api_key,
        })
    }

    /// Pure normalization of a raw Numverify payload.
    ///
    /// Numverify reports the carrier of record at allocation time, so its
    /// carrier lands in `carrier_original` (porting detection compares it
    /// against the current carrier from other sources).
    pub fn normalize(raw: &Value) -> Result<ProviderSignal, ProviderError> {
        if let Some(error) = raw.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("provider reported an error");
            let kind = match code {
                104 => FailureKind::QuotaExceeded,
                101 | 102 | 103 => FailureKind::Auth,
                _ => FailureKind::Malformed,
            };
            return Err(ProviderError::new(NUMVERIFY_SOURCE, kind, info));
        }

        let mut signal = ProviderSignal::new(NUMVERIFY_SOURCE);
        signal.valid = TriState::from_json(raw.get("valid"));
        signal.carrier_original = clean_str(raw.get("carrier"));
        signal.line_type = clean_str(raw.get("line_type"));
        signal.country = clean_str(raw.get("country_code")).or_else(|| clean_str(raw.get("country_name")));
        signal.city = clean_str(raw.get("location"));
        Ok(signal)
    }
}

#[async_trait]
impl ProviderAdapter for NumverifyAdapter {
    fn source_id(&self) -> &'static str {
        NUMVERIFY_SOURCE
    }

    async fn fetch(&self, phone: &PhoneNumber) -> Result<ProviderSignal, ProviderError> {
        let url = format!(
            "{}/api/validate?access_key={}&number={}&format=1",
            self.base_url,
            self.api_key,
            phone.digits()
        );
        tracing::debug!("Querying Numverify for {}", phone.e164());

        let raw = get_json(&self.client, NUMVERIFY_SOURCE, &url).await?;
        Self::normalize(&raw)
    }
}

// ============ Breach Directory (deep scan) ============

pub const BREACH_SOURCE: &str = "breachdirectory";

/// Breach-database exposure lookup. Slow; deep-scan only.
pub struct BreachDirectoryAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl BreachDirectoryAdapter {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(BREACH_SOURCE, timeout)?,
            base_url,
            api_key,
        })
    }

    /// Accepts either a `count` field or a `breaches` array.
    pub fn normalize(raw: &Value) -> Result<ProviderSignal, ProviderError> {
        let count = raw
            .get("count")
            .and_then(Value::as_u64)
            .or_else(|| raw.get("breaches").and_then(Value::as_array).map(|b| b.len() as u64));

        let mut signal = ProviderSignal::new(BREACH_SOURCE);
        signal.breach_count = count.map(|c| c as u32);
        Ok(signal)
    }
}

#[async_trait]
impl ProviderAdapter for BreachDirectoryAdapter {
    fn source_id(&self) -> &'static str {
        BREACH_SOURCE
    }

    fn deep_scan_only(&self) -> bool {
        true
    }

    async fn fetch(&self, phone: &PhoneNumber) -> Result<ProviderSignal, ProviderError> {
        let url = format!(
            "{}/api/phone/{}?key={}",
            self.base_url,
            phone.digits(),
            self.api_key
        );
        tracing::debug!("Querying breach directory for {}", phone.e164());

        let raw = get_json(&self.client, BREACH_SOURCE, &url).await?;
        Self::normalize(&raw)
    }
}

// ============ Social Profile Scan (deep scan) ============

pub const SOCIAL_SOURCE: &str = "socialscan";

/// Social-platform presence lookup. Slow; deep-scan only.
pub struct SocialScanAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SocialScanAdapter {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(SOCIAL_SOURCE, timeout)?,
            base_url,
            api_key,
        })
    }

    pub fn normalize(raw: &Value) -> Result<ProviderSignal, ProviderError> {
        let mut signal = ProviderSignal::new(SOCIAL_SOURCE);
        signal.platforms_checked = raw.get("platforms_checked").and_then(Value::as_array).map(|a| {
            a.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        });
        let profiles = raw.get("profiles").and_then(Value::as_array);
        signal.public_profiles_found = profiles
            .map(|p| p.len() as u32)
            .or_else(|| raw.get("public_profiles_found").and_then(Value::as_u64).map(|n| n as u32));
        signal.total_accounts = raw
            .get("total_accounts")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .or(signal.public_profiles_found);
        Ok(signal)
    }
}

#[async_trait]
impl ProviderAdapter for SocialScanAdapter {
    fn source_id(&self) -> &'static str {
        SOCIAL_SOURCE
    }

    fn deep_scan_only(&self) -> bool {
        true
    }

    async fn fetch(&self, phone: &PhoneNumber) -> Result<ProviderSignal, ProviderError> {
        let url = format!(
            "{}/v1/lookup?phone={}&key={}",
            self.base_url,
            phone.digits(),
            self.api_key
        );
        tracing::debug!("Querying social scan for {}", phone.e164());

        let raw = get_json(&self.client, SOCIAL_SOURCE, &url).await?;
        Self::normalize(&raw)
    }
}
