use crate::rules::PolicyConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// IPQualityScore fraud-scoring API key (source disabled when unset).
    pub ipqs_api_key: Option<String>,
    pub ipqs_base_url: String,
    /// Numverify carrier/validation API key (source disabled when unset).
    pub numverify_api_key: Option<String>,
    pub numverify_base_url: String,
    /// Breach directory API key; deep-scan only (disabled when unset).
    pub breach_api_key: Option<String>,
    pub breach_base_url: String,
    /// Social-profile lookup API key; deep-scan only (disabled when unset).
    pub social_scan_api_key: Option<String>,
    pub social_scan_base_url: String,
    /// Timeout applied independently to each provider call.
    pub provider_timeout_secs: u64,
    /// Upper bound on the whole collection phase.
    pub collection_timeout_secs: u64,
    /// Freshness window for cached analysis records.
    pub cache_ttl_hours: u64,
    /// Rolling per-source call quota (per hour) against upstream providers.
    pub provider_quota_per_hour: u32,
    /// Scoring policy: rule weights, thresholds and level buckets.
    pub policy: PolicyConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            ipqs_api_key: std::env::var("IPQS_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            ipqs_base_url: base_url_var("IPQS_BASE_URL", "https://ipqualityscore.com")?,
            numverify_api_key: std::env::var("NUMVERIFY_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            numverify_base_url: base_url_var("NUMVERIFY_BASE_URL", "http://apilayer.net")?,
            breach_api_key: std::env::var("BREACH_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            breach_base_url: base_url_var("BREACH_BASE_URL", "https://breachdirectory.org")?,
            social_scan_api_key: std::env::var("SOCIAL_SCAN_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            social_scan_base_url: base_url_var(
                "SOCIAL_SCAN_BASE_URL",
                "https://api.socialscan.example.com",
            )?,
            provider_timeout_secs: numeric_var("PROVIDER_TIMEOUT_SECS", 15)?,
            collection_timeout_secs: numeric_var("COLLECTION_TIMEOUT_SECS", 45)?,
            cache_ttl_hours: numeric_var("CACHE_TTL_HOURS", 24)?,
            provider_quota_per_hour: numeric_var("PROVIDER_QUOTA_PER_HOUR", 100)? as u32,
            policy: load_policy()?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server Port: {}", config.port);
        tracing::info!(
            "Enabled providers: ipqs={}, numverify={}, breach={}, social={}",
            config.ipqs_api_key.is_some(),
            config.numverify_api_key.is_some(),
            config.breach_api_key.is_some(),
            config.social_scan_api_key.is_some(),
        );

        Ok(config)
    }
}

fn base_url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let url = std::env::var(name).unwrap_or_else(|_| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url)
}

fn numeric_var(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative number", name)),
        Err(_) => Ok(default),
    }
}

/// Loads the scoring policy. Weights and thresholds are deployment policy,
/// not code: `RISK_POLICY_JSON` overrides any subset of the defaults.
fn load_policy() -> anyhow::Result<PolicyConfig> {
    match std::env::var("RISK_POLICY_JSON") {
        Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("RISK_POLICY_JSON is not valid policy JSON: {}", e)),
        _ => Ok(PolicyConfig::default()),
    }
}
