/// Record builder: pure assembly of an `AnalysisRecord` from collected
/// evidence and derived scoring output. No I/O, no clock reads; callers
/// supply the timestamp and duration.
use chrono::{DateTime, Utc};

use crate::models::{
    AnalysisRecord, CarrierDetails, CollectedEvidence, GeographicData, NumberStatus, PhoneNumber,
    ReputationIndicators, RichMetadata, RiskFactor, RiskLevel, SocialMediaPresence,
};

/// Assembles the final record. Field merge rules:
///
/// - `carrier` prefers the current carrier over the allocation-time one.
/// - Porting is detected either from an explicit provider flag or from a
///   current/original carrier mismatch where both are known.
/// - `spam_reports_count` is the most pessimistic spam score scaled to a
///   report count; `fraud_mentions_count` counts abuse flags.
/// - The record `id` stays unset; the persistence layer assigns it.
#[allow(clippy::too_many_arguments)]
pub fn build_record(
    phone: &PhoneNumber,
    evidence: &CollectedEvidence,
    risk_factors: Vec<RiskFactor>,
    risk_score: f64,
    risk_level: RiskLevel,
    analysis_date: DateTime<Utc>,
    analysis_duration: f64,
) -> AnalysisRecord {
    let carrier_current = evidence.first(|s| s.carrier_current.clone());
    let carrier_original = evidence.first(|s| s.carrier_original.clone());
    let carrier = carrier_current.clone().or_else(|| carrier_original.clone());

    let porting_detected = evidence.flag(|s| s.ported).is_yes()
        || matches!(
            (&carrier_current, &carrier_original),
            (Some(current), Some(original)) if current != original
        );

    let line_type = evidence.first(|s| s.line_type.clone());
    let spam_score = evidence.max_score(|s| s.spam_score);
    let recent_abuse = evidence.flag(|s| s.recent_abuse);
    let risky = evidence.flag(|s| s.risky);
    let breach_count = evidence.first(|s| s.breach_count).unwrap_or(0);

    let rich_metadata = RichMetadata {
        carrier_details: Some(CarrierDetails {
            current_carrier: carrier_current,
            original_carrier: carrier_original,
            porting_detected,
            line_type: line_type.clone(),
            is_voip: evidence.flag(|s| s.is_voip),
            is_prepaid: evidence.flag(|s| s.is_prepaid),
        }),
        geographic_data: Some(GeographicData {
            country: evidence.first(|s| s.country.clone()),
            city: evidence.first(|s| s.city.clone()),
            region: evidence.first(|s| s.region.clone()),
            timezone: evidence.first(|s| s.timezone.clone()),
        }),
        number_status: Some(NumberStatus {
            active: evidence.flag(|s| s.active),
            valid: evidence.flag(|s| s.valid),
            risky: evidence.flag(|s| s.risky),
            do_not_call: evidence.flag(|s| s.do_not_call),
        }),
        reputation_indicators: Some(ReputationIndicators {
            fraud_score: evidence.max_score(|s| s.fraud_score),
            spam_score,
            recent_abuse,
            leak_detected: breach_count > 0,
        }),
    };

    let social_media_presence = build_social_presence(evidence, breach_count);

    AnalysisRecord {
        id: None,
        phone_number: phone.e164().to_string(),
        country_code: Some(phone.country_code().to_string()),
        carrier,
        line_type,
        risk_score,
        risk_level,
        risk_factors,
        social_media_presence,
        rich_metadata: Some(rich_metadata),
        spam_reports_count: spam_score.map(|s| (s / 10.0) as i32).unwrap_or(0),
        fraud_mentions_count: [recent_abuse, risky].iter().filter(|f| f.is_yes()).count() as i32,
        data_sources_used: evidence.sources_used(),
        analysis_date,
        analysis_duration,
    }
}

/// Social presence only exists when some deep-scan source reported data.
fn build_social_presence(
    evidence: &CollectedEvidence,
    breach_count: u32,
) -> Option<SocialMediaPresence> {
    let platforms = evidence.first(|s| s.platforms_checked.clone());
    let profiles = evidence.first(|s| s.public_profiles_found);
    let accounts = evidence.first(|s| s.total_accounts);

    if platforms.is_none() && profiles.is_none() && accounts.is_none() && breach_count == 0 {
        return None;
    }

    Some(SocialMediaPresence {
        platforms_checked: platforms.unwrap_or_default(),
        public_profiles_found: profiles.unwrap_or(0),
        total_accounts: accounts.unwrap_or(0),
        breach_count,
    })
}
