//! End-to-end scoring pipeline tests: evidence -> rule derivation ->
//! aggregation -> level classification.

use phone_risk_api::models::{CollectedEvidence, ProviderSignal, RiskLevel, TriState};
use phone_risk_api::rules::{derive_risk_factors, PolicyConfig, RiskPolicy};
use phone_risk_api::scoring::aggregate;

fn evidence(signals: Vec<ProviderSignal>) -> CollectedEvidence {
    let mut evidence = CollectedEvidence::default();
    for signal in signals {
        evidence.signals.insert(signal.source.clone(), signal);
    }
    evidence
}

#[test]
fn benign_number_scores_minimal_with_no_factors() {
    let mut ipqs = ProviderSignal::new("ipqualityscore");
    ipqs.fraud_score = Some(5.0);
    ipqs.is_voip = TriState::No;
    ipqs.is_prepaid = TriState::No;
    ipqs.recent_abuse = TriState::No;
    ipqs.valid = TriState::Yes;
    ipqs.active = TriState::Yes;
    let mut numverify = ProviderSignal::new("numverify");
    numverify.valid = TriState::Yes;

    let policy = RiskPolicy::default();
    let evidence = evidence(vec![ipqs, numverify]);
    let factors = derive_risk_factors(&evidence, &policy);
    assert!(factors.is_empty());

    let (score, level) = aggregate(&factors, &evidence, &policy.buckets).unwrap();
    assert_eq!(score, 0.0);
    assert_eq!(level, RiskLevel::Minimal);
}

#[test]
fn known_fraud_number_scores_critical() {
    let mut ipqs = ProviderSignal::new("ipqualityscore");
    ipqs.fraud_score = Some(85.0);
    ipqs.recent_abuse = TriState::Yes;
    ipqs.ported = TriState::Yes;

    let policy = RiskPolicy::default();
    let evidence = evidence(vec![ipqs]);
    let factors = derive_risk_factors(&evidence, &policy);

    let types: Vec<&str> = factors.iter().map(|f| f.factor_type.as_str()).collect();
    assert!(types.contains(&"High Fraud Score"));
    assert!(types.contains(&"Recent Abuse"));
    assert!(types.contains(&"Number Ported"));

    // 50 * 0.85 + 35 + 20 = 97.5
    let (score, level) = aggregate(&factors, &evidence, &policy.buckets).unwrap();
    assert!((score - 97.5).abs() < 1e-9);
    assert_eq!(level, RiskLevel::Critical);
}

#[test]
fn score_never_exceeds_hundred() {
    let mut ipqs = ProviderSignal::new("ipqualityscore");
    ipqs.fraud_score = Some(100.0);
    ipqs.recent_abuse = TriState::Yes;
    ipqs.ported = TriState::Yes;
    ipqs.is_voip = TriState::Yes;
    ipqs.do_not_call = TriState::Yes;
    ipqs.is_prepaid = TriState::Yes;
    ipqs.valid = TriState::No;
    let mut breach = ProviderSignal::new("breachdirectory");
    breach.breach_count = Some(10);

    let policy = RiskPolicy::default();
    let evidence = evidence(vec![ipqs, breach]);
    let factors = derive_risk_factors(&evidence, &policy);

    let (score, level) = aggregate(&factors, &evidence, &policy.buckets).unwrap();
    assert_eq!(score, 100.0);
    assert_eq!(level, RiskLevel::Critical);
}

#[test]
fn absent_prepaid_flag_scores_lower_than_explicit_yes() {
    let policy = RiskPolicy::default();

    let mut with_flag = ProviderSignal::new("ipqualityscore");
    with_flag.is_prepaid = TriState::Yes;
    let flagged = evidence(vec![with_flag]);
    let flagged_factors = derive_risk_factors(&flagged, &policy);
    let (flagged_score, _) = aggregate(&flagged_factors, &flagged, &policy.buckets).unwrap();

    let without_flag = ProviderSignal::new("ipqualityscore");
    let unknown = evidence(vec![without_flag]);
    let unknown_factors = derive_risk_factors(&unknown, &policy);
    let (unknown_score, _) = aggregate(&unknown_factors, &unknown, &policy.buckets).unwrap();

    assert_eq!(flagged_score, 10.0);
    assert_eq!(unknown_score, 0.0);
}

#[test]
fn derivation_is_idempotent() {
    let mut ipqs = ProviderSignal::new("ipqualityscore");
    ipqs.fraud_score = Some(60.0);
    ipqs.is_voip = TriState::Yes;

    let policy = RiskPolicy::default();
    let evidence = evidence(vec![ipqs]);

    let first = derive_risk_factors(&evidence, &policy);
    let second = derive_risk_factors(&evidence, &policy);

    assert_eq!(first.len(), second.len());
    let score_a = aggregate(&first, &evidence, &policy.buckets).unwrap();
    let score_b = aggregate(&second, &evidence, &policy.buckets).unwrap();
    assert_eq!(score_a, score_b);
}

#[test]
fn custom_policy_changes_contributions() {
    let config: PolicyConfig =
        serde_json::from_str(r#"{"weights": {"voip": 40.0}}"#).unwrap();
    let policy = RiskPolicy::from_config(&config);

    let mut signal = ProviderSignal::new("ipqualityscore");
    signal.is_voip = TriState::Yes;
    let evidence = evidence(vec![signal]);

    let factors = derive_risk_factors(&evidence, &policy);
    let (score, _) = aggregate(&factors, &evidence, &policy.buckets).unwrap();
    assert_eq!(score, 40.0);
}

#[test]
fn signals_from_multiple_sources_combine() {
    let mut ipqs = ProviderSignal::new("ipqualityscore");
    ipqs.fraud_score = Some(55.0);
    let mut numverify = ProviderSignal::new("numverify");
    numverify.valid = TriState::No;

    let policy = RiskPolicy::default();
    let evidence = evidence(vec![ipqs, numverify]);
    let factors = derive_risk_factors(&evidence, &policy);
    assert_eq!(factors.len(), 2);

    // 30 * 0.55 + 35 = 51.5
    let (score, level) = aggregate(&factors, &evidence, &policy.buckets).unwrap();
    assert!((score - 51.5).abs() < 1e-9);
    assert_eq!(level, RiskLevel::Medium);
}
