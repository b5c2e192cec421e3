//! Property tests over parsing, scoring bounds and order independence.

use proptest::prelude::*;

use phone_risk_api::models::{
    CollectedEvidence, ProviderSignal, RiskFactor, RiskLevel, Severity,
};
use phone_risk_api::rules::{derive_risk_factors, RiskBuckets, RiskPolicy};
use phone_risk_api::scoring::{aggregate, classify};

fn factor_strategy() -> impl Strategy<Value = RiskFactor> {
    (1.0f64..=50.0, 0.0f64..=1.0).prop_map(|(weight, strength)| RiskFactor {
        category: "generated".to_string(),
        factor_type: "Generated".to_string(),
        severity: Severity::Medium,
        weight,
        score_contribution: weight * strength,
        description: String::new(),
        evidence: serde_json::json!({}),
        source: "generated".to_string(),
    })
}

fn non_empty_evidence() -> CollectedEvidence {
    let mut evidence = CollectedEvidence::default();
    evidence
        .signals
        .insert("src".to_string(), ProviderSignal::new("src"));
    evidence
}

fn signal_strategy() -> impl Strategy<Value = ProviderSignal> {
    (
        proptest::option::of(0.0f64..=100.0),
        proptest::option::of(0u32..=10),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(fraud_score, breach_count, voip, abuse)| {
            let mut signal = ProviderSignal::new("src");
            signal.fraud_score = fraud_score;
            signal.breach_count = breach_count;
            if voip {
                signal.is_voip = phone_risk_api::models::TriState::Yes;
            }
            if abuse {
                signal.recent_abuse = phone_risk_api::models::TriState::Yes;
            }
            signal
        })
}

proptest! {
    #[test]
    fn phone_parse_never_panics(input in ".{0,40}") {
        let _ = phone_risk_api::models::PhoneNumber::parse(&input);
    }

    #[test]
    fn aggregated_score_stays_in_bounds(factors in proptest::collection::vec(factor_strategy(), 0..12)) {
        let (score, _) = aggregate(&factors, &non_empty_evidence(), &RiskBuckets::default()).unwrap();
        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn aggregation_is_permutation_invariant(
        factors in proptest::collection::vec(factor_strategy(), 0..8),
        seed in any::<u64>(),
    ) {
        let evidence = non_empty_evidence();
        let buckets = RiskBuckets::default();
        let baseline = aggregate(&factors, &evidence, &buckets).unwrap();

        let mut shuffled = factors;
        // Cheap deterministic shuffle driven by the seed.
        let len = shuffled.len();
        if len > 1 {
            for i in 0..len {
                let j = ((seed.wrapping_mul(i as u64 + 1)) % len as u64) as usize;
                shuffled.swap(i, j);
            }
        }

        prop_assert_eq!(aggregate(&shuffled, &evidence, &buckets).unwrap(), baseline);
    }

    #[test]
    fn classification_matches_bucket_bounds(score in 0.0f64..=100.0) {
        let buckets = RiskBuckets::default();
        let level = classify(score, &buckets);
        let expected = if score >= 90.0 {
            RiskLevel::Critical
        } else if score >= 70.0 {
            RiskLevel::High
        } else if score >= 50.0 {
            RiskLevel::Medium
        } else if score >= 25.0 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        };
        prop_assert_eq!(level, expected);
    }

    #[test]
    fn derived_factors_always_aggregate_cleanly(signal in signal_strategy()) {
        let mut evidence = CollectedEvidence::default();
        evidence.signals.insert(signal.source.clone(), signal);
        let policy = RiskPolicy::default();

        let factors = derive_risk_factors(&evidence, &policy);
        let result = aggregate(&factors, &evidence, &policy.buckets);
        prop_assert!(result.is_ok());

        let (score, _) = result.unwrap();
        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn factor_contributions_never_exceed_weights(signal in signal_strategy()) {
        let mut evidence = CollectedEvidence::default();
        evidence.signals.insert(signal.source.clone(), signal);

        for factor in derive_risk_factors(&evidence, &RiskPolicy::default()) {
            prop_assert!(factor.weight > 0.0);
            prop_assert!(factor.score_contribution.abs() <= factor.weight);
        }
    }
}
