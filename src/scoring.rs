/// Score aggregation: deterministic reduction of risk factors into a
/// bounded 0-100 score and its discrete level.
use crate::errors::AppError;
use crate::models::{CollectedEvidence, RiskFactor, RiskLevel};
use crate::rules::RiskBuckets;

/// Classifies a clamped score into its risk level bucket.
pub fn classify(score: f64, buckets: &RiskBuckets) -> RiskLevel {
    if score >= buckets.critical_min {
        RiskLevel::Critical
    } else if score >= buckets.high_min {
        RiskLevel::High
    } else if score >= buckets.medium_min {
        RiskLevel::Medium
    } else if score >= buckets.low_min {
        RiskLevel::Low
    } else {
        RiskLevel::Minimal
    }
}

/// Reduces risk factors into the overall score and level.
///
/// The score is the sum of factor contributions clamped to [0, 100]. The
/// reduction is order-independent and idempotent: re-aggregating the same
/// factors always yields the same result.
///
/// # Errors
///
/// - `InsufficientData` when the run collected zero usable signals. Zero
///   factors over non-empty evidence is not an error (a clean number).
/// - `Aggregation` when a factor violates scoring invariants (non-positive
///   weight, or a contribution outside `[-weight, weight]`). Malformed
///   policy must fail loudly, never be silently clamped into a plausible
///   score.
pub fn aggregate(
    factors: &[RiskFactor],
    evidence: &CollectedEvidence,
    buckets: &RiskBuckets,
) -> Result<(f64, RiskLevel), AppError> {
    if !evidence.has_signals() {
        return Err(AppError::InsufficientData(
            "no provider signals were collected".to_string(),
        ));
    }

    let mut contributions = Vec::with_capacity(factors.len());
    for factor in factors {
        if !(factor.weight > 0.0) || !factor.weight.is_finite() {
            return Err(AppError::Aggregation(format!(
                "factor '{}' has non-positive weight {}",
                factor.factor_type, factor.weight
            )));
        }
        if !factor.score_contribution.is_finite()
            || factor.score_contribution.abs() > factor.weight
        {
            return Err(AppError::Aggregation(format!(
                "factor '{}' contribution {} exceeds weight {}",
                factor.factor_type, factor.score_contribution, factor.weight
            )));
        }
        contributions.push(factor.score_contribution);
    }

    // Float addition is not associative; summing in sorted order keeps the
    // result bit-identical across factor permutations.
    contributions.sort_by(f64::total_cmp);
    let total: f64 = contributions.into_iter().sum();

    let score = total.clamp(0.0, 100.0);
    Ok((score, classify(score, buckets)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderSignal, Severity};
    use serde_json::json;

    fn factor(factor_type: &str, weight: f64, contribution: f64) -> RiskFactor {
        RiskFactor {
            category: "test".to_string(),
            factor_type: factor_type.to_string(),
            severity: Severity::Medium,
            weight,
            score_contribution: contribution,
            description: String::new(),
            evidence: json!({}),
            source: "test".to_string(),
        }
    }

    fn non_empty_evidence() -> CollectedEvidence {
        let mut evidence = CollectedEvidence::default();
        evidence
            .signals
            .insert("test".to_string(), ProviderSignal::new("test"));
        evidence
    }

    #[test]
    fn empty_evidence_is_insufficient_data() {
        let result = aggregate(&[], &CollectedEvidence::default(), &RiskBuckets::default());
        assert!(matches!(result, Err(AppError::InsufficientData(_))));
    }

    #[test]
    fn zero_factors_over_signals_is_a_clean_number() {
        let (score, level) =
            aggregate(&[], &non_empty_evidence(), &RiskBuckets::default()).unwrap();
        assert_eq!(score, 0.0);
        assert_eq!(level, RiskLevel::Minimal);
    }

    #[test]
    fn sums_and_clamps_to_hundred() {
        let factors = vec![
            factor("a", 50.0, 42.5),
            factor("b", 35.0, 35.0),
            factor("c", 30.0, 30.0),
        ];
        let (score, level) =
            aggregate(&factors, &non_empty_evidence(), &RiskBuckets::default()).unwrap();
        assert_eq!(score, 100.0);
        assert_eq!(level, RiskLevel::Critical);
    }

    #[test]
    fn negative_weight_is_an_aggregation_error() {
        let factors = vec![factor("bad", -10.0, 5.0)];
        let result = aggregate(&factors, &non_empty_evidence(), &RiskBuckets::default());
        assert!(matches!(result, Err(AppError::Aggregation(_))));
    }

    #[test]
    fn contribution_beyond_weight_is_an_aggregation_error() {
        let factors = vec![factor("bad", 10.0, 15.0)];
        let result = aggregate(&factors, &non_empty_evidence(), &RiskBuckets::default());
        assert!(matches!(result, Err(AppError::Aggregation(_))));
    }

    #[test]
    fn aggregation_is_order_independent() {
        let a = factor("a", 50.0, 42.5);
        let b = factor("b", 35.0, 35.0);
        let evidence = non_empty_evidence();
        let buckets = RiskBuckets::default();

        let forward = aggregate(&[a.clone(), b.clone()], &evidence, &buckets).unwrap();
        let backward = aggregate(&[b, a], &evidence, &buckets).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn bucket_boundaries_are_inclusive_lower() {
        let buckets = RiskBuckets::default();
        assert_eq!(classify(0.0, &buckets), RiskLevel::Minimal);
        assert_eq!(classify(24.9, &buckets), RiskLevel::Minimal);
        assert_eq!(classify(25.0, &buckets), RiskLevel::Low);
        assert_eq!(classify(49.9, &buckets), RiskLevel::Low);
        assert_eq!(classify(50.0, &buckets), RiskLevel::Medium);
        assert_eq!(classify(69.9, &buckets), RiskLevel::Medium);
        assert_eq!(classify(70.0, &buckets), RiskLevel::High);
        assert_eq!(classify(89.9, &buckets), RiskLevel::High);
        assert_eq!(classify(90.0, &buckets), RiskLevel::Critical);
        assert_eq!(classify(100.0, &buckets), RiskLevel::Critical);
    }
}
