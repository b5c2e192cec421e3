/// Data-driven risk factor derivation.
///
/// Rules are declarative: each one names a trigger condition over a single
/// provider signal plus the category/severity/weight of the factor it emits.
/// Adding a rule means adding a table entry, not editing scoring code.
/// Weights and thresholds are deployment policy, overridable via
/// `RISK_POLICY_JSON` (see `config::load_policy`).
use serde::Deserialize;
use serde_json::json;

use crate::models::{CollectedEvidence, ProviderSignal, RiskFactor, Severity, TriState};

/// Score thresholds used by fraud-score triggers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyThresholds {
    /// Fraud score strictly above this is a high-severity finding.
    pub high_fraud: f64,
    /// Fraud score in `(elevated, high]` is an elevated finding.
    pub elevated_fraud: f64,
    /// Breach count at or above this is a high-severity exposure.
    pub breach_high_min: u32,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            high_fraud: 75.0,
            elevated_fraud: 50.0,
            breach_high_min: 3,
        }
    }
}

/// Maximum score contribution of each rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyWeights {
    pub high_fraud: f64,
    pub elevated_fraud: f64,
    pub recent_abuse: f64,
    pub voip: f64,
    pub ported: f64,
    pub do_not_call: f64,
    pub prepaid: f64,
    pub breach_medium: f64,
    pub breach_high: f64,
    pub invalid_inactive: f64,
}

impl Default for PolicyWeights {
    fn default() -> Self {
        Self {
            high_fraud: 50.0,
            elevated_fraud: 30.0,
            recent_abuse: 35.0,
            voip: 20.0,
            ported: 20.0,
            do_not_call: 10.0,
            prepaid: 10.0,
            breach_medium: 15.0,
            breach_high: 30.0,
            invalid_inactive: 35.0,
        }
    }
}

/// Lower bounds of the overall risk-level buckets. Scores below `low_min`
/// classify as MINIMAL.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RiskBuckets {
    pub low_min: f64,
    pub medium_min: f64,
    pub high_min: f64,
    pub critical_min: f64,
}

impl Default for RiskBuckets {
    fn default() -> Self {
        Self {
            low_min: 25.0,
            medium_min: 50.0,
            high_min: 70.0,
            critical_min: 90.0,
        }
    }
}

/// Deserializable scoring policy. Any subset of fields may be supplied;
/// the rest fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub thresholds: PolicyThresholds,
    pub weights: PolicyWeights,
    pub buckets: RiskBuckets,
}

/// Trigger condition of a single rule, evaluated per provider signal.
///
/// A trigger fires with a strength in (0, 1]: graded triggers (fraud score)
/// scale the rule weight, boolean triggers fire at full strength. Missing
/// fields never fire.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fires for scores strictly above the threshold.
    FraudScoreAbove(f64),
    /// Fires for scores in `(above, up_to]`.
    FraudScoreBand { above: f64, up_to: f64 },
    RecentAbuse,
    VoipLine,
    NumberPorted,
    DoNotCall,
    PrepaidSim,
    /// Fires for breach counts in `[min, max)`.
    BreachCountBand { min: u32, max: u32 },
    BreachCountAtLeast(u32),
    /// Fires when the number is explicitly reported invalid or inactive.
    InvalidOrInactive,
}

impl Trigger {
    /// Evaluates this trigger against one signal. Returns the firing
    /// strength, or `None` when the condition does not hold (including when
    /// the relevant field is absent).
    pub fn fire(&self, signal: &ProviderSignal) -> Option<f64> {
        match self {
            Trigger::FraudScoreAbove(threshold) => {
                let score = signal.fraud_score?;
                if score > *threshold {
                    Some((score / 100.0).clamp(0.0, 1.0))
                } else {
                    None
                }
            }
            Trigger::FraudScoreBand { above, up_to } => {
                let score = signal.fraud_score?;
                if score > *above && score <= *up_to {
                    Some((score / 100.0).clamp(0.0, 1.0))
                } else {
                    None
                }
            }
            Trigger::RecentAbuse => full_if(signal.recent_abuse),
            Trigger::VoipLine => full_if(signal.is_voip),
            Trigger::NumberPorted => full_if(signal.ported),
            Trigger::DoNotCall => full_if(signal.do_not_call),
            Trigger::PrepaidSim => full_if(signal.is_prepaid),
            Trigger::BreachCountBand { min, max } => {
                let count = signal.breach_count?;
                if count >= *min && count < *max {
                    Some(1.0)
                } else {
                    None
                }
            }
            Trigger::BreachCountAtLeast(min) => {
                let count = signal.breach_count?;
                if count >= *min {
                    Some(1.0)
                } else {
                    None
                }
            }
            Trigger::InvalidOrInactive => {
                if signal.valid.is_no() || signal.active.is_no() {
                    Some(1.0)
                } else {
                    None
                }
            }
        }
    }
}

fn full_if(flag: TriState) -> Option<f64> {
    if flag.is_yes() {
        Some(1.0)
    } else {
        None
    }
}

/// One entry of the rule table.
#[derive(Debug, Clone)]
pub struct RiskRule {
    pub category: &'static str,
    pub factor_type: &'static str,
    pub severity: Severity,
    pub weight: f64,
    pub description: &'static str,
    pub trigger: Trigger,
}

/// The compiled scoring policy: rule table plus level buckets.
pub struct RiskPolicy {
    pub rules: Vec<RiskRule>,
    pub buckets: RiskBuckets,
}

impl RiskPolicy {
    /// Builds the rule table from a policy configuration.
    pub fn from_config(config: &PolicyConfig) -> Self {
        let t = &config.thresholds;
        let w = &config.weights;
        let rules = vec![
            RiskRule {
                category: "fraud_indicators",
                factor_type: "High Fraud Score",
                severity: Severity::Critical,
                weight: w.high_fraud,
                description: "Provider fraud score at or above the high-risk threshold",
                trigger: Trigger::FraudScoreAbove(t.high_fraud),
            },
            RiskRule {
                category: "fraud_indicators",
                factor_type: "Elevated Fraud Score",
                severity: Severity::High,
                weight: w.elevated_fraud,
                description: "Provider fraud score in the elevated band",
                trigger: Trigger::FraudScoreBand {
                    above: t.elevated_fraud,
                    up_to: t.high_fraud,
                },
            },
            RiskRule {
                category: "fraud_indicators",
                factor_type: "Recent Abuse",
                severity: Severity::High,
                weight: w.recent_abuse,
                description: "Number flagged for recent abusive activity",
                trigger: Trigger::RecentAbuse,
            },
            RiskRule {
                category: "line_attributes",
                factor_type: "VOIP Line",
                severity: Severity::Medium,
                weight: w.voip,
                description: "Number is a VOIP line, commonly used for disposable identities",
                trigger: Trigger::VoipLine,
            },
            RiskRule {
                category: "line_attributes",
                factor_type: "Number Ported",
                severity: Severity::Medium,
                weight: w.ported,
                description: "Number was ported between carriers",
                trigger: Trigger::NumberPorted,
            },
            RiskRule {
                category: "line_attributes",
                factor_type: "Prepaid SIM",
                severity: Severity::Low,
                weight: w.prepaid,
                description: "Number is on a prepaid SIM",
                trigger: Trigger::PrepaidSim,
            },
            RiskRule {
                category: "compliance",
                factor_type: "Do Not Call Listed",
                severity: Severity::Low,
                weight: w.do_not_call,
                description: "Number appears on a do-not-call registry",
                trigger: Trigger::DoNotCall,
            },
            RiskRule {
                category: "data_exposure",
                factor_type: "Data Breach Exposure",
                severity: Severity::Medium,
                weight: w.breach_medium,
                description: "Number appears in known data breaches",
                trigger: Trigger::BreachCountBand {
                    min: 1,
                    max: t.breach_high_min,
                },
            },
            RiskRule {
                category: "data_exposure",
                factor_type: "Data Breach Exposure",
                severity: Severity::High,
                weight: w.breach_high,
                description: "Number appears in multiple data breaches",
                trigger: Trigger::BreachCountAtLeast(t.breach_high_min),
            },
            RiskRule {
                category: "number_status",
                factor_type: "Invalid/Inactive Number",
                severity: Severity::High,
                weight: w.invalid_inactive,
                description: "Number is reported invalid or inactive",
                trigger: Trigger::InvalidOrInactive,
            },
        ];

        Self {
            rules,
            buckets: config.buckets,
        }
    }
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}

/// Derives risk factors from collected evidence by scanning the rule table.
///
/// Signals are visited in source-id order, so the output is deterministic
/// regardless of collection completion order. Each rule fires at most once,
/// on the first signal that satisfies its trigger.
pub fn derive_risk_factors(evidence: &CollectedEvidence, policy: &RiskPolicy) -> Vec<RiskFactor> {
    let mut factors = Vec::new();

    for rule in &policy.rules {
        for signal in evidence.signals.values() {
            if let Some(strength) = rule.trigger.fire(signal) {
                factors.push(RiskFactor {
                    category: rule.category.to_string(),
                    factor_type: rule.factor_type.to_string(),
                    severity: rule.severity,
                    weight: rule.weight,
                    score_contribution: rule.weight * strength,
                    description: rule.description.to_string(),
                    evidence: json!({
                        "source": signal.source,
                        "signal": signal,
                    }),
                    source: signal.source.clone(),
                });
                break;
            }
        }
    }

    if !factors.is_empty() {
        tracing::debug!("Derived {} risk factors", factors.len());
    }
    factors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderSignal;

    fn evidence_with(signal: ProviderSignal) -> CollectedEvidence {
        let mut evidence = CollectedEvidence::default();
        evidence.signals.insert(signal.source.clone(), signal);
        evidence
    }

    #[test]
    fn clean_signal_fires_nothing() {
        let mut signal = ProviderSignal::new("ipqualityscore");
        signal.fraud_score = Some(5.0);
        signal.is_voip = TriState::No;
        signal.valid = TriState::Yes;
        signal.active = TriState::Yes;

        let factors = derive_risk_factors(&evidence_with(signal), &RiskPolicy::default());
        assert!(factors.is_empty());
    }

    #[test]
    fn high_fraud_score_scales_contribution() {
        let mut signal = ProviderSignal::new("ipqualityscore");
        signal.fraud_score = Some(85.0);

        let factors = derive_risk_factors(&evidence_with(signal), &RiskPolicy::default());
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].factor_type, "High Fraud Score");
        assert_eq!(factors[0].severity, Severity::Critical);
        assert_eq!(factors[0].weight, 50.0);
        assert!((factors[0].score_contribution - 42.5).abs() < 1e-9);
    }

    #[test]
    fn fraud_bands_split_exactly_at_thresholds() {
        for (score, expected) in [
            (50.0, None),
            (50.5, Some("Elevated Fraud Score")),
            (75.0, Some("Elevated Fraud Score")),
            (75.5, Some("High Fraud Score")),
        ] {
            let mut signal = ProviderSignal::new("ipqualityscore");
            signal.fraud_score = Some(score);
            let factors = derive_risk_factors(&evidence_with(signal), &RiskPolicy::default());
            match expected {
                Some(factor_type) => {
                    assert_eq!(factors.len(), 1, "score {}", score);
                    assert_eq!(factors[0].factor_type, factor_type, "score {}", score);
                }
                None => assert!(factors.is_empty(), "score {}", score),
            }
        }
    }

    #[test]
    fn absent_fields_never_fire() {
        let signal = ProviderSignal::new("numverify");

        let factors = derive_risk_factors(&evidence_with(signal), &RiskPolicy::default());
        assert!(factors.is_empty());
    }

    #[test]
    fn explicit_no_does_not_fire_boolean_rules() {
        let mut signal = ProviderSignal::new("ipqualityscore");
        signal.is_voip = TriState::No;
        signal.is_prepaid = TriState::No;
        signal.do_not_call = TriState::No;
        signal.recent_abuse = TriState::No;

        let factors = derive_risk_factors(&evidence_with(signal), &RiskPolicy::default());
        assert!(factors.is_empty());
    }

    #[test]
    fn breach_count_bands_split_at_threshold() {
        let mut low = ProviderSignal::new("breachdirectory");
        low.breach_count = Some(2);
        let factors = derive_risk_factors(&evidence_with(low), &RiskPolicy::default());
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].severity, Severity::Medium);
        assert_eq!(factors[0].score_contribution, 15.0);

        let mut high = ProviderSignal::new("breachdirectory");
        high.breach_count = Some(3);
        let factors = derive_risk_factors(&evidence_with(high), &RiskPolicy::default());
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].severity, Severity::High);
        assert_eq!(factors[0].score_contribution, 30.0);
    }

    #[test]
    fn zero_breaches_fire_nothing() {
        let mut signal = ProviderSignal::new("breachdirectory");
        signal.breach_count = Some(0);

        let factors = derive_risk_factors(&evidence_with(signal), &RiskPolicy::default());
        assert!(factors.is_empty());
    }

    #[test]
    fn invalid_or_inactive_fires_once() {
        let mut signal = ProviderSignal::new("numverify");
        signal.valid = TriState::No;

        let factors = derive_risk_factors(&evidence_with(signal), &RiskPolicy::default());
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].factor_type, "Invalid/Inactive Number");
    }

    #[test]
    fn each_rule_fires_at_most_once_across_sources() {
        let mut a = ProviderSignal::new("a");
        a.is_voip = TriState::Yes;
        let mut b = ProviderSignal::new("b");
        b.is_voip = TriState::Yes;

        let mut evidence = CollectedEvidence::default();
        evidence.signals.insert("a".to_string(), a);
        evidence.signals.insert("b".to_string(), b);

        let factors = derive_risk_factors(&evidence, &RiskPolicy::default());
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].source, "a");
    }

    #[test]
    fn evidence_references_triggering_signal() {
        let mut signal = ProviderSignal::new("ipqualityscore");
        signal.recent_abuse = TriState::Yes;

        let factors = derive_risk_factors(&evidence_with(signal), &RiskPolicy::default());
        assert_eq!(factors[0].evidence["source"], "ipqualityscore");
        assert_eq!(factors[0].evidence["signal"]["recent_abuse"], "yes");
    }

    #[test]
    fn policy_json_overrides_subset_of_weights() {
        let config: PolicyConfig =
            serde_json::from_str(r#"{"weights": {"voip": 40.0}}"#).unwrap();
        assert_eq!(config.weights.voip, 40.0);
        assert_eq!(config.weights.high_fraud, 50.0);
        assert_eq!(config.thresholds.high_fraud, 75.0);
    }
}
