//! Risk Scoring Module
//! Maps wallet metrics to a 0-1000 creditworthiness risk score
//!
//! Each metric goes through an ordered step table. Tables are evaluated from the
//! most favorable bucket downward, so a value exactly on a threshold lands in the
//! better bucket.
//!
//! - 0-200: Very Low Risk
//! - 201-400: Low Risk
//! - 401-600: Medium Risk
//! - 601-800: High Risk
//! - 801-1000: Very High Risk

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{FactorScore, RiskAssessment, RiskCategory, RiskFactor, RiskWeights, WalletMetrics};

/// Upper bound of the score scale
pub const MAX_SCORE: u16 = 1000;

// ============================================
// STEP TABLES
// ============================================

/// (minimum, multiplier), best bucket first
const PROTOCOL_EXPERIENCE_STEPS: [(f64, f64); 5] = [(50.0, 0.05), (20.0, 0.15), (10.0, 0.30), (5.0, 0.50), (1.0, 0.70)];
const PROTOCOL_EXPERIENCE_FLOOR: f64 = 0.95;

const VOLUME_STEPS: [(f64, f64); 4] = [(1000.0, 0.10), (100.0, 0.20), (10.0, 0.40), (1.0, 0.60)];
const VOLUME_FLOOR: f64 = 0.90;

const FREQUENCY_STEPS: [(f64, f64); 3] = [(1.0, 0.02), (0.5, 0.20), (0.1, 0.40)];
const FREQUENCY_ANY: f64 = 0.70;
const FREQUENCY_NONE: f64 = 1.00;

const BALANCE_STEPS: [(f64, f64); 4] = [(100.0, 0.02), (10.0, 0.15), (1.0, 0.30), (0.1, 0.60)];
const BALANCE_FLOOR: f64 = 0.90;

const COUNTERPARTY_STEPS: [(f64, f64); 5] = [(100.0, 0.05), (50.0, 0.15), (20.0, 0.30), (10.0, 0.50), (1.0, 0.80)];
const COUNTERPARTY_FLOOR: f64 = 1.00;

/// (maximum, multiplier), best bucket first
const FAILURE_RATE_STEPS: [(f64, f64); 3] = [(0.02, 0.10), (0.05, 0.30), (0.10, 0.60)];
const FAILURE_RATE_CEILING: f64 = 1.00;

const RECENCY_STEPS: [(f64, f64); 4] = [(30.0, 0.05), (90.0, 0.30), (180.0, 0.50), (365.0, 0.70)];
const RECENCY_STALE: f64 = 0.90;
const RECENCY_NEVER: f64 = 1.00;

/// First bucket whose lower bound the value meets
fn at_least(value: f64, steps: &[(f64, f64)], floor: f64) -> f64 {
    steps
        .iter()
        .find(|(min, _)| value >= *min)
        .map_or(floor, |(_, multiplier)| *multiplier)
}

/// First bucket whose upper bound the value stays within
fn at_most(value: f64, steps: &[(f64, f64)], ceiling: f64) -> f64 {
    steps
        .iter()
        .find(|(max, _)| value <= *max)
        .map_or(ceiling, |(_, multiplier)| *multiplier)
}

// ============================================
// SCORER
// ============================================

pub struct RiskScorer;

impl RiskScorer {
    /// Risk multiplier in [0, 1] for one factor
    pub fn factor_multiplier(factor: RiskFactor, metrics: &WalletMetrics) -> f64 {
        let multiplier = match factor {
            RiskFactor::ProtocolExperience => at_least(
                metrics.protocol_interactions as f64,
                &PROTOCOL_EXPERIENCE_STEPS,
                PROTOCOL_EXPERIENCE_FLOOR,
            ),
            RiskFactor::TransactionVolume => at_least(metrics.total_volume_eth, &VOLUME_STEPS, VOLUME_FLOOR),
            RiskFactor::TransactionFrequency => {
                if metrics.transaction_frequency > 0.0 {
                    at_least(metrics.transaction_frequency, &FREQUENCY_STEPS, FREQUENCY_ANY)
                } else {
                    FREQUENCY_NONE
                }
            }
            RiskFactor::BalanceStability => at_least(metrics.current_balance_eth, &BALANCE_STEPS, BALANCE_FLOOR),
            RiskFactor::FailureRate => {
                // No transactions means no evidence of reliability
                if metrics.total_transactions == 0 {
                    FAILURE_RATE_CEILING
                } else if metrics.failed_transaction_rate <= 0.0 {
                    0.0
                } else {
                    at_most(metrics.failed_transaction_rate, &FAILURE_RATE_STEPS, FAILURE_RATE_CEILING)
                }
            }
            RiskFactor::CounterpartyDiversity => at_least(
                metrics.unique_counterparties as f64,
                &COUNTERPARTY_STEPS,
                COUNTERPARTY_FLOOR,
            ),
            RiskFactor::RecentActivity => match metrics.days_since_last_activity {
                Some(days) => at_most(days, &RECENCY_STEPS, RECENCY_STALE),
                None => RECENCY_NEVER,
            },
        };
        // NaN inputs fall through every bucket; keep the result in range anyway
        if multiplier.is_finite() {
            multiplier.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// All seven factor scores under the given weights
    pub fn factor_scores(metrics: &WalletMetrics, weights: &RiskWeights) -> Vec<FactorScore> {
        RiskFactor::ALL
            .into_iter()
            .map(|factor| FactorScore {
                factor,
                multiplier: Self::factor_multiplier(factor, metrics),
                weight: weights.get(factor),
            })
            .collect()
    }

    /// Weighted 0-1000 score from factor scores
    pub fn total(factors: &[FactorScore]) -> u16 {
        let raw: f64 = factors.iter().map(|f| f.multiplier * f.weight).sum::<f64>() * f64::from(MAX_SCORE);
        raw.round().clamp(0.0, f64::from(MAX_SCORE)) as u16
    }

    /// Score one wallet. `weights` must already be validated.
    pub fn score(
        address: impl Into<String>,
        metrics: &WalletMetrics,
        weights: &RiskWeights,
        processed_at: DateTime<Utc>,
    ) -> RiskAssessment {
        let address = address.into();
        let factors = Self::factor_scores(metrics, weights);
        let score = Self::total(&factors);
        let category = RiskCategory::from_score(score);

        debug!("📊 {} scored {} ({})", address, score, category);

        RiskAssessment {
            address,
            score,
            category,
            factors,
            metrics: Some(metrics.clone()),
            error: None,
            processed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn at() -> DateTime<Utc> {
        DateTime::<Utc>::default()
    }

    fn best_metrics() -> WalletMetrics {
        WalletMetrics {
            total_transactions: 500,
            total_volume_eth: 1500.0,
            transaction_frequency: 2.0,
            protocol_interactions: 60,
            current_balance_eth: 150.0,
            failed_transaction_rate: 0.0,
            unique_counterparties: 120,
            days_since_last_activity: Some(5.0),
            activity_span_days: 250.0,
        }
    }

    /// Small deterministic sweep over the metric space
    fn metric_grid() -> Vec<WalletMetrics> {
        let mut grid = Vec::new();
        for &interactions in &[0u64, 1, 5, 20, 75] {
            for &volume in &[0.0, 0.5, 10.0, 2000.0] {
                for &failure in &[0.0, 0.02, 0.07, 0.5] {
                    for &recency in &[None, Some(0.0), Some(100.0), Some(900.0)] {
                        grid.push(WalletMetrics {
                            total_transactions: if recency.is_some() { 40 } else { 0 },
                            total_volume_eth: volume,
                            transaction_frequency: volume / 100.0,
                            protocol_interactions: interactions,
                            current_balance_eth: volume / 3.0,
                            failed_transaction_rate: failure,
                            unique_counterparties: interactions * 2,
                            days_since_last_activity: recency,
                            activity_span_days: 30.0,
                        });
                    }
                }
            }
        }
        grid
    }

    fn weight_sets() -> Vec<RiskWeights> {
        let skewed: HashMap<String, f64> = [
            ("protocol_experience", 0.6),
            ("transaction_volume", 0.1),
            ("transaction_frequency", 0.1),
            ("balance_stability", 0.05),
            ("failure_rate", 0.05),
            ("counterparty_diversity", 0.05),
            ("recent_activity", 0.05),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        vec![RiskWeights::default(), RiskWeights::from_map(&skewed).unwrap()]
    }

    #[test]
    fn test_minimal_risk_wallet() {
        let assessment = RiskScorer::score("0xabc", &best_metrics(), &RiskWeights::default(), at());
        assert!(assessment.score <= 50, "score was {}", assessment.score);
        assert_eq!(assessment.category, RiskCategory::VeryLow);
        assert!(assessment.error.is_none());
    }

    #[test]
    fn test_empty_wallet_is_maximal_risk() {
        let metrics = WalletMetrics::default();
        let assessment = RiskScorer::score("0xabc", &metrics, &RiskWeights::default(), at());

        assert!(assessment.score >= 900, "score was {}", assessment.score);
        assert_eq!(assessment.category, RiskCategory::VeryHigh);
        let failure = assessment
            .factors
            .iter()
            .find(|f| f.factor == RiskFactor::FailureRate)
            .unwrap();
        assert_eq!(failure.multiplier, 1.0);
    }

    #[test]
    fn test_boundary_values_take_the_better_bucket() {
        let mut metrics = WalletMetrics::default();
        metrics.protocol_interactions = 50;
        assert_eq!(RiskScorer::factor_multiplier(RiskFactor::ProtocolExperience, &metrics), 0.05);
        metrics.protocol_interactions = 49;
        assert_eq!(RiskScorer::factor_multiplier(RiskFactor::ProtocolExperience, &metrics), 0.15);

        metrics.total_transactions = 100;
        metrics.failed_transaction_rate = 0.02;
        assert_eq!(RiskScorer::factor_multiplier(RiskFactor::FailureRate, &metrics), 0.10);
        metrics.failed_transaction_rate = 0.1;
        assert_eq!(RiskScorer::factor_multiplier(RiskFactor::FailureRate, &metrics), 0.60);

        metrics.days_since_last_activity = Some(30.0);
        assert_eq!(RiskScorer::factor_multiplier(RiskFactor::RecentActivity, &metrics), 0.05);
        metrics.days_since_last_activity = Some(366.0);
        assert_eq!(RiskScorer::factor_multiplier(RiskFactor::RecentActivity, &metrics), 0.90);

        metrics.transaction_frequency = 0.01;
        assert_eq!(RiskScorer::factor_multiplier(RiskFactor::TransactionFrequency, &metrics), 0.70);
    }

    #[test]
    fn test_factor_scores_stay_in_unit_range() {
        for metrics in metric_grid() {
            for factor in RiskFactor::ALL {
                let m = RiskScorer::factor_multiplier(factor, &metrics);
                assert!((0.0..=1.0).contains(&m), "{:?} gave {}", factor, m);
            }
        }
    }

    #[test]
    fn test_nan_metric_is_treated_as_maximal_risk() {
        let mut metrics = best_metrics();
        metrics.total_volume_eth = f64::NAN;
        assert_eq!(RiskScorer::factor_multiplier(RiskFactor::TransactionVolume, &metrics), 0.90);
    }

    #[test]
    fn test_score_bounds_and_category_agree() {
        for weights in weight_sets() {
            for metrics in metric_grid() {
                let assessment = RiskScorer::score("0xabc", &metrics, &weights, at());
                assert!(assessment.score <= MAX_SCORE);
                assert_eq!(assessment.category, RiskCategory::from_score(assessment.score));
            }
        }
    }

    #[test]
    fn test_category_mapping_is_total() {
        for score in 0..=MAX_SCORE {
            let category = RiskCategory::from_score(score);
            let expected = match score {
                0..=200 => RiskCategory::VeryLow,
                201..=400 => RiskCategory::Low,
                401..=600 => RiskCategory::Medium,
                601..=800 => RiskCategory::High,
                _ => RiskCategory::VeryHigh,
            };
            assert_eq!(category, expected);
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let weights = RiskWeights::default();
        for metrics in metric_grid() {
            assert_eq!(
                RiskScorer::score("0xabc", &metrics, &weights, at()),
                RiskScorer::score("0xabc", &metrics, &weights, at())
            );
        }
    }

    #[test]
    fn test_more_protocol_experience_never_raises_score() {
        for weights in weight_sets() {
            for base in metric_grid() {
                let mut previous = u16::MAX;
                for interactions in [0u64, 1, 4, 5, 9, 10, 19, 20, 49, 50, 500] {
                    let mut metrics = base.clone();
                    metrics.protocol_interactions = interactions;
                    let score = RiskScorer::score("0xabc", &metrics, &weights, at()).score;
                    assert!(score <= previous, "{} interactions raised score to {}", interactions, score);
                    previous = score;
                }
            }
        }
    }

    #[test]
    fn test_higher_failure_rate_never_lowers_score() {
        for weights in weight_sets() {
            for base in metric_grid() {
                let mut previous = 0u16;
                for rate in [0.0, 0.01, 0.02, 0.03, 0.05, 0.08, 0.1, 0.2, 1.0] {
                    let mut metrics = base.clone();
                    metrics.failed_transaction_rate = rate;
                    let score = RiskScorer::score("0xabc", &metrics, &weights, at()).score;
                    assert!(score >= previous, "rate {} lowered score to {}", rate, score);
                    previous = score;
                }
            }
        }
    }

    #[test]
    fn test_explanation_lists_top_contributors() {
        let assessment = RiskScorer::score("0xabc", &WalletMetrics::default(), &RiskWeights::default(), at());
        let text = assessment.explanation();
        assert!(text.contains("Protocol Experience"));
        assert!(text.contains("contributes"));
        assert_eq!(text.matches("contributes").count(), 3);
    }
}
