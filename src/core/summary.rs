//! Batch Summary
//! Aggregate statistics over a finished run

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::models::{RiskAssessment, RiskCategory};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Score statistics over successful wallets only
    pub mean_score: Option<f64>,
    pub median_score: Option<f64>,
    pub min_score: Option<u16>,
    pub max_score: Option<u16>,
    /// Every band, including empty ones
    pub categories: BTreeMap<RiskCategory, usize>,
    pub mean_transactions: Option<f64>,
    pub mean_interactions: Option<f64>,
    pub mean_balance_eth: Option<f64>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

impl BatchSummary {
    pub fn from_assessments(assessments: &[RiskAssessment]) -> Self {
        let mut categories: BTreeMap<RiskCategory, usize> = RiskCategory::ALL.into_iter().map(|c| (c, 0)).collect();
        for assessment in assessments {
            *categories.entry(assessment.category).or_default() += 1;
        }

        let successes: Vec<&RiskAssessment> = assessments.iter().filter(|a| !a.is_failure()).collect();
        let metrics: Vec<_> = successes.iter().filter_map(|a| a.metrics.as_ref()).collect();

        let mut scores: Vec<u16> = successes.iter().map(|a| a.score).collect();
        scores.sort_unstable();

        let median_score = match scores.len() {
            0 => None,
            n if n % 2 == 1 => Some(f64::from(scores[n / 2])),
            n => Some((f64::from(scores[n / 2 - 1]) + f64::from(scores[n / 2])) / 2.0),
        };

        Self {
            total: assessments.len(),
            successful: successes.len(),
            failed: assessments.len() - successes.len(),
            mean_score: mean(scores.iter().map(|s| f64::from(*s))),
            median_score,
            min_score: scores.first().copied(),
            max_score: scores.last().copied(),
            categories,
            mean_transactions: mean(metrics.iter().map(|m| m.total_transactions as f64)),
            mean_interactions: mean(metrics.iter().map(|m| m.protocol_interactions as f64)),
            mean_balance_eth: mean(metrics.iter().map(|m| m.current_balance_eth)),
        }
    }

    pub fn log(&self) {
        info!("📊 ═══════════════════════════════════════");
        info!("📊 BATCH SUMMARY");
        info!("📊 Wallets: {} ({} scored, {} failed)", self.total, self.successful, self.failed);
        if let (Some(mean), Some(median), Some(min), Some(max)) =
            (self.mean_score, self.median_score, self.min_score, self.max_score)
        {
            info!("📊 Score: mean {:.1}, median {:.1}, range {}-{}", mean, median, min, max);
        }
        for (category, count) in &self.categories {
            info!("📊   {:<15} {}", category.as_str(), count);
        }
        if let (Some(txs), Some(interactions), Some(balance)) =
            (self.mean_transactions, self.mean_interactions, self.mean_balance_eth)
        {
            info!(
                "📊 Averages: {:.1} txs, {:.1} protocol interactions, {:.4} ETH",
                txs, interactions, balance
            );
        }
        info!("📊 ═══════════════════════════════════════");
    }
}
