//! Feature Extraction
//!
//! Reduces raw activity records into the seven numeric risk metrics.
//! Pure: no I/O, `now` is always passed in.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::{Address, RawActivity, WalletMetrics};

const SECONDS_PER_DAY: f64 = 86_400.0;

pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn extract(raw: &RawActivity, now: DateTime<Utc>) -> WalletMetrics {
        let transactions = &raw.transactions;
        let total = transactions.len() as u64;

        let total_volume_eth: f64 = transactions.iter().map(|tx| tx.value_eth).sum();
        let failed = transactions.iter().filter(|tx| !tx.success).count() as u64;

        // Addresses are canonical lowercase, so set membership is case-insensitive
        let counterparties: HashSet<&Address> = transactions
            .iter()
            .filter_map(|tx| tx.counterparty.as_ref())
            .collect();

        let first = transactions.iter().map(|tx| tx.timestamp).min();
        let last = transactions.iter().map(|tx| tx.timestamp).max();

        let activity_span_days = match (first, last) {
            (Some(first), Some(last)) => days_between(first, last),
            _ => 0.0,
        };

        let transaction_frequency = if total == 0 {
            0.0
        } else {
            total as f64 / activity_span_days.max(1.0)
        };

        let failed_transaction_rate = if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        };

        WalletMetrics {
            total_transactions: total,
            total_volume_eth,
            transaction_frequency,
            protocol_interactions: raw.interactions.len() as u64,
            current_balance_eth: raw.balance.balance_eth,
            failed_transaction_rate,
            unique_counterparties: counterparties.len() as u64,
            days_since_last_activity: last.map(|last| days_between(last, now).max(0.0)),
            activity_span_days,
        }
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / SECONDS_PER_DAY
}
