//! Data Collector
//!
//! Issues the three activity queries for one wallet and turns them into
//! metrics. Any query failing after retries fails the whole wallet.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::features::FeatureExtractor;
use crate::models::{Address, AppResult, CollectionResult, RawActivity};
use crate::providers::ActivityService;

#[derive(Clone)]
pub struct DataCollector {
    service: Arc<dyn ActivityService>,
}

impl DataCollector {
    pub fn new(service: Arc<dyn ActivityService>) -> Self {
        Self { service }
    }

    /// Fetch history, interactions and balance; first error wins.
    /// History goes first so an interaction lookup built on the same
    /// response can be served from cache.
    pub async fn collect_raw(&self, address: &Address) -> AppResult<RawActivity> {
        let transactions = self.service.fetch_transaction_history(address).await?;
        let (interactions, balance) = tokio::try_join!(
            self.service.fetch_protocol_interactions(address),
            self.service.fetch_balance(address),
        )?;

        debug!(
            "📥 {}: {} txs, {} interactions, {:.4} ETH",
            address,
            transactions.len(),
            interactions.len(),
            balance.balance_eth
        );

        Ok(RawActivity {
            address: address.clone(),
            transactions,
            interactions,
            balance,
        })
    }

    /// Collect and extract metrics in one step
    pub async fn collect(&self, address: &Address, now: DateTime<Utc>) -> CollectionResult {
        match self.collect_raw(address).await {
            Ok(raw) => CollectionResult::Success(FeatureExtractor::extract(&raw, now)),
            Err(e) => {
                warn!("⚠️ Collection failed for {}: {}", address, e);
                CollectionResult::Failure {
                    code: e.code,
                    reason: e.message,
                }
            }
        }
    }
}
