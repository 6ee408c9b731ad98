//! Activity-data service seam
//!
//! The pipeline only knows these three queries. Any explorer-class or
//! node-provider-class backend can implement them.

use async_trait::async_trait;

use crate::models::{Address, AppResult, BalanceSnapshot, ProtocolInteractionRecord, TransactionRecord};

#[async_trait]
pub trait ActivityService: Send + Sync {
    /// Full transaction history; an inactive wallet yields an empty vector
    async fn fetch_transaction_history(&self, address: &Address) -> AppResult<Vec<TransactionRecord>>;

    /// Interactions with known lending-protocol contracts
    async fn fetch_protocol_interactions(&self, address: &Address) -> AppResult<Vec<ProtocolInteractionRecord>>;

    /// Current balance
    async fn fetch_balance(&self, address: &Address) -> AppResult<BalanceSnapshot>;
}
