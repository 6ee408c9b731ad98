//! Wallet Risk Library
//!
//! Batch creditworthiness scoring for on-chain wallets:
//! - Rate-limited, retrying collection of wallet activity
//! - Seven-factor risk model producing a 0-1000 score and a risk band
//! - Resumable batch runs backed by an append-only checkpoint

pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{
    BatchOrchestrator, BatchReport, BatchSummary, CheckpointStore, DataCollector, FeatureExtractor,
    JsonlCheckpointStore, JsonlResultSink, MemoryCheckpointStore, ResultSink, RiskScorer, StopHandle,
};
pub use models::{
    Address, AppError, AppResult, ErrorCode, PipelineConfig, RiskAssessment, RiskCategory, RiskFactor,
    RiskWeights, WalletMetrics,
};
pub use providers::{
    ActivityService, Clock, EtherscanService, EtherscanTransport, ManualClock, RateLimitedClient, SystemClock,
};
pub use utils::ResponseCache;
