//! Configuration module for the wallet risk pipeline
//!
//! Every value here is built once per run and then only read. Tuning defaults
//! come from `utils::constants`.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::errors::{AppError, AppResult};
use super::types::RiskFactor;
use crate::utils::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS, DEFAULT_CHECKPOINT_INTERVAL,
    DEFAULT_CHECKPOINT_PATH, DEFAULT_ETHERSCAN_API_URL, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RATE_LIMIT_PER_SEC, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RESULTS_PATH,
    DEFAULT_RETRY_BASE_MS, DEFAULT_RETRY_JITTER_PERCENT, DEFAULT_RETRY_MAX_MS,
};

/// Allowed deviation of the weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ============================================
// WEIGHTS
// ============================================

/// Validated weight set for the seven risk factors.
///
/// Fields are private: the only way to obtain a value is through a
/// constructor that checks presence, sign and sum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskWeights {
    protocol_experience: f64,
    transaction_volume: f64,
    transaction_frequency: f64,
    balance_stability: f64,
    failure_rate: f64,
    counterparty_diversity: f64,
    recent_activity: f64,
}

impl RiskWeights {
    /// Build from a name → weight map. Every factor must be present exactly
    /// once; unknown names are rejected.
    pub fn from_map(weights: &HashMap<String, f64>) -> AppResult<Self> {
        for name in weights.keys() {
            if RiskFactor::from_name(name).is_none() {
                return Err(AppError::invalid_weights(format!("unknown factor {:?}", name)));
            }
        }

        let get = |factor: RiskFactor| -> AppResult<f64> {
            weights
                .get(factor.as_str())
                .copied()
                .ok_or_else(|| AppError::invalid_weights(format!("missing weight for {}", factor.as_str())))
        };

        let candidate = Self {
            protocol_experience: get(RiskFactor::ProtocolExperience)?,
            transaction_volume: get(RiskFactor::TransactionVolume)?,
            transaction_frequency: get(RiskFactor::TransactionFrequency)?,
            balance_stability: get(RiskFactor::BalanceStability)?,
            failure_rate: get(RiskFactor::FailureRate)?,
            counterparty_diversity: get(RiskFactor::CounterpartyDiversity)?,
            recent_activity: get(RiskFactor::RecentActivity)?,
        };
        candidate.validate()?;
        Ok(candidate)
    }

    /// Parse a JSON object such as `{"protocol_experience": 0.25, ...}`
    pub fn from_json(json: &str) -> AppResult<Self> {
        let map: HashMap<String, f64> = serde_json::from_str(json)
            .map_err(|e| AppError::invalid_weights(format!("weights are not a JSON object of numbers: {}", e)))?;
        Self::from_map(&map)
    }

    fn validate(&self) -> AppResult<()> {
        let mut sum = 0.0;
        for factor in RiskFactor::ALL {
            let weight = self.get(factor);
            if !weight.is_finite() {
                return Err(AppError::invalid_weights(format!("{} is not finite", factor.as_str())));
            }
            if weight < 0.0 {
                return Err(AppError::invalid_weights(format!(
                    "{} is negative ({})",
                    factor.as_str(),
                    weight
                )));
            }
            sum += weight;
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AppError::invalid_weights(format!("weights sum to {:.6}, expected 1.0", sum)));
        }
        Ok(())
    }

    /// Weight for one factor
    pub fn get(&self, factor: RiskFactor) -> f64 {
        match factor {
            RiskFactor::ProtocolExperience => self.protocol_experience,
            RiskFactor::TransactionVolume => self.transaction_volume,
            RiskFactor::TransactionFrequency => self.transaction_frequency,
            RiskFactor::BalanceStability => self.balance_stability,
            RiskFactor::FailureRate => self.failure_rate,
            RiskFactor::CounterpartyDiversity => self.counterparty_diversity,
            RiskFactor::RecentActivity => self.recent_activity,
        }
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            protocol_experience: 0.25,
            transaction_volume: 0.20,
            transaction_frequency: 0.15,
            balance_stability: 0.15,
            failure_rate: 0.10,
            counterparty_diversity: 0.10,
            recent_activity: 0.05,
        }
    }
}

// ============================================
// RETRY / RATE LIMIT
// ============================================

/// Exponential backoff policy for transient fetch failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first try included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// ± jitter applied to each delay, in percent
    pub jitter_percent: u64,
}

impl RetryPolicy {
    /// Backoff before attempt `attempt` (1-based). Attempt 1 never waits.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Policy with no jitter, for deterministic timing
    pub fn without_jitter(mut self) -> Self {
        self.jitter_percent = 0;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
            jitter_percent: DEFAULT_RETRY_JITTER_PERCENT,
        }
    }
}

/// Outbound call settings shared by every worker
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Minimum spacing between any two outbound calls
    pub min_interval: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl FetchConfig {
    /// Minimum interval that keeps the call rate at or below `per_second`
    pub fn interval_for_rate(per_second: u32) -> AppResult<Duration> {
        if per_second == 0 {
            return Err(AppError::invalid_config("rate limit must be at least 1 call/s"));
        }
        Ok(Duration::from_secs(1) / per_second)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1) / DEFAULT_RATE_LIMIT_PER_SEC,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Response cache settings
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

/// Batch orchestration settings
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Completed wallets between checkpoint writes
    pub checkpoint_interval: usize,
    /// 1 = sequential
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            workers: 1,
        }
    }
}

// ============================================
// PIPELINE CONFIG
// ============================================

/// Everything a run needs, assembled once
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub weights: RiskWeights,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub api_url: String,
    /// Never logged
    pub api_key: String,
    pub checkpoint_path: PathBuf,
    pub results_path: PathBuf,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let api_key = std::env::var("ETHERSCAN_API_KEY")
            .ok()
            .filter(|k| !k.is_empty() && k != "YOUR_API_KEY")
            .ok_or_else(|| AppError::missing_env("ETHERSCAN_API_KEY"))?;
        info!("🔑 ETHERSCAN_API_KEY configured (key hidden for security)");

        let weights = match std::env::var("RISK_WEIGHTS") {
            Ok(json) => RiskWeights::from_json(&json)?,
            Err(_) => RiskWeights::default(),
        };

        let rate = env_parse::<u32>("RATE_LIMIT_PER_SEC")?.unwrap_or(DEFAULT_RATE_LIMIT_PER_SEC);
        let retry = RetryPolicy {
            max_attempts: env_parse("FETCH_MAX_ATTEMPTS")?.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            base_delay: Duration::from_millis(env_parse("RETRY_BASE_MS")?.unwrap_or(DEFAULT_RETRY_BASE_MS)),
            max_delay: Duration::from_millis(env_parse("RETRY_MAX_MS")?.unwrap_or(DEFAULT_RETRY_MAX_MS)),
            jitter_percent: env_parse("RETRY_JITTER_PERCENT")?.unwrap_or(DEFAULT_RETRY_JITTER_PERCENT),
        };
        let fetch = FetchConfig {
            min_interval: FetchConfig::interval_for_rate(rate)?,
            request_timeout: Duration::from_secs(
                env_parse("REQUEST_TIMEOUT_SECS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            retry,
        };
        let cache = CacheConfig {
            capacity: env_parse("CACHE_CAPACITY")?.unwrap_or(DEFAULT_CACHE_CAPACITY),
            ttl: Duration::from_secs(env_parse("CACHE_TTL_SECS")?.unwrap_or(DEFAULT_CACHE_TTL_SECS)),
        };
        let batch = BatchConfig {
            checkpoint_interval: env_parse("CHECKPOINT_INTERVAL")?.unwrap_or(DEFAULT_CHECKPOINT_INTERVAL),
            workers: env_parse("BATCH_WORKERS")?.unwrap_or(1),
        };

        let config = Self {
            weights,
            fetch,
            cache,
            batch,
            api_url: std::env::var("ETHERSCAN_API_URL").unwrap_or_else(|_| DEFAULT_ETHERSCAN_API_URL.to_string()),
            api_key,
            checkpoint_path: std::env::var("CHECKPOINT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
            results_path: std::env::var("RESULTS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_RESULTS_PATH)),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.fetch.retry.max_attempts == 0 {
            return Err(AppError::invalid_config("FETCH_MAX_ATTEMPTS must be at least 1"));
        }
        if self.fetch.retry.base_delay > self.fetch.retry.max_delay {
            return Err(AppError::invalid_config("RETRY_BASE_MS must not exceed RETRY_MAX_MS"));
        }
        if self.fetch.request_timeout.is_zero() {
            return Err(AppError::invalid_config("REQUEST_TIMEOUT_SECS must be positive"));
        }
        if self.batch.checkpoint_interval == 0 {
            return Err(AppError::invalid_config("CHECKPOINT_INTERVAL must be at least 1"));
        }
        if self.batch.workers == 0 {
            return Err(AppError::invalid_config("BATCH_WORKERS must be at least 1"));
        }
        if self.cache.capacity == 0 {
            return Err(AppError::invalid_config("CACHE_CAPACITY must be at least 1"));
        }
        Ok(())
    }
}

/// Read and parse an optional environment variable
fn env_parse<T: std::str::FromStr>(key: &str) -> AppResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::invalid_config(format!("{} has invalid value {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}
