//! Type definitions for the wallet risk pipeline
//! Raw activity records, derived metrics, factor scores and assessments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::{AppError, AppResult, ErrorCode};

// ============================================
// ADDRESS
// ============================================

/// Canonical account identifier: `0x` followed by 40 lowercase hex characters.
///
/// Validated once at construction; two addresses that differ only in case
/// compare equal because both are lowercased here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and canonicalize a raw address string
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AppError::invalid_address(format!("missing 0x prefix: {:?}", trimmed)))?;

        if body.len() != 40 {
            return Err(AppError::invalid_address(format!(
                "expected 40 hex characters, got {}: {:?}",
                body.len(),
                trimmed
            )));
        }
        hex::decode(body)
            .map_err(|e| AppError::invalid_address(format!("{:?} is not hex: {}", trimmed, e)))?;

        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key used to match an input entry against completed work.
/// Valid addresses use their canonical form, anything else its trimmed text.
pub fn address_key(raw: &str) -> String {
    Address::parse(raw)
        .map(String::from)
        .unwrap_or_else(|_| raw.trim().to_string())
}

// ============================================
// RAW ACTIVITY RECORDS
// ============================================

/// Gas metadata attached to a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GasMetadata {
    pub gas_limit: u64,
    pub gas_used: u64,
    pub gas_price_wei: u128,
}

/// One normalized transaction from the wallet's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    /// Transferred value in ETH
    pub value_eth: f64,
    pub success: bool,
    pub from: Address,
    /// `None` for contract creations
    pub to: Option<Address>,
    /// The other side of the transfer relative to the wallet being assessed
    pub counterparty: Option<Address>,
    pub gas: GasMetadata,
    /// 4-byte method selector (`0x` + 8 hex) when the call carried input data
    pub method_id: Option<String>,
    /// Decoded function signature when the explorer provides it
    pub function_name: Option<String>,
}

/// Kind of lending-protocol action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Supply,
    Borrow,
    Repay,
    Liquidation,
    Redeem,
    Other,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supply => "supply",
            Self::Borrow => "borrow",
            Self::Repay => "repay",
            Self::Liquidation => "liquidation",
            Self::Redeem => "redeem",
            Self::Other => "other",
        }
    }
}

/// A transaction matched against a known protocol contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolInteractionRecord {
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
    pub kind: InteractionKind,
    pub contract: Address,
}

/// Balance at a point in time, in ETH
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub balance_eth: f64,
}

/// Everything the collector gathered for one wallet
#[derive(Debug, Clone, PartialEq)]
pub struct RawActivity {
    pub address: Address,
    pub transactions: Vec<TransactionRecord>,
    pub interactions: Vec<ProtocolInteractionRecord>,
    pub balance: BalanceSnapshot,
}

// ============================================
// DERIVED METRICS
// ============================================

/// Aggregate activity metrics for one wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletMetrics {
    pub total_transactions: u64,
    /// Sum of transacted value in ETH
    pub total_volume_eth: f64,
    /// Transactions per day across the observed activity window
    pub transaction_frequency: f64,
    pub protocol_interactions: u64,
    pub current_balance_eth: f64,
    pub failed_transaction_rate: f64,
    pub unique_counterparties: u64,
    /// Days between the last transaction and `now`; `None` when never active
    pub days_since_last_activity: Option<f64>,
    /// Days between the first and last transaction
    pub activity_span_days: f64,
}

/// Outcome of collecting one wallet
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionResult {
    Success(WalletMetrics),
    Failure { code: ErrorCode, reason: String },
}

impl CollectionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

// ============================================
// SCORING
// ============================================

/// The seven risk factors of the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    ProtocolExperience,
    TransactionVolume,
    TransactionFrequency,
    BalanceStability,
    FailureRate,
    CounterpartyDiversity,
    RecentActivity,
}

impl RiskFactor {
    pub const ALL: [RiskFactor; 7] = [
        RiskFactor::ProtocolExperience,
        RiskFactor::TransactionVolume,
        RiskFactor::TransactionFrequency,
        RiskFactor::BalanceStability,
        RiskFactor::FailureRate,
        RiskFactor::CounterpartyDiversity,
        RiskFactor::RecentActivity,
    ];

    /// Name used in weight maps and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProtocolExperience => "protocol_experience",
            Self::TransactionVolume => "transaction_volume",
            Self::TransactionFrequency => "transaction_frequency",
            Self::BalanceStability => "balance_stability",
            Self::FailureRate => "failure_rate",
            Self::CounterpartyDiversity => "counterparty_diversity",
            Self::RecentActivity => "recent_activity",
        }
    }

    /// Title-cased label for explanations
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProtocolExperience => "Protocol Experience",
            Self::TransactionVolume => "Transaction Volume",
            Self::TransactionFrequency => "Transaction Frequency",
            Self::BalanceStability => "Balance Stability",
            Self::FailureRate => "Failure Rate",
            Self::CounterpartyDiversity => "Counterparty Diversity",
            Self::RecentActivity => "Recent Activity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

/// One factor's normalized risk contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub factor: RiskFactor,
    /// Risk multiplier in [0, 1], 1 = maximal risk
    pub multiplier: f64,
    pub weight: f64,
}

impl FactorScore {
    /// Points this factor adds to the 0-1000 score
    pub fn contribution(&self) -> f64 {
        self.multiplier * self.weight * 1000.0
    }
}

/// Five ordered risk bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskCategory {
    #[serde(rename = "Very Low Risk")]
    VeryLow,
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "High Risk")]
    High,
    #[serde(rename = "Very High Risk")]
    VeryHigh,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 5] = [
        RiskCategory::VeryLow,
        RiskCategory::Low,
        RiskCategory::Medium,
        RiskCategory::High,
        RiskCategory::VeryHigh,
    ];

    /// Band for a 0-1000 score. Scores above 1000 fall in the top band.
    pub fn from_score(score: u16) -> Self {
        match score {
            0..=200 => Self::VeryLow,
            201..=400 => Self::Low,
            401..=600 => Self::Medium,
            601..=800 => Self::High,
            _ => Self::VeryHigh,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "Very Low Risk",
            Self::Low => "Low Risk",
            Self::Medium => "Medium Risk",
            Self::High => "High Risk",
            Self::VeryHigh => "Very High Risk",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score given to wallets whose activity could not be collected
pub const FALLBACK_SCORE: u16 = 999;

/// Terminal per-wallet result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Canonical address, or the raw input when it failed validation
    pub address: String,
    pub score: u16,
    pub category: RiskCategory,
    pub factors: Vec<FactorScore>,
    /// Absent for failed wallets
    pub metrics: Option<WalletMetrics>,
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Conservative fallback for a wallet that could not be assessed
    pub fn failed(address: impl Into<String>, reason: impl Into<String>, processed_at: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            score: FALLBACK_SCORE,
            category: RiskCategory::VeryHigh,
            factors: Vec::new(),
            metrics: None,
            error: Some(reason.into()),
            processed_at,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Top three weighted contributors, highest first
    pub fn explanation(&self) -> String {
        let mut text = format!("Risk Score: {}/1000 ({})\n", self.score, self.category);

        if let Some(error) = &self.error {
            text.push_str(&format!("Unable to assess: {}\n", error));
            return text;
        }

        text.push_str("\nKey Risk Factors:\n");
        let mut ranked: Vec<&FactorScore> = self.factors.iter().collect();
        ranked.sort_by(|a, b| b.contribution().total_cmp(&a.contribution()));

        for factor in ranked.into_iter().take(3) {
            text.push_str(&format!(
                "- {}: {:.2} (contributes {:.0} points)\n",
                factor.factor.label(),
                factor.multiplier,
                factor.contribution()
            ));
        }
        text
    }

    /// Flat record handed to result sinks
    pub fn to_record(&self) -> ResultRecord {
        let metrics = self.metrics.clone().unwrap_or_default();
        ResultRecord {
            address: self.address.clone(),
            risk_score: self.score,
            risk_category: self.category.as_str().to_string(),
            total_transactions: metrics.total_transactions,
            protocol_interactions: metrics.protocol_interactions,
            current_balance: metrics.current_balance_eth,
            transaction_volume: metrics.total_volume_eth,
            transaction_frequency: metrics.transaction_frequency,
            failed_transaction_rate: metrics.failed_transaction_rate,
            unique_counterparties: metrics.unique_counterparties,
            error: self.error.clone().unwrap_or_default(),
            processed_at: self.processed_at,
        }
    }
}

/// Output row consumed by result sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub address: String,
    pub risk_score: u16,
    pub risk_category: String,
    pub total_transactions: u64,
    pub protocol_interactions: u64,
    pub current_balance: f64,
    pub transaction_volume: f64,
    pub transaction_frequency: f64,
    pub failed_transaction_rate: f64,
    pub unique_counterparties: u64,
    /// Empty on success
    pub error: String,
    pub processed_at: DateTime<Utc>,
}

// ============================================
// PIPELINE STATE
// ============================================

/// Per-wallet progress through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletState {
    Pending,
    Collecting,
    Extracting,
    Scoring,
    Done,
    Failed,
}

impl WalletState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Forward edges plus the error-absorbing edge into `Failed`
    pub fn can_transition_to(&self, next: WalletState) -> bool {
        use WalletState::*;
        match (self, next) {
            (Pending, Collecting)
            | (Collecting, Extracting)
            | (Extracting, Scoring)
            | (Scoring, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Collecting => "collecting",
            Self::Extracting => "extracting",
            Self::Scoring => "scoring",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_canonicalization() {
        let upper = Address::parse("0xDAC17F958D2EE523A2206206994597C13D831EC7").unwrap();
        let lower = Address::parse("0xdac17f958d2ee523a2206206994597c13d831ec7").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "0xdac17f958d2ee523a2206206994597c13d831ec7");
    }

    #[test]
    fn test_address_rejects_malformed() {
        for raw in ["", "0x123", "dac17f958d2ee523a2206206994597c13d831ec7", "0xzz17f958d2ee523a2206206994597c13d831ec7"] {
            let err = Address::parse(raw).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidAddress, "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_address_serde_validates() {
        let ok: Address = serde_json::from_str("\"0xAbCdEf0000000000000000000000000000000001\"").unwrap();
        assert_eq!(ok.as_str(), "0xabcdef0000000000000000000000000000000001");
        assert!(serde_json::from_str::<Address>("\"0xnope\"").is_err());
    }

    #[test]
    fn test_category_bands_are_total() {
        for score in 0..=1000u16 {
            let category = RiskCategory::from_score(score);
            let expected = match score {
                0..=200 => RiskCategory::VeryLow,
                201..=400 => RiskCategory::Low,
                401..=600 => RiskCategory::Medium,
                601..=800 => RiskCategory::High,
                _ => RiskCategory::VeryHigh,
            };
            assert_eq!(category, expected, "score {}", score);
        }
        assert_eq!(RiskCategory::from_score(200), RiskCategory::VeryLow);
        assert_eq!(RiskCategory::from_score(201), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(801), RiskCategory::VeryHigh);
    }

    #[test]
    fn test_category_ordering() {
        assert!(RiskCategory::VeryLow < RiskCategory::Low);
        assert!(RiskCategory::Low < RiskCategory::Medium);
        assert!(RiskCategory::Medium < RiskCategory::High);
        assert!(RiskCategory::High < RiskCategory::VeryHigh);
    }

    #[test]
    fn test_failed_assessment_record() {
        let at = Utc::now();
        let assessment = RiskAssessment::failed("0xbad", "[FETCH_TRANSIENT] retries exhausted", at);
        let record = assessment.to_record();
        assert_eq!(record.risk_score, 999);
        assert_eq!(record.risk_category, "Very High Risk");
        assert!(!record.error.is_empty());
        assert_eq!(record.total_transactions, 0);
    }

    #[test]
    fn test_state_transitions() {
        use WalletState::*;
        assert!(Pending.can_transition_to(Collecting));
        assert!(Scoring.can_transition_to(Done));
        assert!(Collecting.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Scoring));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Collecting));
    }

    #[test]
    fn test_factor_names_roundtrip() {
        for factor in RiskFactor::ALL {
            assert_eq!(RiskFactor::from_name(factor.as_str()), Some(factor));
        }
        assert_eq!(RiskFactor::from_name("governance"), None);
    }
}
