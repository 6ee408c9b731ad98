//! Constants Module - Single Source of Truth
//!
//! Contract registries, default tuning values and unit conversions used across
//! the pipeline live here so that no other module hardcodes them.

use crate::models::{Address, InteractionKind};

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "wallet_risk";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for HTTP requests
pub const USER_AGENT: &str = concat!("wallet_risk/", env!("CARGO_PKG_VERSION"));

// ============================================
// FETCH DEFAULTS
// ============================================

/// Public Etherscan-compatible endpoint
pub const DEFAULT_ETHERSCAN_API_URL: &str = "https://api.etherscan.io/api";

/// Ceiling on outbound calls per second, shared by every worker
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 5;

/// Timeout for a single outbound request (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Attempts per request, the first try included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// First backoff delay (milliseconds); doubles per retry
pub const DEFAULT_RETRY_BASE_MS: u64 = 1000;

/// Backoff cap (milliseconds)
pub const DEFAULT_RETRY_MAX_MS: u64 = 16_000;

/// Random jitter applied to each backoff delay (percent)
pub const DEFAULT_RETRY_JITTER_PERCENT: u64 = 20;

/// Page size requested from the history endpoint
pub const HISTORY_PAGE_SIZE: u32 = 10_000;

// ============================================
// CACHE / BATCH DEFAULTS
// ============================================

/// Default cache TTL (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default cache capacity (entries)
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Completed wallets between checkpoint writes
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 10;

/// Default checkpoint file
pub const DEFAULT_CHECKPOINT_PATH: &str = "./wallet_risk_checkpoint.jsonl";

/// Default result file
pub const DEFAULT_RESULTS_PATH: &str = "./wallet_risk_scores.jsonl";

/// Default wallet list, one address per line
pub const DEFAULT_WALLET_LIST_PATH: &str = "./wallets.txt";

// ============================================
// UNITS
// ============================================

/// 1 ETH = 10^18 wei
pub const WEI_PER_ETH: f64 = 1e18;

/// Convert a decimal wei string (as returned by explorers) to ETH
pub fn wei_str_to_eth(wei: &str) -> Option<f64> {
    let wei = wei.trim();
    if wei.is_empty() {
        return Some(0.0);
    }
    wei.parse::<u128>().ok().map(|w| w as f64 / WEI_PER_ETH)
}

// ============================================
// COMPOUND CONTRACT REGISTRY
// ============================================

/// Known protocol contract
pub struct ProtocolContract {
    pub name: &'static str,
    pub address: &'static str,
}

/// Compound V2 markets and comptroller
pub static COMPOUND_V2_CONTRACTS: [ProtocolContract; 6] = [
    ProtocolContract { name: "cDAI", address: "0x5d3a536e4d6dbd6114cc1ead35777bab948e3643" },
    ProtocolContract { name: "cUSDC", address: "0x39aa39c021dfbae8fac545936693ac917d5e7563" },
    ProtocolContract { name: "cUSDT", address: "0xf650c3d88d12db855b8bf7d11be6c55a4e07dcc9" },
    ProtocolContract { name: "cETH", address: "0x4ddc2d193948926d02f9b1fe9e1daa0718270ed5" },
    ProtocolContract { name: "cWBTC", address: "0xc11b1268c1a384e55c48c2391d8d480264a3a7f4" },
    ProtocolContract { name: "comptroller", address: "0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b" },
];

/// Compound V3 (Comet) markets
pub static COMPOUND_V3_CONTRACTS: [ProtocolContract; 2] = [
    ProtocolContract { name: "cUSDCv3", address: "0xc3d688b66703497daa19211eedff47f25384cdc3" },
    ProtocolContract { name: "cWETHv3", address: "0xa17581a9e3356d9a858b789d68b4d866e593ae94" },
];

/// Registry name for a protocol contract, if known
pub fn compound_contract_name(address: &Address) -> Option<&'static str> {
    COMPOUND_V2_CONTRACTS
        .iter()
        .chain(COMPOUND_V3_CONTRACTS.iter())
        .find(|c| c.address == address.as_str())
        .map(|c| c.name)
}

/// Check if an address is a known Compound contract
#[inline]
pub fn is_compound_contract(address: &Address) -> bool {
    compound_contract_name(address).is_some()
}

// ============================================
// METHOD SELECTORS
// ============================================

/// Compound V2/V3 method selectors
static METHOD_SELECTORS: [(&str, InteractionKind); 14] = [
    ("0xa0712d68", InteractionKind::Supply),      // mint(uint256)
    ("0x1249c58b", InteractionKind::Supply),      // mint() payable, cETH
    ("0xf2b9fdb8", InteractionKind::Supply),      // supply(address,uint256), Comet
    ("0xc5ebeaec", InteractionKind::Borrow),      // borrow(uint256)
    ("0x0e752702", InteractionKind::Repay),       // repayBorrow(uint256)
    ("0x4e4d9fea", InteractionKind::Repay),       // repayBorrow() payable, cETH
    ("0x2608f818", InteractionKind::Repay),       // repayBorrowBehalf(address,uint256)
    ("0xe5974619", InteractionKind::Repay),       // repayBorrowBehalf(address) payable
    ("0xf5e3c462", InteractionKind::Liquidation), // liquidateBorrow(address,uint256,address)
    ("0xaae40a2a", InteractionKind::Liquidation), // liquidateBorrow(address,address) payable
    ("0x76e11286", InteractionKind::Liquidation), // absorb(address,address[]), Comet
    ("0xdb006a75", InteractionKind::Redeem),      // redeem(uint256)
    ("0x852a12e3", InteractionKind::Redeem),      // redeemUnderlying(uint256)
    ("0xf3fef3a3", InteractionKind::Redeem),      // withdraw(address,uint256), Comet
];

/// Classify a protocol call by decoded function name, falling back to the selector
pub fn classify_interaction(function_name: Option<&str>, method_id: Option<&str>) -> InteractionKind {
    if let Some(name) = function_name {
        let name = name.trim().to_ascii_lowercase();
        // Order matters: "repayborrow" must win over "borrow".
        let by_name = if name.starts_with("liquidateborrow") || name.starts_with("absorb") {
            Some(InteractionKind::Liquidation)
        } else if name.starts_with("repayborrow") {
            Some(InteractionKind::Repay)
        } else if name.starts_with("borrow") {
            Some(InteractionKind::Borrow)
        } else if name.starts_with("mint") || name.starts_with("supply") {
            Some(InteractionKind::Supply)
        } else if name.starts_with("redeem") || name.starts_with("withdraw") {
            Some(InteractionKind::Redeem)
        } else {
            None
        };
        if let Some(kind) = by_name {
            return kind;
        }
    }

    method_id
        .map(|id| id.trim().to_ascii_lowercase())
        .and_then(|id| {
            METHOD_SELECTORS
                .iter()
                .find(|(selector, _)| *selector == id)
                .map(|(_, kind)| *kind)
        })
        .unwrap_or(InteractionKind::Other)
}
