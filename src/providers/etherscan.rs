//! Etherscan-compatible Activity Service
//!
//! Implements `ActivityService` over the explorer's account module:
//! - `account.txlist`  -> transaction history (and, filtered against the
//!   Compound contract registry, protocol interactions)
//! - `account.balance` -> current balance
//!
//! Responses are wrapped in `{status, message, result}`. `status = "0"` is not
//! always an error: "No transactions found" is a legitimately empty wallet.
//!
//! API: https://api.etherscan.io/api?module=account&action=txlist&address=...
//! API key required (never logged).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::client::{Clock, RateLimitedClient, RequestSpec, Transport};
use super::service::ActivityService;
use crate::models::{
    Address, AppError, AppResult, BalanceSnapshot, ErrorCode, GasMetadata, ProtocolInteractionRecord,
    TransactionRecord,
};
use crate::utils::cache::ResponseCache;
use crate::utils::constants::{
    classify_interaction, is_compound_contract, wei_str_to_eth, HISTORY_PAGE_SIZE,
    USER_AGENT as USER_AGENT_CONST,
};

// ============================================
// WIRE TYPES
// ============================================

/// Response envelope shared by every explorer endpoint
#[derive(Debug, Deserialize)]
pub struct ExplorerEnvelope {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: Value,
}

/// One entry of `account.txlist`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerTransaction {
    pub hash: String,
    pub time_stamp: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub gas: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub is_error: String,
    #[serde(default, rename = "txreceipt_status")]
    pub receipt_status: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub method_id: String,
    #[serde(default)]
    pub function_name: String,
}

/// Turn an explorer envelope into its result, classifying failures
pub fn interpret_envelope(envelope: ExplorerEnvelope) -> AppResult<Value> {
    if envelope.status == "1" {
        return Ok(envelope.result);
    }

    let detail = match &envelope.result {
        Value::String(s) => format!("{} {}", envelope.message, s),
        _ => envelope.message.clone(),
    };
    let lowered = detail.to_lowercase();

    if lowered.contains("no transactions found") || envelope.result.as_array().is_some_and(|a| a.is_empty()) {
        return Ok(json!([]));
    }
    if lowered.contains("invalid api key") || lowered.contains("missing/invalid api key") {
        return Err(AppError::fatal(format!("Authentication rejected: {}", detail.trim())));
    }
    if lowered.contains("invalid address") {
        return Err(AppError::fatal(format!("Address rejected by service: {}", detail.trim())));
    }
    if lowered.contains("rate limit") {
        return Err(AppError::rate_limited());
    }
    Err(AppError::transient(format!("Service error: {}", detail.trim())))
}

// ============================================
// HTTP TRANSPORT
// ============================================

/// reqwest-backed transport for an Etherscan-compatible endpoint
pub struct EtherscanTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EtherscanTransport {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Self::build_client(timeout)?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// HTTP client with User-Agent and gzip enabled
    fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| AppError::invalid_config(format!("Failed to build HTTP client: {}", e)))
    }
}

#[async_trait]
impl Transport for EtherscanTransport {
    async fn send(&self, request: &RequestSpec) -> AppResult<Value> {
        let mut query: Vec<(&str, &str)> = vec![("module", request.module), ("action", request.action)];
        query.extend(request.params.iter().map(|(k, v)| (*k, v.as_str())));
        query.push(("apikey", self.api_key.as_str()));

        debug!("🌐 GET {} ({})", request, self.base_url);
        let response = self.client.get(&self.base_url).query(&query).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::rate_limited());
        }
        if status.is_server_error() {
            return Err(AppError::transient(format!("HTTP error: {}", status)));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AppError::fatal(format!("Authentication rejected: HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(AppError::fatal(format!("HTTP error: {}", status)));
        }

        let envelope: ExplorerEnvelope = response.json().await?;
        interpret_envelope(envelope)
    }
}

// ============================================
// NORMALIZATION
// ============================================

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| AppError::transient(format!("Malformed response: bad timestamp {:?}", raw)))
}

fn parse_optional_address(raw: &str) -> AppResult<Option<Address>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Address::parse(raw)
        .map(Some)
        .map_err(|e| AppError::transient(format!("Malformed response: {}", e.message)))
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty() && trimmed != "0x").then(|| trimmed.to_string())
}

/// Normalize one explorer transaction relative to `owner`
pub fn normalize_transaction(owner: &Address, raw: &ExplorerTransaction) -> AppResult<TransactionRecord> {
    let from = parse_optional_address(&raw.from)?
        .ok_or_else(|| AppError::transient("Malformed response: transaction without sender"))?;
    let to = parse_optional_address(&raw.to)?;
    let created = parse_optional_address(&raw.contract_address)?;

    let counterparty = if &from == owner {
        to.clone().or(created)
    } else {
        Some(from.clone())
    }
    .filter(|c| c != owner);

    let value_eth = wei_str_to_eth(&raw.value)
        .ok_or_else(|| AppError::transient(format!("Malformed response: bad value {:?}", raw.value)))?;

    let success = raw.is_error.trim() != "1" && raw.receipt_status.trim() != "0";

    let method_id = non_empty(&raw.method_id).or_else(|| {
        let input = raw.input.trim();
        input.get(..10).filter(|selector| selector.is_ascii()).map(str::to_string)
    });

    Ok(TransactionRecord {
        hash: raw.hash.clone(),
        timestamp: parse_timestamp(&raw.time_stamp)?,
        value_eth,
        success,
        from,
        to,
        counterparty,
        gas: GasMetadata {
            gas_limit: raw.gas.trim().parse().unwrap_or(0),
            gas_used: raw.gas_used.trim().parse().unwrap_or(0),
            gas_price_wei: raw.gas_price.trim().parse().unwrap_or(0),
        },
        method_id,
        function_name: non_empty(&raw.function_name),
    })
}

/// Decode and normalize a txlist result for `owner`
pub fn parse_history(owner: &Address, value: &Value) -> AppResult<Vec<TransactionRecord>> {
    let raw = Vec::<ExplorerTransaction>::deserialize(value)
        .map_err(|e| AppError::with_source(ErrorCode::FetchTransient, "Malformed response: txlist", e))?;
    raw.iter().map(|tx| normalize_transaction(owner, tx)).collect()
}

/// Decode a balance result (wei, as string or number) into ETH
pub fn parse_balance(value: &Value) -> AppResult<f64> {
    let wei = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(AppError::transient(format!("Malformed response: balance {}", other))),
    };
    wei_str_to_eth(&wei).ok_or_else(|| AppError::transient(format!("Malformed response: balance {:?}", wei)))
}

/// Keep transactions sent to a known protocol contract
pub fn extract_interactions(transactions: &[TransactionRecord]) -> Vec<ProtocolInteractionRecord> {
    transactions
        .iter()
        .filter_map(|tx| {
            let contract = tx.to.as_ref().filter(|to| is_compound_contract(to))?;
            Some(ProtocolInteractionRecord {
                tx_hash: tx.hash.clone(),
                timestamp: tx.timestamp,
                kind: classify_interaction(tx.function_name.as_deref(), tx.method_id.as_deref()),
                contract: contract.clone(),
            })
        })
        .collect()
}

// ============================================
// SERVICE
// ============================================

/// Activity service backed by the explorer, with a response cache in front
/// of the rate-limited client
pub struct EtherscanService {
    client: RateLimitedClient,
    cache: ResponseCache,
    clock: Arc<dyn Clock>,
}

impl EtherscanService {
    pub fn new(client: RateLimitedClient, cache: ResponseCache, clock: Arc<dyn Clock>) -> Self {
        Self { client, cache, clock }
    }

    fn txlist_request(address: &Address) -> RequestSpec {
        RequestSpec::new("account", "txlist")
            .param("address", address.as_str())
            .param("startblock", "0")
            .param("endblock", "99999999")
            .param("page", "1")
            .param("offset", HISTORY_PAGE_SIZE.to_string())
            .param("sort", "asc")
    }

    fn balance_request(address: &Address) -> RequestSpec {
        RequestSpec::new("account", "balance")
            .param("address", address.as_str())
            .param("tag", "latest")
    }

    /// Serve from cache, or call through the client and remember the result.
    /// `parse` runs inside the retry loop; only payloads it accepts are cached.
    async fn cached_call<T, F>(&self, request: &RequestSpec, parse: F) -> AppResult<T>
    where
        F: Fn(&Value) -> AppResult<T> + Send + Sync,
        T: Send,
    {
        let key = request.cache_key();
        if let Some(value) = self.cache.get(&key) {
            return parse(&value);
        }
        let (value, parsed) = self
            .client
            .call_with(request, |value| {
                let parsed = parse(&value)?;
                Ok((value, parsed))
            })
            .await?;
        self.cache.put(&key, value);
        Ok(parsed)
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn client(&self) -> &RateLimitedClient {
        &self.client
    }
}

#[async_trait]
impl ActivityService for EtherscanService {
    async fn fetch_transaction_history(&self, address: &Address) -> AppResult<Vec<TransactionRecord>> {
        let records = self
            .cached_call(&Self::txlist_request(address), |value| parse_history(address, value))
            .await?;
        debug!("📜 {} transactions for {}", records.len(), address);
        Ok(records)
    }

    async fn fetch_protocol_interactions(&self, address: &Address) -> AppResult<Vec<ProtocolInteractionRecord>> {
        let history = self.fetch_transaction_history(address).await?;
        let interactions = extract_interactions(&history);
        if !interactions.is_empty() {
            info!("🏦 {} Compound interactions for {}", interactions.len(), address);
        }
        Ok(interactions)
    }

    async fn fetch_balance(&self, address: &Address) -> AppResult<BalanceSnapshot> {
        let balance_eth = self.cached_call(&Self::balance_request(address), parse_balance).await?;

        Ok(BalanceSnapshot {
            timestamp: self.clock.now(),
            balance_eth,
        })
    }
}
