//! Wallet Risk - batch creditworthiness scoring for on-chain wallets
//!
//! Usage:
//!   wallet_risk [WALLET_LIST]
//!
//! Environment:
//!   ETHERSCAN_API_KEY - Explorer API key (required)
//!   WALLET_LIST       - Address file, one per line (default: ./wallets.txt)
//!   RISK_WEIGHTS      - JSON weight map (default: built-in weights)
//!   BATCH_WORKERS     - Concurrent wallets (default: 1)
//!   RUST_LOG          - Log level (default: info)

use eyre::{eyre, Result, WrapErr};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wallet_risk::models::PipelineConfig;
use wallet_risk::utils::constants::{APP_NAME, APP_VERSION, DEFAULT_WALLET_LIST_PATH};
use wallet_risk::{
    BatchOrchestrator, DataCollector, EtherscanService, EtherscanTransport, JsonlCheckpointStore,
    JsonlResultSink, RateLimitedClient, ResponseCache, ResultSink, SystemClock,
};

/// Addresses from a list file: one per line, first CSV column, `#` comments
/// and a header row are ignored
fn read_wallet_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).wrap_err_with(|| format!("reading wallet list {}", path.display()))?;

    let addresses: Vec<String> = content
        .lines()
        .map(|line| line.split(',').next().unwrap_or_default().trim())
        .filter(|field| !field.is_empty() && !field.starts_with('#'))
        .filter(|field| !field.eq_ignore_ascii_case("wallet_id") && !field.eq_ignore_ascii_case("address"))
        .map(str::to_string)
        .collect();

    if addresses.is_empty() {
        return Err(eyre!("wallet list {} contains no addresses", path.display()));
    }
    Ok(addresses)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    info!("🚀 {} v{} starting", APP_NAME, APP_VERSION);

    // Weights and limits are validated before any wallet is touched
    let config = PipelineConfig::from_env()?;

    let list_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WALLET_LIST").ok())
        .unwrap_or_else(|| DEFAULT_WALLET_LIST_PATH.to_string());
    let addresses = read_wallet_list(Path::new(&list_path))?;
    info!("📋 {} addresses loaded from {}", addresses.len(), list_path);

    let clock = Arc::new(SystemClock);
    let transport = Arc::new(EtherscanTransport::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.fetch.request_timeout,
    )?);
    let client = RateLimitedClient::new(transport, &config.fetch, clock.clone());
    let service = Arc::new(EtherscanService::new(client, ResponseCache::new(config.cache.clone()), clock.clone()));

    let orchestrator = BatchOrchestrator::new(
        DataCollector::new(service.clone()),
        config.weights.clone(),
        Arc::new(JsonlCheckpointStore::new(config.checkpoint_path.clone())),
        config.batch.clone(),
        clock,
    );

    // Graceful shutdown on Ctrl+C: finish in-flight wallets, then stop
    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl+C received, stopping after in-flight wallets...");
            stop.stop();
        }
    });

    let report = orchestrator.run(&addresses).await?;

    JsonlResultSink::new(config.results_path.clone()).write(&report.assessments)?;
    report.summary.log();

    let cache = service.cache().stats();
    let calls = service.client().stats();
    info!(
        "🌐 {} service calls ({} retries), cache hit rate {:.1}%",
        calls.attempts.load(Ordering::Relaxed),
        calls.retries.load(Ordering::Relaxed),
        cache.hit_rate
    );

    if report.stopped {
        return Err(eyre!(
            "run stopped before completion ({} of {} wallets); rerun to resume from {}",
            report.assessments.len(),
            addresses.len(),
            config.checkpoint_path.display()
        ));
    }
    Ok(())
}
