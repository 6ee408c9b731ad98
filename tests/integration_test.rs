//! Integration tests for the wallet risk pipeline

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wallet_risk::core::{CheckpointStore, MemoryCheckpointStore};
use wallet_risk::models::{
    BalanceSnapshot, BatchConfig, CacheConfig, ErrorCode, FetchConfig, GasMetadata, InteractionKind,
    ProtocolInteractionRecord, RetryPolicy, TransactionRecord, FALLBACK_SCORE,
};
use wallet_risk::providers::{RequestSpec, Transport};
use wallet_risk::{
    ActivityService, Address, AppError, AppResult, BatchOrchestrator, Clock, DataCollector, EtherscanService,
    JsonlCheckpointStore, ManualClock, RateLimitedClient, ResponseCache, RiskCategory, RiskWeights, StopHandle,
};

const BLUE_CHIP: u64 = 0xb1e55;
const GHOST: u64 = 0xe0e0;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn addr(n: u64) -> String {
    format!("0x{:040x}", n)
}

fn batch(n: u64) -> Vec<String> {
    (1..=n).map(addr).collect()
}

// ============================================
// FAKE ACTIVITY SERVICE
// ============================================

/// Deterministic activity derived from the numeric value of the address
struct FakeService {
    fetched: Mutex<Vec<String>>,
    stop_after: Option<(String, StopHandle)>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeService {
    fn new() -> Self {
        Self {
            fetched: Mutex::new(Vec::new()),
            stop_after: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Requests a stop while the given wallet is being collected
    fn stopping_at(address: String, stop: StopHandle) -> Self {
        Self {
            stop_after: Some((address, stop)),
            ..Self::new()
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn seed(address: &Address) -> u64 {
        u64::from_str_radix(address.as_str().trim_start_matches("0x"), 16).unwrap()
    }

    fn tx(owner: &Address, days_ago: i64, value_eth: f64, success: bool, counterparty: u64) -> TransactionRecord {
        let other = Address::parse(&addr(counterparty)).unwrap();
        TransactionRecord {
            hash: format!("0x{:x}{:x}", days_ago, counterparty),
            timestamp: now() - ChronoDuration::days(days_ago),
            value_eth,
            success,
            from: owner.clone(),
            to: Some(other.clone()),
            counterparty: Some(other),
            gas: GasMetadata::default(),
            method_id: None,
            function_name: None,
        }
    }

    fn history(address: &Address) -> Vec<TransactionRecord> {
        match Self::seed(address) {
            GHOST => Vec::new(),
            BLUE_CHIP => (0..150)
                .map(|j| Self::tx(address, 5 + (j % 95), 10.0, true, 0x10_000 + (j as u64 % 120)))
                .collect(),
            n => {
                let count = (n * 4 % 37 + 1) as i64;
                let spread = n % 9 + 1;
                (0..count)
                    .map(|j| {
                        let success = j as u64 % (n % 5 + 2) != 0;
                        Self::tx(address, j * 3 + n as i64, n as f64 * 0.5, success, 0x1000 + j as u64 % spread)
                    })
                    .collect()
            }
        }
    }

    fn interaction_count(address: &Address) -> u64 {
        match Self::seed(address) {
            GHOST => 0,
            BLUE_CHIP => 60,
            n => n % 8,
        }
    }

    fn balance_eth(address: &Address) -> f64 {
        match Self::seed(address) {
            GHOST => 0.0,
            BLUE_CHIP => 150.0,
            n => n as f64 * 1.7,
        }
    }
}

#[async_trait]
impl ActivityService for FakeService {
    async fn fetch_transaction_history(&self, address: &Address) -> AppResult<Vec<TransactionRecord>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(address.to_string());
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Self::history(address))
    }

    async fn fetch_protocol_interactions(&self, address: &Address) -> AppResult<Vec<ProtocolInteractionRecord>> {
        let contract = Address::parse("0x4ddc2d193948926d02f9b1fe9e1daa0718270ed5").unwrap();
        Ok((0..Self::interaction_count(address))
            .map(|i| ProtocolInteractionRecord {
                tx_hash: format!("0xc{:x}", i),
                timestamp: now() - ChronoDuration::days(i as i64),
                kind: InteractionKind::Supply,
                contract: contract.clone(),
            })
            .collect())
    }

    async fn fetch_balance(&self, address: &Address) -> AppResult<BalanceSnapshot> {
        if let Some((target, stop)) = &self.stop_after {
            if target == address.as_str() {
                stop.stop();
            }
        }
        Ok(BalanceSnapshot {
            timestamp: now(),
            balance_eth: Self::balance_eth(address),
        })
    }
}

fn orchestrator(
    service: Arc<dyn ActivityService>,
    store: Arc<dyn CheckpointStore>,
    workers: usize,
) -> BatchOrchestrator {
    BatchOrchestrator::new(
        DataCollector::new(service),
        RiskWeights::default(),
        store,
        BatchConfig {
            checkpoint_interval: 10,
            workers,
        },
        Arc::new(ManualClock::new(now())),
    )
}

// ============================================
// SCENARIOS
// ============================================

#[tokio::test]
async fn test_blue_chip_wallet_is_very_low_risk() {
    let service = Arc::new(FakeService::new());
    let report = orchestrator(service, Arc::new(MemoryCheckpointStore::new()), 1)
        .run(&[addr(BLUE_CHIP)])
        .await
        .unwrap();

    let assessment = &report.assessments[0];
    assert!(assessment.score <= 50, "score was {}", assessment.score);
    assert_eq!(assessment.category, RiskCategory::VeryLow);

    let metrics = assessment.metrics.as_ref().unwrap();
    assert_eq!(metrics.protocol_interactions, 60);
    assert_eq!(metrics.unique_counterparties, 120);
    assert!((metrics.total_volume_eth - 1500.0).abs() < 1e-9);

    let record = assessment.to_record();
    assert_eq!(record.risk_category, "Very Low Risk");
    assert_eq!(record.error, "");
}

#[tokio::test]
async fn test_inactive_wallet_is_very_high_risk() {
    let service = Arc::new(FakeService::new());
    let report = orchestrator(service, Arc::new(MemoryCheckpointStore::new()), 1)
        .run(&[addr(GHOST)])
        .await
        .unwrap();

    let assessment = &report.assessments[0];
    assert!(assessment.score >= 900, "score was {}", assessment.score);
    assert_ne!(assessment.score, FALLBACK_SCORE);
    assert_eq!(assessment.category, RiskCategory::VeryHigh);
    assert!(assessment.error.is_none(), "an inactive wallet is not a failure");
}

#[tokio::test]
async fn test_resume_after_interruption_matches_uninterrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.jsonl");
    let input = batch(25);

    // First run stops while wallet 10 is in flight
    let stop = StopHandle::new();
    let interrupted_service = Arc::new(FakeService::stopping_at(addr(10), stop.clone()));
    let first = orchestrator(interrupted_service, Arc::new(JsonlCheckpointStore::new(&path)), 1)
        .with_stop_handle(stop)
        .run(&input)
        .await
        .unwrap();

    assert!(first.stopped);
    assert_eq!(first.processed, 10);
    assert_eq!(JsonlCheckpointStore::new(&path).load().unwrap().len(), 10);

    // Resume with a fresh process
    let resumed_service = Arc::new(FakeService::new());
    let resumed = orchestrator(resumed_service.clone(), Arc::new(JsonlCheckpointStore::new(&path)), 1)
        .run(&input)
        .await
        .unwrap();

    assert!(!resumed.stopped);
    assert_eq!(resumed.skipped, 10);
    assert_eq!(resumed.processed, 15);
    assert_eq!(resumed_service.fetched(), input[10..].to_vec());

    let uninterrupted = orchestrator(Arc::new(FakeService::new()), Arc::new(MemoryCheckpointStore::new()), 1)
        .run(&input)
        .await
        .unwrap();

    assert_eq!(resumed.assessments, uninterrupted.assessments);
    assert_eq!(resumed.summary, uninterrupted.summary);
}

#[tokio::test]
async fn test_rerun_after_completion_does_no_work() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.jsonl");
    let input = batch(12);

    let first = orchestrator(Arc::new(FakeService::new()), Arc::new(JsonlCheckpointStore::new(&path)), 1)
        .run(&input)
        .await
        .unwrap();

    let service = Arc::new(FakeService::new());
    let second = orchestrator(service.clone(), Arc::new(JsonlCheckpointStore::new(&path)), 1)
        .run(&input)
        .await
        .unwrap();

    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 12);
    assert!(service.fetched().is_empty());
    assert_eq!(first.assessments, second.assessments);
}

#[tokio::test]
async fn test_worker_pool_matches_sequential_run() {
    let input = batch(20);

    let sequential = orchestrator(Arc::new(FakeService::new()), Arc::new(MemoryCheckpointStore::new()), 1)
        .run(&input)
        .await
        .unwrap();

    let service = Arc::new(FakeService::new());
    let store = Arc::new(MemoryCheckpointStore::new());
    let pooled = orchestrator(service.clone(), store.clone(), 4).run(&input).await.unwrap();

    assert_eq!(pooled.assessments, sequential.assessments);
    let max = service.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 4, "{} wallets in flight", max);
    assert!(max >= 2, "worker pool never overlapped wallets");

    // Completion order may differ, but the checkpoint holds every wallet once
    let mut checkpointed: Vec<String> = store.entries().into_iter().map(|a| a.address).collect();
    checkpointed.sort();
    assert_eq!(checkpointed, input);
}

#[tokio::test]
async fn test_checkpoint_failure_halts_the_run() {
    let store = Arc::new(MemoryCheckpointStore::failing_after(1));
    let err = orchestrator(Arc::new(FakeService::new()), store.clone(), 1)
        .run(&batch(25))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::CheckpointWriteFailed);
    assert_eq!(store.entries().len(), 10, "only the first chunk was persisted");
}

// ============================================
// FULL STACK OVER A FAKE TRANSPORT
// ============================================

/// Stands in for the explorer: empty histories, zero balances
struct ExplorerStub {
    calls: AtomicUsize,
    always_fail: bool,
}

#[async_trait]
impl Transport for ExplorerStub {
    async fn send(&self, request: &RequestSpec) -> AppResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            return Err(AppError::rate_limited());
        }
        match request.action {
            "txlist" => Ok(json!([])),
            _ => Ok(json!("0")),
        }
    }
}

fn explorer_service(stub: Arc<ExplorerStub>, clock: Arc<ManualClock>) -> EtherscanService {
    let fetch = FetchConfig {
        min_interval: Duration::from_millis(200),
        request_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(16_000),
            jitter_percent: 0,
        },
    };
    let client = RateLimitedClient::new(stub, &fetch, clock.clone());
    EtherscanService::new(client, ResponseCache::new(CacheConfig::default()), clock)
}

#[tokio::test]
async fn test_exhausted_retries_yield_fallback_score() {
    let clock = Arc::new(ManualClock::new(now()));
    let stub = Arc::new(ExplorerStub {
        calls: AtomicUsize::new(0),
        always_fail: true,
    });
    let service = Arc::new(explorer_service(stub.clone(), clock.clone()));

    let report = BatchOrchestrator::new(
        DataCollector::new(service),
        RiskWeights::default(),
        Arc::new(MemoryCheckpointStore::new()),
        BatchConfig::default(),
        clock.clone(),
    )
    .run(&[addr(7)])
    .await
    .unwrap();

    let assessment = &report.assessments[0];
    assert_eq!(assessment.score, FALLBACK_SCORE);
    assert_eq!(assessment.category, RiskCategory::VeryHigh);
    assert!(!assessment.error.as_deref().unwrap_or_default().is_empty());

    // History fails first, so only its four attempts are made
    assert_eq!(stub.calls.load(Ordering::SeqCst), 4);
    assert!(clock.total_slept() >= Duration::from_millis(1000 + 2000 + 4000));
}

#[tokio::test]
async fn test_rate_budget_is_shared_across_workers() {
    let clock = Arc::new(ManualClock::new(now()));
    let stub = Arc::new(ExplorerStub {
        calls: AtomicUsize::new(0),
        always_fail: false,
    });
    let service = Arc::new(explorer_service(stub.clone(), clock.clone()));
    let budget = service.client().budget().clone();

    let report = BatchOrchestrator::new(
        DataCollector::new(service.clone()),
        RiskWeights::default(),
        Arc::new(MemoryCheckpointStore::new()),
        BatchConfig {
            checkpoint_interval: 10,
            workers: 4,
        },
        clock.clone(),
    )
    .run(&batch(5))
    .await
    .unwrap();

    assert_eq!(report.assessments.len(), 5);
    // txlist + balance per wallet; the interaction lookup reuses the cached txlist
    assert_eq!(stub.calls.load(Ordering::SeqCst), 10);
    assert_eq!(budget.consumed(), 10);
    assert_eq!(service.cache().stats().hits, 5);
    assert!(clock.now() - now() >= ChronoDuration::milliseconds(9 * 200));
}
