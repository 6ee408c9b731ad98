//! Batch Orchestrator
//!
//! Drives every wallet through `Pending -> Collecting -> Extracting -> Scoring -> Done`
//! (or `Failed`), skipping wallets already in the checkpoint.
//!
//! Workers hand finished assessments over a channel to one checkpoint writer,
//! which appends them in chunks of `checkpoint_interval`. A stop request is
//! honoured between wallets; wallets already in flight still finish and are
//! checkpointed.

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use super::checkpoint::CheckpointStore;
use super::collector::DataCollector;
use super::risk_score::RiskScorer;
use super::summary::BatchSummary;
use crate::models::{
    address_key, Address, AppError, AppResult, BatchConfig, CollectionResult, ErrorCode, RiskAssessment,
    RiskWeights, WalletState,
};
use crate::providers::Clock;

// ============================================
// STOP HANDLE
// ============================================

/// Cloneable stop signal, checked between wallets
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================
// PER-WALLET PIPELINE
// ============================================

/// Everything a worker needs to assess one wallet
struct WalletPipeline {
    collector: DataCollector,
    weights: RiskWeights,
    clock: Arc<dyn Clock>,
}

impl WalletPipeline {
    fn advance(address: &str, state: &mut WalletState, next: WalletState) {
        debug_assert!(state.can_transition_to(next), "{:?} -> {:?}", state, next);
        debug!("🔄 {}: {} -> {}", address, state.as_str(), next.as_str());
        *state = next;
    }

    async fn assess(&self, raw: &str) -> RiskAssessment {
        let mut state = WalletState::Pending;

        let address = match Address::parse(raw) {
            Ok(address) => address,
            Err(e) => {
                Self::advance(raw, &mut state, WalletState::Failed);
                warn!("⚠️ Skipping invalid address {:?}: {}", raw, e.message);
                return RiskAssessment::failed(raw.trim(), e.to_string(), self.clock.now());
            }
        };
        let label = address.as_str();

        Self::advance(label, &mut state, WalletState::Collecting);
        let metrics = match self.collector.collect(&address, self.clock.now()).await {
            CollectionResult::Success(metrics) => metrics,
            CollectionResult::Failure { code, reason } => {
                Self::advance(label, &mut state, WalletState::Failed);
                let reason = format!("{} ({})", reason, code.as_str());
                return RiskAssessment::failed(label, reason, self.clock.now());
            }
        };
        Self::advance(label, &mut state, WalletState::Extracting);

        Self::advance(label, &mut state, WalletState::Scoring);
        let assessment = RiskScorer::score(label, &metrics, &self.weights, self.clock.now());

        Self::advance(label, &mut state, WalletState::Done);
        assessment
    }
}

// ============================================
// REPORT
// ============================================

#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One assessment per distinct input address, in input order
    pub assessments: Vec<RiskAssessment>,
    /// Wallets assessed in this run
    pub processed: usize,
    /// Wallets served from the checkpoint
    pub skipped: usize,
    /// A stop request ended the run early
    pub stopped: bool,
    pub summary: BatchSummary,
}

// ============================================
// ORCHESTRATOR
// ============================================

pub struct BatchOrchestrator {
    pipeline: Arc<WalletPipeline>,
    checkpoint: Arc<dyn CheckpointStore>,
    config: BatchConfig,
    stop: StopHandle,
}

impl BatchOrchestrator {
    pub fn new(
        collector: DataCollector,
        weights: RiskWeights,
        checkpoint: Arc<dyn CheckpointStore>,
        config: BatchConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pipeline: Arc::new(WalletPipeline {
                collector,
                weights,
                clock,
            }),
            checkpoint,
            config,
            stop: StopHandle::new(),
        }
    }

    /// Handle that stops the run before the next wallet starts
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Assess every address not already checkpointed
    pub async fn run(&self, addresses: &[String]) -> AppResult<BatchReport> {
        let existing = self.checkpoint.load()?;
        let mut results: HashMap<String, RiskAssessment> = existing
            .into_iter()
            .map(|a| (address_key(&a.address), a))
            .collect();

        // Distinct addresses in input order
        let mut seen = HashSet::new();
        let ordered: Vec<(String, &String)> = addresses
            .iter()
            .filter_map(|raw| {
                let key = address_key(raw);
                seen.insert(key.clone()).then_some((key, raw))
            })
            .collect();
        if ordered.len() < addresses.len() {
            warn!("⚠️ Ignoring {} duplicate addresses", addresses.len() - ordered.len());
        }

        let pending: Vec<String> = ordered
            .iter()
            .filter(|(key, _)| !results.contains_key(key))
            .map(|(_, raw)| (*raw).clone())
            .collect();
        let skipped = ordered.len() - pending.len();

        info!(
            "🚀 Batch start: {} wallets, {} already checkpointed, {} to process ({} workers)",
            ordered.len(),
            skipped,
            pending.len(),
            self.config.workers.max(1)
        );

        let (written, stopped) = self.process(pending).await?;
        let processed = written.len();
        for assessment in written {
            results.insert(address_key(&assessment.address), assessment);
        }

        let assessments: Vec<RiskAssessment> = ordered
            .iter()
            .filter_map(|(key, _)| results.get(key).cloned())
            .collect();
        let summary = BatchSummary::from_assessments(&assessments);

        if stopped {
            warn!("🛑 Batch stopped: {} of {} wallets assessed", assessments.len(), ordered.len());
        } else {
            info!("✅ Batch complete: {} processed, {} from checkpoint", processed, skipped);
        }

        Ok(BatchReport {
            assessments,
            processed,
            skipped,
            stopped,
            summary,
        })
    }

    /// Run the worker pool and the checkpoint writer; returns new assessments
    async fn process(&self, pending: Vec<String>) -> AppResult<(Vec<RiskAssessment>, bool)> {
        let workers = self.config.workers.max(1);
        let interval = self.config.checkpoint_interval.max(1);
        let total = pending.len();

        let halted = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<RiskAssessment>(interval.max(workers) * 2);
        let writer = tokio::spawn(write_checkpoints(
            self.checkpoint.clone(),
            rx,
            interval,
            halted.clone(),
        ));

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut in_flight = FuturesUnordered::new();
        let mut stopped = false;

        for (position, raw) in pending.into_iter().enumerate() {
            if self.stop.is_stopped() {
                stopped = true;
                break;
            }
            if halted.load(Ordering::SeqCst) {
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| AppError::new(ErrorCode::Unknown, "Worker pool closed"))?;

            // Re-check after waiting for a free worker
            if self.stop.is_stopped() {
                stopped = true;
                break;
            }

            let pipeline = self.pipeline.clone();
            let tx = tx.clone();
            in_flight.push(tokio::spawn(async move {
                let assessment = pipeline.assess(&raw).await;
                if assessment.is_failure() {
                    warn!(
                        "❌ [{}/{}] {} failed: {}",
                        position + 1,
                        total,
                        assessment.address,
                        assessment.error.as_deref().unwrap_or_default()
                    );
                } else {
                    info!(
                        "✅ [{}/{}] {} -> {} ({})",
                        position + 1,
                        total,
                        assessment.address,
                        assessment.score,
                        assessment.category
                    );
                }
                if tx.send(assessment).await.is_err() {
                    debug!("Checkpoint writer gone, dropping result for {}", raw);
                }
                drop(permit);
            }));
        }
        drop(tx);

        while let Some(joined) = in_flight.next().await {
            if let Err(e) = joined {
                error!("❌ Wallet worker crashed: {}", e);
            }
        }

        let written = writer
            .await
            .map_err(|e| AppError::new(ErrorCode::Unknown, format!("Checkpoint writer crashed: {}", e)))??;

        if written.len() < total && !stopped {
            // Only a crashed worker can get here
            warn!("⚠️ {} wallets produced no result", total - written.len());
        }
        Ok((written, stopped))
    }
}

/// Single owner of the checkpoint store for the duration of a run
async fn write_checkpoints(
    store: Arc<dyn CheckpointStore>,
    mut rx: mpsc::Receiver<RiskAssessment>,
    interval: usize,
    halted: Arc<AtomicBool>,
) -> AppResult<Vec<RiskAssessment>> {
    let mut buffer: Vec<RiskAssessment> = Vec::with_capacity(interval);
    let mut written = Vec::new();

    let flush = |buffer: &mut Vec<RiskAssessment>, written: &mut Vec<RiskAssessment>| -> AppResult<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        if let Err(e) = store.append(buffer) {
            halted.store(true, Ordering::SeqCst);
            error!("❌ Checkpoint write failed, halting run: {}", e);
            return Err(e);
        }
        info!("💾 Checkpoint: +{} wallets ({} this run)", buffer.len(), written.len() + buffer.len());
        written.append(buffer);
        Ok(())
    };

    while let Some(assessment) = rx.recv().await {
        buffer.push(assessment);
        if buffer.len() >= interval {
            flush(&mut buffer, &mut written)?;
        }
    }
    flush(&mut buffer, &mut written)?;
    Ok(written)
}
