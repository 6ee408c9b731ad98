//! Rate-Limited Client Module
//!
//! Every outbound request in a run goes through one `RateLimitedClient`:
//! 1. A single shared rate budget (minimum spacing between calls, all workers)
//! 2. A per-attempt timeout, treated as a transient failure
//! 3. Exponential backoff with jitter on transient failures (base doubles per
//!    attempt, capped), bounded attempt count
//! 4. Fatal failures surface immediately without retry
//!
//! Every attempt, retries included, consumes one unit of the rate budget.
//! Time is read and slept through a `Clock` so tests can run the whole retry
//! schedule without real waiting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{AppError, AppResult, FetchConfig, RetryPolicy};

// ============================================
// CLOCK
// ============================================

/// Source of "now" and of suspension
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when slept on. Records every sleep.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every duration passed to `sleep`, in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Sum of all sleeps
    pub fn total_slept(&self) -> Duration {
        self.sleeps().into_iter().sum()
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|_| Utc::now())
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// ============================================
// REQUEST / TRANSPORT
// ============================================

/// One logical request to the activity-data service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub module: &'static str,
    pub action: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl RequestSpec {
    pub fn new(module: &'static str, action: &'static str) -> Self {
        Self {
            module,
            action,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    /// Stable identity of the request, used as the cache key
    pub fn cache_key(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{}:{}?{}", self.module, self.action, params.join("&"))
    }
}

impl fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.action)
    }
}

/// Wire-level sender. Implementations classify their own failures as
/// transient or fatal through the returned error code.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestSpec) -> AppResult<Value>;
}

// ============================================
// RATE BUDGET
// ============================================

/// Shared rate budget: hands out call slots spaced by `min_interval`
pub struct RateBudget {
    min_interval: Duration,
    next_slot: tokio::sync::Mutex<Option<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
    consumed: AtomicU64,
}

impl RateBudget {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            next_slot: tokio::sync::Mutex::new(None),
            clock,
            consumed: AtomicU64::new(0),
        }
    }

    /// Wait for the next free slot. Slots are reserved under the lock and
    /// slept on outside it, so concurrent callers queue in arrival order.
    pub async fn acquire(&self) {
        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = self.clock.now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            let interval = chrono::Duration::from_std(self.min_interval).unwrap_or_else(|_| chrono::Duration::zero());
            *next = Some(slot + interval);
            (slot - now).to_std().unwrap_or(Duration::ZERO)
        };

        if !wait.is_zero() {
            debug!("⏳ Rate budget: waiting {}ms for next slot", wait.as_millis());
            self.clock.sleep(wait).await;
        }
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Slots handed out so far
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }
}

// ============================================
// CLIENT
// ============================================

/// Counters for monitoring
#[derive(Debug, Default)]
pub struct ClientStats {
    pub attempts: AtomicU64,
    pub retries: AtomicU64,
    pub timeouts: AtomicU64,
    pub failures: AtomicU64,
}

/// Rate-limited, retrying front for a `Transport`
#[derive(Clone)]
pub struct RateLimitedClient {
    transport: Arc<dyn Transport>,
    budget: Arc<RateBudget>,
    retry: RetryPolicy,
    request_timeout: Duration,
    clock: Arc<dyn Clock>,
    stats: Arc<ClientStats>,
}

impl RateLimitedClient {
    pub fn new(transport: Arc<dyn Transport>, config: &FetchConfig, clock: Arc<dyn Clock>) -> Self {
        let budget = Arc::new(RateBudget::new(config.min_interval, clock.clone()));
        Self {
            transport,
            budget,
            retry: config.retry.clone(),
            request_timeout: config.request_timeout,
            clock,
            stats: Arc::new(ClientStats::default()),
        }
    }

    /// Issue a request under the rate budget, retrying transient failures
    pub async fn call(&self, request: &RequestSpec) -> AppResult<Value> {
        self.call_with(request, Ok).await
    }

    /// Like `call`, but `parse` runs on every response inside the retry
    /// loop, so a malformed payload is retried like any transient failure
    pub async fn call_with<T, F>(&self, request: &RequestSpec, parse: F) -> AppResult<T>
    where
        F: Fn(Value) -> AppResult<T> + Send + Sync,
        T: Send,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error: Option<AppError> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = jittered(self.retry.delay_for(attempt), self.retry.jitter_percent, self.retry.max_delay);
                debug!(
                    "⏳ Retry {}/{} for {} after {}ms",
                    attempt,
                    max_attempts,
                    request,
                    delay.as_millis()
                );
                self.stats.retries.fetch_add(1, Ordering::Relaxed);
                self.clock.sleep(delay).await;
            }

            self.budget.acquire().await;
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            let outcome = match tokio::time::timeout(self.request_timeout, self.transport.send(request)).await {
                Ok(result) => result,
                Err(_) => {
                    self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                    Err(AppError::timeout(self.request_timeout.as_millis()))
                }
            };

            match outcome.and_then(&parse) {
                Ok(parsed) => return Ok(parsed),
                Err(e) if !e.is_retryable() => {
                    warn!("❌ {} failed permanently: {}", request, e);
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
                Err(e) => {
                    warn!("⚠️ {} attempt {}/{} failed: {}", request, attempt, max_attempts, e);
                    last_error = Some(e);
                }
            }
        }

        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        Err(AppError::transient(format!(
            "{} failed after {} attempts: {}",
            request, max_attempts, reason
        )))
    }

    pub fn budget(&self) -> &Arc<RateBudget> {
        &self.budget
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }
}

/// Apply ± `percent` random jitter, never dropping below half the delay
/// and never exceeding `cap`
fn jittered(delay: Duration, percent: u64, cap: Duration) -> Duration {
    let delay = delay.min(cap);
    if percent == 0 || delay.is_zero() {
        return delay;
    }
    let millis = delay.as_millis() as i64;
    let range = millis * percent.min(100) as i64 / 100;
    if range == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(-range..=range);
    Duration::from_millis((millis + jitter).max(millis / 2) as u64).min(cap)
}
