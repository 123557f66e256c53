//! Request scheduler.
//!
//! # Responsibilities
//! - Bound the number of upstream calls in flight from this process
//! - Queue excess calls first-arrived-first-dispatched
//! - Optionally space dispatches to cap calls per second
//! - Feed quota headers of every completed call to the circuit breaker
//!
//! # Lifecycle of a call
//! ```text
//! schedule() → queued (bounded in length and wait) → slot acquired → paced → breaker re-check
//!     → dispatched on its own task → quota recorded → slot released
//! ```
//!
//! # Design Decisions
//! - Slots are a fair semaphore: waiters are served in arrival order
//! - A caller that goes away while queued gives up its place immediately
//! - Once dispatched, a call runs to completion even if the caller is gone;
//!   its quota headers, block marker and 429 are persisted by the dispatch
//!   task before the result is handed back
//! - No internal retries

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::time::Instant;

use crate::config::SchedulerConfig;
use crate::error::ShieldError;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::timeouts::with_deadline;
use crate::upstream::{UpstreamFailure, UpstreamResponse};

/// Counters exposed to the admin API.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub max_concurrent: usize,
    pub in_flight: usize,
    pub queued: usize,
    pub dispatched: u64,
}

/// Decrements a counter when dropped.
struct CountGuard(Arc<AtomicUsize>);

impl CountGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }

    /// Enter only while the counter is below `max`.
    fn try_enter(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(counter.clone()))
    }
}

impl Drop for CountGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct RequestScheduler {
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    max_queue: usize,
    queued: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    dispatched: AtomicU64,
    spacing: Option<Duration>,
    next_dispatch: Mutex<Instant>,
    max_wait: Duration,
    call_timeout: Duration,
    breaker: Arc<CircuitBreaker>,
}

impl RequestScheduler {
    pub fn new(config: &SchedulerConfig, call_timeout: Duration, breaker: Arc<CircuitBreaker>) -> Self {
        let spacing = (config.min_spacing_ms > 0).then(|| Duration::from_millis(config.min_spacing_ms));
        Self {
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
            max_concurrent: config.max_concurrent,
            max_queue: config.max_queue,
            queued: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            dispatched: AtomicU64::new(0),
            spacing,
            next_dispatch: Mutex::new(Instant::now()),
            max_wait: Duration::from_millis(config.max_wait_ms),
            call_timeout,
            breaker,
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            max_concurrent: self.max_concurrent,
            in_flight: self.in_flight.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
            dispatched: self.dispatched.load(Ordering::SeqCst),
        }
    }

    /// Run `task` (exactly one upstream call) once a slot is free.
    ///
    /// Dropping the returned future while queued releases the place in the
    /// queue; dropping it after dispatch lets the call finish in the background.
    pub async fn schedule<F, Fut>(&self, task: F) -> Result<UpstreamResponse, ShieldError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'static,
    {
        let Some(waiting) = CountGuard::try_enter(&self.queued, self.max_queue) else {
            tracing::warn!(max_queue = self.max_queue, "Scheduler queue full, rejecting call");
            return Err(ShieldError::QueueFull { retry_after: 1 });
        };
        self.publish();
        let ready = async {
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ShieldError::UpstreamUnavailable("scheduler closed".to_string()))?;
            self.pace().await;
            Ok::<_, ShieldError>(permit)
        };
        let permit = match tokio::time::timeout(self.max_wait, ready).await {
            Ok(acquired) => acquired?,
            Err(_) => {
                tracing::warn!(max_wait_ms = self.max_wait.as_millis() as u64, "Call waited too long for a slot");
                return Err(ShieldError::QueueTimeout { retry_after: 1 });
            }
        };
        drop(waiting);

        // The circuit may have tripped while this call was waiting.
        self.breaker.admit().await?;

        let breaker = self.breaker.clone();
        let in_flight = self.in_flight.clone();
        let limit = self.call_timeout;
        let (tx, rx) = oneshot::channel();

        self.dispatched.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let _permit = permit;
            let _active = CountGuard::enter(&in_flight);

            let outcome = with_deadline(limit, task()).await;
            if let Ok(response) = &outcome {
                apply_signals(&breaker, response).await;
            }

            let _ = tx.send(outcome);
        });
        self.publish();

        match rx.await {
            Ok(outcome) => outcome.map_err(ShieldError::from),
            Err(_) => Err(ShieldError::UpstreamUnavailable("dispatch task aborted".to_string())),
        }
    }

    /// Wait for this call's dispatch time, reserving the next one.
    async fn pace(&self) {
        let Some(spacing) = self.spacing else {
            return;
        };
        let start = {
            let mut next = self.next_dispatch.lock().await;
            let start = (*next).max(Instant::now());
            *next = start + spacing;
            start
        };
        tokio::time::sleep_until(start).await;
    }

    fn publish(&self) {
        let stats = self.stats();
        metrics::record_scheduler(stats.in_flight, stats.queued);
    }
}

/// Persist what an upstream response says about the circuit. Runs on the
/// dispatch task so the trip lands whether or not the caller is still waiting.
async fn apply_signals(breaker: &CircuitBreaker, response: &UpstreamResponse) {
    if let Some(q) = response.quota {
        if let Err(e) = breaker.record_quota(q.remaining, q.limit, q.reset_at).await {
            tracing::warn!(error = %e, "Failed to record upstream quota");
        }
    }

    let settings = breaker.settings();
    let trip = if response.blocked {
        breaker.trip_hard_lock(settings.hard_ttl(), "upstream block marker").await
    } else if response.status == StatusCode::TOO_MANY_REQUESTS {
        breaker.trip_soft_lock(settings.soft_ttl(), "upstream returned 429").await
    } else {
        return;
    };
    if let Err(e) = trip {
        tracing::error!(error = %e, "Failed to persist circuit trip");
    }
}
