//! Adaptive request pacing.
//!
//! Each extractor kind gets its own delay and in-flight bound; the delay
//! backs off on failures and recovers after a run of successes. A
//! process-wide stress multiplier, doubled when the caller observes many
//! 429/5xx responses across kinds and halved on calm windows, scales every
//! kind's delay. The limiter only paces requests; it never rejects them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Tuning knobs for [`AdaptiveRateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Floor for the per-kind delay.
    pub min_delay: Duration,
    /// Ceiling for the per-kind delay.
    pub max_delay: Duration,
    /// Starting per-kind delay.
    pub initial_delay: Duration,
    /// Consecutive successes required before the delay halves.
    pub recovery_threshold: u32,
    /// In-flight requests allowed per kind.
    pub max_in_flight: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(30),
            initial_delay: Duration::from_millis(100),
            recovery_threshold: 3,
            max_in_flight: 8,
        }
    }
}

/// Bounds for the global stress multiplier.
const STRESS_FLOOR: u32 = 1;
const STRESS_CEILING: u32 = 16;

#[derive(Debug)]
struct KindState {
    delay: Duration,
    consecutive_successes: u32,
    consecutive_failures: u32,
    total_requests: u64,
    total_failures: u64,
}

struct KindEntry {
    state: KindState,
    semaphore: Arc<Semaphore>,
}

/// Slot held while a paced request is in flight. Hand it back through
/// [`AdaptiveRateLimiter::release`] with the request outcome.
pub struct RateLimitGuard {
    kind: String,
    _permit: OwnedSemaphorePermit,
}

/// Per-kind pacing snapshot for statistics output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindStatus {
    pub delay_ms: u64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub total_failures: u64,
}

/// Limiter-wide snapshot for statistics output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterStatus {
    pub stress_multiplier: u32,
    pub kinds: BTreeMap<String, KindStatus>,
}

/// Per-extractor adaptive gate with a global stress multiplier.
pub struct AdaptiveRateLimiter {
    config: RateLimiterConfig,
    kinds: Mutex<HashMap<String, KindEntry>>,
    stress: AtomicU32,
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            kinds: Mutex::new(HashMap::new()),
            stress: AtomicU32::new(STRESS_FLOOR),
        }
    }

    /// Waits for an in-flight slot for `kind`, then sleeps the kind's
    /// current delay scaled by the stress multiplier.
    pub async fn acquire(&self, kind: &str) -> RateLimitGuard {
        let (semaphore, delay) = {
            let mut kinds = self.kinds.lock().expect("rate limiter poisoned");
            let entry = self.entry_for(&mut kinds, kind);
            entry.state.total_requests += 1;
            (Arc::clone(&entry.semaphore), entry.state.delay)
        };

        let permit = semaphore
            .acquire_owned()
            .await
            .expect("rate limiter semaphore closed");

        let wait = delay * self.stress_multiplier();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        RateLimitGuard {
            kind: kind.to_string(),
            _permit: permit,
        }
    }

    /// Returns the slot and folds the outcome into the kind's pacing state.
    pub fn release(&self, guard: RateLimitGuard, success: bool) {
        let mut kinds = self.kinds.lock().expect("rate limiter poisoned");
        let entry = self.entry_for(&mut kinds, &guard.kind);
        let state = &mut entry.state;

        if success {
            state.consecutive_failures = 0;
            state.consecutive_successes += 1;
            if state.consecutive_successes >= self.config.recovery_threshold {
                state.delay = (state.delay / 2).max(self.config.min_delay);
                state.consecutive_successes = 0;
            }
        } else {
            state.consecutive_successes = 0;
            state.consecutive_failures += 1;
            state.total_failures += 1;
            state.delay = (state.delay * 2).min(self.config.max_delay);
            debug!(kind = %guard.kind, delay_ms = state.delay.as_millis() as u64, "backing off");
        }
    }

    /// Doubles the stress multiplier (clamped to 16). Called when the
    /// runner observes a window with many 429/5xx across kinds.
    pub fn note_stress(&self) {
        self.stress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current * 2).min(STRESS_CEILING))
            })
            .ok();
    }

    /// Halves the stress multiplier (clamped to 1) on a calm window.
    pub fn note_calm(&self) {
        self.stress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current / 2).max(STRESS_FLOOR))
            })
            .ok();
    }

    pub fn stress_multiplier(&self) -> u32 {
        self.stress.load(Ordering::Acquire)
    }

    /// Current delay for a kind (its initial value if never seen).
    pub fn current_delay(&self, kind: &str) -> Duration {
        let kinds = self.kinds.lock().expect("rate limiter poisoned");
        kinds
            .get(kind)
            .map(|entry| entry.state.delay)
            .unwrap_or(self.config.initial_delay)
    }

    /// Snapshot for `statistics.json`.
    pub fn status(&self) -> RateLimiterStatus {
        let kinds = self.kinds.lock().expect("rate limiter poisoned");
        RateLimiterStatus {
            stress_multiplier: self.stress_multiplier(),
            kinds: kinds
                .iter()
                .map(|(name, entry)| {
                    (
                        name.clone(),
                        KindStatus {
                            delay_ms: entry.state.delay.as_millis() as u64,
                            consecutive_successes: entry.state.consecutive_successes,
                            consecutive_failures: entry.state.consecutive_failures,
                            total_requests: entry.state.total_requests,
                            total_failures: entry.state.total_failures,
                        },
                    )
                })
                .collect(),
        }
    }

    fn entry_for<'a>(
        &self,
        kinds: &'a mut HashMap<String, KindEntry>,
        kind: &str,
    ) -> &'a mut KindEntry {
        kinds.entry(kind.to_string()).or_insert_with(|| KindEntry {
            state: KindState {
                delay: self.config.initial_delay,
                consecutive_successes: 0,
                consecutive_failures: 0,
                total_requests: 0,
                total_failures: 0,
            },
            semaphore: Arc::new(Semaphore::new(self.config.max_in_flight)),
        })
    }
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
