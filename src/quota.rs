use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source for the quota tracker, injectable so tests can use a fake
/// clock instead of sleeping through rolling windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time source used in production.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Rolling-window call quota, tracked per provider source.
///
/// The Evidence Collector consults this before each dispatch; an exhausted
/// source is recorded as a quota failure for that run rather than blocking.
pub struct QuotaTracker {
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl QuotaTracker {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_clock(limit, window, Arc::new(SystemClock))
    }

    pub fn with_clock(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            clock,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to reserve one call for `source` inside the rolling window.
    /// Returns false when the quota is exhausted; the reservation is not
    /// refunded on provider failure (a failed call still consumed upstream
    /// quota).
    pub fn try_acquire(&self, source: &str) -> bool {
        let now = self.clock.now();
        let mut calls = self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let timestamps = calls.entry(source.to_string()).or_default();

        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.limit as usize {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Remaining calls for `source` in the current window.
    pub fn remaining(&self, source: &str) -> u32 {
        let now = self.clock.now();
        let calls = self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let used = calls
            .get(source)
            .map(|ts| {
                ts.iter()
                    .filter(|t| now.duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0);
        self.limit.saturating_sub(used as u32)
    }
}
