use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{CircuitBreaker, Config, StateMachine};
use std::time::Duration;

/// Circuit breaker guarding one provider's outbound calls.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// While the breaker is open the Evidence Collector skips the source and
/// records a `CircuitOpen` failure instead of waiting on a dead upstream.
pub struct ProviderBreaker {
    inner: StateMachine<ConsecutiveFailures<Exponential>, ()>,
}

impl ProviderBreaker {
    pub fn new() -> Self {
        let backoff_strategy = backoff::exponential(
            Duration::from_secs(10), // Initial delay
            Duration::from_secs(60), // Maximum delay
        );

        let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

        Self {
            inner: Config::new().failure_policy(failure_policy).build(),
        }
    }

    /// Whether a call to this provider may be dispatched right now.
    pub fn is_call_permitted(&self) -> bool {
        self.inner.is_call_permitted()
    }

    /// Feeds an already-observed call outcome into the failure accrual.
    pub fn record(&self, success: bool) {
        let _ = self.inner.call(|| {
            if success {
                Ok::<(), &str>(())
            } else {
                Err("provider call failed")
            }
        });
    }
}

impl Default for ProviderBreaker {
    fn default() -> Self {
        Self::new()
    }
}
