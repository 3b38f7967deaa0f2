use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Adaptive politeness throttle for a single host. Starts conservative,
/// doubles the inter-request delay on distress (timeouts, connect failures,
/// 429, 5xx) and narrows it gradually while the host answers quickly. The
/// delay never drops below the configured base and never narrows on error.
pub struct Throttle {
    base_delay: Duration,
    max_delay: Duration,
    target_concurrency: f64,
    state: Mutex<ThrottleState>,
}

struct ThrottleState {
    delay: Duration,
    next_free: Instant,
}

pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY: Duration = Duration::from_secs(120);
const TARGET_CONCURRENCY: f64 = 1.0;

impl Throttle {
    pub fn new(base_delay: Duration) -> Throttle {
        Throttle {
            base_delay,
            max_delay: MAX_DELAY,
            target_concurrency: TARGET_CONCURRENCY,
            state: Mutex::new(ThrottleState {
                delay: base_delay,
                next_free: Instant::now(),
            }),
        }
    }

    /// Reserve the next request slot and wait until it opens. Concurrent
    /// callers are serialized: each reservation pushes the following slot out
    /// by the current delay.
    pub async fn acquire(&self) {
        let wake = {
            let mut state = lock(&self.state);
            let now = Instant::now();
            let wake = if state.next_free > now { state.next_free } else { now };
            state.next_free = wake + state.delay;
            wake
        };
        sleep_until(wake).await;
    }

    /// Feed back one successful response and its observed latency.
    pub fn record_success(&self, latency: Duration) {
        let mut state = lock(&self.state);
        let next = narrowed(state.delay, latency, self.base_delay, self.target_concurrency);
        if next != state.delay {
            debug!(from_ms = state.delay.as_millis() as u64, to_ms = next.as_millis() as u64, "throttle narrowed");
        }
        state.delay = next.min(self.max_delay);
    }

    /// Feed back a distress signal from the host.
    pub fn record_distress(&self) {
        let mut state = lock(&self.state);
        let next = widened(state.delay, self.max_delay);
        debug!(from_ms = state.delay.as_millis() as u64, to_ms = next.as_millis() as u64, "throttle widened");
        state.delay = next;
    }

    pub fn current_delay(&self) -> Duration {
        lock(&self.state).delay
    }
}

fn lock(state: &Mutex<ThrottleState>) -> std::sync::MutexGuard<'_, ThrottleState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Move the delay halfway toward what the observed latency suggests for the
/// target concurrency, floored at the base delay.
fn narrowed(delay: Duration, latency: Duration, base: Duration, target_concurrency: f64) -> Duration {
    let target = latency.div_f64(target_concurrency);
    let next = (delay + target) / 2;
    next.max(base)
}

fn widened(delay: Duration, max: Duration) -> Duration {
    (delay * 2).min(max)
}

// ── Tests ──
