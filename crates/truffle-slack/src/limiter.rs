use std::sync::Mutex;
use std::time::Duration;

/// Batch-window rate limiter for Web API calls.
///
/// Tracks calls issued in the current batch; once `batch_size` calls have
/// gone out, the next call waits `batch_wait` and starts a fresh batch.
/// Every call additionally waits a small inter-call delay. `plan` returns
/// the wait without sleeping so the arithmetic is testable; `acquire` is
/// the async wrapper the client uses.
pub struct BatchLimiter {
    batch_size: u32,
    batch_wait: Duration,
    inter_call_delay: Duration,
    count: Mutex<u32>,
}

impl BatchLimiter {
    pub fn new(batch_size: u32, batch_wait: Duration, inter_call_delay: Duration) -> Self {
        Self {
            batch_size,
            batch_wait,
            inter_call_delay,
            count: Mutex::new(0),
        }
    }

    /// Count one call and return how long it must wait first.
    pub fn plan(&self) -> Duration {
        let mut count = self.count.lock().unwrap();
        if *count >= self.batch_size {
            *count = 1;
            self.batch_wait + self.inter_call_delay
        } else {
            *count += 1;
            self.inter_call_delay
        }
    }

    pub async fn acquire(&self) {
        let wait = self.plan();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Start a fresh batch (called between logical operations, e.g. per
    /// channel).
    pub fn reset(&self) {
        *self.count.lock().unwrap() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> BatchLimiter {
        BatchLimiter::new(3, Duration::from_secs(61), Duration::from_millis(100))
    }

    #[test]
    fn batch_budget_then_long_wait() {
        let l = limiter();
        for _ in 0..3 {
            assert_eq!(l.plan(), Duration::from_millis(100));
        }
        // Budget spent: the 4th call waits out the batch window
        assert_eq!(l.plan(), Duration::from_millis(61_100));
        // ...and the new batch has its own budget again
        assert_eq!(l.plan(), Duration::from_millis(100));
        assert_eq!(l.plan(), Duration::from_millis(100));
        assert_eq!(l.plan(), Duration::from_millis(61_100));
    }

    #[test]
    fn reset_starts_a_fresh_batch() {
        let l = limiter();
        for _ in 0..3 {
            l.plan();
        }
        l.reset();
        assert_eq!(l.plan(), Duration::from_millis(100));
    }

    #[test]
    fn at_most_batch_size_calls_between_long_waits() {
        let l = BatchLimiter::new(50, Duration::from_secs(61), Duration::ZERO);
        let mut in_window = 0u32;
        for _ in 0..500 {
            if l.plan() >= Duration::from_secs(61) {
                assert!(in_window <= 50);
                in_window = 1;
            } else {
                in_window += 1;
            }
        }
        assert!(in_window <= 50);
    }
}
