use std::time::Duration;

/// Additive reconnect backoff: one second to
/// start, plus one second per failed attempt, capped at ten minutes, reset
/// to one second after a success.
///
/// Modeled as a pure state machine (not a sleeping loop) so the timing
/// sequence can be tested without real delays.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    current: Duration,
    step: Duration,
    cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(1), Duration::from_secs(600))
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, step: Duration, cap: Duration) -> Self {
        BackoffPolicy {
            current: initial,
            step,
            cap,
        }
    }

    /// The delay to sleep before the next attempt.
    pub fn next_delay(&self) -> Duration {
        self.current
    }

    /// Record a failed attempt: advance the delay by `step`, capped.
    pub fn record_failure(&mut self) {
        self.current = (self.current + self.step).min(self.cap);
    }

    /// Record a success: reset the delay to its initial value.
    pub fn record_success(&mut self) {
        self.current = self.step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_backoff_increments_by_one_second() {
        let mut b = BackoffPolicy::default();
        let mut delays = Vec::new();
        for _ in 0..5 {
            delays.push(b.next_delay());
            b.record_failure();
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(4),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn caps_at_ten_minutes() {
        let mut b = BackoffPolicy::default();
        for _ in 0..1000 {
            b.record_failure();
        }
        assert_eq!(b.next_delay(), Duration::from_secs(600));
    }

    #[test]
    fn success_resets_to_initial() {
        let mut b = BackoffPolicy::default();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.next_delay(), Duration::from_secs(3));
        b.record_success();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }
}
