use std::time::Duration;

/// Default first delay: spec requires `first >= 60s`.
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(60);
/// Default cap: spec requires `max <= 1h`.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60 * 60);
/// Roughly 24 passes/day at the default initial/max delays before giving up.
const DEFAULT_MAX_ATTEMPTS: u32 = 24;

/// Produces a finite, monotonic non-decreasing sequence of retry delays. A fresh
/// `BackoffPolicy` is built per validation driver run (see `driver::run`); it is not
/// shared across drivers.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    multiplier: u32,
    attempts_taken: u32,
}

impl BackoffPolicy {
    pub fn builder() -> BackoffPolicyBuilder {
        BackoffPolicyBuilder::default()
    }

    /// True iff another call to `next()` is valid.
    pub fn has_next(&self) -> bool {
        self.attempts_taken < self.max_attempts
    }

    /// Returns the next delay and advances the sequence. Doubles each step (capped at
    /// `max_delay`), matching the teacher's `exponential` backoff function but bounded to
    /// a finite attempt count rather than growing without limit.
    pub fn next(&mut self) -> Duration {
        debug_assert!(self.has_next());
        let step = self.attempts_taken;
        self.attempts_taken += 1;

        let factor = self.multiplier.saturating_pow(step);
        let scaled = self.initial_delay.saturating_mul(factor.max(1));
        scaled.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct BackoffPolicyBuilder {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    multiplier: u32,
}

impl Default for BackoffPolicyBuilder {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            multiplier: 2,
        }
    }
}

impl BackoffPolicyBuilder {
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn build(self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            max_attempts: self.max_attempts,
            multiplier: self.multiplier,
            attempts_taken: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_satisfy_spec_bounds() {
        let b = BackoffPolicy::builder().build();
        assert!(b.initial_delay >= Duration::from_secs(60));
        assert!(b.max_delay <= Duration::from_secs(60 * 60));
    }

    #[test]
    fn sequence_is_monotonic_non_decreasing_and_capped() {
        let mut b = BackoffPolicy::builder()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(10))
            .with_max_attempts(6)
            .build();

        let mut prev = Duration::from_millis(0);
        let mut count = 0;
        while b.has_next() {
            let d = b.next();
            assert!(d >= prev);
            assert!(d <= Duration::from_millis(10));
            prev = d;
            count += 1;
        }
        assert_eq!(count, 6);
        assert!(!b.has_next());
    }

    #[test]
    fn finite_attempt_budget() {
        let mut b = BackoffPolicy::builder()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_attempts(3)
            .build();
        for _ in 0..3 {
            assert!(b.has_next());
            b.next();
        }
        assert!(!b.has_next());
    }
}
