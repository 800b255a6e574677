//! Bounded waiting for socket readiness.
//!
//! # Responsibilities
//! - Describe how long one attempt may wait for data or write capacity
//! - Count consecutive attempts that produced nothing
//! - Decide when a stalled transfer should be reported as broken

use std::time::Duration;

use crate::config::IoConfig;

/// Wait/retry budget for one endpoint operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long a single read or write attempt may wait.
    pub wait: Duration,
    /// Consecutive empty attempts tolerated before giving up.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const fn new(wait: Duration, max_retries: u32) -> Self {
        Self { wait, max_retries }
    }

    /// Policy for receives, from the `[io]` config section.
    pub fn for_receive(config: &IoConfig) -> Self {
        Self::new(Duration::from_millis(config.wait_ms), config.max_retries)
    }

    /// Policy for sends and handshakes, from the `[io]` config section.
    pub fn for_send(config: &IoConfig) -> Self {
        Self::new(Duration::from_millis(config.send_wait_ms), config.send_max_retries)
    }

    /// Longest time an operation can stall before it is abandoned.
    pub fn budget(&self) -> Duration {
        self.wait.saturating_mul(self.max_retries.max(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(5), 10)
    }
}

/// Per-call tally of consecutive idle attempts.
#[derive(Debug)]
pub struct IdleCounter {
    limit: u32,
    idle: u32,
}

impl IdleCounter {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            limit: policy.max_retries.max(1),
            idle: 0,
        }
    }

    /// Record an attempt that moved no bytes. Returns false once the budget
    /// is spent.
    pub fn record_idle(&mut self) -> bool {
        self.idle += 1;
        self.idle < self.limit
    }

    /// Progress was made; the run of idle attempts starts over.
    pub fn reset(&mut self) {
        self.idle = 0;
    }

    pub fn idle(&self) -> u32 {
        self.idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_exhausts_after_max_retries() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 3);
        let mut counter = IdleCounter::new(&policy);
        assert!(counter.record_idle());
        assert!(counter.record_idle());
        assert!(!counter.record_idle());
    }

    #[test]
    fn progress_resets_the_run() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 2);
        let mut counter = IdleCounter::new(&policy);
        assert!(counter.record_idle());
        counter.reset();
        assert_eq!(counter.idle(), 0);
        assert!(counter.record_idle());
        assert!(!counter.record_idle());
    }

    #[test]
    fn zero_retries_still_allows_one_wait() {
        let policy = RetryPolicy::new(Duration::from_millis(4), 0);
        assert_eq!(policy.budget(), Duration::from_millis(4));
        assert!(!IdleCounter::new(&policy).record_idle());
    }

    #[test]
    fn policies_follow_io_config() {
        let io = IoConfig::default();
        let recv = RetryPolicy::for_receive(&io);
        let send = RetryPolicy::for_send(&io);
        assert_eq!(recv.wait, Duration::from_millis(io.wait_ms));
        assert_eq!(send.max_retries, io.send_max_retries);
    }
}
