//! # Fibonacci Backoff
//!
//! Requeue delays for failed reconciles. The delay grows along the Fibonacci
//! sequence, which climbs more gently than doubling, and is capped so a
//! resource that keeps failing is still retried every few minutes.
//!
//! With the defaults the sequence is 5s, 5s, 10s, 15s, 25s, 40s, ... 300s (max).

pub const DEFAULT_MIN_SECONDS: u64 = 5;
pub const DEFAULT_MAX_SECONDS: u64 = 300;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, starting from `min_seconds`
/// twice and never exceeding `max_seconds`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff value in seconds
    prev_seconds: u64,
    /// Current backoff value in seconds
    current_seconds: u64,
    /// Maximum backoff value in seconds
    max_seconds: u64,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SECONDS, DEFAULT_MAX_SECONDS)
    }
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff between `min_seconds` and `max_seconds`
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            prev_seconds: 0,
            current_seconds: min_seconds.min(max_seconds),
            max_seconds,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_seconds;

        let next = self.prev_seconds + self.current_seconds;
        self.prev_seconds = self.current_seconds;
        self.current_seconds = next.min(self.max_seconds);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::default();

        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 10);
        assert_eq!(backoff.next_backoff_seconds(), 15);
        assert_eq!(backoff.next_backoff_seconds(), 25);
        assert_eq!(backoff.next_backoff_seconds(), 40);
        assert_eq!(backoff.next_backoff_seconds(), 65);
    }

    #[test]
    fn test_fibonacci_backoff_max_cap() {
        let mut backoff = FibonacciBackoff::default();

        let delays: Vec<u64> = (0..12).map(|_| backoff.next_backoff_seconds()).collect();
        // 5, 5, 10, 15, 25, 40, 65, 105, 170, 275, then capped
        assert_eq!(delays[9], 275);
        assert_eq!(delays[10], 300);
        assert_eq!(delays[11], 300);
    }

    #[test]
    fn test_min_above_max_is_capped() {
        let mut backoff = FibonacciBackoff::new(60, 30);
        assert_eq!(backoff.next_backoff_seconds(), 30);
        assert_eq!(backoff.next_backoff_seconds(), 30);
    }
}
