use std::time::Duration;

/// How the wait between attempts grows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Linear,
    Exponential,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(5_000),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Two attempts, no wait in between.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay to wait before `attempt` (1-based). The first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let retry_index = (attempt - 1) as u32;
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(retry_index),
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(retry_index - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_never_waits() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn growing_backoffs() {
        let linear = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            backoff: Backoff::Linear,
        };
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(200));

        let exponential = RetryPolicy {
            backoff: Backoff::Exponential,
            ..linear
        };
        assert_eq!(exponential.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(exponential.delay_for_attempt(4), Duration::from_millis(400));
    }

    #[test]
    fn immediate_policy_has_no_delay() {
        assert_eq!(RetryPolicy::immediate().delay_for_attempt(2), Duration::ZERO);
    }
}
