use std::time::Duration;

/// Backoff counters for one logical step
///
/// `attempt` starts at 1 and `delay` at the initial delay. Every delayed
/// failure hands out the current delay, then doubles it and bumps the attempt
/// count; a success puts both back to their initial values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    delay: Duration,
    initial_delay: Duration,
}

impl RetryState {
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            attempt: 1,
            delay: initial_delay,
            initial_delay,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Restores the initial counters after a successful call
    pub fn reset(&mut self) {
        self.attempt = 1;
        self.delay = self.initial_delay;
    }

    /// Registers a delayed-retriable failure
    ///
    /// # Returns
    ///
    /// * `Some(delay)` - How long to wait before the next attempt
    /// * `None` - The attempt count is past `max_attempts`; give up
    pub fn register_delayed_failure(&mut self, max_attempts: u32) -> Option<Duration> {
        if self.attempt > max_attempts {
            return None;
        }

        let wait = self.delay;
        self.attempt += 1;
        self.delay = self.delay.saturating_mul(2);
        Some(wait)
    }
}
