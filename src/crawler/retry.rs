//! Retry classification and the dispatch loop that acts on it
//!
//! Every network step returns an [`Outcome`]: either its value or a
//! [`Failure`] naming how the step may be retried. [`RetryPolicy::execute`]
//! consumes those tags:
//!
//! | Failure | Action |
//! |---------|--------|
//! | `ImmediateRetry` | Retry at once, backoff untouched |
//! | `DelayedRetry` | Sleep the current delay, double it, bump the attempt count |
//! | `SwitchAlternative` | Hand control back to the caller |
//! | `Fatal` | Propagate |

use crate::config::RetryConfig;
use crate::state::RetryState;
use crate::{HarvestError, Result};
use std::future::Future;
use std::time::Duration;

/// Why a single attempt failed, and how it may be retried
#[derive(Debug)]
pub enum Failure {
    /// Retry at once (e.g. a rejected captcha)
    ImmediateRetry(String),

    /// Retry after the backoff delay (overload, malformed body, network error)
    DelayedRetry(String),

    /// The requested alternative does not exist; the caller should try the next one
    SwitchAlternative(String),

    /// Not retriable
    Fatal(HarvestError),
}

impl From<HarvestError> for Failure {
    fn from(err: HarvestError) -> Self {
        Failure::Fatal(err)
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Failure::Fatal(HarvestError::Io(err))
    }
}

/// Result of a single attempt
pub type Outcome<T> = std::result::Result<T, Failure>;

/// What a retried operation finally resolved to
#[derive(Debug)]
pub enum Resolution<T> {
    Done(T),
    /// The operation asked for the next alternative, with the reason given
    SwitchAlternative(String),
}

impl<T> Resolution<T> {
    /// Unwraps a `Done`, treating an alternative switch as a catalog error
    ///
    /// For operations that have no alternatives to switch to.
    pub fn into_done(self, operation: &str) -> Result<T> {
        match self {
            Resolution::Done(value) => Ok(value),
            Resolution::SwitchAlternative(reason) => Err(HarvestError::Catalog(format!(
                "{} has no alternative to switch to: {}",
                operation, reason
            ))),
        }
    }
}

/// Retry ceilings and the initial backoff delay for one kind of operation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    max_captcha_attempts: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_captcha_attempts: u32) -> Self {
        Self {
            max_attempts,
            max_captcha_attempts,
            initial_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            config.max_captcha_attempts,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `attempt` until it succeeds, asks for an alternative, or a ceiling is hit
    ///
    /// Each call starts from a fresh [`RetryState`], so a success always leaves
    /// the next operation at the initial delay.
    ///
    /// # Errors
    ///
    /// * `RetriesExhausted` - a delayed failure arrived with the attempt count
    ///   already past `max_attempts`
    /// * `CaptchaAttemptsExhausted` - too many consecutive immediate retries
    /// * any error carried by `Failure::Fatal`
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<Resolution<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let mut state = RetryState::new(self.initial_delay);
        let mut immediate_retries = 0u32;

        loop {
            match attempt().await {
                Ok(value) => {
                    state.reset();
                    return Ok(Resolution::Done(value));
                }
                Err(Failure::ImmediateRetry(reason)) => {
                    immediate_retries += 1;
                    if immediate_retries > self.max_captcha_attempts {
                        return Err(HarvestError::CaptchaAttemptsExhausted {
                            operation: operation.to_string(),
                            attempts: immediate_retries,
                        });
                    }
                    tracing::warn!("{}: {}, retrying", operation, reason);
                }
                Err(Failure::DelayedRetry(reason)) => {
                    immediate_retries = 0;
                    let attempts = state.attempt();
                    let Some(delay) = state.register_delayed_failure(self.max_attempts) else {
                        return Err(HarvestError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts,
                            reason,
                        });
                    };
                    tracing::warn!(
                        "{}: {} (attempt {}/{}), sleeping {:?}",
                        operation,
                        reason,
                        attempts,
                        self.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Failure::SwitchAlternative(reason)) => {
                    return Ok(Resolution::SwitchAlternative(reason));
                }
                Err(Failure::Fatal(err)) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
