//! Captcha solving capability
//!
//! The crawler never looks at challenge images itself. It hands the decoded
//! image bytes to a [`CaptchaSolver`] and submits whatever text comes back;
//! an empty guess means "unsolvable, fetch a new challenge".

mod command;

pub use command::CommandSolver;

use thiserror::Error;

/// Errors raised by a solver implementation
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("No solver command configured")]
    NoCommand,

    #[error("Failed to run solver `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Solver `{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Solver output is not valid UTF-8")]
    Output(#[from] std::string::FromUtf8Error),

    #[error("Solver task failed: {0}")]
    Task(String),
}

/// A challenge served by the captcha endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    /// Identifier echoed back with the download request
    pub id: String,
    /// Decoded image bytes (PNG)
    pub image: Vec<u8>,
}

/// Converts a challenge image into a text guess
///
/// Implementations are called from a blocking thread and may take their time.
pub trait CaptchaSolver: Send + Sync {
    /// Returns the guessed text, or an empty string if the image could not be read
    fn solve(&self, image: &[u8]) -> Result<String, CaptchaError>;
}

/// Solver that always returns the same guess
#[derive(Debug, Clone)]
pub struct FixedSolver(pub String);

impl CaptchaSolver for FixedSolver {
    fn solve(&self, _image: &[u8]) -> Result<String, CaptchaError> {
        Ok(self.0.clone())
    }
}
