//! Document fetcher
//!
//! Resolves one work item to a local file. A part is attempted against each
//! document variant in priority order until one does not report "not
//! published"; every attempt is a captcha challenge, a solve, and a download
//! request, all under the retry policy.
//!
//! # Reply classification
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | Message matches an invalid-captcha marker | `ImmediateRetry` |
//! | Message matches an unpublished marker | `SwitchAlternative` |
//! | Non-success HTTP status | `DelayedRetry` |
//! | Malformed JSON, or `status != "Success"` | `DelayedRetry` |
//! | `file` is null | zero-byte placeholder |
//! | `file` present | base64-decoded PDF |

use super::client::{ApiClient, DocumentReply, DownloadRequest, SUCCESS_STATUS};
use super::retry::{Failure, Outcome, Resolution, RetryPolicy};
use crate::captcha::{CaptchaError, CaptchaSolver};
use crate::catalog::{DocumentVariant, WorkItem};
use crate::config::ResponseMarkers;
use crate::layout::{write_atomic, DataLayout};
use crate::state::PartStatus;
use crate::{HarvestError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Result of resolving one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Local file the part resolved to
    pub path: PathBuf,
    /// Byte size of that file
    pub size: u64,
    /// Variant that produced the file
    pub variant: DocumentVariant,
    /// True if the file was already on disk and no request was made
    pub from_cache: bool,
}

impl FetchResult {
    pub fn status(&self) -> PartStatus {
        PartStatus::from_size(self.size)
    }
}

#[derive(Debug, Deserialize)]
struct DocumentBody {
    status: String,
    #[serde(default)]
    file: Option<String>,
}

/// Human-readable message of a reply, falling back to the raw body
fn reply_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn matches_any(message: &str, markers: &[String]) -> bool {
    let message = message.to_lowercase();
    markers
        .iter()
        .any(|marker| message.contains(&marker.to_lowercase()))
}

/// Classifies a document endpoint reply
///
/// `Ok(None)` means the portal confirmed there is no document for the part.
pub fn classify_reply(reply: &DocumentReply, markers: &ResponseMarkers) -> Outcome<Option<Vec<u8>>> {
    let message = reply_message(&reply.body);

    if matches_any(&message, &markers.invalid_captcha) {
        return Err(Failure::ImmediateRetry(format!("captcha rejected ({})", message)));
    }
    if matches_any(&message, &markers.unpublished) {
        return Err(Failure::SwitchAlternative(message));
    }
    if !reply.status.is_success() {
        return Err(Failure::DelayedRetry(format!(
            "document endpoint returned {}: {}",
            reply.status, message
        )));
    }

    let body: DocumentBody = serde_json::from_str(&reply.body)
        .map_err(|e| Failure::DelayedRetry(format!("malformed document reply: {}", e)))?;
    if body.status != SUCCESS_STATUS {
        return Err(Failure::DelayedRetry(format!(
            "document endpoint replied {}: {}",
            body.status, message
        )));
    }

    match body.file {
        None => Ok(None),
        Some(encoded) => STANDARD
            .decode(encoded.trim())
            .map(Some)
            .map_err(|e| Failure::DelayedRetry(format!("document payload is not base64: {}", e))),
    }
}

/// Fetches parts through the captcha-gated document endpoints
pub struct Fetcher {
    api: ApiClient,
    layout: DataLayout,
    retry: RetryPolicy,
    solver: Arc<dyn CaptchaSolver>,
    markers: ResponseMarkers,
}

impl Fetcher {
    pub fn new(
        api: ApiClient,
        layout: DataLayout,
        retry: RetryPolicy,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Self {
        let markers = api.source().markers.clone();
        Self {
            api,
            layout,
            retry,
            solver,
            markers,
        }
    }

    /// Resolves `item` to a local file
    ///
    /// If a file already exists for any variant it is returned without a
    /// network call. Otherwise variants are tried in priority order.
    ///
    /// # Errors
    ///
    /// * `VariantsExhausted` - every variant reported "not published"
    /// * any fatal error from the retry policy
    pub async fn fetch_part(&self, item: &WorkItem) -> Result<FetchResult> {
        let key = item.key();
        let part = item.part.part_number;

        if let Some((variant, path)) = self.layout.resolved_part(&key, part) {
            let size = std::fs::metadata(&path)?.len();
            tracing::debug!("Already resolved: {} ({} bytes)", path.display(), size);
            return Ok(FetchResult {
                path,
                size,
                variant,
                from_cache: true,
            });
        }

        for variant in DocumentVariant::ALL {
            let operation = format!("{} roll for {}", variant, item);
            let resolution = self
                .retry
                .execute(&operation, || self.attempt(item, variant))
                .await?;

            match resolution {
                Resolution::Done(payload) => {
                    let path = self.layout.part_file(&key, part, variant);
                    let bytes = match payload {
                        Some(bytes) => bytes,
                        None => {
                            tracing::warn!("Roll not available for {}", item);
                            Vec::new()
                        }
                    };
                    write_atomic(&path, &bytes)?;
                    tracing::info!("Wrote {} ({} bytes)", path.display(), bytes.len());

                    return Ok(FetchResult {
                        path,
                        size: bytes.len() as u64,
                        variant,
                        from_cache: false,
                    });
                }
                Resolution::SwitchAlternative(reason) => {
                    tracing::info!("{} roll not published for {}: {}", variant, item, reason);
                }
            }
        }

        Err(HarvestError::VariantsExhausted {
            item: item.to_string(),
        })
    }

    async fn attempt(&self, item: &WorkItem, variant: DocumentVariant) -> Outcome<Option<Vec<u8>>> {
        let challenge = self.api.captcha().await?;
        let guess = self.solve(challenge.image).await?;
        if guess.is_empty() {
            return Err(Failure::ImmediateRetry(
                "solver could not read the captcha".to_string(),
            ));
        }

        let request = DownloadRequest {
            ac_number: item.part.constituency,
            captcha: guess,
            captcha_id: challenge.id,
            district_code: item.part.district_code.clone(),
            language: item.language.clone(),
            part_number: item.part.part_number,
            state_code: item.part.state_code.clone(),
        };

        let reply = self.api.request_document(variant, &request).await?;
        classify_reply(&reply, &self.markers)
    }

    async fn solve(&self, image: Vec<u8>) -> Outcome<String> {
        let solver = Arc::clone(&self.solver);
        let guess = tokio::task::spawn_blocking(move || solver.solve(&image))
            .await
            .map_err(|e| HarvestError::Captcha(CaptchaError::Task(e.to_string())))?
            .map_err(HarvestError::from)?;
        Ok(guess)
    }
}
