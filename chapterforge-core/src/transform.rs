//! Single-call wrapper around [`TransformService`] with a bounded retry loop.
//!
//! Every call walks an explicit state machine:
//!
//! ```text
//! Pending -> Calling -> Succeeded
//!               |  ^
//!               v  |
//!             Retrying
//!               |
//!               v
//!          FailedFatal
//! ```
//!
//! An error from the service and an answer that is empty once its fences are
//! stripped are both failed attempts.
//! After `max_attempts` failed attempts the call ends in `FailedFatal` and the
//! caller receives a [`CallFailure`]; nothing transient escapes this module.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, warn};

use crate::config::DEFAULT_MAX_ATTEMPTS;
use crate::contract::{
    Phase, ProgressEvent, ProgressSink, SourceDocument, TransformRequest, TransformService,
};

/// Expected shape of the response text, used for fence cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Markup,
    Json,
    Plain,
}

/// A call whose attempts were all used up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub attempts: u32,
    pub last_error: String,
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up after {} attempt(s): {}",
            self.attempts, self.last_error
        )
    }
}

impl std::error::Error for CallFailure {}

#[derive(Debug)]
enum CallState {
    Pending,
    Calling { attempt: u32 },
    Retrying { attempt: u32, error: String },
    Succeeded { text: String },
    FailedFatal { attempts: u32, error: String },
}

pub struct TransformClient {
    service: Arc<dyn TransformService>,
    source: SourceDocument,
    progress: Arc<dyn ProgressSink>,
    max_attempts: u32,
    retry_jitter: Duration,
}

impl TransformClient {
    pub fn new(
        service: Arc<dyn TransformService>,
        source: SourceDocument,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            service,
            source,
            progress,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_jitter: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn source(&self) -> &SourceDocument {
        &self.source
    }

    /// Runs one logical call to completion.
    ///
    /// `call_id` correlates the emitted progress events; `label` is the
    /// human-readable name shown next to them.
    pub async fn call(
        &self,
        call_id: &str,
        label: &str,
        request: &TransformRequest,
        format: ResponseFormat,
    ) -> Result<String, CallFailure> {
        let mut state = CallState::Pending;
        loop {
            state = match state {
                CallState::Pending => {
                    self.emit(call_id, label, Phase::Started, None);
                    CallState::Calling { attempt: 1 }
                }
                CallState::Calling { attempt } => {
                    debug!(call = call_id, attempt, "Calling transformation service");
                    match self.service.transform(&self.source, request).await {
                        Ok(Some(text)) => {
                            let text = normalise_response(&text, format);
                            if text.trim().is_empty() {
                                self.after_failure(attempt, "service returned an empty response".into())
                            } else {
                                CallState::Succeeded { text }
                            }
                        }
                        Ok(None) => self.after_failure(attempt, "service returned no response".into()),
                        Err(e) => self.after_failure(attempt, e.to_string()),
                    }
                }
                CallState::Retrying { attempt, error } => {
                    let next = attempt + 1;
                    warn!(call = call_id, attempt = next, error = %error, "Retrying transformation call");
                    self.emit(call_id, label, Phase::Retrying, Some(next));
                    self.pause_before_retry().await;
                    CallState::Calling { attempt: next }
                }
                CallState::Succeeded { text } => {
                    self.emit(call_id, label, Phase::Succeeded, None);
                    return Ok(text);
                }
                CallState::FailedFatal { attempts, error } => {
                    error!(call = call_id, attempts, error = %error, "Transformation call failed permanently");
                    self.emit(call_id, label, Phase::Failed, Some(attempts));
                    return Err(CallFailure {
                        attempts,
                        last_error: error,
                    });
                }
            };
        }
    }

    fn after_failure(&self, attempt: u32, error: String) -> CallState {
        if attempt < self.max_attempts {
            CallState::Retrying { attempt, error }
        } else {
            CallState::FailedFatal {
                attempts: attempt,
                error,
            }
        }
    }

    async fn pause_before_retry(&self) {
        let max_ms = self.retry_jitter.as_millis() as u64;
        if max_ms == 0 {
            return;
        }
        let pause = rand::rng().random_range(0..=max_ms);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }

    fn emit(&self, call_id: &str, label: &str, phase: Phase, attempt: Option<u32>) {
        self.progress.emit(&ProgressEvent {
            unit_id: call_id.to_string(),
            phase,
            attempt,
            label: label.to_string(),
        });
    }
}

/// Removes the fencing the service likes to wrap its answers in.
pub fn normalise_response(text: &str, format: ResponseFormat) -> String {
    match format {
        ResponseFormat::Markup => strip_fence(text, "```html"),
        ResponseFormat::Json => strip_fence(text, "```json"),
        ResponseFormat::Plain => text.to_string(),
    }
}

/// Strips one leading `opening` and one trailing closing fence, each only when
/// it sits literally at the start or end of the trimmed text.
pub fn strip_fence(text: &str, opening: &str) -> String {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix(opening) {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim().to_string()
}
