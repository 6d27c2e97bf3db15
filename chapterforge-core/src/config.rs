use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PipelineError;

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How analysis asks the service to delimit each unit. Exactly one is active per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStrategy {
    /// Literal first and last sentence of every chapter.
    #[default]
    Sentences,
    /// Transform until the next chapter's title appears.
    NextTitle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Persist once, after every unit has completed.
    #[default]
    Batch,
    /// Persist the full composite every time a unit completes.
    Streaming,
}

/// What happens when one unit exhausts its attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole run; remaining workers are cancelled.
    #[default]
    Abort,
    /// Mark the chapter failed, finish the run, report failure at the end.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_concurrency: usize,
    pub max_attempts: u32,
    /// Upper bound of the random pause before a retry. 0 retries immediately.
    pub retry_jitter_ms: u64,
    pub boundary: BoundaryStrategy,
    pub delivery: DeliveryMode,
    pub on_unit_failure: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_jitter_ms: 0,
            boundary: BoundaryStrategy::default(),
            delivery: DeliveryMode::default(),
            on_unit_failure: FailurePolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_concurrency == 0 {
            return Err(PipelineError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(PipelineError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            max_concurrency = self.max_concurrency,
            max_attempts = self.max_attempts,
            boundary = ?self.boundary,
            delivery = ?self.delivery,
            on_unit_failure = ?self.on_unit_failure,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
