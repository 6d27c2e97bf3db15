use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::RunReport;

/// Every way a run can fail once it leaves the transformation client.
///
/// Transient call failures never appear here: the client retries them and
/// only reports once its attempts are exhausted.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to ingest source {}: {reason}", path.display())]
    Ingestion { path: PathBuf, reason: String },

    #[error("document analysis failed after {attempts} attempt(s): {reason}")]
    Analysis { attempts: u32, reason: String },

    #[error("document metadata is malformed: {reason}")]
    MalformedMetadata { reason: String, raw: String },

    #[error("document has no units to transform")]
    EmptyRun,

    #[error("unit {index} ({title}) failed after {attempts} attempt(s): {reason}")]
    UnitFatal {
        index: usize,
        title: String,
        attempts: u32,
        reason: String,
    },

    #[error("{} unit(s) failed: {failed:?}", failed.len())]
    Incomplete {
        failed: Vec<usize>,
        report: Box<RunReport>,
    },

    #[error("assembly error: {0}")]
    Assembly(String),

    #[error("failed to persist composite output: {0}")]
    Output(String),
}

impl PipelineError {
    /// The raw service payload, when one is worth showing for post-mortem inspection.
    pub fn raw_payload(&self) -> Option<&str> {
        match self {
            PipelineError::MalformedMetadata { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
