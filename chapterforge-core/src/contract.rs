//! # contract: data model and collaborator seams for the chapter pipeline
//!
//! Everything the pipeline talks to from outside lives behind one of the
//! traits in this module:
//!
//! - [`TransformService`]: the external, unreliable model call
//! - [`Ingestor`]: turns a local path into a [`SourceDocument`] handle
//! - [`CompositeWriter`]: persists the assembled [`Composite`]
//! - [`ProgressSink`]: receives per-unit lifecycle [`ProgressEvent`]s
//!
//! ## Mocking & Testing
//! The traits are annotated for `mockall` so consumers can generate
//! deterministic mocks for unit/integration tests (exported under the default
//! `test-export-mocks` feature).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

/// Error type returned by collaborators (service, ingestion, writers).
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// Where the bytes of a [`SourceDocument`] live.
#[derive(Debug, Clone)]
pub enum SourceLocation {
    /// Raw file contents, shared read-only between all workers.
    Inline(Arc<Vec<u8>>),
    /// A handle returned by the service's file upload endpoint.
    Remote { uri: String },
}

/// Opaque handle to the ingested source. Immutable for the whole run.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub display_name: String,
    pub mime_type: String,
    pub location: SourceLocation,
}

/// One request to the transformation service.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub instructions: String,
    /// JSON schema for structured output, when the caller expects JSON.
    pub schema: Option<serde_json::Value>,
}

impl TransformRequest {
    pub fn text(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            schema: None,
        }
    }

    pub fn structured(instructions: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            instructions: instructions.into(),
            schema: Some(schema),
        }
    }
}

/// Where one unit starts and stops inside the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryHint {
    /// Literal first and last sentence of the unit.
    Sentences { first: String, last: String },
    /// Continue until this title appears; `None` means until the end of the document.
    NextTitle(Option<String>),
}

/// One chapter-equivalent segment of the source, as reported by analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    /// 1-based, dense, equal to position + 1 in [`DocumentMetadata::units`].
    pub index: usize,
    pub title: String,
    pub boundary: Option<BoundaryHint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub units: Vec<UnitDescriptor>,
}

/// The transformed body of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitResult {
    pub index: usize,
    pub title: String,
    pub body: String,
}

/// State of one chapter slot in the composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum SlotState {
    Pending,
    Filled(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSlot {
    pub index: usize,
    pub title: String,
    pub state: SlotState,
}

/// The ordered, merged document assembled from all unit results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composite {
    pub title: String,
    pub author: String,
    pub chapters: Vec<ChapterSlot>,
}

impl Composite {
    /// Bodies of all filled chapters, in chapter order.
    pub fn bodies(&self) -> Vec<&str> {
        self.chapters
            .iter()
            .filter_map(|slot| match &slot.state {
                SlotState::Filled(body) => Some(body.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.chapters
            .iter()
            .all(|slot| matches!(slot.state, SlotState::Filled(_)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Started,
    Retrying,
    Succeeded,
    Failed,
}

/// A lifecycle event for one call site (the analysis call or one unit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub unit_id: String,
    pub phase: Phase,
    pub attempt: Option<u32>,
    pub label: String,
}

/// The external transformation call.
///
/// `Ok(None)` means the service answered without usable content; callers treat
/// it as a failed attempt, not an empty success.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TransformService: Send + Sync {
    async fn transform(
        &self,
        source: &SourceDocument,
        request: &TransformRequest,
    ) -> Result<Option<String>, ServiceError>;
}

/// Turns a local file into a [`SourceDocument`] usable by the service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn ingest(&self, path: &Path) -> Result<SourceDocument, ServiceError>;
}

/// Persists the composite. Called once in batch mode, on every update in streaming mode.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CompositeWriter: Send + Sync {
    async fn persist(&self, composite: &Composite) -> Result<(), ServiceError>;
}

/// Purely observational; must not block.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}
