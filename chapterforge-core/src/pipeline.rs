//! High-level pipeline: ingest → analyse → schedule → assemble.
//!
//! This module wires the collaborators together for one run:
//!   - Ingests the source document through an [`Ingestor`]
//!   - Asks the service for title, author and the flat chapter list ([`DocumentAnalyzer`])
//!   - Transforms every chapter with bounded concurrency ([`UnitScheduler`])
//!   - Fills the composite in chapter order and persists it ([`Assembler`])
//!
//! # Error Handling
//! Ingestion, analysis and output failures end the run immediately. A unit
//! failure either aborts the run and cancels the remaining workers
//! ([`FailurePolicy::Abort`], the default) or is recorded in its slot and
//! reported as [`PipelineError::Incomplete`] once the composite has been
//! persisted ([`FailurePolicy::Continue`]).
//!
//! In streaming mode a partially filled composite may already be on disk when
//! a run aborts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analyze::DocumentAnalyzer;
use crate::assemble::Assembler;
use crate::config::{FailurePolicy, PipelineConfig};
use crate::contract::{
    Composite, CompositeWriter, Ingestor, ProgressSink, SlotState, TransformService,
};
use crate::error::PipelineError;
use crate::schedule::{UnitOutcome, UnitScheduler};
use crate::transform::TransformClient;

/// The external collaborators a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub ingestor: Arc<dyn Ingestor>,
    pub service: Arc<dyn TransformService>,
    pub writer: Arc<dyn CompositeWriter>,
    pub progress: Arc<dyn ProgressSink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterStatus {
    Converted { bytes: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterReport {
    pub index: usize,
    pub title: String,
    pub status: ChapterStatus,
}

/// Summary of a finished run. Only settled slots are listed, which after
/// [`Assembler::finish`] means every chapter.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub title: String,
    pub author: String,
    pub chapters: Vec<ChapterReport>,
}

impl RunReport {
    fn from_composite(run_id: Uuid, composite: &Composite) -> Self {
        let chapters = composite
            .chapters
            .iter()
            .filter_map(|slot| {
                let status = match &slot.state {
                    SlotState::Filled(body) => ChapterStatus::Converted { bytes: body.len() },
                    SlotState::Failed(reason) => ChapterStatus::Failed {
                        reason: reason.clone(),
                    },
                    SlotState::Pending => return None,
                };
                Some(ChapterReport {
                    index: slot.index,
                    title: slot.title.clone(),
                    status,
                })
            })
            .collect();
        Self {
            run_id,
            title: composite.title.clone(),
            author: composite.author.clone(),
            chapters,
        }
    }

    pub fn converted(&self) -> usize {
        self.chapters
            .iter()
            .filter(|c| matches!(c.status, ChapterStatus::Converted { .. }))
            .count()
    }

    pub fn failed(&self) -> Vec<usize> {
        self.chapters
            .iter()
            .filter(|c| matches!(c.status, ChapterStatus::Failed { .. }))
            .map(|c| c.index)
            .collect()
    }
}

/// Runs the full pipeline for one input document.
pub async fn run(
    config: &PipelineConfig,
    input: &Path,
    parts: &Collaborators,
) -> Result<RunReport, PipelineError> {
    config.validate()?;
    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id);
    execute(config, input, parts, run_id).instrument(span).await
}

async fn execute(
    config: &PipelineConfig,
    input: &Path,
    parts: &Collaborators,
    run_id: Uuid,
) -> Result<RunReport, PipelineError> {
    info!(input = %input.display(), "[RUN] Starting chapter pipeline");
    config.trace_loaded();

    let source = parts.ingestor.ingest(input).await.map_err(|e| {
        error!(error = %e, input = %input.display(), "[RUN][ERROR] Ingestion failed");
        PipelineError::Ingestion {
            path: input.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    info!(source = %source.display_name, mime_type = %source.mime_type, "[RUN] Source ingested");

    let client = Arc::new(
        TransformClient::new(Arc::clone(&parts.service), source, Arc::clone(&parts.progress))
            .with_max_attempts(config.max_attempts)
            .with_retry_jitter(Duration::from_millis(config.retry_jitter_ms)),
    );

    let metadata = DocumentAnalyzer::new(config.boundary)
        .analyze(&client)
        .await?;

    let scheduler = UnitScheduler::new(client, config.max_concurrency);
    let mut assembler = Assembler::new(&metadata, config.delivery, Arc::clone(&parts.writer));
    assembler.begin().await?;
    let mut workers = scheduler.spawn_all(&metadata.units)?;

    while let Some(outcome) = workers.next().await {
        match outcome {
            UnitOutcome::Completed(result) => assembler.accept(result).await?,
            UnitOutcome::Failed(failure) => match config.on_unit_failure {
                FailurePolicy::Abort => {
                    error!(index = failure.index, "[RUN][ERROR] Unit failed, aborting run");
                    workers.cancel();
                    return Err(failure.into());
                }
                FailurePolicy::Continue => {
                    warn!(index = failure.index, reason = %failure.reason, "[RUN] Unit failed, continuing");
                    assembler.mark_failed(failure.index, &failure.reason).await?;
                }
            },
        }
    }

    let composite = assembler.finish().await?;
    let report = RunReport::from_composite(run_id, &composite);
    let failed = report.failed();
    info!(
        title = %report.title,
        converted = report.converted(),
        failed = failed.len(),
        "[RUN] Chapter pipeline finished"
    );

    if !failed.is_empty() {
        return Err(PipelineError::Incomplete {
            failed,
            report: Box::new(report),
        });
    }
    Ok(report)
}
