//! Order-preserving fan-in of unit results.
//!
//! The composite is seeded with one slot per unit from the metadata, so its
//! chapter order is fixed before any result arrives. Results fill their own
//! slot by index, whatever order they complete in.
//!
//! - [`DeliveryMode::Batch`]: persisted once, from [`Assembler::finish`].
//! - [`DeliveryMode::Streaming`]: the skeleton is persisted by
//!   [`Assembler::begin`] and the full composite again after every update.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::DeliveryMode;
use crate::contract::{
    ChapterSlot, Composite, CompositeWriter, DocumentMetadata, SlotState, UnitResult,
};
use crate::error::PipelineError;

/// Builds the final composite from a complete set of results.
pub fn assemble(metadata: &DocumentMetadata, results: Vec<UnitResult>) -> Result<Composite, PipelineError> {
    let mut composite = seed(metadata);
    for result in results {
        fill(&mut composite, result)?;
    }
    if let Some(missing) = composite
        .chapters
        .iter()
        .find(|slot| slot.state == SlotState::Pending)
    {
        return Err(PipelineError::Assembly(format!(
            "unit {} ({}) has no result",
            missing.index, missing.title
        )));
    }
    Ok(composite)
}

fn seed(metadata: &DocumentMetadata) -> Composite {
    Composite {
        title: metadata.title.clone(),
        author: metadata.author.clone(),
        chapters: metadata
            .units
            .iter()
            .map(|unit| ChapterSlot {
                index: unit.index,
                title: unit.title.clone(),
                state: SlotState::Pending,
            })
            .collect(),
    }
}

fn slot_mut(composite: &mut Composite, index: usize) -> Result<&mut ChapterSlot, PipelineError> {
    let slot = composite
        .chapters
        .iter_mut()
        .find(|slot| slot.index == index)
        .ok_or_else(|| PipelineError::Assembly(format!("unknown unit index {index}")))?;
    if slot.state != SlotState::Pending {
        return Err(PipelineError::Assembly(format!(
            "unit {index} was delivered more than once"
        )));
    }
    Ok(slot)
}

fn fill(composite: &mut Composite, result: UnitResult) -> Result<(), PipelineError> {
    let slot = slot_mut(composite, result.index)?;
    slot.state = SlotState::Filled(result.body);
    Ok(())
}

pub struct Assembler {
    composite: Composite,
    mode: DeliveryMode,
    writer: Arc<dyn CompositeWriter>,
    writes: usize,
}

impl Assembler {
    pub fn new(metadata: &DocumentMetadata, mode: DeliveryMode, writer: Arc<dyn CompositeWriter>) -> Self {
        Self {
            composite: seed(metadata),
            mode,
            writer,
            writes: 0,
        }
    }

    /// Persists the placeholder skeleton in streaming mode.
    pub async fn begin(&mut self) -> Result<(), PipelineError> {
        if self.mode == DeliveryMode::Streaming {
            info!(chapters = self.composite.chapters.len(), "[ASSEMBLE] Writing streaming skeleton");
            self.persist().await?;
        }
        Ok(())
    }

    pub async fn accept(&mut self, result: UnitResult) -> Result<(), PipelineError> {
        debug!(index = result.index, "[ASSEMBLE] Accepting unit result");
        fill(&mut self.composite, result)?;
        if self.mode == DeliveryMode::Streaming {
            self.persist().await?;
        }
        Ok(())
    }

    pub async fn mark_failed(&mut self, index: usize, reason: &str) -> Result<(), PipelineError> {
        let slot = slot_mut(&mut self.composite, index)?;
        slot.state = SlotState::Failed(reason.to_string());
        if self.mode == DeliveryMode::Streaming {
            self.persist().await?;
        }
        Ok(())
    }

    pub fn composite(&self) -> &Composite {
        &self.composite
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.composite
            .chapters
            .iter()
            .filter(|slot| matches!(slot.state, SlotState::Failed(_)))
            .map(|slot| slot.index)
            .collect()
    }

    /// Number of times the composite has been persisted so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Closes the assembly. Every slot must be filled or failed.
    pub async fn finish(mut self) -> Result<Composite, PipelineError> {
        if let Some(missing) = self
            .composite
            .chapters
            .iter()
            .find(|slot| slot.state == SlotState::Pending)
        {
            return Err(PipelineError::Assembly(format!(
                "unit {} ({}) has no result",
                missing.index, missing.title
            )));
        }
        if self.mode == DeliveryMode::Batch {
            self.persist().await?;
        }
        info!(
            chapters = self.composite.chapters.len(),
            writes = self.writes,
            "[ASSEMBLE] Composite complete"
        );
        Ok(self.composite)
    }

    async fn persist(&mut self) -> Result<(), PipelineError> {
        self.writer.persist(&self.composite).await.map_err(|e| {
            error!(error = %e, "[ASSEMBLE][ERROR] Failed to persist composite");
            PipelineError::Output(e.to_string())
        })?;
        self.writes += 1;
        Ok(())
    }
}
