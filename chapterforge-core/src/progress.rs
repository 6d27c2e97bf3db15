//! Ready-made [`ProgressSink`] implementations.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::contract::{Phase, ProgressEvent, ProgressSink};

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: &ProgressEvent) {
        match event.phase {
            Phase::Started | Phase::Succeeded => info!(
                unit = %event.unit_id,
                phase = ?event.phase,
                label = %event.label,
                "[PROGRESS]"
            ),
            Phase::Retrying | Phase::Failed => warn!(
                unit = %event.unit_id,
                phase = ?event.phase,
                attempt = event.attempt,
                label = %event.label,
                "[PROGRESS]"
            ),
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events emitted under one correlation id.
    pub fn events_for(&self, unit_id: &str) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.unit_id == unit_id)
            .collect()
    }

    pub fn phases_for(&self, unit_id: &str) -> Vec<Phase> {
        self.events_for(unit_id)
            .into_iter()
            .map(|event| event.phase)
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
