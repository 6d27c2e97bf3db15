//! Bounded fan-out of one worker per unit.
//!
//! All workers share a single semaphore sized to `max_concurrency`, so the
//! bound holds across the whole run rather than per batch. A worker holds its
//! permit for the full duration of its (retried) transformation call. Outcomes
//! are yielded in completion order; ordering by index is the assembler's job.
//!
//! Dropping a [`ScheduledRun`] aborts every worker still running.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::contract::{UnitDescriptor, UnitResult};
use crate::error::PipelineError;
use crate::instructions::unit_request;
use crate::transform::{ResponseFormat, TransformClient};

/// A unit whose transformation call ended in `FailedFatal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub index: usize,
    pub title: String,
    pub attempts: u32,
    pub reason: String,
}

impl From<UnitFailure> for PipelineError {
    fn from(f: UnitFailure) -> Self {
        PipelineError::UnitFatal {
            index: f.index,
            title: f.title,
            attempts: f.attempts,
            reason: f.reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed(UnitResult),
    Failed(UnitFailure),
}

impl UnitOutcome {
    pub fn index(&self) -> usize {
        match self {
            UnitOutcome::Completed(r) => r.index,
            UnitOutcome::Failed(f) => f.index,
        }
    }
}

/// Correlation id used for a unit's progress events.
pub fn unit_call_id(index: usize) -> String {
    format!("chapter-{index}")
}

pub struct UnitScheduler {
    client: Arc<TransformClient>,
    max_concurrency: usize,
}

impl UnitScheduler {
    pub fn new(client: Arc<TransformClient>, max_concurrency: usize) -> Self {
        Self {
            client,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Spawns one worker per unit and returns the live run.
    ///
    /// Must be called from within a tokio runtime. An empty unit list is
    /// rejected before anything is spawned.
    pub fn spawn_all(&self, units: &[UnitDescriptor]) -> Result<ScheduledRun, PipelineError> {
        if units.is_empty() {
            error!("[SCHED][ERROR] Refusing to schedule an empty unit list");
            return Err(PipelineError::EmptyRun);
        }
        info!(
            units = units.len(),
            max_concurrency = self.max_concurrency,
            "[SCHED] Dispatching unit workers"
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut workers = JoinSet::new();
        for unit in units.iter().cloned() {
            workers.spawn(run_unit(
                Arc::clone(&self.client),
                Arc::clone(&permits),
                unit,
            ));
        }
        Ok(ScheduledRun {
            workers,
            remaining: units.len(),
        })
    }

    /// Runs every unit and returns the results ordered by index.
    ///
    /// The first unit failure aborts the remaining workers and is returned as
    /// [`PipelineError::UnitFatal`].
    pub async fn schedule_all(&self, units: &[UnitDescriptor]) -> Result<Vec<UnitResult>, PipelineError> {
        let mut run = self.spawn_all(units)?;
        let mut results = Vec::with_capacity(units.len());
        while let Some(outcome) = run.next().await {
            match outcome {
                UnitOutcome::Completed(result) => results.push(result),
                UnitOutcome::Failed(failure) => return Err(failure.into()),
            }
        }
        results.sort_by_key(|r| r.index);
        Ok(results)
    }
}

async fn run_unit(client: Arc<TransformClient>, permits: Arc<Semaphore>, unit: UnitDescriptor) -> UnitOutcome {
    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            return UnitOutcome::Failed(UnitFailure {
                index: unit.index,
                title: unit.title,
                attempts: 0,
                reason: e.to_string(),
            })
        }
    };

    let call_id = unit_call_id(unit.index);
    debug!(index = unit.index, title = %unit.title, "[SCHED] Worker acquired permit");
    let request = unit_request(&unit);
    match client
        .call(&call_id, &unit.title, &request, ResponseFormat::Markup)
        .await
    {
        Ok(body) => {
            info!(index = unit.index, title = %unit.title, bytes = body.len(), "[SCHED] Unit transformed");
            UnitOutcome::Completed(UnitResult {
                index: unit.index,
                title: unit.title,
                body,
            })
        }
        Err(failure) => {
            error!(index = unit.index, title = %unit.title, attempts = failure.attempts, "[SCHED][ERROR] Unit failed");
            UnitOutcome::Failed(UnitFailure {
                index: unit.index,
                title: unit.title,
                attempts: failure.attempts,
                reason: failure.last_error,
            })
        }
    }
}

/// Outcomes of a dispatched run, in completion order.
pub struct ScheduledRun {
    workers: JoinSet<UnitOutcome>,
    remaining: usize,
}

impl ScheduledRun {
    /// Units that have not reported an outcome yet.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Aborts all workers still in flight.
    pub fn cancel(&mut self) {
        if self.remaining > 0 {
            info!(remaining = self.remaining, "[SCHED] Cancelling in-flight workers");
        }
        self.workers.abort_all();
    }
}

impl Stream for ScheduledRun {
    type Item = UnitOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<UnitOutcome>> {
        loop {
            match self.workers.poll_join_next(cx) {
                Poll::Ready(Some(Ok(outcome))) => {
                    self.remaining = self.remaining.saturating_sub(1);
                    return Poll::Ready(Some(outcome));
                }
                Poll::Ready(Some(Err(e))) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                // cancelled worker, nothing to report
                Poll::Ready(Some(Err(_))) => {
                    self.remaining = self.remaining.saturating_sub(1);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
