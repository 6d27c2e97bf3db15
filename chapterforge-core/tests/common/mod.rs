#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chapterforge_core::contract::{
    Composite, CompositeWriter, Ingestor, ServiceError, SourceDocument, SourceLocation,
    TransformRequest, TransformService,
};
use serde_json::json;

pub fn sample_source() -> SourceDocument {
    SourceDocument {
        display_name: "book.txt".into(),
        mime_type: "text/plain".into(),
        location: SourceLocation::Inline(Arc::new(b"Once upon a time.".to_vec())),
    }
}

/// Analysis payload for the sentence boundary strategy.
pub fn analysis_json(title: &str, author: Option<&str>, chapters: &[&str]) -> String {
    let chapters: Vec<_> = chapters
        .iter()
        .map(|c| {
            json!({
                "title": c,
                "first_sentence": format!("{c} begins."),
                "last_sentence": format!("{c} ends."),
            })
        })
        .collect();
    let mut value = json!({ "title": title, "chapters": chapters });
    if let Some(author) = author {
        value["author"] = json!(author);
    }
    value.to_string()
}

/// Index from a unit request ("Chapter 3: ...").
pub fn unit_index(request: &TransformRequest) -> Option<usize> {
    request
        .instructions
        .strip_prefix("Chapter ")?
        .split(':')
        .next()?
        .parse()
        .ok()
}

/// Deterministic fake service.
///
/// Structured requests get the analysis payload; unit requests answer with a
/// fenced `<p>chapter N</p>` after an optional delay, failing the first
/// `failures[N]` attempts.
#[derive(Default)]
pub struct ScriptedService {
    analysis: String,
    failures: HashMap<usize, u32>,
    delays: HashMap<usize, u64>,
    default_delay_ms: u64,
    attempts: Mutex<HashMap<usize, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    unit_calls: AtomicUsize,
    analysis_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new(analysis: String) -> Self {
        Self {
            analysis,
            ..Self::default()
        }
    }

    pub fn with_chapters(chapters: &[&str]) -> Self {
        Self::new(analysis_json("A Book", Some("A. Writer"), chapters))
    }

    pub fn failing(mut self, index: usize, times: u32) -> Self {
        self.failures.insert(index, times);
        self
    }

    pub fn delayed(mut self, index: usize, ms: u64) -> Self {
        self.delays.insert(index, ms);
        self
    }

    pub fn with_default_delay(mut self, ms: u64) -> Self {
        self.default_delay_ms = ms;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn unit_calls(&self) -> usize {
        self.unit_calls.load(Ordering::SeqCst)
    }

    pub fn analysis_calls(&self) -> usize {
        self.analysis_calls.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, index: usize) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&index)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TransformService for ScriptedService {
    async fn transform(
        &self,
        _source: &SourceDocument,
        request: &TransformRequest,
    ) -> Result<Option<String>, ServiceError> {
        if request.schema.is_some() {
            self.analysis_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(Some(self.analysis.clone()));
        }

        let index = unit_index(request).ok_or("request without chapter index")?;
        self.unit_calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(index).or_insert(0);
            *counter += 1;
            *counter
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .delays
            .get(&index)
            .copied()
            .unwrap_or(self.default_delay_ms);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if attempt <= self.failures.get(&index).copied().unwrap_or(0) {
            return Err(format!("transient failure on chapter {index}").into());
        }
        Ok(Some(format!("```html\n<p>chapter {index}</p>\n```")))
    }
}

/// Keeps every persisted composite.
#[derive(Default)]
pub struct MemoryWriter {
    snapshots: Mutex<Vec<Composite>>,
}

impl MemoryWriter {
    pub fn snapshots(&self) -> Vec<Composite> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Composite> {
        self.snapshots.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompositeWriter for MemoryWriter {
    async fn persist(&self, composite: &Composite) -> Result<(), ServiceError> {
        self.snapshots.lock().unwrap().push(composite.clone());
        Ok(())
    }
}

/// Ingestor that never touches the file system.
pub struct FixedIngestor;

#[async_trait]
impl Ingestor for FixedIngestor {
    async fn ingest(&self, _path: &Path) -> Result<SourceDocument, ServiceError> {
        Ok(sample_source())
    }
}
