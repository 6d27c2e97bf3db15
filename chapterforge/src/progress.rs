use std::io::Write;

use chapterforge_core::contract::{Phase, ProgressEvent, ProgressSink};

/// Prints one human-readable line per progress event to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

pub fn format_event(event: &ProgressEvent) -> String {
    let status = match (event.phase, event.attempt) {
        (Phase::Started, _) => "started".to_string(),
        (Phase::Retrying, Some(attempt)) => format!("retrying (attempt {attempt})"),
        (Phase::Retrying, None) => "retrying".to_string(),
        (Phase::Succeeded, _) => "done".to_string(),
        (Phase::Failed, Some(attempts)) => format!("FAILED after {attempts} attempt(s)"),
        (Phase::Failed, None) => "FAILED".to_string(),
    };
    format!("[{}] {}: {}", event.unit_id, event.label, status)
}

impl ProgressSink for ConsoleProgress {
    fn emit(&self, event: &ProgressEvent) {
        let line = format_event(event);
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }
}
