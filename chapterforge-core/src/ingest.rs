use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::contract::{Ingestor, ServiceError, SourceDocument, SourceLocation};

/// Reads the whole file into memory and hands it to the service inline.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileIngestor;

#[async_trait]
impl Ingestor for FileIngestor {
    async fn ingest(&self, path: &Path) -> Result<SourceDocument, ServiceError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            error!(error = ?e, path = %path.display(), "Failed to read source document");
            e
        })?;
        info!(path = %path.display(), size = bytes.len(), "Read source document");
        Ok(SourceDocument {
            display_name: display_name(path),
            mime_type: mime_type_for(path).to_string(),
            location: SourceLocation::Inline(Arc::new(bytes)),
        })
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// MIME type from the file extension; unknown extensions are sent as plain text.
pub fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("html") | Some("htm") => "text/html",
        Some("md") | Some("markdown") => "text/markdown",
        Some("rtf") => "text/rtf",
        Some("xml") => "text/xml",
        _ => "text/plain",
    }
}
