//! File-backed [`CompositeWriter`]: an HTML page or a JSON dump, chosen by extension.
//!
//! Every write goes to a temporary file in the destination directory and is
//! then renamed over the target, so a reader never sees a half-written file
//! while streaming mode rewrites it.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chapterforge_core::contract::{Composite, CompositeWriter, ServiceError};
use chapterforge_core::render::render_html;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Html,
    Json,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Html,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileOutput {
    path: PathBuf,
    format: OutputFormat,
}

impl FileOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = OutputFormat::from_path(&path);
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn render(&self, composite: &Composite) -> Result<String, ServiceError> {
        Ok(match self.format {
            OutputFormat::Html => render_html(composite),
            OutputFormat::Json => serde_json::to_string_pretty(composite)?,
        })
    }

    fn write_atomically(&self, contents: &str) -> Result<(), ServiceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| {
            error!(error = ?e.error, path = %self.path.display(), "Failed to move output into place");
            e.error
        })?;
        Ok(())
    }
}

#[async_trait]
impl CompositeWriter for FileOutput {
    async fn persist(&self, composite: &Composite) -> Result<(), ServiceError> {
        let contents = self.render(composite)?;
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.write_atomically(&contents)).await??;
        debug!(
            path = %self.path.display(),
            chapters = composite.chapters.len(),
            "Composite written"
        );
        Ok(())
    }
}
