//! Turns one structured service response into [`DocumentMetadata`].

use serde::Deserialize;
use tracing::{error, info};

use crate::config::BoundaryStrategy;
use crate::contract::{BoundaryHint, DocumentMetadata, UnitDescriptor};
use crate::error::PipelineError;
use crate::instructions::analysis_request;
use crate::transform::{ResponseFormat, TransformClient};

pub const ANALYSIS_CALL_ID: &str = "analysis";
pub const DEFAULT_AUTHOR: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct RawMetadata {
    title: String,
    #[serde(default)]
    author: Option<String>,
    chapters: Vec<RawChapter>,
}

#[derive(Debug, Deserialize)]
struct RawChapter {
    title: String,
    #[serde(default)]
    first_sentence: Option<String>,
    #[serde(default)]
    last_sentence: Option<String>,
}

pub struct DocumentAnalyzer {
    strategy: BoundaryStrategy,
}

impl DocumentAnalyzer {
    pub fn new(strategy: BoundaryStrategy) -> Self {
        Self { strategy }
    }

    pub async fn analyze(&self, client: &TransformClient) -> Result<DocumentMetadata, PipelineError> {
        info!(strategy = ?self.strategy, source = %client.source().display_name, "[ANALYZE] Requesting document metadata");
        let request = analysis_request(self.strategy);
        let raw = client
            .call(ANALYSIS_CALL_ID, "Analysing document", &request, ResponseFormat::Json)
            .await
            .map_err(|failure| PipelineError::Analysis {
                attempts: failure.attempts,
                reason: failure.last_error,
            })?;

        let metadata = parse_metadata(&raw, self.strategy)?;
        info!(
            title = %metadata.title,
            author = %metadata.author,
            units = metadata.units.len(),
            "[ANALYZE] Document metadata ready"
        );
        Ok(metadata)
    }
}

/// Parses and validates the analysis payload.
pub fn parse_metadata(raw: &str, strategy: BoundaryStrategy) -> Result<DocumentMetadata, PipelineError> {
    let parsed: RawMetadata = serde_json::from_str(raw).map_err(|e| {
        error!(error = %e, "[ANALYZE][ERROR] Metadata payload is not valid JSON for the expected shape");
        PipelineError::MalformedMetadata {
            reason: e.to_string(),
            raw: raw.to_string(),
        }
    })?;

    if parsed.chapters.is_empty() {
        error!("[ANALYZE][ERROR] Metadata payload lists no chapters");
        return Err(PipelineError::MalformedMetadata {
            reason: "no chapters found".into(),
            raw: raw.to_string(),
        });
    }

    let author = parsed
        .author
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_AUTHOR.to_string());

    let next_titles: Vec<Option<String>> = parsed
        .chapters
        .iter()
        .skip(1)
        .map(|c| Some(c.title.clone()))
        .chain(std::iter::once(None))
        .collect();

    let units = parsed
        .chapters
        .into_iter()
        .zip(next_titles)
        .enumerate()
        .map(|(position, (chapter, next_title))| {
            let boundary = match strategy {
                BoundaryStrategy::Sentences => {
                    let first = non_blank(chapter.first_sentence);
                    let last = non_blank(chapter.last_sentence);
                    match (first, last) {
                        (Some(first), Some(last)) => BoundaryHint::Sentences { first, last },
                        _ => {
                            error!(chapter = %chapter.title, "[ANALYZE][ERROR] Chapter lacks its boundary sentences");
                            return Err(PipelineError::MalformedMetadata {
                                reason: format!(
                                    "chapter {} ({}) is missing its first or last sentence",
                                    position + 1,
                                    chapter.title
                                ),
                                raw: raw.to_string(),
                            });
                        }
                    }
                }
                BoundaryStrategy::NextTitle => BoundaryHint::NextTitle(next_title),
            };
            Ok(UnitDescriptor {
                index: position + 1,
                title: chapter.title,
                boundary: Some(boundary),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DocumentMetadata {
        title: parsed.title,
        author,
        units,
    })
}

fn non_blank(sentence: Option<String>) -> Option<String> {
    sentence.filter(|s| !s.trim().is_empty())
}
