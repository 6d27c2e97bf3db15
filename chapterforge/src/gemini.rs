#![doc = "Gemini integration: implements the core's TransformService and Ingestor traits against the Generative Language REST API."]
//
//! # Gemini Integration (CLI <-> Core)
//!
//! - [`GeminiClient`] sends one `generateContent` request per transformation
//!   call, attaching the source document either inline (base64) or by the URI
//!   returned from the file API.
//! - [`GeminiUploader`] uploads the source once through the resumable upload
//!   protocol and waits until the file is `ACTIVE`.
//!
//! Retries are not handled here: a failed request is reported as an error and
//! the core's transform client decides whether to try again.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chapterforge_core::contract::{
    Ingestor, ServiceError, SourceDocument, SourceLocation, TransformRequest, TransformService,
};
use chapterforge_core::ingest::{display_name, mime_type_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::load_config::RunSettings;

const API_KEY_HEADER: &str = "x-goog-api-key";
const FILE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const FILE_POLL_LIMIT: u32 = 60;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    Text(&'a str),
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
        data: String,
    },
    FileData {
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
        #[serde(rename = "fileUri")]
        file_uri: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    uri: String,
    #[serde(default)]
    state: Option<String>,
}

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(settings: &RunSettings) -> Self {
        tracing::info!(
            model = %settings.service.model,
            api_key_set = !settings.api_key.is_empty(),
            "Initialized GeminiClient"
        );
        Self {
            http: reqwest::Client::new(),
            endpoint: settings.service.endpoint.trim_end_matches('/').to_string(),
            model: settings.service.model.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

#[async_trait]
impl TransformService for GeminiClient {
    async fn transform(
        &self,
        source: &SourceDocument,
        request: &TransformRequest,
    ) -> Result<Option<String>, ServiceError> {
        let document = match &source.location {
            SourceLocation::Inline(bytes) => Part::InlineData {
                mime_type: &source.mime_type,
                data: STANDARD.encode(bytes.as_slice()),
            },
            SourceLocation::Remote { uri } => Part::FileData {
                mime_type: &source.mime_type,
                file_uri: uri,
            },
        };
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![document, Part::Text(&request.instructions)],
            }],
            generation_config: request.schema.as_ref().map(|schema| GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            }),
        };

        tracing::debug!(model = %self.model, structured = request.schema.is_some(), "Sending generateContent request");
        let response = self
            .http
            .post(self.generate_url())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(%status, detail = %detail, "generateContent returned an error status");
            return Err(format!("generateContent failed with {status}: {detail}").into());
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(extract_text(parsed))
    }
}

fn extract_text(response: GenerateResponse) -> Option<String> {
    let candidate = response.candidates.into_iter().next()?;
    if let Some(reason) = &candidate.finish_reason {
        tracing::debug!(finish_reason = %reason, "Candidate finished");
    }
    let text: String = candidate
        .content?
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Uploads the source through the file API so each request only carries its URI.
pub struct GeminiUploader {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiUploader {
    pub fn new(settings: &RunSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: settings.service.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        }
    }

    async fn wait_until_active(&self, mut file: RemoteFile) -> Result<RemoteFile, ServiceError> {
        for _ in 0..FILE_POLL_LIMIT {
            let state = file.state.clone();
            match state.as_deref() {
                None | Some("ACTIVE") => return Ok(file),
                Some("FAILED") => {
                    return Err(format!("file {} failed processing", file.name).into())
                }
                Some(state) => {
                    tracing::debug!(file = %file.name, state, "Waiting for uploaded file to become active");
                    tokio::time::sleep(FILE_POLL_INTERVAL).await;
                }
            }
            file = self
                .http
                .get(format!("{}/v1beta/{}", self.endpoint, file.name))
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
        }
        Err(format!("file {} did not become active in time", file.name).into())
    }
}

#[async_trait]
impl Ingestor for GeminiUploader {
    async fn ingest(&self, path: &Path) -> Result<SourceDocument, ServiceError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            tracing::error!(error = ?e, path = %path.display(), "Failed to read source document");
            e
        })?;
        let name = display_name(path);
        let mime_type = mime_type_for(path);
        tracing::info!(file = %name, size = bytes.len(), mime_type, "Uploading source document");

        let start = self
            .http
            .post(format!("{}/upload/v1beta/files", self.endpoint))
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": name } }))
            .send()
            .await?
            .error_for_status()?;
        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .ok_or("upload session did not return an upload URL")?
            .to_string();

        let uploaded: UploadResponse = self
            .http
            .post(upload_url)
            .header("X-Goog-Upload-Offset", 0)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let file = self.wait_until_active(uploaded.file).await?;
        tracing::info!(file = %file.name, uri = %file.uri, "Source document uploaded");
        Ok(SourceDocument {
            display_name: name,
            mime_type: mime_type.to_string(),
            location: SourceLocation::Remote { uri: file.uri },
        })
    }
}
