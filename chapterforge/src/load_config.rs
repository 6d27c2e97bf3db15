/// `load_config` module: loads the optional YAML config and merges it with
/// command-line overrides and environment secrets into one [`RunSettings`].
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into typed sections
/// - Apply CLI flag overrides on top (flags win)
/// - Inject the API key from the environment (`GEMINI_API_KEY`) when no flag sets it
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics,
/// and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use chapterforge_core::config::{DeliveryMode, FailurePolicy, PipelineConfig};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub service: ServiceSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub model: String,
    pub endpoint: String,
    /// Upload the document once through the file API instead of inlining it in every request.
    pub upload: bool,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            upload: true,
        }
    }
}

/// Flag values that override the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub concurrency: Option<usize>,
    pub stream: bool,
    pub keep_going: bool,
}

/// Everything a run needs, fully resolved.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub pipeline: PipelineConfig,
    pub service: ServiceSection,
    pub api_key: String,
}

/// Loads a static YAML config file (no secrets).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let config: CliConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");
    Ok(config)
}

/// Merges file config (if any), flag overrides and the environment.
pub fn resolve_settings(config: Option<CliConfig>, overrides: Overrides) -> Result<RunSettings> {
    let CliConfig {
        mut pipeline,
        mut service,
    } = config.unwrap_or_default();

    if let Some(model) = overrides.model {
        service.model = model;
    }
    if let Some(concurrency) = overrides.concurrency {
        pipeline.max_concurrency = concurrency;
    }
    if overrides.stream {
        pipeline.delivery = DeliveryMode::Streaming;
    }
    if overrides.keep_going {
        pipeline.on_unit_failure = FailurePolicy::Continue;
    }
    pipeline
        .validate()
        .context("Invalid pipeline configuration")?;

    let api_key = match overrides.api_key {
        Some(key) => key,
        None => std::env::var(API_KEY_ENV).map_err(|e| {
            error!(error = ?e, "{API_KEY_ENV} missing in environment");
            anyhow::anyhow!("No API key: pass --api-key or set {API_KEY_ENV}")
        })?,
    };
    if api_key.trim().is_empty() {
        anyhow::bail!("API key is empty");
    }

    info!(
        model = %service.model,
        endpoint = %service.endpoint,
        upload = service.upload,
        "Resolved service settings"
    );
    pipeline.trace_loaded();
    Ok(RunSettings {
        pipeline,
        service,
        api_key,
    })
}
