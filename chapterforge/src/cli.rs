///
/// This module implements the CLI interface for chapterforge: command parsing,
/// settings resolution and wiring the concrete collaborators into the core
/// pipeline.
///
/// All pipeline logic (analysis, scheduling, retries, assembly) lives in the
/// [`chapterforge-core`] crate. This module is strictly CLI glue.
///
/// - For command-line users: use the installed `chapterforge` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`chapterforge-core`]: ../../chapterforge-core/
use crate::gemini::{GeminiClient, GeminiUploader};
use crate::load_config::{load_config, resolve_settings, Overrides};
use crate::output::FileOutput;
use crate::progress::ConsoleProgress;
use anyhow::Result;
use chapterforge_core::contract::Ingestor;
use chapterforge_core::ingest::FileIngestor;
use chapterforge_core::pipeline::{self, ChapterStatus, Collaborators, RunReport};
use chapterforge_core::PipelineError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for chapterforge: convert a long document into a chaptered HTML book.
#[derive(Parser)]
#[clap(
    name = "chapterforge",
    version,
    about = "Split a document into chapters with an LLM, convert each chapter, and reassemble them in order"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a document into a single HTML (or JSON) book
    Convert {
        /// Source document (PDF, text, markdown, ...)
        #[clap(long, short)]
        input: PathBuf,
        /// Output file; `.json` writes the raw composite, anything else HTML
        #[clap(long, short)]
        output: PathBuf,
        /// Optional YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// API key (defaults to the GEMINI_API_KEY environment variable)
        #[clap(long)]
        api_key: Option<String>,
        /// Model identifier
        #[clap(long)]
        model: Option<String>,
        /// Maximum number of chapters converted at the same time
        #[clap(long)]
        concurrency: Option<usize>,
        /// Rewrite the output after every finished chapter
        #[clap(long)]
        stream: bool,
        /// Keep converting when a chapter fails; still exits non-zero at the end
        #[clap(long)]
        keep_going: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Convert {
            input,
            output,
            config,
            api_key,
            model,
            concurrency,
            stream,
            keep_going,
        } => {
            let file_config = config.map(load_config).transpose()?;
            let settings = resolve_settings(
                file_config,
                Overrides {
                    api_key,
                    model,
                    concurrency,
                    stream,
                    keep_going,
                },
            )?;

            let ingestor: Arc<dyn Ingestor> = if settings.service.upload {
                Arc::new(GeminiUploader::new(&settings))
            } else {
                Arc::new(FileIngestor)
            };
            let writer = Arc::new(FileOutput::new(&output));
            let parts = Collaborators {
                ingestor,
                service: Arc::new(GeminiClient::new(&settings)),
                writer: writer.clone(),
                progress: Arc::new(ConsoleProgress),
            };

            tracing::info!(command = "convert", input = %input.display(), output = %writer.path().display(), "Starting conversion");
            match pipeline::run(&settings.pipeline, &input, &parts).await {
                Ok(report) => {
                    tracing::info!(command = "convert", run_id = %report.run_id, "Conversion complete");
                    print_report(&report, &writer);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "convert", error = %e, "Conversion failed");
                    if let PipelineError::Incomplete { report, .. } = &e {
                        print_report(report, &writer);
                    }
                    if let Some(raw) = e.raw_payload() {
                        eprintln!("[ERROR] Raw service response:\n{raw}");
                    }
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}

fn print_report(report: &RunReport, output: &FileOutput) {
    println!("Converted \"{}\" by {}", report.title, report.author);
    for chapter in &report.chapters {
        match &chapter.status {
            ChapterStatus::Converted { bytes } => {
                println!("  {:>3}. {} ({bytes} bytes)", chapter.index, chapter.title)
            }
            ChapterStatus::Failed { reason } => {
                println!("  {:>3}. {} FAILED: {reason}", chapter.index, chapter.title)
            }
        }
    }
    println!("Wrote {}", output.path().display());
}
