#![doc = "chapterforge-core: chapter pipeline library for chapterforge."]

//! This crate holds the whole pipeline and its data model: splitting a source
//! document into chapters through a single analysis call, transforming every
//! chapter with bounded concurrency and retries, and reassembling the results
//! in order.
//!
//! Vendor specifics (the actual model API, files on disk, terminal output) are
//! kept out of this crate and plugged in through the traits in [`contract`].

pub mod analyze;
pub mod assemble;
pub mod config;
pub mod contract;
pub mod error;
pub mod ingest;
pub mod instructions;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod schedule;
pub mod transform;

pub use error::PipelineError;
