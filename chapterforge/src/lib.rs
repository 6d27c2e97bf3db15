pub mod cli;
pub mod gemini;
pub mod load_config;
pub mod output;
pub mod progress;

pub use cli::{run, Cli, Commands};
