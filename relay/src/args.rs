use std::path::PathBuf;

use clap::Parser;

/// Relay provider adapter
#[derive(Debug, Parser)]
#[command(name = "relay", about = "Stream an OpenAI-compatible completion as Anthropic-style SSE")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml", env = "RELAY_CONFIG")]
    pub config: PathBuf,

    /// JSON file holding the chat request, `-` for stdin
    #[arg(short, long, default_value = "-")]
    pub request: PathBuf,

    /// Override the request's model, e.g. `lmstudio/qwen3-8b`
    #[arg(short, long)]
    pub model: Option<String>,
}
