use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// aihttp command-line client
#[derive(Debug, Parser)]
#[command(name = "aihttp", about = "Send completions to OpenAI, Anthropic, Gemini, Grok and OpenRouter")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "aihttp.toml", env = "AIHTTP_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a single prompt
    Send {
        /// Configured provider name
        provider: String,
        /// User prompt
        prompt: String,
        /// Model to use instead of the provider default
        #[arg(short, long)]
        model: Option<String>,
        /// Print the response as it streams
        #[arg(short, long)]
        stream: bool,
        /// System instruction
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f64>,
    },
    /// List models offered by a provider
    Models {
        /// Configured provider name
        provider: String,
    },
    /// Check that a provider accepts requests
    Test {
        /// Configured provider name
        provider: String,
    },
}
