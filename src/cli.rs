use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelcast")]
#[command(author, version, about = "Chat-triggered video repost pipeline")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one session for a trigger message
    Run {
        /// The trigger message, including the source URL and any directives
        #[arg(required = true)]
        message: String,
    },

    /// Read trigger messages from stdin, one per line, running sessions
    /// concurrently up to the admission limit
    Watch,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Display version information
    Version,
}
