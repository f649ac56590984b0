//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Chat backend endpoint, overriding the configuration file
    #[arg(short, long)]
    pub endpoint: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an interactive chat session
    Chat {
        /// Client whose chat room to join
        #[arg(long)]
        client_id: String,
        /// Talk to a built-in auto-reply agent instead of the backend
        #[arg(long)]
        loopback: bool,
    },
    /// Send a single message and exit
    Send {
        /// Client whose chat room to post to
        #[arg(long)]
        client_id: String,
        /// Message content
        message: String,
    },
    /// Print the effective configuration as TOML
    Config,
}
