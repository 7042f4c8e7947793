//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backend API base URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Channel server URL
    #[arg(long)]
    pub channel_url: Option<String>,

    /// Start in offline mode
    #[arg(long)]
    pub offline: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive chat (default)
    Chat,
    /// Sign in as a participant and store the token in the keyring
    Login {
        /// Participant id
        #[arg(long)]
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Bearer token for the backend
        #[arg(long, env = "PARLEY_TOKEN")]
        token: String,
    },
    /// Forget the signed-in participant and drop cached data
    Logout,
    /// Write the effective configuration to the config file
    SaveConfig,
}
