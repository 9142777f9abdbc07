//! Command definitions and structures for the CLI
//!
//! This module contains all the clap-based command line argument definitions,
//! including the main CLI structure and all subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser)]
#[command(name = "live-toasts")]
#[command(about = "Live notification feed with a bounded, auto-expiring toast queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project path for project-level configuration
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the notification feed and print every queue change
    Watch {
        /// Endpoint to connect to (overrides connection.url)
        #[arg(short, long, env = "LIVE_TOASTS_URL")]
        url: Option<String>,

        /// Maximum visible notifications (overrides queue.max_active)
        #[arg(short, long)]
        max_active: Option<usize>,
    },

    /// Decode frames read from stdin, one JSON document per line
    Decode,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Initialize global configuration (default is project-level)
        #[arg(short, long)]
        global: bool,

        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Print the path of the configuration file in use
    Path,
}
