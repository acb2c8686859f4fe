//! CLI type definitions
//!
//! Clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::classify::ClassifyArgs;
use super::commands::policy::PolicyArgs;
use super::commands::queue::QueueArgs;

#[derive(Parser, Debug)]
#[command(name = "seaworthy")]
#[command(about = "Seaworthy - adaptive network resilience toolkit", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .seaworthy/config.yaml + local.yaml)
    #[arg(short, long, global = true, env = "SEAWORTHY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the behaviour policy for every connection tier
    Policy(PolicyArgs),

    /// Classify network signals into a connection tier
    Classify(ClassifyArgs),

    /// Inspect and replay the offline action queue
    Queue(QueueArgs),
}
