use crate::config::ConfigLayer;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stream-recorder")]
#[command(about = "Record a live channel every time it goes online", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub settings: ConfigLayer,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliCommand {
    /// Watch the channel and record until interrupted (default)
    Run,
    /// Ask the platform once whether the channel is live
    Check,
    /// Print version information
    Version,
}
