pub mod args;

pub use args::{Cli, CliCommand};

use crate::app;
use crate::config::Config;
use anyhow::Result;

/// One-shot live check, printed for the operator.
pub async fn handle_check_command(config: &Config) -> Result<()> {
    let online = app::check_channel(config).await?;
    let state = if online { "live" } else { "offline" };
    println!("{} is {}", config.channel, state);
    Ok(())
}
