use anyhow::Result;
use clap::Parser;
use stream_recorder::{
    app,
    cli::{handle_check_command, Cli, CliCommand},
    config::{Config, ConfigLayer},
};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let command = cli.command.unwrap_or(CliCommand::Run);
    if let Err(e) = dispatch(command, cli.settings).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn dispatch(command: CliCommand, settings: ConfigLayer) -> Result<()> {
    match command {
        CliCommand::Version => {
            println!("stream-recorder {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Check => {
            let config = Config::load(settings)?;
            handle_check_command(&config).await
        }
        CliCommand::Run => {
            let config = Config::load(settings)?;
            app::run_service(config).await
        }
    }
}
