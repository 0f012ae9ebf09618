use crate::config::Config;
use crate::platform::{PlatformApi, TwitchClient};
use crate::recorder::Recorder;
use crate::tools::{self, SystemLauncher};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run_service(config: Config) -> Result<()> {
    info!(
        "Starting stream recorder for {} (quality {})",
        config.channel, config.quality
    );

    tools::preflight(&[config.capture_program.as_str(), config.remux_program.as_str()]);

    let api = Arc::new(build_client(&config)?);
    let recorder = Recorder::new(api, Arc::new(SystemLauncher), config.recorder_settings())
        .context("Failed to prepare recording directories")?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    recorder
        .run(&cancel)
        .await
        .context("Failed to run recorder")?;

    info!("Recorder stopped");
    Ok(())
}

/// Fetches a fresh token and asks whether the configured channel is live.
pub async fn check_channel(config: &Config) -> Result<bool> {
    let api = build_client(config)?;
    let token = api
        .fetch_access_token()
        .await
        .context("Failed to fetch access token")?;

    api.is_stream_online(&config.channel, &token)
        .await
        .context("Failed to check stream status")
}

fn build_client(config: &Config) -> Result<TwitchClient> {
    TwitchClient::new(
        config.client_id.clone(),
        config.client_secret.clone(),
        config.endpoints.clone(),
    )
    .context("Failed to create HTTP client")
}

/// The handler only cancels; the recorder performs the shutdown itself.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
    }
}
