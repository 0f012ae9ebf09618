//! Recording lifecycle orchestrator.
//!
//! Drives the poll → check → capture → finalize → cleanup cycle for a single
//! channel until the shutdown token fires:
//!
//! Idle → Checking → (offline) Idle
//!                 → (live) Recording → Finalizing → Cleaning → Idle
//!
//! Cancellation at any point leads to Cleaning and then Stopped.

pub mod session;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::platform::{PlatformApi, PlatformError};
use crate::tools::{run_tool, ToolError, ToolInvocation, ToolLauncher, ToolOutcome};

pub use session::RecordingSession;
pub use status::{RecorderPhase, RecorderStatus, RecorderStatusHandle};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to create directory {path:?}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch access token: {0}")]
    Authentication(#[source] PlatformError),
    #[error("failed to check stream status: {0}")]
    LiveStatus(#[source] PlatformError),
    #[error("failed to record stream: {0}")]
    Capture(#[source] ToolError),
    #[error("failed to fix stream: {0}")]
    Finalize(#[source] ToolError),
    #[error("failed to remove temp entry {path:?}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to cleanup on shutdown: {0}")]
    ShutdownCleanup(#[source] Box<RecorderError>),
}

impl RecorderError {
    /// Errors raised while asking the platform whether the channel is live.
    pub fn is_check_failure(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::LiveStatus(_))
    }
}

/// Immutable recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub channel: String,
    pub quality: String,
    /// Root directory for in-progress captures; the channel gets a subdirectory.
    pub temp_root: PathBuf,
    /// Root directory for finished recordings; the channel gets a subdirectory.
    pub final_root: PathBuf,
    pub refresh: Duration,
    pub web_api_token: String,
    pub capture_program: String,
    pub remux_program: String,
    /// Consecutive check failures that abort the run. `1` is fail-fast.
    pub check_failure_limit: u32,
    /// Remux whatever a failed capture left behind before aborting.
    pub salvage_partial: bool,
}

enum CycleOutcome {
    Offline,
    Recorded(PathBuf),
    Interrupted,
}

pub struct Recorder {
    api: Arc<dyn PlatformApi>,
    launcher: Arc<dyn ToolLauncher>,
    settings: RecorderSettings,
    temp_dir: PathBuf,
    final_dir: PathBuf,
    status: RecorderStatusHandle,
}

impl Recorder {
    /// Creates the per-channel temp and final directories if needed.
    pub fn new(
        api: Arc<dyn PlatformApi>,
        launcher: Arc<dyn ToolLauncher>,
        settings: RecorderSettings,
    ) -> Result<Self, RecorderError> {
        let temp_dir = settings.temp_root.join(&settings.channel);
        let final_dir = settings.final_root.join(&settings.channel);

        for dir in [&temp_dir, &final_dir] {
            std::fs::create_dir_all(dir).map_err(|source| RecorderError::Setup {
                path: dir.clone(),
                source,
            })?;
        }

        debug!("Recorder directories ready: {:?}, {:?}", temp_dir, final_dir);

        Ok(Self {
            api,
            launcher,
            settings,
            temp_dir,
            final_dir,
            status: RecorderStatusHandle::default(),
        })
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn final_dir(&self) -> &Path {
        &self.final_dir
    }

    pub fn status(&self) -> RecorderStatusHandle {
        self.status.clone()
    }

    /// Runs until `cancel` fires or a stage fails.
    ///
    /// Returns `Ok(())` only when the shutdown cleanup succeeded.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), RecorderError> {
        let refresh = self.settings.refresh;
        let mut ticker = interval_at(Instant::now() + refresh, refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        info!(
            "Watching {} every {}",
            self.settings.channel,
            humantime::format_duration(refresh)
        );

        loop {
            self.status.set_phase(RecorderPhase::Idle).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if cancel.is_cancelled() {
                break;
            }

            match self.run_cycle(cancel).await {
                Ok(CycleOutcome::Offline) => {
                    failures = 0;
                    info!(
                        "{} offline, checking again in {}",
                        self.settings.channel,
                        humantime::format_duration(refresh)
                    );
                }
                Ok(CycleOutcome::Recorded(path)) => {
                    failures = 0;
                    debug!("Cycle finished with {:?}", path);
                }
                Ok(CycleOutcome::Interrupted) => break,
                Err(e) if e.is_check_failure() => {
                    failures += 1;
                    if failures >= self.settings.check_failure_limit {
                        self.status.stop(Some(e.to_string())).await;
                        return Err(e);
                    }
                    warn!(
                        "Check {}/{} failed, retrying next tick: {}",
                        failures, self.settings.check_failure_limit, e
                    );
                    self.status
                        .set_check_failures(failures, Some(e.to_string()))
                        .await;
                    continue;
                }
                Err(e) => {
                    self.status.stop(Some(e.to_string())).await;
                    return Err(e);
                }
            }
            self.status.set_check_failures(failures, None).await;
        }

        self.shutdown().await
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleOutcome, RecorderError> {
        self.status.set_phase(RecorderPhase::Checking).await;

        let Some(online) = self.check_live(cancel).await? else {
            return Ok(CycleOutcome::Interrupted);
        };
        if !online {
            return Ok(CycleOutcome::Offline);
        }

        let session = RecordingSession::start(
            &self.settings.channel,
            &self.settings.quality,
            &self.temp_dir,
        );
        let outcome = self.record(&session, cancel).await;
        self.status
            .end_session(matches!(outcome, Ok(CycleOutcome::Recorded(_))))
            .await;
        outcome
    }

    /// `None` when shutdown was requested while waiting on the platform.
    async fn check_live(&self, cancel: &CancellationToken) -> Result<Option<bool>, RecorderError> {
        let token = tokio::select! {
            token = self.api.fetch_access_token() => token.map_err(RecorderError::Authentication)?,
            _ = cancel.cancelled() => return Ok(None),
        };

        let online = tokio::select! {
            online = self.api.is_stream_online(&self.settings.channel, &token) => {
                online.map_err(RecorderError::LiveStatus)?
            }
            _ = cancel.cancelled() => return Ok(None),
        };

        Ok(Some(online))
    }

    async fn record(
        &self,
        session: &RecordingSession,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, RecorderError> {
        self.status.begin_session(session.temp_path.clone()).await;
        info!("Starting recording of {}", session.channel);

        let capture = ToolInvocation::capture(
            &self.settings.capture_program,
            &session.channel,
            &session.quality,
            &self.settings.web_api_token,
            &session.temp_path,
        );

        match run_tool(self.launcher.as_ref(), &capture, cancel).await {
            Ok(ToolOutcome::Completed) => {}
            Ok(ToolOutcome::Cancelled) => {
                info!("Recording of {} interrupted by shutdown", session.channel);
                return Ok(CycleOutcome::Interrupted);
            }
            Err(e) => {
                if self.settings.salvage_partial && session.has_partial_capture().await {
                    self.salvage(session, cancel).await?;
                }
                return Err(RecorderError::Capture(e));
            }
        }

        info!("Recording finished, fixing stream...");
        let Some(final_path) = self.finalize(session, cancel).await? else {
            return Ok(CycleOutcome::Interrupted);
        };
        info!("Stream saved to: {}", final_path.display());

        self.status.set_phase(RecorderPhase::Cleaning).await;
        self.cleanup().await?;

        Ok(CycleOutcome::Recorded(final_path))
    }

    /// Remuxes the temp file; `None` when shutdown interrupted the remux.
    async fn finalize(
        &self,
        session: &RecordingSession,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, RecorderError> {
        self.status.set_phase(RecorderPhase::Finalizing).await;

        let final_path = session.final_path(&self.final_dir, &chrono::Local::now());
        let remux = ToolInvocation::remux(
            &self.settings.remux_program,
            &session.temp_path,
            &final_path,
        );

        match run_tool(self.launcher.as_ref(), &remux, cancel).await {
            Ok(ToolOutcome::Completed) => Ok(Some(final_path)),
            Ok(ToolOutcome::Cancelled) => {
                info!("Remux of {:?} interrupted by shutdown", session.temp_path);
                Ok(None)
            }
            Err(e) => Err(RecorderError::Finalize(e)),
        }
    }

    /// Remuxes what a failed capture left behind. A remux failure is logged
    /// and the caller's capture error stands; a cleanup failure is returned.
    async fn salvage(
        &self,
        session: &RecordingSession,
        cancel: &CancellationToken,
    ) -> Result<(), RecorderError> {
        warn!(
            "Capture failed, salvaging partial recording {:?}",
            session.temp_path
        );

        match self.finalize(session, cancel).await {
            Ok(Some(path)) => {
                info!("Partial stream saved to: {}", path.display());
                self.status.set_phase(RecorderPhase::Cleaning).await;
                self.cleanup().await?;
            }
            Ok(None) => {}
            Err(e) => warn!("Salvage failed: {}", e),
        }

        Ok(())
    }

    /// Removes every entry directly inside the temp directory. Returns the
    /// number of entries removed.
    pub async fn cleanup(&self) -> Result<usize, RecorderError> {
        let mut entries = tokio::fs::read_dir(&self.temp_dir)
            .await
            .map_err(cleanup_error(&self.temp_dir))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(cleanup_error(&self.temp_dir))?
        {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(cleanup_error(&path))?;
            let result = if file_type.is_dir() {
                tokio::fs::remove_dir(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            result.map_err(cleanup_error(&path))?;
            debug!("Removed temp entry {:?}", path);
            removed += 1;
        }

        Ok(removed)
    }

    async fn shutdown(&self) -> Result<(), RecorderError> {
        info!("Shutting down recorder...");
        self.status.set_phase(RecorderPhase::Cleaning).await;

        match self.cleanup().await {
            Ok(removed) => {
                debug!("Shutdown cleanup removed {} entries", removed);
                self.status.stop(None).await;
                Ok(())
            }
            Err(e) => {
                let e = RecorderError::ShutdownCleanup(Box::new(e));
                self.status.stop(Some(e.to_string())).await;
                Err(e)
            }
        }
    }
}

fn cleanup_error(path: &Path) -> impl FnOnce(std::io::Error) -> RecorderError {
    let path = path.to_path_buf();
    move |source| RecorderError::Cleanup { path, source }
}
