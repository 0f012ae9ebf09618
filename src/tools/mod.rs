//! External tool abstraction for the capture and remux subprocesses.
//!
//! The recorder never talks to `tokio::process` directly; it launches a
//! [`ToolInvocation`] through a [`ToolLauncher`] and races the resulting
//! [`ToolHandle`] against the shutdown token.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_CAPTURE_PROGRAM: &str = "streamlink";
pub const DEFAULT_REMUX_PROGRAM: &str = "ffmpeg";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ToolExit },
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to terminate {program}: {source}")]
    Terminate {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Exit status of a finished tool. `code` is `None` when the process was
/// ended by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    pub code: Option<i32>,
}

impl ToolExit {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signalled() -> Self {
        Self { code: None }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl std::fmt::Display for ToolExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {code}"),
            None => f.write_str("termination by signal"),
        }
    }
}

impl From<std::process::ExitStatus> for ToolExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Capture,
    Remux,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub kind: ToolKind,
    pub program: String,
    pub args: Vec<String>,
    /// File the tool writes to.
    pub output: PathBuf,
}

impl ToolInvocation {
    /// Continuous capture of `channel` at `quality` into `output`.
    pub fn capture(
        program: &str,
        channel: &str,
        quality: &str,
        web_api_token: &str,
        output: &Path,
    ) -> Self {
        let args = vec![
            "--loglevel".to_string(),
            "error".to_string(),
            "--twitch-api-header".to_string(),
            format!("Authorization=OAuth {web_api_token}"),
            format!("twitch.tv/{channel}"),
            quality.to_string(),
            "-f".to_string(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        Self {
            kind: ToolKind::Capture,
            program: program.to_string(),
            args,
            output: output.to_path_buf(),
        }
    }

    /// Stream-copy `input` into `output`, ignoring minor decode errors.
    pub fn remux(program: &str, input: &Path, output: &Path) -> Self {
        let args = vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-err_detect".to_string(),
            "ignore_err".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        Self {
            kind: ToolKind::Remux,
            program: program.to_string(),
            args,
            output: output.to_path_buf(),
        }
    }
}

/// A running tool.
#[async_trait]
pub trait ToolHandle: Send {
    async fn wait(&mut self) -> Result<ToolExit, ToolError>;

    async fn terminate(&mut self) -> Result<(), ToolError>;
}

#[async_trait]
pub trait ToolLauncher: Send + Sync {
    async fn launch(&self, invocation: &ToolInvocation) -> Result<Box<dyn ToolHandle>, ToolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Completed,
    /// The shutdown token fired before or while the tool was running.
    Cancelled,
}

/// Runs `invocation` to completion unless `cancel` fires first, in which case
/// the tool is terminated and reaped. A failed exit observed after
/// cancellation is reported as [`ToolOutcome::Cancelled`].
pub async fn run_tool(
    launcher: &dyn ToolLauncher,
    invocation: &ToolInvocation,
    cancel: &CancellationToken,
) -> Result<ToolOutcome, ToolError> {
    if cancel.is_cancelled() {
        return Ok(ToolOutcome::Cancelled);
    }

    let mut handle = launcher.launch(invocation).await?;

    // A tool that already exited is reported as such even if shutdown fired
    // in the meantime.
    let finished = tokio::select! {
        biased;
        exit = handle.wait() => Some(exit),
        _ = cancel.cancelled() => None,
    };

    match finished {
        Some(Ok(exit)) if exit.is_success() => Ok(ToolOutcome::Completed),
        Some(_) if cancel.is_cancelled() => Ok(ToolOutcome::Cancelled),
        Some(Ok(status)) => Err(ToolError::Failed {
            program: invocation.program.clone(),
            status,
        }),
        Some(Err(e)) => Err(e),
        None => {
            debug!("Terminating {} after shutdown request", invocation.program);
            handle.terminate().await?;
            if let Err(e) = handle.wait().await {
                warn!("Failed to reap {}: {}", invocation.program, e);
            }
            Ok(ToolOutcome::Cancelled)
        }
    }
}

/// Launches real programs with inherited stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

struct ChildHandle {
    program: String,
    child: tokio::process::Child,
}

#[async_trait]
impl ToolHandle for ChildHandle {
    async fn wait(&mut self) -> Result<ToolExit, ToolError> {
        self.child
            .wait()
            .await
            .map(ToolExit::from)
            .map_err(|source| ToolError::Wait {
                program: self.program.clone(),
                source,
            })
    }

    async fn terminate(&mut self) -> Result<(), ToolError> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already exited.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(source) => Err(ToolError::Terminate {
                program: self.program.clone(),
                source,
            }),
        }
    }
}

#[async_trait]
impl ToolLauncher for SystemLauncher {
    async fn launch(&self, invocation: &ToolInvocation) -> Result<Box<dyn ToolHandle>, ToolError> {
        debug!("Launching {} writing {:?}", invocation.program, invocation.output);

        let child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        Ok(Box::new(ChildHandle {
            program: invocation.program.clone(),
            child,
        }))
    }
}

/// Warns about tools that cannot be found on `PATH`. Missing tools only fail
/// once a session actually needs them.
pub fn preflight(programs: &[&str]) {
    for program in programs {
        match which::which(program) {
            Ok(path) => debug!("Found {} at {:?}", program, path),
            Err(_) => warn!("{} was not found on PATH; recordings will fail", program),
        }
    }
}
