//! Recorder phase and the shared handle used to observe it.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Phase of the recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderPhase {
    Idle,
    Checking,
    Recording,
    Finalizing,
    Cleaning,
    Stopped,
}

impl RecorderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Recording => "recording",
            Self::Finalizing => "finalizing",
            Self::Cleaning => "cleaning",
            Self::Stopped => "stopped",
        }
    }
}

/// Snapshot of the recorder, readable from outside the run loop.
#[derive(Debug, Clone)]
pub struct RecorderStatus {
    pub phase: RecorderPhase,
    pub session_temp_path: Option<PathBuf>,
    pub sessions_completed: u64,
    pub consecutive_check_failures: u32,
    pub last_error: Option<String>,
}

impl Default for RecorderStatus {
    fn default() -> Self {
        Self {
            phase: RecorderPhase::Idle,
            session_temp_path: None,
            sessions_completed: 0,
            consecutive_check_failures: 0,
            last_error: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct RecorderStatusHandle {
    inner: Arc<Mutex<RecorderStatus>>,
}

impl RecorderStatusHandle {
    pub async fn get(&self) -> RecorderStatus {
        self.inner.lock().await.clone()
    }

    pub async fn phase(&self) -> RecorderPhase {
        self.inner.lock().await.phase
    }

    pub async fn set_phase(&self, phase: RecorderPhase) {
        let mut status = self.inner.lock().await;
        Self::transition(&mut status, phase);
    }

    pub async fn begin_session(&self, temp_path: PathBuf) {
        let mut status = self.inner.lock().await;
        Self::transition(&mut status, RecorderPhase::Recording);
        status.session_temp_path = Some(temp_path);
    }

    pub async fn end_session(&self, completed: bool) {
        let mut status = self.inner.lock().await;
        status.session_temp_path = None;
        if completed {
            status.sessions_completed += 1;
        }
    }

    pub async fn set_check_failures(&self, count: u32, last_error: Option<String>) {
        let mut status = self.inner.lock().await;
        status.consecutive_check_failures = count;
        if last_error.is_some() {
            status.last_error = last_error;
        }
    }

    pub async fn stop(&self, last_error: Option<String>) {
        let mut status = self.inner.lock().await;
        Self::transition(&mut status, RecorderPhase::Stopped);
        status.session_temp_path = None;
        if last_error.is_some() {
            status.last_error = last_error;
        }
    }

    fn transition(status: &mut RecorderStatus, phase: RecorderPhase) {
        if status.phase != phase {
            debug!(
                "Recorder phase: {} -> {}",
                status.phase.as_str(),
                phase.as_str()
            );
        }
        status.phase = phase;
    }
}
