//! Test doubles for driving the recorder without network or real tools.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_recorder::platform::{AccessToken, PlatformApi, PlatformError};
use stream_recorder::recorder::{Recorder, RecorderSettings};
use stream_recorder::tools::{
    ToolError, ToolExit, ToolHandle, ToolInvocation, ToolKind, ToolLauncher,
};
use tokio_util::sync::CancellationToken;

pub const REFRESH: Duration = Duration::from_secs(15);

/// What the platform answers on one check cycle.
#[derive(Debug, Clone, Copy)]
pub enum Check {
    Online,
    Offline,
    AuthFails,
    StatusFails,
}

/// Scripted platform. Once the script runs out every check reports offline.
#[derive(Default)]
pub struct FakePlatform {
    script: Mutex<VecDeque<Check>>,
    token_calls: AtomicUsize,
    status_calls: AtomicUsize,
    tokens_seen: Mutex<Vec<String>>,
}

impl FakePlatform {
    pub fn new(script: impl IntoIterator<Item = Check>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn fetch_access_token(&self) -> Result<AccessToken, PlatformError> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut script = self.script.lock().unwrap();
        if matches!(script.front(), Some(Check::AuthFails)) {
            script.pop_front();
            return Err(PlatformError::UnexpectedStatus {
                status: 500,
                body: "auth down".to_string(),
            });
        }
        Ok(AccessToken::new(format!("token-{n}")))
    }

    async fn is_stream_online(
        &self,
        _channel: &str,
        token: &AccessToken,
    ) -> Result<bool, PlatformError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen
            .lock()
            .unwrap()
            .push(token.as_str().to_string());

        match self.script.lock().unwrap().pop_front() {
            Some(Check::Online) => Ok(true),
            Some(Check::StatusFails) => Err(PlatformError::InvalidResponse {
                body: "{}".to_string(),
            }),
            Some(Check::Offline) | Some(Check::AuthFails) | None => Ok(false),
        }
    }
}

/// How a fake tool process behaves once launched.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Exit(i32),
    /// Runs until terminated.
    Hang,
}

pub struct FakeLauncher {
    capture: Behavior,
    remux: Behavior,
    invocations: Mutex<Vec<ToolInvocation>>,
    terminations: Arc<AtomicUsize>,
    cancel_after_remux: Mutex<Option<CancellationToken>>,
}

impl FakeLauncher {
    pub fn new(capture: Behavior, remux: Behavior) -> Arc<Self> {
        Arc::new(Self {
            capture,
            remux,
            invocations: Mutex::new(Vec::new()),
            terminations: Arc::new(AtomicUsize::new(0)),
            cancel_after_remux: Mutex::new(None),
        })
    }

    /// Fires `cancel` when the first remux finishes, ending the run after
    /// exactly one session.
    pub fn cancel_after_remux(&self, cancel: CancellationToken) {
        *self.cancel_after_remux.lock().unwrap() = Some(cancel);
    }

    pub fn invocations(&self, kind: ToolKind) -> Vec<ToolInvocation> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| inv.kind == kind)
            .cloned()
            .collect()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

struct FakeHandle {
    behavior: Behavior,
    terminated: bool,
    terminations: Arc<AtomicUsize>,
    on_exit: Option<CancellationToken>,
}

#[async_trait]
impl ToolHandle for FakeHandle {
    async fn wait(&mut self) -> Result<ToolExit, ToolError> {
        match self.behavior {
            Behavior::Exit(code) => {
                if let Some(cancel) = self.on_exit.take() {
                    cancel.cancel();
                }
                Ok(ToolExit::code(code))
            }
            Behavior::Hang if self.terminated => Ok(ToolExit::signalled()),
            Behavior::Hang => std::future::pending().await,
        }
    }

    async fn terminate(&mut self) -> Result<(), ToolError> {
        self.terminated = true;
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ToolLauncher for FakeLauncher {
    async fn launch(&self, invocation: &ToolInvocation) -> Result<Box<dyn ToolHandle>, ToolError> {
        self.invocations.lock().unwrap().push(invocation.clone());

        let (behavior, on_exit) = match invocation.kind {
            ToolKind::Capture => {
                std::fs::write(&invocation.output, b"captured-ts").unwrap();
                (self.capture, None)
            }
            ToolKind::Remux => {
                if matches!(self.remux, Behavior::Exit(0)) {
                    std::fs::write(&invocation.output, b"remuxed-mp4").unwrap();
                }
                (self.remux, self.cancel_after_remux.lock().unwrap().take())
            }
        };

        Ok(Box::new(FakeHandle {
            behavior,
            terminated: false,
            terminations: Arc::clone(&self.terminations),
            on_exit,
        }))
    }
}

pub fn settings(root: &Path) -> RecorderSettings {
    RecorderSettings {
        channel: "somechannel".to_string(),
        quality: "720p60".to_string(),
        temp_root: root.join("temp"),
        final_root: root.join("final"),
        refresh: REFRESH,
        web_api_token: "web-token".to_string(),
        capture_program: "streamlink".to_string(),
        remux_program: "ffmpeg".to_string(),
        check_failure_limit: 1,
        salvage_partial: false,
    }
}

pub fn recorder(
    settings: RecorderSettings,
    platform: &Arc<FakePlatform>,
    launcher: &Arc<FakeLauncher>,
) -> Arc<Recorder> {
    Arc::new(Recorder::new(platform.clone(), launcher.clone(), settings).unwrap())
}

pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// `YYYY-MM-DD_HH-MM-SS`
pub fn is_timestamp(s: &str) -> bool {
    s.len() == 19
        && s.char_indices().all(|(i, c)| match i {
            4 | 7 | 13 | 16 => c == '-',
            10 => c == '_',
            _ => c.is_ascii_digit(),
        })
}
