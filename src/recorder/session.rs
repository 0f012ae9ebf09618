//! A single capture attempt and the file names it produces.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub const RECORDING_EXTENSION: &str = "mp4";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// `<start>.mp4`
pub fn temp_file_name(started_at: &DateTime<Local>) -> String {
    format!("{}.{}", format_timestamp(started_at), RECORDING_EXTENSION)
}

/// `<start>__<end>.mp4`
pub fn final_file_name(started_at: &DateTime<Local>, finished_at: &DateTime<Local>) -> String {
    format!(
        "{}__{}.{}",
        format_timestamp(started_at),
        format_timestamp(finished_at),
        RECORDING_EXTENSION
    )
}

#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub channel: String,
    pub quality: String,
    pub started_at: DateTime<Local>,
    pub temp_path: PathBuf,
}

impl RecordingSession {
    pub fn start(channel: &str, quality: &str, temp_dir: &Path) -> Self {
        Self::started_at(channel, quality, temp_dir, Local::now())
    }

    pub fn started_at(
        channel: &str,
        quality: &str,
        temp_dir: &Path,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            channel: channel.to_string(),
            quality: quality.to_string(),
            temp_path: temp_dir.join(temp_file_name(&started_at)),
            started_at,
        }
    }

    pub fn final_path(&self, final_dir: &Path, finished_at: &DateTime<Local>) -> PathBuf {
        final_dir.join(final_file_name(&self.started_at, finished_at))
    }

    /// Whether the capture left anything worth remuxing.
    pub async fn has_partial_capture(&self) -> bool {
        tokio::fs::metadata(&self.temp_path)
            .await
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }
}
