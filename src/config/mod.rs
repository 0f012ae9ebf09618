use crate::global;
use crate::platform::{PlatformEndpoints, DEFAULT_API_URL, DEFAULT_AUTH_URL};
use crate::recorder::RecorderSettings;
use crate::tools::{DEFAULT_CAPTURE_PROGRAM, DEFAULT_REMUX_PROGRAM};
use anyhow::{bail, Context, Result};
use clap::builder::BoolishValueParser;
use clap::Args as ClapArgs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_REFRESH: &str = "15s";
const DEFAULT_QUALITY: &str = "best";
const DEFAULT_CHECK_FAILURE_LIMIT: u32 = 1;

/// One layer of settings. The command line / environment fill it through
/// clap, the optional config file through serde; unset values fall through
/// to the next layer.
#[derive(ClapArgs, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    #[serde(skip)]
    pub config: Option<PathBuf>,
    /// Interval between live checks (e.g. 15s, 1m)
    #[arg(long, env = "REFRESH", global = true)]
    pub refresh: Option<String>,
    /// Login name of the channel to record
    #[arg(long, env = "CHANNEL", global = true)]
    pub channel: Option<String>,
    /// Legacy name for the channel. Shells export `USERNAME` as the login
    /// name, so it only applies when `CHANNEL` is unset.
    #[arg(long, env = "USERNAME", global = true, hide = true)]
    #[serde(skip)]
    pub username: Option<String>,
    /// Quality selector passed to the capture tool
    #[arg(long, env = "QUALITY", global = true)]
    pub quality: Option<String>,
    /// Root directory for in-progress captures
    #[arg(long, env = "TEMP_PATH", global = true)]
    pub temp_path: Option<PathBuf>,
    /// Root directory for finished recordings
    #[arg(long, env = "FINAL_PATH", global = true)]
    pub final_path: Option<PathBuf>,
    #[arg(long, env = "CLIENT_ID", global = true, hide_env_values = true)]
    pub client_id: Option<String>,
    #[arg(long, env = "CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,
    /// Token forwarded to the capture tool as an OAuth header
    #[arg(long, env = "WEB_API_TOKEN", global = true, hide_env_values = true)]
    pub web_api_token: Option<String>,
    /// Consecutive failed live checks that stop the recorder
    #[arg(long, env = "CHECK_FAILURE_LIMIT", global = true)]
    pub check_failure_limit: Option<u32>,
    /// Remux partial captures left behind by a failed capture
    #[arg(long, env = "SALVAGE_PARTIAL", global = true, value_parser = BoolishValueParser::new())]
    pub salvage_partial: Option<bool>,
    #[arg(long, env = "CAPTURE_PROGRAM", global = true)]
    pub capture_program: Option<String>,
    #[arg(long, env = "REMUX_PROGRAM", global = true)]
    pub remux_program: Option<String>,
    #[arg(long, env = "AUTH_URL", global = true)]
    pub auth_url: Option<String>,
    #[arg(long, env = "API_URL", global = true)]
    pub api_url: Option<String>,
}

impl ConfigLayer {
    /// Values from `self` win; gaps are filled from `fallback`.
    pub fn or(self, fallback: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            config: self.config.or(fallback.config),
            refresh: self.refresh.or(fallback.refresh),
            channel: self.channel.or(fallback.channel),
            username: self.username.or(fallback.username),
            quality: self.quality.or(fallback.quality),
            temp_path: self.temp_path.or(fallback.temp_path),
            final_path: self.final_path.or(fallback.final_path),
            client_id: self.client_id.or(fallback.client_id),
            client_secret: self.client_secret.or(fallback.client_secret),
            web_api_token: self.web_api_token.or(fallback.web_api_token),
            check_failure_limit: self.check_failure_limit.or(fallback.check_failure_limit),
            salvage_partial: self.salvage_partial.or(fallback.salvage_partial),
            capture_program: self.capture_program.or(fallback.capture_program),
            remux_program: self.remux_program.or(fallback.remux_program),
            auth_url: self.auth_url.or(fallback.auth_url),
            api_url: self.api_url.or(fallback.api_url),
        }
    }
}

/// Fully resolved, immutable runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub channel: String,
    pub quality: String,
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
    pub refresh: Duration,
    pub client_id: String,
    pub client_secret: String,
    pub web_api_token: String,
    pub check_failure_limit: u32,
    pub salvage_partial: bool,
    pub capture_program: String,
    pub remux_program: String,
    pub endpoints: PlatformEndpoints,
}

impl Config {
    pub fn load(args: ConfigLayer) -> Result<Self> {
        let file = match &args.config {
            Some(path) => Self::read_file(path)?,
            None => {
                let default_path = global::config_file()?;
                if default_path.exists() {
                    Self::read_file(&default_path)?
                } else {
                    debug!("No config file at {:?}, using flags and environment", default_path);
                    ConfigLayer::default()
                }
            }
        };

        Self::resolve(args.or(file))
    }

    fn read_file(path: &Path) -> Result<ConfigLayer> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        let layer: ConfigLayer =
            toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", path);
        Ok(layer)
    }

    pub fn resolve(layer: ConfigLayer) -> Result<Self> {
        let refresh_raw = layer.refresh.unwrap_or_else(|| DEFAULT_REFRESH.to_string());
        let refresh = humantime::parse_duration(&refresh_raw)
            .with_context(|| format!("Failed to parse refresh duration: {refresh_raw}"))?;
        if refresh.is_zero() {
            bail!("REFRESH must be greater than zero");
        }

        let check_failure_limit = layer
            .check_failure_limit
            .unwrap_or(DEFAULT_CHECK_FAILURE_LIMIT);
        if check_failure_limit == 0 {
            bail!("CHECK_FAILURE_LIMIT must be at least 1");
        }

        Ok(Self {
            channel: required(layer.channel.or(layer.username), "CHANNEL")?,
            quality: layer.quality.unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
            temp_path: required(layer.temp_path, "TEMP_PATH")?,
            final_path: required(layer.final_path, "FINAL_PATH")?,
            refresh,
            client_id: required(layer.client_id, "CLIENT_ID")?,
            client_secret: required(layer.client_secret, "CLIENT_SECRET")?,
            web_api_token: required(layer.web_api_token, "WEB_API_TOKEN")?,
            check_failure_limit,
            salvage_partial: layer.salvage_partial.unwrap_or(false),
            capture_program: layer
                .capture_program
                .unwrap_or_else(|| DEFAULT_CAPTURE_PROGRAM.to_string()),
            remux_program: layer
                .remux_program
                .unwrap_or_else(|| DEFAULT_REMUX_PROGRAM.to_string()),
            endpoints: PlatformEndpoints {
                auth_url: layer.auth_url.unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
                api_url: layer.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            },
        })
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            channel: self.channel.clone(),
            quality: self.quality.clone(),
            temp_root: self.temp_path.clone(),
            final_root: self.final_path.clone(),
            refresh: self.refresh,
            web_api_token: self.web_api_token.clone(),
            capture_program: self.capture_program.clone(),
            remux_program: self.remux_program.clone(),
            check_failure_limit: self.check_failure_limit,
            salvage_partial: self.salvage_partial,
        }
    }
}

/// Empty strings count as unset.
fn required<T: AsRef<std::ffi::OsStr>>(value: Option<T>, key: &str) -> Result<T> {
    match value {
        Some(v) if !v.as_ref().is_empty() => Ok(v),
        _ => bail!("{key} is not set"),
    }
}
