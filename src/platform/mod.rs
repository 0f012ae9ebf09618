//! Client for the streaming platform's API.
//!
//! Two calls are needed per check: a client-credentials exchange that yields a
//! short-lived bearer token, and a live-streams query filtered by channel login.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_AUTH_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const DEFAULT_API_URL: &str = "https://api.twitch.tv/helix";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status code {status}, body: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("invalid or missing token, response: {body}")]
    InvalidToken { body: String },
    #[error("invalid or missing data, response: {body}")]
    InvalidResponse { body: String },
}

/// Opaque bearer credential. Never reused across check cycles.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn fetch_access_token(&self) -> Result<AccessToken, PlatformError>;

    async fn is_stream_online(
        &self,
        channel: &str,
        token: &AccessToken,
    ) -> Result<bool, PlatformError>;
}

#[derive(Debug, Clone)]
pub struct PlatformEndpoints {
    pub auth_url: String,
    pub api_url: String,
}

impl Default for PlatformEndpoints {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

pub struct TwitchClient {
    client: reqwest::Client,
    endpoints: PlatformEndpoints,
    client_id: String,
    client_secret: String,
}

impl TwitchClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        endpoints: PlatformEndpoints,
    ) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoints,
            client_id,
            client_secret,
        })
    }

    fn streams_url(&self) -> String {
        format!("{}/streams", self.endpoints.api_url.trim_end_matches('/'))
    }
}

/// Reads the body of a response, turning any non-2xx status into an error that
/// carries the status code and the raw body.
async fn success_body(response: reqwest::Response) -> Result<String, PlatformError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(PlatformError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

fn parse_access_token(body: &str) -> Result<AccessToken, PlatformError> {
    let invalid = || PlatformError::InvalidToken {
        body: body.to_string(),
    };

    let data: Value = serde_json::from_str(body).map_err(|_| invalid())?;
    match data.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
        _ => Err(invalid()),
    }
}

fn parse_stream_list(body: &str) -> Result<bool, PlatformError> {
    let invalid = || PlatformError::InvalidResponse {
        body: body.to_string(),
    };

    let data: Value = serde_json::from_str(body).map_err(|_| invalid())?;
    let streams = data.get("data").and_then(Value::as_array).ok_or_else(invalid)?;
    Ok(!streams.is_empty())
}

#[async_trait]
impl PlatformApi for TwitchClient {
    async fn fetch_access_token(&self) -> Result<AccessToken, PlatformError> {
        debug!("Requesting access token from {}", self.endpoints.auth_url);

        let response = self
            .client
            .post(&self.endpoints.auth_url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let body = success_body(response).await?;
        parse_access_token(&body)
    }

    async fn is_stream_online(
        &self,
        channel: &str,
        token: &AccessToken,
    ) -> Result<bool, PlatformError> {
        let response = self
            .client
            .get(self.streams_url())
            .query(&[("user_login", channel)])
            .header("Client-ID", &self.client_id)
            .bearer_auth(token.as_str())
            .send()
            .await?;

        let body = success_body(response).await?;
        let online = parse_stream_list(&body)?;
        debug!("Live status for {}: {}", channel, online);
        Ok(online)
    }
}
