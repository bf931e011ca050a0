use std::time::Duration;

use url::Url;

use crate::errors::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the notification REST service, e.g. `https://docs.example.com/api`.
    pub api_url: Url,
    /// Live channel endpoint. `None` disables live delivery.
    pub ws_url: Option<Url>,
    /// Identifier of the signed-in user; keys the live channel room.
    pub user_id: String,
    /// Bearer token attached to REST requests and the websocket handshake.
    pub auth_token: Option<String>,
    /// Periodic re-fetch interval. `None` disables polling.
    pub poll_interval: Option<Duration>,
    pub http_timeout: Duration,
    /// Transient HTTP retries before a request is reported as failed. 0 = disabled.
    pub http_max_retries: u32,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// Re-fetch the full list after the live channel reconnects.
    pub resync_on_reconnect: bool,
}

impl Config {
    /// Minimal configuration for a given API base and user; everything else defaulted.
    pub fn new(api_url: &str, user_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_url: parse_base_url(api_url)?,
            ws_url: None,
            user_id: user_id.into(),
            auth_token: None,
            poll_interval: None,
            http_timeout: Duration::from_secs(15),
            http_max_retries: 2,
            reconnect_base: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            resync_on_reconnect: true,
        })
    }

    pub fn with_ws_url(mut self, ws_url: &str) -> Result<Self> {
        self.ws_url = Some(parse_ws_url(ws_url)?);
        Ok(self)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Join a relative path onto the API base, e.g. `notifications/read-all`.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Config(format!("bad endpoint '{}': {}", path, e)))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw).map_err(|e| ClientError::Config(format!("invalid API URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ClientError::Config(format!(
                "API URL must be http(s), got '{}'",
                other
            )))
        }
    }
    // Url::join replaces the last segment unless the base ends with '/'.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_ws_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| ClientError::Config(format!("invalid websocket URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ClientError::Config(format!(
            "websocket URL must be ws(s), got '{}'",
            other
        ))),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let api_url = std::env::var("NOTIFY_API_URL").unwrap_or_else(|_| "http://localhost:3000/api".into());
    let user_id = std::env::var("NOTIFY_USER_ID").unwrap_or_default();

    let mut cfg = Config::new(&api_url, user_id)?;

    if let Ok(ws) = std::env::var("NOTIFY_WS_URL") {
        if !ws.trim().is_empty() {
            cfg = cfg.with_ws_url(ws.trim())?;
        }
    }
    cfg.auth_token = std::env::var("NOTIFY_TOKEN").ok().filter(|t| !t.is_empty());
    cfg.poll_interval = env_parse::<u64>("NOTIFY_POLL_SECS")
        .filter(|s| *s > 0)
        .map(Duration::from_secs);
    if let Some(secs) = env_parse::<u64>("NOTIFY_HTTP_TIMEOUT_SECS") {
        cfg.http_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(n) = env_parse::<u32>("NOTIFY_HTTP_RETRIES") {
        cfg.http_max_retries = n;
    }
    if let Some(ms) = env_parse::<u64>("NOTIFY_RECONNECT_BASE_MS") {
        cfg.reconnect_base = Duration::from_millis(ms);
    }
    if let Some(ms) = env_parse::<u64>("NOTIFY_RECONNECT_MAX_MS") {
        cfg.reconnect_max = Duration::from_millis(ms);
    }
    if let Some(flag) = env_parse::<bool>("NOTIFY_RESYNC_ON_RECONNECT") {
        cfg.resync_on_reconnect = flag;
    }

    if cfg.reconnect_max < cfg.reconnect_base {
        anyhow::bail!(
            "NOTIFY_RECONNECT_MAX_MS ({:?}) is smaller than NOTIFY_RECONNECT_BASE_MS ({:?})",
            cfg.reconnect_max,
            cfg.reconnect_base
        );
    }

    Ok(cfg)
}
