use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::websocket::ReconnectConfig;

/// Settings shared by the REST client and the real-time session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Page origin the app is served from, e.g. `https://bets.example.com`
    pub origin: Url,
    /// Path prefix of the REST API on the origin
    pub api_prefix: String,
    /// Reconnection behavior of the group channel
    pub reconnect: ReconnectConfig,
    /// Session cookie to seed the cookie jar with (`name=value`)
    pub session_cookie: Option<String>,
}

impl ClientConfig {
    pub const DEFAULT_API_PREFIX: &'static str = "/api";

    /// Create a configuration for `origin` with default settings
    pub fn new(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin)?;
        validate_origin(&origin)?;
        Ok(Self {
            origin,
            api_prefix: Self::DEFAULT_API_PREFIX.to_string(),
            reconnect: ReconnectConfig::default(),
            session_cookie: None,
        })
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Base URL of the REST API: origin joined with the API prefix
    pub fn api_base(&self) -> String {
        format!(
            "{}{}",
            self.origin.as_str().trim_end_matches('/'),
            self.api_prefix.trim_end_matches('/')
        )
    }

    /// Load settings from `BETS_*` environment variables.
    ///
    /// `BETS_ORIGIN` is required. Nested keys use `__`, e.g.
    /// `BETS_RECONNECT__MAX_ATTEMPTS=5`.
    pub fn from_env() -> Result<Self> {
        Self::load(
            Config::builder().add_source(
                Environment::with_prefix("BETS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            ),
        )
    }

    /// Resolve settings from `builder` on top of the defaults
    pub fn load(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let raw: RawSettings = builder
            .set_default("api_prefix", Self::DEFAULT_API_PREFIX)?
            .set_default(
                "reconnect.base_delay_ms",
                ReconnectConfig::DEFAULT_BASE_DELAY.as_millis() as i64,
            )?
            .set_default(
                "reconnect.max_delay_ms",
                ReconnectConfig::DEFAULT_MAX_DELAY.as_millis() as i64,
            )?
            .set_default(
                "reconnect.max_attempts",
                ReconnectConfig::DEFAULT_MAX_ATTEMPTS as i64,
            )?
            .build()?
            .try_deserialize()?;

        raw.try_into()
    }
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    origin: String,
    api_prefix: String,
    session_cookie: Option<String>,
    reconnect: RawReconnect,
}

#[derive(Debug, Deserialize)]
struct RawReconnect {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
}

impl TryFrom<RawSettings> for ClientConfig {
    type Error = Error;

    fn try_from(raw: RawSettings) -> Result<Self> {
        if raw.reconnect.max_delay_ms < raw.reconnect.base_delay_ms {
            return Err(Error::Config(format!(
                "reconnect.max_delay_ms ({}) is below reconnect.base_delay_ms ({})",
                raw.reconnect.max_delay_ms, raw.reconnect.base_delay_ms
            )));
        }

        let mut config = ClientConfig::new(&raw.origin)?
            .with_api_prefix(raw.api_prefix)
            .with_reconnect(ReconnectConfig {
                base_delay: Duration::from_millis(raw.reconnect.base_delay_ms),
                max_delay: Duration::from_millis(raw.reconnect.max_delay_ms),
                max_attempts: raw.reconnect.max_attempts,
            });
        config.session_cookie = raw.session_cookie.filter(|c| !c.is_empty());
        Ok(config)
    }
}

fn validate_origin(origin: &Url) -> Result<()> {
    if !matches!(origin.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "origin must be http or https, got {}",
            origin
        )));
    }
    if origin.host_str().is_none() {
        return Err(Error::Config(format!("origin {} has no host", origin)));
    }
    Ok(())
}
