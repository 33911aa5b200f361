//! Runtime configuration read from the environment.

use crate::error::ConfigError;
use std::env;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_TRENDS_URL: &str = "https://trends.google.com";
pub const DEFAULT_SUMMARIZER_ENDPOINT: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_SUMMARIZER_MODEL: &str = "facebook/bart-base";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Custom Search JSON API key.
    pub api_key: String,
    /// Programmable Search Engine id.
    pub cse_id: String,
    pub search_endpoint: String,
    pub search_timeout: Duration,
    pub trends_url: String,
    pub trends_timeout: Duration,
    pub summarizer_endpoint: String,
    pub summarizer_model: String,
    pub summarizer_token: Option<String>,
    pub summarizer_timeout: Duration,
    /// Upper bound on a proxy probe round trip.
    pub proxy_speed_threshold: Duration,
    pub session_ttl: Duration,
}

impl AppConfig {
    /// Credentials are the only settings without a default.
    pub fn with_credentials(api_key: impl Into<String>, cse_id: impl Into<String>) -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            api_key: api_key.into(),
            cse_id: cse_id.into(),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            search_timeout: Duration::from_secs(15),
            trends_url: DEFAULT_TRENDS_URL.to_string(),
            trends_timeout: Duration::from_secs(10),
            summarizer_endpoint: DEFAULT_SUMMARIZER_ENDPOINT.to_string(),
            summarizer_model: DEFAULT_SUMMARIZER_MODEL.to_string(),
            summarizer_token: None,
            summarizer_timeout: Duration::from_secs(60),
            proxy_speed_threshold: Duration::from_secs(2),
            session_ttl: Duration::from_secs(60 * 60),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GOOGLE_API_KEY").ok_or(ConfigError::Missing("GOOGLE_API_KEY"))?;
        let cse_id = lookup("GOOGLE_CSE_ID").ok_or(ConfigError::Missing("GOOGLE_CSE_ID"))?;
        let mut config = Self::with_credentials(api_key, cse_id);

        if let Some(v) = lookup("TRENDI_BIND_ADDR") { config.bind_addr = v; }
        if let Some(v) = lookup("GOOGLE_SEARCH_ENDPOINT") { config.search_endpoint = v; }
        if let Some(v) = lookup("GOOGLE_TRENDS_URL") { config.trends_url = v; }
        if let Some(v) = lookup("SUMMARIZER_ENDPOINT") { config.summarizer_endpoint = v; }
        if let Some(v) = lookup("SUMMARIZER_MODEL") { config.summarizer_model = v; }
        config.summarizer_token = lookup("HF_API_TOKEN").filter(|t| !t.trim().is_empty());

        if let Some(v) = lookup("TRENDS_TIMEOUT_SECS") {
            config.trends_timeout = parse_secs("TRENDS_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PROXY_SPEED_THRESHOLD_SECS") {
            config.proxy_speed_threshold = parse_secs("PROXY_SPEED_THRESHOLD_SECS", &v)?;
        }
        if let Some(v) = lookup("SESSION_TTL_SECS") {
            config.session_ttl = parse_secs("SESSION_TTL_SECS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("GOOGLE_API_KEY"));
        }
        if self.cse_id.trim().is_empty() {
            return Err(ConfigError::Missing("GOOGLE_CSE_ID"));
        }
        check_http_url("GOOGLE_SEARCH_ENDPOINT", &self.search_endpoint)?;
        check_http_url("GOOGLE_TRENDS_URL", &self.trends_url)?;
        check_http_url("SUMMARIZER_ENDPOINT", &self.summarizer_endpoint)?;
        for (name, value) in [
            ("TRENDS_TIMEOUT_SECS", self.trends_timeout),
            ("PROXY_SPEED_THRESHOLD_SECS", self.proxy_speed_threshold),
            ("SESSION_TTL_SECS", self.session_ttl),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be greater than 0".into(),
                });
            }
        }
        Ok(())
    }
}

fn parse_secs(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("'{}' is not a number of seconds", raw),
    })?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("'{}' is not a number of seconds", raw),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("'{}' seconds is out of range", raw),
    })
}

fn check_http_url(name: &'static str, raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::Invalid {
            name,
            reason: "must use http or https".into(),
        });
    }
    Ok(())
}
