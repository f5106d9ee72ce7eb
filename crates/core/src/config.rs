use std::{env, time::Duration};

use reqwest::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_ANALYZE_PATH: &str = "/analyze_class";
pub const DEFAULT_GENERATE_PATH: &str = "/generate_report";

const API_URL_VAR: &str = "INSIGHT_API_URL";
const ANALYZE_PATH_VAR: &str = "INSIGHT_ANALYZE_PATH";
const GENERATE_PATH_VAR: &str = "INSIGHT_GENERATE_PATH";
const TIMEOUT_VAR: &str = "INSIGHT_HTTP_TIMEOUT_SECS";

/// Where the audit service lives and how to reach it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub analyze_path: String,
    pub generate_path: String,
    /// No timeout unless configured; an analysis can take minutes.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            analyze_path: DEFAULT_ANALYZE_PATH.to_string(),
            generate_path: DEFAULT_GENERATE_PATH.to_string(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Self::default().with_base_url(base_url)
    }

    /// Point at a different service while keeping the endpoint paths.
    pub fn with_base_url(self, base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            ..self
        })
    }

    /// Read the configuration from the environment, loading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(API_URL_VAR).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let timeout = match lookup(TIMEOUT_VAR) {
            Some(value) => Some(parse_timeout(&value)?),
            None => None,
        };

        Ok(Self {
            base_url: parse_base_url(&base_url)?,
            analyze_path: lookup(ANALYZE_PATH_VAR)
                .unwrap_or_else(|| DEFAULT_ANALYZE_PATH.to_string()),
            generate_path: lookup(GENERATE_PATH_VAR)
                .unwrap_or_else(|| DEFAULT_GENERATE_PATH.to_string()),
            timeout,
        })
    }

    pub fn analyze_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.analyze_path)
    }

    pub fn generate_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.generate_path)
    }

    /// Resolve a service-relative path (such as a rendered report image)
    /// against the base URL. Absolute URLs are returned as-is.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        let path = path.trim();
        if path.starts_with("http://") || path.starts_with("https://") {
            return parse_url(path);
        }
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        parse_url(&joined)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = parse_url(raw.trim())?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "expected an http(s) base URL".to_string(),
        });
    }
    Ok(url)
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidTimeout {
            var: TIMEOUT_VAR,
            value: value.to_string(),
        })
}
