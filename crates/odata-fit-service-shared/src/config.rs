//! Service configuration read from the environment.
//!
//! # Environment Variables
//!
//! - `FIT_FIXTURES_PATH`: fixture root directory (default: `./fixtures`)
//! - `SERVICE_PORT`: HTTP port (default: 8080)
//! - `SERVICE_BASE_URL`: externally reachable base URL used for `Location`
//!   headers and batch loopback calls (default: `http://localhost:<port>`)
//! - `FIT_DISPATCH_USER` / `FIT_DISPATCH_PASSWORD`: basic auth identity sent
//!   on batch loopback calls (default: `fit` / `fit`)

use std::path::PathBuf;

use odata_fit_lib::DispatchCredentials;
use url::Url;

/// Default fixture root, relative to the working directory.
pub const DEFAULT_FIXTURES_PATH: &str = "./fixtures";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Runtime configuration of the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub fixtures_path: PathBuf,
    pub port: u16,
    /// Base URL, always ending in `/`.
    pub base_url: Url,
    pub credentials: DispatchCredentials,
}

impl ServiceConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which returns the value of a
    /// variable or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let fixtures_path = lookup("FIT_FIXTURES_PATH")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FIXTURES_PATH.to_string())
            .into();

        let port = match lookup("SERVICE_PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(value))?,
            None => DEFAULT_PORT,
        };

        let base_url = lookup("SERVICE_BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        let base_url = normalize_base_url(&base_url)?;

        let defaults = DispatchCredentials::default();
        let credentials = DispatchCredentials {
            username: lookup("FIT_DISPATCH_USER").unwrap_or(defaults.username),
            password: lookup("FIT_DISPATCH_PASSWORD").unwrap_or(defaults.password),
        };

        Ok(Self {
            fixtures_path,
            port,
            base_url,
            credentials,
        })
    }
}

/// Parse a base URL and make sure its path ends with `/` so that joining a
/// version prefix appends instead of replacing the last segment.
pub fn normalize_base_url(value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value.trim()).map_err(|e| ConfigError::InvalidBaseUrl {
        value: value.to_string(),
        message: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl {
            value: value.to_string(),
            message: "not a base URL".to_string(),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `SERVICE_PORT` is not a valid port number.
    InvalidPort(String),
    /// `SERVICE_BASE_URL` is not an absolute base URL.
    InvalidBaseUrl { value: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort(value) => write!(f, "invalid SERVICE_PORT: {}", value),
            ConfigError::InvalidBaseUrl { value, message } => {
                write!(f, "invalid SERVICE_BASE_URL {}: {}", value, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
