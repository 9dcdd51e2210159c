//! Station connection settings and credentials.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use station_common::EndpointId;

use crate::error::{ClientError, Result};

/// How the password is transformed before it is submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginSchemeKind {
    /// Double PBKDF2-HMAC-SHA256 over the station-provided salts.
    #[default]
    Pbkdf2,
    /// Password sent unchanged.
    Plaintext,
}

/// Station connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Base URL of the station web interface (default: "http://192.168.0.1").
    #[serde(default = "default_url")]
    pub url: String,

    /// Login user name (default: "admin").
    #[serde(default = "default_username")]
    pub username: String,

    /// Login password.
    #[serde(default)]
    pub password: String,

    /// Password derivation used during login.
    #[serde(default)]
    pub login_scheme: LoginSchemeKind,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Accept self-signed certificates on HTTPS stations.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Endpoints to fetch on every scrape (default: all).
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointId>,
}

fn default_url() -> String {
    "http://192.168.0.1".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_endpoints() -> Vec<EndpointId> {
    EndpointId::ALL.to_vec()
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: default_username(),
            password: String::new(),
            login_scheme: LoginSchemeKind::default(),
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            accept_invalid_certs: false,
            endpoints: default_endpoints(),
        }
    }
}

impl StationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate the station settings.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| ClientError::config(format!("Invalid station URL '{}': {}", self.url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::config(format!(
                "Station URL must use http or https: {}",
                self.url
            )));
        }

        if self.username.is_empty() {
            return Err(ClientError::config("username must not be empty"));
        }

        if self.request_timeout_ms == 0 {
            return Err(ClientError::config("request_timeout_ms must be > 0"));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ClientError::config("connect_timeout_ms must be > 0"));
        }

        if self.endpoints.is_empty() {
            return Err(ClientError::config("at least one endpoint must be enabled"));
        }

        Ok(())
    }

    /// Endpoints to fetch, deduplicated and in fetch order.
    pub fn enabled_endpoints(&self) -> Vec<EndpointId> {
        let mut endpoints = self.endpoints.clone();
        endpoints.sort();
        endpoints.dedup();
        endpoints
    }

    /// Build the immutable credentials shared by all scrapes.
    pub fn credentials(&self) -> Arc<Credentials> {
        Arc::new(Credentials {
            url: self.url.trim_end_matches('/').to_string(),
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

/// Station URL and login, fixed for the process lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    url: String,
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(url: &str, username: &str, password: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Base URL without a trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
