//! Configuration for the Prometheus exporter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use station_client::{ClientError, StationConfig};
use station_common::LoggingConfig;

use crate::exposition::{sanitize_label_name, sanitize_metric_name};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] station_common::Error),
    #[error("Invalid station settings: {0}")]
    Station(#[from] ClientError),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Station connection settings.
    #[serde(default)]
    pub station: StationConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Per-scrape limits.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Metric filtering settings.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "[::]:9420").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Default labels to add to all metrics.
    #[serde(default)]
    pub default_labels: BTreeMap<String, String>,

    /// Metric name prefix (default: "vodafone_station").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "[::]:9420".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "vodafone_station".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            default_labels: BTreeMap::new(),
            prefix: default_prefix(),
        }
    }
}

/// Scrape limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Upper bound for one whole fetch cycle, login to logout (seconds).
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,
}

fn default_scrape_timeout() -> u64 {
    30
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
        }
    }
}

impl ScrapeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Metric filtering configuration.
///
/// Patterns match the unprefixed metric name, e.g. `docsis_*` or `host_*`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns for metrics to include (empty = all).
    #[serde(default)]
    pub include_metrics: Vec<String>,

    /// Glob patterns for metrics to exclude.
    #[serde(default)]
    pub exclude_metrics: Vec<String>,
}

/// Settings given on the command line, applied over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub listen: Option<String>,
    pub station_url: Option<String>,
    pub station_password: Option<String>,
    pub log_level: Option<String>,
}

impl CliOverrides {
    pub fn apply(self, config: &mut ExporterConfig) {
        if let Some(listen) = self.listen {
            config.prometheus.listen = listen;
        }
        if let Some(url) = self.station_url {
            config.station.url = url;
        }
        if let Some(password) = self.station_password {
            config.station.password = password;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

impl ExporterConfig {
    /// Load and validate configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON5 file without validating it.
    ///
    /// Callers that layer overrides on top must call [`validate`](Self::validate)
    /// once they are applied.
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(station_common::load_config(path)?)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = station_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.station.validate()?;

        if self.scrape.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "scrape.timeout_secs must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if matches!(self.prometheus.path.as_str(), "/" | "/health") {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is reserved",
                self.prometheus.path
            )));
        }

        if sanitize_metric_name(&self.prometheus.prefix) != self.prometheus.prefix {
            return Err(ConfigError::Validation(format!(
                "Invalid metric prefix: {}",
                self.prometheus.prefix
            )));
        }

        for name in self.prometheus.default_labels.keys() {
            if sanitize_label_name(name) != *name {
                return Err(ConfigError::Validation(format!(
                    "Invalid default label name: {}",
                    name
                )));
            }
        }

        for pattern in self
            .filters
            .include_metrics
            .iter()
            .chain(&self.filters.exclude_metrics)
        {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("Invalid metric pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_client::{EndpointId, LoginSchemeKind};
    use station_common::LogFormat;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let json = "{}";
        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.prometheus.listen, "[::]:9420");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.prometheus.prefix, "vodafone_station");
        assert_eq!(config.scrape.timeout_secs, 30);
        assert_eq!(config.station.url, "http://192.168.0.1");
        assert_eq!(config.station.endpoints.len(), EndpointId::ALL.len());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            station: {
                url: "https://192.168.100.1",
                username: "admin",
                password: "hunter2",
                login_scheme: "plaintext",
                accept_invalid_certs: true,
                endpoints: ["docsis_status", "led_setting"]
            },
            prometheus: {
                listen: "127.0.0.1:9421",
                path: "/prometheus/metrics",
                prefix: "cable",
                default_labels: {
                    site: "home",
                }
            },
            scrape: { timeout_secs: 15 },
            filters: {
                exclude_metrics: ["host_*"]
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.station.url, "https://192.168.100.1");
        assert_eq!(config.station.login_scheme, LoginSchemeKind::Plaintext);
        assert!(config.station.accept_invalid_certs);
        assert_eq!(
            config.station.endpoints,
            vec![EndpointId::DocsisStatus, EndpointId::LedSetting]
        );
        assert_eq!(config.prometheus.listen, "127.0.0.1:9421");
        assert_eq!(config.prometheus.path, "/prometheus/metrics");
        assert_eq!(config.prometheus.prefix, "cable");
        assert_eq!(
            config.prometheus.default_labels.get("site"),
            Some(&"home".to_string())
        );
        assert_eq!(config.scrape.timeout(), Duration::from_secs(15));
        assert_eq!(config.filters.exclude_metrics, vec!["host_*"]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ station: {{ password: 'pw' }}, scrape: {{ timeout_secs: 5 }} }}").unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.station.password, "pw");
        assert_eq!(config.scrape.timeout_secs, 5);
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            prometheus: { listen: "not-an-address" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            prometheus: { path: "no-leading-slash" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );

        let result = ExporterConfig::parse(r#"{ prometheus: { path: "/health" } }"#);
        assert!(result.unwrap_err().to_string().contains("reserved"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let result = ExporterConfig::parse("{ scrape: { timeout_secs: 0 } }");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_bad_prefix_and_labels() {
        assert!(ExporterConfig::parse(r#"{ prometheus: { prefix: "my-station" } }"#).is_err());
        assert!(ExporterConfig::parse(r#"{ prometheus: { prefix: "" } }"#).is_ok());
        assert!(
            ExporterConfig::parse(r#"{ prometheus: { default_labels: { "bad label": "x" } } }"#)
                .is_err()
        );
    }

    #[test]
    fn test_validate_station_settings() {
        let result = ExporterConfig::parse(r#"{ station: { url: "ftp://modem" } }"#);
        assert!(matches!(result, Err(ConfigError::Station(_))));

        let result = ExporterConfig::parse(r#"{ station: { endpoints: ["wifi"] } }"#);
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_overrides_are_validated_after_applying() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ station: {{ url: "ftp://modem" }} }}"#).unwrap();

        assert!(ExporterConfig::load_from_file(file.path()).is_err());

        let mut config = ExporterConfig::read_file(file.path()).unwrap();
        CliOverrides {
            station_url: Some("http://192.168.100.1".to_string()),
            ..Default::default()
        }
        .apply(&mut config);
        config.validate().unwrap();
        assert_eq!(config.station.url, "http://192.168.100.1");
    }

    #[test]
    fn test_overrides_can_break_a_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ prometheus: {{ listen: "127.0.0.1:9420" }} }}"#).unwrap();

        let mut config = ExporterConfig::read_file(file.path()).unwrap();
        CliOverrides {
            listen: Some("not-an-address".to_string()),
            log_level: Some("debug".to_string()),
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().unwrap_err().to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_validate_bad_glob() {
        let result = ExporterConfig::parse(r#"{ filters: { include_metrics: ["[docsis"] } }"#);
        assert!(result.unwrap_err().to_string().contains("Invalid metric pattern"));
    }
}
