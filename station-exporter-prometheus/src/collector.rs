//! Scrape orchestration.
//!
//! One [`StationCollector::collect`] call is one fetch-and-map cycle against
//! the station. Every call builds its own [`SessionClient`], so overlapping
//! scrapes share nothing but the read-only credentials.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use station_client::{Credentials, FetchReport, SessionClient, StationConfig, TelemetryFetcher};
use tracing::{debug, error, info, warn};

use crate::config::{ExporterConfig, FilterConfig};
use crate::exposition::Renderer;
use crate::mapping::{MetricSample, map_records};
use crate::metrics::{self, MetricDescriptor};

/// Result of one scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Scrape {
    /// Whether at least one endpoint returned data.
    pub up: bool,
    /// Device-derived and per-scrape samples, without the liveness sample.
    pub samples: Vec<MetricSample>,
}

impl Scrape {
    fn down() -> Self {
        Self {
            up: false,
            samples: Vec::new(),
        }
    }

    /// The liveness sample.
    pub fn up_sample(&self) -> MetricSample {
        MetricSample::new(&metrics::UP, Vec::new(), if self.up { 1.0 } else { 0.0 })
    }

    /// Liveness sample followed by every other sample.
    pub fn all_samples(&self) -> Vec<MetricSample> {
        let mut samples = Vec::with_capacity(self.samples.len() + 1);
        samples.push(self.up_sample());
        samples.extend(self.samples.iter().cloned());
        samples
    }
}

/// Filter for exported metrics.
pub struct MetricFilter {
    include_metrics: Vec<glob::Pattern>,
    exclude_metrics: Vec<glob::Pattern>,
}

impl MetricFilter {
    /// Create a new filter from configuration. Invalid patterns are ignored.
    pub fn new(config: &FilterConfig) -> Self {
        let include_metrics = config
            .include_metrics
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let exclude_metrics = config
            .exclude_metrics
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        Self {
            include_metrics,
            exclude_metrics,
        }
    }

    /// Check if a metric should be exported. Liveness is always exported.
    pub fn should_include(&self, descriptor: &MetricDescriptor) -> bool {
        if std::ptr::eq(descriptor, &metrics::UP) {
            return true;
        }

        if !self.include_metrics.is_empty()
            && !self
                .include_metrics
                .iter()
                .any(|p| p.matches(descriptor.name))
        {
            return false;
        }

        !self
            .exclude_metrics
            .iter()
            .any(|p| p.matches(descriptor.name))
    }
}

impl Default for MetricFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}

/// Collector statistics.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Scrapes started.
    pub scrapes: u64,
    /// Scrapes that ended with up=0.
    pub failed_scrapes: u64,
    /// Scrapes cut off by the scrape timeout.
    pub timed_out_scrapes: u64,
    /// Samples produced by the last successful scrape.
    pub last_sample_count: usize,
}

/// Runs scrapes against one station.
pub struct StationCollector {
    station: StationConfig,
    credentials: Arc<Credentials>,
    fetcher: TelemetryFetcher,
    filter: MetricFilter,
    renderer: Renderer,
    timeout: Duration,
    stats: RwLock<CollectorStats>,
}

impl StationCollector {
    /// Create a collector from validated configuration.
    pub fn new(config: &ExporterConfig) -> Self {
        Self {
            credentials: config.station.credentials(),
            fetcher: TelemetryFetcher::new(config.station.enabled_endpoints())
                .with_time_budget(config.scrape.timeout()),
            station: config.station.clone(),
            filter: MetricFilter::new(&config.filters),
            renderer: Renderer::new(&config.prometheus.prefix, &config.prometheus.default_labels),
            timeout: config.scrape.timeout(),
            stats: RwLock::new(CollectorStats::default()),
        }
    }

    /// Run one scrape. Never fails; every problem degrades to `up = false`.
    pub async fn collect(&self) -> Scrape {
        self.stats.write().scrapes += 1;

        let client = match SessionClient::new(self.credentials.clone(), &self.station) {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Failed to create station client");
                return self.finish(Scrape::down());
            }
        };

        // The scrape timeout is enforced by the fetcher, which still logs out.
        let report = self.fetcher.fetch_all(&client).await;
        if report.deadline_exceeded {
            warn!(
                timeout_secs = self.timeout.as_secs(),
                fetched = report.records.len(),
                "Scrape timed out, station requests abandoned"
            );
            self.stats.write().timed_out_scrapes += 1;
            return self.finish(Scrape::down());
        }

        self.finish(self.build(&report))
    }

    /// Run one scrape and render it in text exposition format.
    pub async fn render(&self) -> String {
        let scrape = self.collect().await;
        self.renderer.render(&scrape.all_samples())
    }

    /// Get collector statistics.
    pub fn stats(&self) -> CollectorStats {
        self.stats.read().clone()
    }

    fn build(&self, report: &FetchReport) -> Scrape {
        if !report.any_success() {
            warn!(
                failures = report.failures.len(),
                login_error = ?report.login_error,
                "No telemetry from station"
            );
            return Scrape::down();
        }

        let mut samples = vec![
            MetricSample::new(
                &metrics::SCRAPE_DURATION,
                Vec::new(),
                report.duration.as_secs_f64(),
            ),
            MetricSample::new(&metrics::SESSION_RELOGINS, Vec::new(), report.relogins as f64),
        ];
        for endpoint in self.fetcher.endpoints() {
            let value = if report.succeeded(*endpoint) { 1.0 } else { 0.0 };
            samples.push(MetricSample::new(
                &metrics::ENDPOINT_UP,
                vec![endpoint.to_string()],
                value,
            ));
        }
        samples.extend(map_records(&report.records));

        let before = samples.len();
        samples.retain(|s| self.filter.should_include(s.descriptor));
        if samples.len() < before {
            debug!(filtered = before - samples.len(), "Samples filtered out");
        }

        Scrape { up: true, samples }
    }

    fn finish(&self, scrape: Scrape) -> Scrape {
        let mut stats = self.stats.write();
        if scrape.up {
            stats.last_sample_count = scrape.samples.len();
        } else {
            stats.failed_scrapes += 1;
        }
        drop(stats);

        info!(up = scrape.up, samples = scrape.samples.len(), "Scrape finished");
        scrape
    }
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<StationCollector>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_exclude_glob() {
        let filter = MetricFilter::new(&FilterConfig {
            exclude_metrics: vec!["host_*".to_string()],
            ..Default::default()
        });

        assert!(!filter.should_include(&metrics::HOST_ACTIVE));
        assert!(!filter.should_include(&metrics::HOST_LEASE_REMAINING));
        assert!(filter.should_include(&metrics::LED_ENABLED));
    }

    #[test]
    fn test_filter_include_glob() {
        let filter = MetricFilter::new(&FilterConfig {
            include_metrics: vec!["docsis_*".to_string()],
            ..Default::default()
        });

        assert!(filter.should_include(&metrics::DS_POWER));
        assert!(!filter.should_include(&metrics::UPTIME));
    }

    #[test]
    fn test_filter_never_drops_up() {
        let filter = MetricFilter::new(&FilterConfig {
            include_metrics: vec!["docsis_*".to_string()],
            exclude_metrics: vec!["*".to_string()],
        });

        assert!(filter.should_include(&metrics::UP));
        assert!(!filter.should_include(&metrics::DS_POWER));
    }

    #[test]
    fn test_down_scrape_has_only_liveness() {
        let scrape = Scrape::down();
        let all = scrape.all_samples();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].descriptor.name, "up");
        assert_eq!(all[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_unreachable_station_is_down() {
        let config = ExporterConfig::parse(
            r#"{ station: { url: "http://127.0.0.1:1", connect_timeout_ms: 200, request_timeout_ms: 500 } }"#,
        )
        .unwrap();
        let collector = StationCollector::new(&config);

        let scrape = collector.collect().await;
        assert!(!scrape.up);
        assert!(scrape.samples.is_empty());

        let stats = collector.stats();
        assert_eq!(stats.scrapes, 1);
        assert_eq!(stats.failed_scrapes, 1);
    }
}
