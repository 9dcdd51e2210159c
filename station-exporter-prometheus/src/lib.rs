//! Prometheus exporter for Vodafone Station cable modems.
//!
//! Every request on the metrics path logs in to the station, reads the
//! configured endpoints, maps them to metrics and logs out again.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   HTTP Server   │────>│    Collector    │────>│ Station Client  │
//! │   (/metrics)    │<────│ (fetch + map)   │<────│ (login/fetch)   │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! station-exporter --config station.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod exposition;
pub mod http;
pub mod mapping;
pub mod metrics;

pub use collector::{MetricFilter, Scrape, SharedCollector, StationCollector};
pub use config::{CliOverrides, ExporterConfig};
pub use http::HttpServer;
pub use mapping::{MetricSample, map_records};
pub use metrics::MetricDescriptor;
