//! Prometheus exporter for Vodafone Station cable modems.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use station_exporter_prometheus::exposition::build_metric_name;
use station_exporter_prometheus::metrics;
use station_exporter_prometheus::{CliOverrides, ExporterConfig, HttpServer, StationCollector};

/// Prometheus exporter for Vodafone Station cable modems.
#[derive(Parser, Debug)]
#[command(name = "station-exporter")]
#[command(about = "Export Vodafone Station telemetry as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Station base URL (overrides config).
    #[arg(long)]
    station_url: Option<String>,

    /// Station password (overrides config).
    #[arg(long, env = "VODAFONE_STATION_PASSWORD", hide_env_values = true)]
    station_password: Option<String>,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,

    /// Print the metric catalog and exit.
    #[arg(long)]
    show_metrics: bool,
}

fn print_metrics(prefix: &str) {
    for descriptor in metrics::catalog() {
        let name = build_metric_name(prefix, descriptor.name);
        let labels = if descriptor.labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", descriptor.labels.join(","))
        };
        let source = descriptor
            .endpoint
            .map(|endpoint| endpoint.as_str())
            .unwrap_or("exporter");
        println!(
            "{}{} [{}, {}] {}",
            name,
            labels,
            descriptor.kind.as_str(),
            source,
            descriptor.help
        );
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration; validated once the overrides are in
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::read_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    CliOverrides {
        listen: args.listen,
        station_url: args.station_url,
        station_password: args.station_password,
        log_level: args.log_level,
    }
    .apply(&mut config);
    config.validate()?;

    if args.show_metrics {
        print_metrics(&config.prometheus.prefix);
        return Ok(());
    }

    station_common::init_tracing(&config.logging)?;

    info!(
        station = %config.station.url,
        endpoints = config.station.enabled_endpoints().len(),
        "Starting Vodafone Station exporter"
    );
    if config.station.password.is_empty() {
        info!("No station password configured, logins will most likely be refused");
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let collector = Arc::new(StationCollector::new(&config));

    // Parse listen address
    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let http_server = HttpServer::new(
        collector.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );

    // Start HTTP server
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_signal().await;

    // Signal shutdown
    shutdown_tx.send(true)?;

    // In-flight scrapes are abandoned after the grace period.
    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    let stats = collector.stats();
    info!(
        scrapes = stats.scrapes,
        failed_scrapes = stats.failed_scrapes,
        timed_out_scrapes = stats.timed_out_scrapes,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}
