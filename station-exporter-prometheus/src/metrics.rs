//! Static catalog of exported metrics.
//!
//! Names are unprefixed; the configured prefix is added at render time.
//! Dashboards key on these names and label sets, so changing them is a
//! breaking change.

use station_common::EndpointId;

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// Name, help text and label names of one exported metric.
#[derive(Debug, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
    /// Endpoint the values come from; `None` for collector-level metrics.
    pub endpoint: Option<EndpointId>,
}

const NO_LABELS: &[&str] = &[];
const CHANNEL_LABELS: &[&str] = &["id", "channel_id", "fft", "channel_type"];
const RANGING_LABELS: &[&str] = &["id", "channel_id", "fft", "channel_type", "status"];
const HOST_LABELS: &[&str] = &["mac", "hostname", "ip", "interface"];
const CALL_LABELS: &[&str] = &["line", "type"];

macro_rules! descriptor {
    ($ident:ident, $name:literal, $kind:ident, $labels:expr, $endpoint:expr, $help:literal) => {
        pub static $ident: MetricDescriptor = MetricDescriptor {
            name: $name,
            help: $help,
            kind: MetricKind::$kind,
            labels: $labels,
            endpoint: $endpoint,
        };
    };
}

// Collector
descriptor!(UP, "up", Gauge, NO_LABELS, None,
    "Whether any telemetry could be read from the station (1) or not (0)");
descriptor!(SCRAPE_DURATION, "scrape_duration_seconds", Gauge, NO_LABELS, None,
    "Wall time spent fetching telemetry from the station");
descriptor!(ENDPOINT_UP, "endpoint_up", Gauge, &["endpoint"], None,
    "Whether the endpoint returned data during this scrape");
descriptor!(SESSION_RELOGINS, "session_relogins", Gauge, NO_LABELS, None,
    "Re-logins performed during this scrape after the station dropped the session");

// DOCSIS downstream (SC-QAM)
const DOCSIS: Option<EndpointId> = Some(EndpointId::DocsisStatus);
descriptor!(DS_FREQUENCY, "docsis_downstream_channel_frequency_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "Downstream channel center frequency in Hz");
descriptor!(DS_POWER, "docsis_downstream_channel_power_dbmv", Gauge, CHANNEL_LABELS, DOCSIS,
    "Downstream channel receive power in dBmV");
descriptor!(DS_SNR, "docsis_downstream_channel_snr_db", Gauge, CHANNEL_LABELS, DOCSIS,
    "Downstream channel signal to noise ratio in dB");
descriptor!(DS_LOCKED, "docsis_downstream_channel_locked", Gauge, CHANNEL_LABELS, DOCSIS,
    "Whether the downstream channel is locked");
descriptor!(DS_CORRECTED, "docsis_downstream_channel_corrected_errors_total", Counter, CHANNEL_LABELS, DOCSIS,
    "Codewords with corrected errors on the downstream channel");
descriptor!(DS_UNCORRECTABLE, "docsis_downstream_channel_uncorrectable_errors_total", Counter, CHANNEL_LABELS, DOCSIS,
    "Codewords with uncorrectable errors on the downstream channel");

// DOCSIS 3.1 downstream (OFDM)
descriptor!(OFDM_START_FREQUENCY, "docsis_ofdm_downstream_start_frequency_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDM downstream channel lower edge in Hz");
descriptor!(OFDM_END_FREQUENCY, "docsis_ofdm_downstream_end_frequency_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDM downstream channel upper edge in Hz");
descriptor!(OFDM_CENTRAL_FREQUENCY, "docsis_ofdm_downstream_central_frequency_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDM downstream channel center frequency in Hz");
descriptor!(OFDM_BANDWIDTH, "docsis_ofdm_downstream_bandwidth_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDM downstream channel bandwidth in Hz");
descriptor!(OFDM_POWER, "docsis_ofdm_downstream_power_dbmv", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDM downstream channel receive power in dBmV");
descriptor!(OFDM_SNR, "docsis_ofdm_downstream_snr_db", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDM downstream channel signal to noise ratio in dB");
descriptor!(OFDM_LOCKED, "docsis_ofdm_downstream_locked", Gauge, CHANNEL_LABELS, DOCSIS,
    "Whether the OFDM downstream channel is locked");

// DOCSIS upstream (SC-QAM)
descriptor!(US_FREQUENCY, "docsis_upstream_channel_frequency_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "Upstream channel center frequency in Hz");
descriptor!(US_POWER, "docsis_upstream_channel_power_dbmv", Gauge, CHANNEL_LABELS, DOCSIS,
    "Upstream channel transmit power in dBmV");
descriptor!(US_RANGING, "docsis_upstream_channel_ranging_status_info", Gauge, RANGING_LABELS, DOCSIS,
    "Ranging status of the upstream channel, always 1");

// DOCSIS 3.1 upstream (OFDMA)
descriptor!(OFDMA_START_FREQUENCY, "docsis_ofdma_upstream_start_frequency_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDMA upstream channel lower edge in Hz");
descriptor!(OFDMA_END_FREQUENCY, "docsis_ofdma_upstream_end_frequency_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDMA upstream channel upper edge in Hz");
descriptor!(OFDMA_CENTRAL_FREQUENCY, "docsis_ofdma_upstream_central_frequency_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDMA upstream channel center frequency in Hz");
descriptor!(OFDMA_BANDWIDTH, "docsis_ofdma_upstream_bandwidth_hz", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDMA upstream channel bandwidth in Hz");
descriptor!(OFDMA_POWER, "docsis_ofdma_upstream_power_dbmv", Gauge, CHANNEL_LABELS, DOCSIS,
    "OFDMA upstream channel transmit power in dBmV");
descriptor!(OFDMA_RANGING, "docsis_ofdma_upstream_ranging_status_info", Gauge, RANGING_LABELS, DOCSIS,
    "Ranging status of the OFDMA upstream channel, always 1");

// Station status
const STATUS: Option<EndpointId> = Some(EndpointId::StationStatus);
descriptor!(INFO, "info", Gauge, &["model", "firmware_version", "hardware_version", "serial_number"], STATUS,
    "Station identity, always 1");
descriptor!(UPTIME, "uptime_seconds", Gauge, NO_LABELS, STATUS,
    "Time since the station booted");
descriptor!(CM_STATUS, "cm_status_info", Gauge, &["status"], STATUS,
    "Cable modem status, always 1");
descriptor!(PROVISIONING_STATUS, "provisioning_status_info", Gauge, &["status"], STATUS,
    "Provisioning status, always 1");
descriptor!(FIREWALL_LEVEL, "firewall_level_info", Gauge, &["level"], STATUS,
    "Configured firewall level, always 1");
descriptor!(DSLITE_ENABLED, "dslite_enabled", Gauge, NO_LABELS, STATUS,
    "Whether DS-Lite is enabled");

// Connected hosts
const HOSTS: Option<EndpointId> = Some(EndpointId::ConnectedHosts);
descriptor!(HOST_ACTIVE, "host_active", Gauge, HOST_LABELS, HOSTS,
    "Whether the host is currently connected");
descriptor!(HOST_LEASE_REMAINING, "host_lease_remaining_seconds", Gauge, &["mac"], HOSTS,
    "Remaining DHCP lease time of the host");

// Call log
const CALLS: Option<EndpointId> = Some(EndpointId::CallLog);
descriptor!(CALL_LOG_ENTRIES, "call_log_entries", Gauge, CALL_LABELS, CALLS,
    "Calls in the station call log");
descriptor!(CALL_LOG_DURATION, "call_log_duration_seconds", Gauge, CALL_LABELS, CALLS,
    "Summed duration of the calls in the station call log");

// LED
descriptor!(LED_ENABLED, "led_enabled", Gauge, NO_LABELS, Some(EndpointId::LedSetting),
    "Whether the front LEDs are enabled");

static CATALOG: [&MetricDescriptor; 37] = [
    &UP,
    &SCRAPE_DURATION,
    &ENDPOINT_UP,
    &SESSION_RELOGINS,
    &DS_FREQUENCY,
    &DS_POWER,
    &DS_SNR,
    &DS_LOCKED,
    &DS_CORRECTED,
    &DS_UNCORRECTABLE,
    &OFDM_START_FREQUENCY,
    &OFDM_END_FREQUENCY,
    &OFDM_CENTRAL_FREQUENCY,
    &OFDM_BANDWIDTH,
    &OFDM_POWER,
    &OFDM_SNR,
    &OFDM_LOCKED,
    &US_FREQUENCY,
    &US_POWER,
    &US_RANGING,
    &OFDMA_START_FREQUENCY,
    &OFDMA_END_FREQUENCY,
    &OFDMA_CENTRAL_FREQUENCY,
    &OFDMA_BANDWIDTH,
    &OFDMA_POWER,
    &OFDMA_RANGING,
    &INFO,
    &UPTIME,
    &CM_STATUS,
    &PROVISIONING_STATUS,
    &FIREWALL_LEVEL,
    &DSLITE_ENABLED,
    &HOST_ACTIVE,
    &HOST_LEASE_REMAINING,
    &CALL_LOG_ENTRIES,
    &CALL_LOG_DURATION,
    &LED_ENABLED,
];

/// Every exported metric, in exposition order.
pub fn catalog() -> impl Iterator<Item = &'static MetricDescriptor> {
    CATALOG.iter().copied()
}
