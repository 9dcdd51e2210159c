//! Mapping from station payloads to metric samples.
//!
//! Every known field has a fixed extraction rule. Missing fields produce no
//! sample; a malformed field is logged and only that sample is dropped.

use std::collections::{BTreeMap, HashSet};

use station_common::{EndpointId, RawRecord, RawValue};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::metrics::{self, MetricDescriptor};

/// One data point of one scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub descriptor: &'static MetricDescriptor,
    /// Values for `descriptor.labels`, in the same order.
    pub labels: Vec<String>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(descriptor: &'static MetricDescriptor, labels: Vec<String>, value: f64) -> Self {
        debug_assert_eq!(descriptor.labels.len(), labels.len(), "{}", descriptor.name);
        Self {
            descriptor,
            labels,
            value,
        }
    }

    /// Label value by label name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.descriptor
            .labels
            .iter()
            .position(|l| *l == name)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}

/// A single field that could not be read.
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    #[error("field '{field}' has unexpected type {kind}")]
    UnexpectedType { field: String, kind: &'static str },

    #[error("field '{field}' is not a number: {value:?}")]
    NotANumber { field: String, value: String },

    #[error("field '{field}' has an unknown unit: {value:?}")]
    UnknownUnit { field: String, value: String },

    #[error("field '{field}' is not a boolean: {value:?}")]
    NotABool { field: String, value: String },

    #[error("field '{field}' is not a duration: {value:?}")]
    NotADuration { field: String, value: String },

    #[error("row {row} of table '{table}' has no '{field}'")]
    MissingIdentity {
        table: &'static str,
        row: usize,
        field: &'static str,
    },
}

/// How a field is read and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Plain number, no suffix allowed.
    Count,
    /// Frequency or bandwidth, exported in Hz.
    Hertz,
    /// Level in dB or dBmV; the suffix is dropped.
    Decibel,
    /// Boolean, exported as 0/1.
    Bool,
    /// Uptime in seconds or `3 day(s) 04h:05m:06s` form.
    Uptime,
    /// `HH:MM:SS`, `MM:SS` or plain seconds.
    Duration,
}

/// Something fields can be read from: a whole record or one table row.
pub trait Fields {
    fn field(&self, name: &str) -> Option<&RawValue>;
}

impl Fields for RawValue {
    fn field(&self, name: &str) -> Option<&RawValue> {
        self.get(name)
    }
}

impl Fields for RawRecord {
    fn field(&self, name: &str) -> Option<&RawValue> {
        self.get(name)
    }
}

/// Read `field` from `row` with the given unit.
///
/// `Ok(None)` means the field is absent (missing, null or blank).
pub fn extract(
    row: &impl Fields,
    field: &str,
    unit: Unit,
) -> Result<Option<f64>, MappingError> {
    let value = match row.field(field) {
        None | Some(RawValue::Null) => return Ok(None),
        Some(RawValue::Text(s)) if s.trim().is_empty() => return Ok(None),
        Some(value) => value,
    };

    let parsed = match (unit, value) {
        (Unit::Bool, RawValue::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        (Unit::Bool, RawValue::Number(n)) if *n == 0.0 || *n == 1.0 => Some(*n),
        (Unit::Bool, RawValue::Text(s)) => parse_bool(s).map(|b| if b { 1.0 } else { 0.0 }),
        (Unit::Bool, RawValue::Number(n)) => {
            return Err(MappingError::NotABool {
                field: field.to_string(),
                value: n.to_string(),
            });
        }
        (_, RawValue::Number(n)) => Some(*n),
        (Unit::Count, RawValue::Text(s)) => parse_plain(s),
        (Unit::Hertz, RawValue::Text(s)) => {
            return parse_frequency(s).map(Some).map_err(|e| e.for_field(field));
        }
        (Unit::Decibel, RawValue::Text(s)) => {
            return parse_decibel(s).map(Some).map_err(|e| e.for_field(field));
        }
        (Unit::Uptime, RawValue::Text(s)) => parse_uptime(s),
        (Unit::Duration, RawValue::Text(s)) => parse_duration(s),
        (_, other) => {
            return Err(MappingError::UnexpectedType {
                field: field.to_string(),
                kind: other.kind(),
            });
        }
    };

    match (parsed, value) {
        (Some(v), _) => Ok(Some(v)),
        (None, value) => {
            let value = value.to_label().unwrap_or_default();
            let field = field.to_string();
            Err(match unit {
                Unit::Bool => MappingError::NotABool { field, value },
                Unit::Uptime | Unit::Duration => MappingError::NotADuration { field, value },
                _ => MappingError::NotANumber { field, value },
            })
        }
    }
}

/// Unit parse failure before the field name is known.
#[derive(Debug)]
enum UnitError {
    NotANumber(String),
    UnknownUnit(String),
}

impl UnitError {
    fn for_field(self, field: &str) -> MappingError {
        let field = field.to_string();
        match self {
            UnitError::NotANumber(value) => MappingError::NotANumber { field, value },
            UnitError::UnknownUnit(value) => MappingError::UnknownUnit { field, value },
        }
    }
}

/// Split `"38.6 dB"` into `(38.6, "dB")`.
fn leading_number(text: &str) -> Option<(f64, &str)> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let number = text[..end].parse::<f64>().ok()?;
    Some((number, text[end..].trim()))
}

fn parse_plain(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_frequency(text: &str) -> Result<f64, UnitError> {
    let (value, unit) =
        leading_number(text).ok_or_else(|| UnitError::NotANumber(text.to_string()))?;
    let scale = match unit.to_ascii_lowercase().as_str() {
        "" | "hz" => 1.0,
        "khz" => 1e3,
        "mhz" => 1e6,
        "ghz" => 1e9,
        _ => return Err(UnitError::UnknownUnit(text.to_string())),
    };
    Ok(value * scale)
}

fn parse_decibel(text: &str) -> Result<f64, UnitError> {
    let (value, unit) =
        leading_number(text).ok_or_else(|| UnitError::NotANumber(text.to_string()))?;
    let unit = unit.to_ascii_lowercase();
    if unit.is_empty() || unit.starts_with("db") {
        Ok(value)
    } else {
        Err(UnitError::UnknownUnit(text.to_string()))
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" | "enabled" | "enable" | "locked" => Some(true),
        "false" | "0" | "off" | "no" | "disabled" | "disable" | "not locked" | "unlocked" => {
            Some(false)
        }
        _ => None,
    }
}

fn unit_seconds(unit: &str) -> Option<f64> {
    let unit = unit.to_ascii_lowercase();
    match unit.trim_end_matches("(s)") {
        "d" | "day" | "days" => Some(86_400.0),
        "h" | "hr" | "hour" | "hours" => Some(3_600.0),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60.0),
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1.0),
        _ => None,
    }
}

fn parse_uptime(text: &str) -> Option<f64> {
    if let Some(seconds) = parse_plain(text) {
        return Some(seconds);
    }

    let mut total = 0.0;
    let mut pending: Option<f64> = None;
    let mut matched = false;

    for token in text
        .split(|c: char| c.is_whitespace() || c == ':')
        .filter(|t| !t.is_empty())
    {
        match leading_number(token) {
            Some((value, "")) => {
                if pending.replace(value).is_some() {
                    return None;
                }
            }
            Some((value, unit)) => {
                total += value * unit_seconds(unit)?;
                matched = true;
            }
            None => {
                total += pending.take()? * unit_seconds(token)?;
                matched = true;
            }
        }
    }

    (matched && pending.is_none()).then_some(total)
}

fn parse_duration(text: &str) -> Option<f64> {
    let parts: Vec<f64> = text
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<f64>().ok().filter(|n| *n >= 0.0))
        .collect::<Option<_>>()?;

    match parts.as_slice() {
        [seconds] => Some(*seconds),
        [minutes, seconds] => Some(minutes * 60.0 + seconds),
        [hours, minutes, seconds] => Some(hours * 3_600.0 + minutes * 60.0 + seconds),
        _ => None,
    }
}

/// Label text for a field; absent fields give an empty label.
fn label(row: &impl Fields, field: &str) -> String {
    row.field(field)
        .and_then(RawValue::to_label)
        .unwrap_or_default()
}

/// Numeric field of a channel table.
struct FieldRule {
    field: &'static str,
    unit: Unit,
    descriptor: &'static MetricDescriptor,
}

/// Extraction rules for one channel table of the DOCSIS payload.
struct ChannelTable {
    table: &'static str,
    channel_field: &'static str,
    fft_field: &'static str,
    values: &'static [FieldRule],
    /// Ranging status field and its info metric.
    status: Option<(&'static str, &'static MetricDescriptor)>,
}

const ID_FIELD: &str = "__id";
const CHANNEL_TYPE_FIELD: &str = "ChannelType";

static DOCSIS_TABLES: [ChannelTable; 4] = [
    ChannelTable {
        table: "downstream",
        channel_field: "channelid",
        fft_field: "FFT",
        values: &[
            FieldRule { field: "CentralFrequency", unit: Unit::Hertz, descriptor: &metrics::DS_FREQUENCY },
            FieldRule { field: "power", unit: Unit::Decibel, descriptor: &metrics::DS_POWER },
            FieldRule { field: "SNR", unit: Unit::Decibel, descriptor: &metrics::DS_SNR },
            FieldRule { field: "locked", unit: Unit::Bool, descriptor: &metrics::DS_LOCKED },
            FieldRule { field: "correcteds", unit: Unit::Count, descriptor: &metrics::DS_CORRECTED },
            FieldRule { field: "uncorrect", unit: Unit::Count, descriptor: &metrics::DS_UNCORRECTABLE },
        ],
        status: None,
    },
    ChannelTable {
        table: "ofdm_downstream",
        channel_field: "channelid_ofdm",
        fft_field: "FFT_ofdm",
        values: &[
            FieldRule { field: "start_frequency", unit: Unit::Hertz, descriptor: &metrics::OFDM_START_FREQUENCY },
            FieldRule { field: "end_frequency", unit: Unit::Hertz, descriptor: &metrics::OFDM_END_FREQUENCY },
            FieldRule { field: "CentralFrequency_ofdm", unit: Unit::Hertz, descriptor: &metrics::OFDM_CENTRAL_FREQUENCY },
            FieldRule { field: "bandwidth", unit: Unit::Hertz, descriptor: &metrics::OFDM_BANDWIDTH },
            FieldRule { field: "power_ofdm", unit: Unit::Decibel, descriptor: &metrics::OFDM_POWER },
            FieldRule { field: "SNR_ofdm", unit: Unit::Decibel, descriptor: &metrics::OFDM_SNR },
            FieldRule { field: "locked_ofdm", unit: Unit::Bool, descriptor: &metrics::OFDM_LOCKED },
        ],
        status: None,
    },
    ChannelTable {
        table: "upstream",
        channel_field: "channelidup",
        fft_field: "FFT",
        values: &[
            FieldRule { field: "CentralFrequency", unit: Unit::Hertz, descriptor: &metrics::US_FREQUENCY },
            FieldRule { field: "power", unit: Unit::Decibel, descriptor: &metrics::US_POWER },
        ],
        status: Some(("RangingStatus", &metrics::US_RANGING)),
    },
    ChannelTable {
        table: "ofdma_upstream",
        channel_field: "channelidup",
        fft_field: "FFT",
        values: &[
            FieldRule { field: "start_frequency", unit: Unit::Hertz, descriptor: &metrics::OFDMA_START_FREQUENCY },
            FieldRule { field: "end_frequency", unit: Unit::Hertz, descriptor: &metrics::OFDMA_END_FREQUENCY },
            FieldRule { field: "CentralFrequency", unit: Unit::Hertz, descriptor: &metrics::OFDMA_CENTRAL_FREQUENCY },
            FieldRule { field: "bandwidth", unit: Unit::Hertz, descriptor: &metrics::OFDMA_BANDWIDTH },
            FieldRule { field: "power", unit: Unit::Decibel, descriptor: &metrics::OFDMA_POWER },
        ],
        status: Some(("RangingStatus", &metrics::OFDMA_RANGING)),
    },
];

/// Collects samples and counts what had to be skipped.
///
/// A series is emitted at most once per scrape: when two rows resolve to the
/// same metric and label set, the first one wins.
#[derive(Debug, Default)]
struct SampleSink {
    samples: Vec<MetricSample>,
    series: HashSet<(&'static str, Vec<String>)>,
    skipped: usize,
    duplicates: usize,
}

impl SampleSink {
    fn push(&mut self, descriptor: &'static MetricDescriptor, labels: Vec<String>, value: f64) {
        if !self.series.insert((descriptor.name, labels.clone())) {
            warn!(
                endpoint = ?descriptor.endpoint,
                metric = descriptor.name,
                labels = ?labels,
                "Duplicate series dropped"
            );
            self.duplicates += 1;
            return;
        }
        self.samples.push(MetricSample::new(descriptor, labels, value));
    }

    fn skip(&mut self, endpoint: EndpointId, error: MappingError) {
        warn!(endpoint = %endpoint, error = %error, "Skipping malformed sample");
        self.skipped += 1;
    }

    fn extracted(
        &mut self,
        endpoint: EndpointId,
        descriptor: &'static MetricDescriptor,
        labels: &[String],
        result: Result<Option<f64>, MappingError>,
    ) {
        match result {
            Ok(Some(value)) => self.push(descriptor, labels.to_vec(), value),
            Ok(None) => {
                trace!(endpoint = %endpoint, metric = descriptor.name, "Field absent");
            }
            Err(e) => self.skip(endpoint, e),
        }
    }
}

/// Map every fetched record to samples.
///
/// Pure and deterministic: records are visited in endpoint order, and rows
/// and fields in payload order.
pub fn map_records(records: &BTreeMap<EndpointId, RawRecord>) -> Vec<MetricSample> {
    let mut sink = SampleSink::default();

    for (endpoint, record) in records {
        match endpoint {
            EndpointId::DocsisStatus => map_docsis(record, &mut sink),
            EndpointId::StationStatus => map_station_status(record, &mut sink),
            EndpointId::ConnectedHosts => map_hosts(record, &mut sink),
            EndpointId::CallLog => map_call_log(record, &mut sink),
            EndpointId::LedSetting => map_led(record, &mut sink),
        }
    }

    if sink.skipped > 0 {
        warn!(skipped = sink.skipped, "Some samples could not be mapped");
    }
    if sink.duplicates > 0 {
        warn!(duplicates = sink.duplicates, "Some series were reported more than once");
    }
    sink.samples
}

/// Map a single endpoint's record.
pub fn map_record(endpoint: EndpointId, record: &RawRecord) -> Vec<MetricSample> {
    let mut records = BTreeMap::new();
    records.insert(endpoint, record.clone());
    map_records(&records)
}

fn map_docsis(record: &RawRecord, sink: &mut SampleSink) {
    let endpoint = EndpointId::DocsisStatus;

    for table in &DOCSIS_TABLES {
        for (index, row) in record.rows(table.table).iter().enumerate() {
            if row.as_map().is_none() {
                sink.skip(
                    endpoint,
                    MappingError::UnexpectedType {
                        field: format!("{}[{}]", table.table, index),
                        kind: row.kind(),
                    },
                );
                continue;
            }

            let id = label(row, ID_FIELD);
            if id.is_empty() {
                sink.skip(
                    endpoint,
                    MappingError::MissingIdentity {
                        table: table.table,
                        row: index,
                        field: ID_FIELD,
                    },
                );
                continue;
            }

            let labels = vec![
                id,
                label(row, table.channel_field),
                label(row, table.fft_field),
                label(row, CHANNEL_TYPE_FIELD),
            ];

            for rule in table.values {
                let result = extract(row, rule.field, rule.unit);
                sink.extracted(endpoint, rule.descriptor, &labels, result);
            }

            if let Some((field, descriptor)) = table.status {
                let status = label(row, field);
                if !status.is_empty() {
                    let mut labels = labels.clone();
                    labels.push(status);
                    sink.push(descriptor, labels, 1.0);
                }
            }
        }
    }
}

fn map_station_status(record: &RawRecord, sink: &mut SampleSink) {
    let endpoint = EndpointId::StationStatus;
    let identity = vec![
        label(record, "model"),
        label(record, "firmwareversion"),
        label(record, "hardwareversion"),
        label(record, "serialnumber"),
    ];
    if identity.iter().any(|v| !v.is_empty()) {
        sink.push(&metrics::INFO, identity, 1.0);
    }

    let result = extract(record, "uptime", Unit::Uptime);
    sink.extracted(endpoint, &metrics::UPTIME, &[], result);

    for (field, descriptor) in [
        ("cm_status", &metrics::CM_STATUS),
        ("provisioning_status", &metrics::PROVISIONING_STATUS),
        ("firewall_level", &metrics::FIREWALL_LEVEL),
    ] {
        let value = label(record, field);
        if !value.is_empty() {
            sink.push(descriptor, vec![value], 1.0);
        }
    }

    let result = extract(record, "dslite", Unit::Bool);
    sink.extracted(endpoint, &metrics::DSLITE_ENABLED, &[], result);
}

fn map_hosts(record: &RawRecord, sink: &mut SampleSink) {
    let endpoint = EndpointId::ConnectedHosts;

    for (index, row) in record.rows("hostTbl").iter().enumerate() {
        let mac = label(row, "physaddress").to_ascii_lowercase();
        if mac.is_empty() {
            sink.skip(
                endpoint,
                MappingError::MissingIdentity {
                    table: "hostTbl",
                    row: index,
                    field: "physaddress",
                },
            );
            continue;
        }

        let labels = vec![
            mac.clone(),
            label(row, "hostname"),
            label(row, "ipaddress"),
            label(row, "interfacetype"),
        ];
        let result = extract(row, "active", Unit::Bool);
        sink.extracted(endpoint, &metrics::HOST_ACTIVE, &labels, result);

        let result = extract(row, "leaseTimeRemaining", Unit::Duration);
        sink.extracted(endpoint, &metrics::HOST_LEASE_REMAINING, &[mac], result);
    }
}

fn map_call_log(record: &RawRecord, sink: &mut SampleSink) {
    let endpoint = EndpointId::CallLog;
    // (line, type) -> (entries, summed duration); the sum is dropped once a
    // call in the group has no readable duration.
    let mut totals: BTreeMap<(String, String), (u64, Option<f64>)> = BTreeMap::new();

    for row in record.rows("calllog") {
        if row.as_map().is_none() {
            sink.skip(
                endpoint,
                MappingError::UnexpectedType {
                    field: "calllog".to_string(),
                    kind: row.kind(),
                },
            );
            continue;
        }

        let key = (label(row, "line"), label(row, "type").to_ascii_lowercase());
        let duration = match extract(row, "duration", Unit::Duration) {
            Ok(duration) => duration,
            Err(e) => {
                sink.skip(endpoint, e);
                None
            }
        };

        let entry = totals.entry(key).or_insert((0, Some(0.0)));
        entry.0 += 1;
        entry.1 = match (entry.1, duration) {
            (Some(sum), Some(duration)) => Some(sum + duration),
            _ => None,
        };
    }

    for ((line, kind), (entries, duration)) in totals {
        let labels = vec![line, kind];
        sink.push(&metrics::CALL_LOG_ENTRIES, labels.clone(), entries as f64);
        match duration {
            Some(duration) => sink.push(&metrics::CALL_LOG_DURATION, labels, duration),
            None => debug!(
                line = %labels[0],
                kind = %labels[1],
                "Call log duration incomplete, not exported"
            ),
        }
    }
}

fn map_led(record: &RawRecord, sink: &mut SampleSink) {
    let result = extract(record, "led_enabled", Unit::Bool);
    sink.extracted(EndpointId::LedSetting, &metrics::LED_ENABLED, &[], result);
}
