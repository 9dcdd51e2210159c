use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::Error;

/// A logical data query against the station.
///
/// The declaration order is the fetch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointId {
    DocsisStatus,
    StationStatus,
    ConnectedHosts,
    CallLog,
    LedSetting,
}

impl EndpointId {
    /// Every endpoint, in fetch order.
    pub const ALL: [EndpointId; 5] = [
        EndpointId::DocsisStatus,
        EndpointId::StationStatus,
        EndpointId::ConnectedHosts,
        EndpointId::CallLog,
        EndpointId::LedSetting,
    ];

    /// Get the string representation used in labels and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointId::DocsisStatus => "docsis_status",
            EndpointId::StationStatus => "station_status",
            EndpointId::ConnectedHosts => "connected_hosts",
            EndpointId::CallLog => "call_log",
            EndpointId::LedSetting => "led_setting",
        }
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EndpointId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndpointId::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| Error::UnknownEndpoint(s.to_string()))
    }
}

/// Loosely typed value as returned by the station.
///
/// Numbers arrive as JSON numbers or, more often, as strings with a unit
/// suffix. Extraction rules decide how to read each field.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Number(_) => "number",
            RawValue::Text(_) => "text",
            RawValue::List(_) => "list",
            RawValue::Map(_) => "map",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RawValue]> {
        match self {
            RawValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, RawValue>> {
        match self {
            RawValue::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// Look up a field when this value is a map.
    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.as_map().and_then(|m| m.get(field))
    }

    /// Render scalars as label text. Containers and null have no label form.
    pub fn to_label(&self) -> Option<String> {
        match self {
            RawValue::Text(s) => Some(s.trim().to_string()),
            RawValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(format!("{:.0}", n)),
            RawValue::Number(n) => Some(n.to_string()),
            RawValue::Bool(b) => Some(b.to_string()),
            RawValue::Null | RawValue::List(_) | RawValue::Map(_) => None,
        }
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Bool(b) => RawValue::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Null),
            serde_json::Value::String(s) => RawValue::Text(s),
            serde_json::Value::Array(items) => {
                RawValue::List(items.into_iter().map(RawValue::from).collect())
            }
            serde_json::Value::Object(fields) => RawValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, RawValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// The payload fetched from one endpoint during one scrape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new(fields: BTreeMap<String, RawValue>) -> Self {
        Self { fields }
    }

    /// Build a record from a JSON object. Returns `None` for any other JSON shape.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match RawValue::from(value) {
            RawValue::Map(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.fields.get(field)
    }

    /// Rows of a table field. A missing field or a non-list value yields no rows.
    pub fn rows(&self, field: &str) -> &[RawValue] {
        self.get(field).and_then(RawValue::as_list).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_roundtrip_names() {
        for endpoint in EndpointId::ALL {
            assert_eq!(endpoint.as_str().parse::<EndpointId>().unwrap(), endpoint);
        }
        assert!("nope".parse::<EndpointId>().is_err());
    }

    #[test]
    fn test_endpoint_order_is_declaration_order() {
        let mut sorted = EndpointId::ALL;
        sorted.sort();
        assert_eq!(sorted, EndpointId::ALL);
    }

    #[test]
    fn test_endpoint_serde_names() {
        let parsed: Vec<EndpointId> =
            serde_json::from_str(r#"["call_log", "docsis_status"]"#).unwrap();
        assert_eq!(parsed, vec![EndpointId::CallLog, EndpointId::DocsisStatus]);
    }

    #[test]
    fn test_raw_value_from_json() {
        let value = RawValue::from(json!({
            "power": "4.2",
            "snr": 38.5,
            "locked": true,
            "rows": [{"id": "1"}],
            "gone": null
        }));

        assert_eq!(value.get("power"), Some(&RawValue::Text("4.2".into())));
        assert_eq!(value.get("snr"), Some(&RawValue::Number(38.5)));
        assert_eq!(value.get("locked"), Some(&RawValue::Bool(true)));
        assert_eq!(value.get("gone"), Some(&RawValue::Null));
        assert_eq!(value.get("rows").and_then(RawValue::as_list).map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_record_rows_missing_table() {
        let record = RawRecord::from_json(json!({"downstream": "oops"})).unwrap();
        assert!(record.rows("downstream").is_empty());
        assert!(record.rows("upstream").is_empty());
    }

    #[test]
    fn test_record_requires_object() {
        assert!(RawRecord::from_json(json!([1, 2])).is_none());
        assert!(RawRecord::from_json(json!("text")).is_none());
    }

    #[test]
    fn test_to_label() {
        assert_eq!(RawValue::Number(5.0).to_label(), Some("5".to_string()));
        assert_eq!(RawValue::Number(2.5).to_label(), Some("2.5".to_string()));
        assert_eq!(RawValue::Text(" eth0 ".into()).to_label(), Some("eth0".to_string()));
        assert_eq!(RawValue::Null.to_label(), None);
    }
}
