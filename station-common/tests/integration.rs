//! Integration tests for station-common library.

use serde::Deserialize;
use serde_json::json;
use std::io::Write;
use station_common::{
    EndpointId, Error, LogFormat, LoggingConfig, RawRecord, RawValue, load_config, parse_config,
};

#[derive(Debug, Deserialize)]
struct AppConfig {
    endpoints: Vec<EndpointId>,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
fn test_station_payload_workflow() {
    // A trimmed DOCSIS payload as the station returns it
    let payload = json!({
        "downstream": [
            { "__id": "1", "channelid": "5", "power": "4.2 dBmV", "SNR": 38.6 },
            { "__id": "2", "channelid": "6", "power": "3.9 dBmV", "SNR": null }
        ],
        "upstream": "not a table"
    });

    let record = RawRecord::from_json(payload).expect("object payload");
    assert_eq!(record.len(), 2);

    let rows = record.rows("downstream");
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].get("power").and_then(RawValue::as_text),
        Some("4.2 dBmV")
    );
    assert_eq!(rows[0].get("SNR"), Some(&RawValue::Number(38.6)));
    assert_eq!(rows[1].get("SNR"), Some(&RawValue::Null));
    assert_eq!(
        rows[1].get("channelid").and_then(RawValue::to_label),
        Some("6".to_string())
    );

    // Non-list and missing tables have no rows
    assert!(record.rows("upstream").is_empty());
    assert!(record.rows("ofdm_downstream").is_empty());
}

#[test]
fn test_non_object_payloads_are_rejected() {
    assert!(RawRecord::from_json(json!([1, 2, 3])).is_none());
    assert!(RawRecord::from_json(json!("ok")).is_none());
    assert!(RawRecord::from_json(json!({})).is_some_and(|r| r.is_empty()));
}

#[test]
fn test_labels_from_scalars() {
    assert_eq!(RawValue::Number(5.0).to_label(), Some("5".to_string()));
    assert_eq!(RawValue::Number(2.5).to_label(), Some("2.5".to_string()));
    assert_eq!(RawValue::Bool(true).to_label(), Some("true".to_string()));
    assert_eq!(
        RawValue::Text("  SC-QAM ".to_string()).to_label(),
        Some("SC-QAM".to_string())
    );
    assert_eq!(RawValue::Null.to_label(), None);
    assert_eq!(RawValue::List(Vec::new()).to_label(), None);
}

#[test]
fn test_config_file_with_endpoints() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{
            // fetch order follows the endpoint catalog, not this list
            endpoints: ["led_setting", "docsis_status"],
            logging: {{ level: "debug", format: "json" }},
        }}"#
    )
    .unwrap();

    let config: AppConfig = load_config(file.path()).unwrap();
    assert_eq!(
        config.endpoints,
        vec![EndpointId::LedSetting, EndpointId::DocsisStatus]
    );
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_config_rejects_unknown_endpoint() {
    let result: Result<AppConfig, Error> = parse_config(r#"{ endpoints: ["wifi_status"] }"#);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_missing_config_file() {
    let result: Result<AppConfig, Error> = load_config("/nonexistent/station.json5");
    let message = result.unwrap_err().to_string();
    assert!(message.contains("Failed to read config file"));
}

#[test]
fn test_endpoint_names_parse() {
    for endpoint in EndpointId::ALL {
        let parsed: EndpointId = endpoint.to_string().parse().unwrap();
        assert_eq!(parsed, endpoint);
    }
    assert!(matches!(
        "router".parse::<EndpointId>(),
        Err(Error::UnknownEndpoint(name)) if name == "router"
    ));
}
