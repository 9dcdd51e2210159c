//! Station API paths and response envelope.

use serde::Deserialize;
use station_common::EndpointId;

pub(crate) const LOGIN_PATH: &str = "/api/v1/session/login";
pub(crate) const LOGOUT_PATH: &str = "/api/v1/session/logout";
pub(crate) const MENU_PATH: &str = "/api/v1/session/menu";

/// Password value that asks the station for its login salts.
pub(crate) const SALT_REQUEST: &str = "seeksalthash";

/// Header carrying the anti-CSRF nonce.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Envelope status value for success.
pub(crate) const STATUS_OK: &str = "ok";

/// Message fragments the station uses when a session is no longer accepted.
const SESSION_LOST_MARKERS: &[&str] = &[
    "not logged in",
    "session expired",
    "session has expired",
    "unauthorized",
    "msg_login_",
];

/// API path for an endpoint.
pub fn endpoint_path(endpoint: EndpointId) -> &'static str {
    match endpoint {
        EndpointId::DocsisStatus => "/api/v1/sta_docsis_status",
        EndpointId::StationStatus => "/api/v1/sta_status",
        EndpointId::ConnectedHosts => "/api/v1/host/hostTbl",
        EndpointId::CallLog => "/api/v1/sta_calllog",
        EndpointId::LedSetting => "/api/v1/sta_led",
    }
}

/// Common JSON envelope around every station response.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    pub fn is_ok(&self) -> bool {
        self.error.eq_ignore_ascii_case(STATUS_OK)
    }

    /// Whether a rejected envelope means the session is gone.
    pub fn is_session_lost(&self) -> bool {
        let message = self.message.to_ascii_lowercase();
        SESSION_LOST_MARKERS.iter().any(|m| message.contains(m))
    }
}

/// First login step response.
#[derive(Debug, Deserialize)]
pub(crate) struct SaltResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub salt: String,
    #[serde(default, rename = "saltwebui")]
    pub salt_webui: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_distinct() {
        let mut paths: Vec<_> = EndpointId::ALL.iter().map(|e| endpoint_path(*e)).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), EndpointId::ALL.len());
        assert!(paths.iter().all(|p| p.starts_with("/api/v1/")));
    }

    #[test]
    fn test_envelope_session_lost() {
        let env: Envelope =
            serde_json::from_str(r#"{"error":"error","message":"User not logged in"}"#).unwrap();
        assert!(!env.is_ok());
        assert!(env.is_session_lost());

        let env: Envelope =
            serde_json::from_str(r#"{"error":"error","message":"MSG_LOGIN_150"}"#).unwrap();
        assert!(env.is_session_lost());

        let env: Envelope =
            serde_json::from_str(r#"{"error":"error","message":"invalid parameter"}"#).unwrap();
        assert!(!env.is_session_lost());
    }

    #[test]
    fn test_envelope_ok() {
        let env: Envelope =
            serde_json::from_str(r#"{"error":"ok","message":"all values retrieved","data":{}}"#)
                .unwrap();
        assert!(env.is_ok());
        assert!(env.data.is_some());
    }
}
