//! In-process fake station for tests.
//!
//! Serves the login handshake, the data endpoints and logout over real HTTP
//! on a loopback port. The station enforces a session ceiling and can be told
//! to expire sessions, reject endpoints or slow down, and it counts what it
//! saw so tests can check the client's login/logout discipline.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use station_common::EndpointId;
use tokio::task::JoinHandle;

use crate::challenge::{LoginChallenge, scheme_for};
use crate::config::LoginSchemeKind;
use crate::endpoint::{
    CSRF_HEADER, LOGIN_PATH, LOGOUT_PATH, MENU_PATH, SALT_REQUEST, endpoint_path,
};

const SESSION_COOKIE: &str = "PHPSESSID";

/// Behaviour switches for a [`FakeStation`].
#[derive(Debug, Clone)]
pub struct FakeStationOptions {
    /// Password the station accepts.
    pub password: String,
    /// Derivation the station expects.
    pub scheme: LoginSchemeKind,
    /// Concurrent session ceiling.
    pub max_sessions: usize,
    /// Endpoints answering HTTP 500.
    pub failing_endpoints: Vec<EndpointId>,
    /// Endpoints answering HTTP 401 without dropping the session.
    pub unauthorized_endpoints: Vec<EndpointId>,
    /// Drop a session once it has served this many data requests.
    pub expire_session_after_requests: Option<u32>,
    /// Apply the expiry rule to every session instead of only the first one.
    pub expire_every_session: bool,
    /// Delay before each data response.
    pub response_delay: Option<Duration>,
    /// Payload overrides per endpoint.
    pub payloads: HashMap<EndpointId, Value>,
}

impl Default for FakeStationOptions {
    fn default() -> Self {
        Self {
            password: FakeStation::PASSWORD.to_string(),
            scheme: LoginSchemeKind::Pbkdf2,
            max_sessions: 1,
            failing_endpoints: Vec::new(),
            unauthorized_endpoints: Vec::new(),
            expire_session_after_requests: None,
            expire_every_session: false,
            response_delay: None,
            payloads: HashMap::new(),
        }
    }
}

/// Counters collected by the fake station.
#[derive(Debug, Clone, Default)]
pub struct FakeStationStats {
    /// Successful logins.
    pub logins: u32,
    /// Refused logins (wrong password or session ceiling).
    pub rejected_logins: u32,
    /// Logout requests.
    pub logouts: u32,
    /// Sessions currently open.
    pub active_sessions: usize,
    /// Highest number of simultaneously open sessions.
    pub max_active_sessions: usize,
    /// Endpoints served, in order.
    pub requests: Vec<String>,
    /// Data requests served by each session, in login order.
    pub requests_per_session: Vec<u32>,
}

#[derive(Debug)]
struct OpenSession {
    index: usize,
    nonce: String,
    served: u32,
}

#[derive(Debug)]
struct StationState {
    options: FakeStationOptions,
    sessions: BTreeMap<String, OpenSession>,
    stats: FakeStationStats,
}

type Shared = Arc<Mutex<StationState>>;

/// A running fake station. Stops when dropped.
pub struct FakeStation {
    addr: SocketAddr,
    state: Shared,
    task: JoinHandle<()>,
}

impl FakeStation {
    pub const PASSWORD: &'static str = "station-secret";
    pub const SALT: &'static str = "a1b2c3d4e5f6";
    pub const SALT_WEBUI: &'static str = "0f9e8d7c";

    /// Bind to a loopback port and start serving.
    ///
    /// Panics if the port cannot be bound; this is test-only code.
    pub async fn start(options: FakeStationOptions) -> Self {
        let state = Arc::new(Mutex::new(StationState {
            options,
            sessions: BTreeMap::new(),
            stats: FakeStationStats::default(),
        }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake station");
        let addr = listener.local_addr().expect("fake station address");
        let router = router(state.clone());

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, state, task }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stats(&self) -> FakeStationStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.active_sessions = state.sessions.len();
        stats
    }
}

impl Drop for FakeStation {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Realistic payload for an endpoint.
pub fn default_payload(endpoint: EndpointId) -> Value {
    match endpoint {
        EndpointId::DocsisStatus => json!({
            "downstream": [
                {
                    "__id": "1", "channelid": "5", "CentralFrequency": "602 MHz",
                    "power": "4.2", "SNR": "38.6", "FFT": "256QAM", "locked": "Locked",
                    "ChannelType": "SC-QAM", "correcteds": "12", "uncorrect": "0"
                },
                {
                    "__id": "2", "channelid": "6", "CentralFrequency": "610 MHz",
                    "power": "3.9", "SNR": "38.2", "FFT": "256QAM", "locked": "Locked",
                    "ChannelType": "SC-QAM", "correcteds": "3", "uncorrect": "1"
                }
            ],
            "ofdm_downstream": [
                {
                    "__id": "1", "channelid_ofdm": "33", "start_frequency": "751 MHz",
                    "end_frequency": "846 MHz", "CentralFrequency_ofdm": "759 MHz",
                    "bandwidth": "95 MHz", "power_ofdm": "5.1", "SNR_ofdm": "40.2",
                    "FFT_ofdm": "4K", "locked_ofdm": "Locked", "ChannelType": "OFDM"
                }
            ],
            "upstream": [
                {
                    "__id": "1", "channelidup": "1", "CentralFrequency": "51 MHz",
                    "power": "44.5", "FFT": "64QAM", "ChannelType": "SC-QAM",
                    "RangingStatus": "Success"
                }
            ],
            "ofdma_upstream": [
                {
                    "__id": "1", "channelidup": "9", "start_frequency": "29.8 MHz",
                    "end_frequency": "64.8 MHz", "CentralFrequency": "37 MHz",
                    "bandwidth": "35 MHz", "power": "41.0", "FFT": "2K",
                    "ChannelType": "OFDMA", "RangingStatus": "Completed"
                }
            ]
        }),
        EndpointId::StationStatus => json!({
            "model": "CGA4233DE",
            "firmwareversion": "01.02.068.11",
            "hardwareversion": "5.14.1",
            "serialnumber": "AAAP12345678",
            "uptime": "3 day(s) 04h:05m:06s",
            "cm_status": "OPERATIONAL",
            "provisioning_status": "Online",
            "firewall_level": "Medium",
            "dslite": "true"
        }),
        EndpointId::ConnectedHosts => json!({
            "hostTbl": [
                {
                    "__id": "1", "hostname": "laptop", "physaddress": "AA:BB:CC:DD:EE:01",
                    "ipaddress": "192.168.0.10", "interfacetype": "Ethernet",
                    "active": "true", "leaseTimeRemaining": "3600"
                },
                {
                    "__id": "2", "hostname": "phone", "physaddress": "AA:BB:CC:DD:EE:02",
                    "ipaddress": "192.168.0.11", "interfacetype": "WiFi 5GHz",
                    "active": "false", "leaseTimeRemaining": "120"
                }
            ]
        }),
        EndpointId::CallLog => json!({
            "calllog": [
                { "__id": "1", "line": "1", "type": "missed", "number": "0301234567", "duration": "00:00:00" },
                { "__id": "2", "line": "1", "type": "received", "number": "0301234568", "duration": "00:02:05" },
                { "__id": "3", "line": "1", "type": "received", "number": "0301234569", "duration": "01:00" }
            ]
        }),
        EndpointId::LedSetting => json!({ "led_enabled": "true" }),
    }
}

fn router(state: Shared) -> Router {
    let mut router = Router::new()
        .route(LOGIN_PATH, post(login_handler))
        .route(MENU_PATH, get(menu_handler))
        .route(LOGOUT_PATH, post(logout_handler));

    for endpoint in EndpointId::ALL {
        router = router.route(
            endpoint_path(endpoint),
            get(move |State(state): State<Shared>, headers: HeaderMap| async move {
                data_handler(state, headers, endpoint).await
            }),
        );
    }

    router.with_state(state)
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get("cookie")?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn refused(message: &str) -> Response {
    Json(json!({ "error": "error", "message": message })).into_response()
}

async fn login_handler(
    State(state): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let password = form.get("password").map(String::as_str).unwrap_or_default();

    if password == SALT_REQUEST {
        return Json(json!({
            "error": "ok",
            "salt": FakeStation::SALT,
            "saltwebui": FakeStation::SALT_WEBUI,
        }))
        .into_response();
    }

    let mut state = state.lock();
    let challenge = LoginChallenge {
        salt: FakeStation::SALT.to_string(),
        salt_webui: FakeStation::SALT_WEBUI.to_string(),
    };
    let expected = scheme_for(state.options.scheme).derive(&state.options.password, &challenge);

    if password != expected {
        state.stats.rejected_logins += 1;
        return refused("wrong password");
    }

    if state.sessions.len() >= state.options.max_sessions {
        state.stats.rejected_logins += 1;
        return refused("MSG_LOGIN_150");
    }

    let index = state.stats.requests_per_session.len();
    let token = format!("session-{}", index);
    let nonce = format!("nonce-{}", index);
    state.sessions.insert(
        token.clone(),
        OpenSession {
            index,
            nonce: nonce.clone(),
            served: 0,
        },
    );
    state.stats.requests_per_session.push(0);
    state.stats.logins += 1;
    let open = state.sessions.len();
    state.stats.max_active_sessions = state.stats.max_active_sessions.max(open);

    (
        [
            ("set-cookie", format!("{}={}; path=/", SESSION_COOKIE, token)),
            (CSRF_HEADER, nonce),
        ],
        Json(json!({
            "error": "ok",
            "message": "",
            "data": { "user": "admin", "interface": "web" }
        })),
    )
        .into_response()
}

async fn menu_handler(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = state.lock();
    match session_token(&headers) {
        Some(token) if state.sessions.contains_key(&token) => {
            Json(json!({ "error": "ok", "data": {} })).into_response()
        }
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn logout_handler(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock();
    state.stats.logouts += 1;
    if let Some(token) = session_token(&headers) {
        state.sessions.remove(&token);
    }
    Json(json!({ "error": "ok", "message": "" })).into_response()
}

async fn data_handler(state: Shared, headers: HeaderMap, endpoint: EndpointId) -> Response {
    let delay = state.lock().options.response_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock();
    let Some(token) = session_token(&headers) else {
        return refused("User not logged in");
    };
    let nonce = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());

    let Some(session) = state.sessions.get(&token) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if nonce != Some(session.nonce.as_str()) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let (index, served) = (session.index, session.served);

    if state.options.unauthorized_endpoints.contains(&endpoint) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if let Some(limit) = state.options.expire_session_after_requests
        && served >= limit
        && (state.options.expire_every_session || index == 0)
    {
        state.sessions.remove(&token);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if state.options.failing_endpoints.contains(&endpoint) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if let Some(session) = state.sessions.get_mut(&token) {
        session.served += 1;
    }
    state.stats.requests_per_session[index] += 1;
    state.stats.requests.push(endpoint.as_str().to_string());

    let payload = state
        .options
        .payloads
        .get(&endpoint)
        .cloned()
        .unwrap_or_else(|| default_payload(endpoint));

    Json(json!({
        "error": "ok",
        "message": "all values retrieved",
        "data": payload,
    }))
    .into_response()
}
