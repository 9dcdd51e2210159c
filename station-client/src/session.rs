//! Authenticated conversation with the station web interface.
//!
//! [`SessionClient`] is the only component that performs network I/O against
//! the station. It knows the request envelope (headers, cookies, CSRF nonce)
//! and classifies every failure as [`ClientError::Network`],
//! [`ClientError::AuthExpired`] or [`ClientError::Device`]. It never retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, COOKIE, REFERER};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use station_common::{EndpointId, RawRecord};
use tracing::{debug, info, warn};

use crate::challenge::{LoginChallenge, LoginScheme, scheme_for};
use crate::config::{Credentials, StationConfig};
use crate::endpoint::{
    CSRF_HEADER, Envelope, LOGIN_PATH, LOGOUT_PATH, MENU_PATH, SALT_REQUEST, SaltResponse,
    endpoint_path,
};
use crate::error::{ClientError, Result};

/// Station-issued proof of login.
///
/// Owned by whoever called [`SessionClient::login`]; the cookie material never
/// leaves this module.
#[derive(Debug)]
pub struct Session {
    cookies: Vec<(String, String)>,
    nonce: Option<String>,
    issued_at: DateTime<Utc>,
    expired: bool,
}

impl Session {
    fn pending() -> Self {
        Self {
            cookies: Vec::new(),
            nonce: None,
            issued_at: Utc::now(),
            expired: false,
        }
    }

    /// When the station accepted the login.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.issued_at
    }

    /// False once the station has rejected this session.
    pub fn is_valid(&self) -> bool {
        !self.expired
    }

    fn expire(&mut self) {
        self.expired = true;
    }

    fn absorb_cookies(&mut self, response: &Response) {
        for cookie in response.cookies() {
            let name = cookie.name().to_string();
            let value = cookie.value().to_string();
            match self.cookies.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value,
                None => self.cookies.push((name, value)),
            }
        }
    }

    fn absorb_nonce(&mut self, response: &Response) {
        if let Some(nonce) = response
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            self.nonce = Some(nonce.to_string());
        }
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// HTTP client bound to one station and one set of credentials.
///
/// Build a fresh client per scrape; it holds no state shared with other scrapes.
pub struct SessionClient {
    http: reqwest::Client,
    credentials: Arc<Credentials>,
    scheme: Arc<dyn LoginScheme>,
}

impl SessionClient {
    /// Create a client using the timeouts and login scheme from `config`.
    pub fn new(credentials: Arc<Credentials>, config: &StationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| ClientError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            credentials,
            scheme: scheme_for(config.login_scheme),
        })
    }


    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Perform the login handshake.
    ///
    /// Safe to call again after a failure: cookies gathered during a failed
    /// handshake are dropped with the error.
    pub async fn login(&self) -> Result<Session> {
        let mut session = Session::pending();
        let username = self.credentials.username();

        // Step 1: ask for the salts.
        let response = self
            .request(Method::POST, LOGIN_PATH, Some(&session))
            .form(&[
                ("username", username),
                ("password", SALT_REQUEST),
                ("logout", "true"),
            ])
            .send()
            .await?;
        session.absorb_cookies(&response);
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::auth(format!(
                "salt request rejected with HTTP {}",
                status
            )));
        }

        let salts: SaltResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::auth(format!("unexpected salt response: {}", e)))?;
        if !salts.error.eq_ignore_ascii_case("ok") {
            return Err(ClientError::auth(format!(
                "salt request refused: {}",
                salts.message
            )));
        }
        if salts.salt.is_empty() {
            return Err(ClientError::auth("station returned no salt"));
        }

        let challenge = LoginChallenge {
            salt: salts.salt,
            salt_webui: salts.salt_webui,
        };
        let derived = self
            .scheme
            .derive(self.credentials.password(), &challenge);

        // Step 2: submit the derived password.
        let response = self
            .request(Method::POST, LOGIN_PATH, Some(&session))
            .form(&[
                ("username", username),
                ("password", derived.as_str()),
                ("logout", "true"),
            ])
            .send()
            .await?;
        session.absorb_cookies(&response);
        session.absorb_nonce(&response);
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::auth(format!(
                "login rejected with HTTP {}",
                status
            )));
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| ClientError::auth(format!("unexpected login response: {}", e)))?;
        if !envelope.is_ok() {
            return Err(ClientError::auth(format!(
                "login refused: {}",
                envelope.message
            )));
        }

        // Step 3: the station only activates the session once the menu was loaded.
        let response = self
            .request(Method::GET, MENU_PATH, Some(&session))
            .send()
            .await?;
        session.absorb_cookies(&response);
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::auth(format!(
                "menu request rejected with HTTP {}",
                status
            )));
        }
        if let Ok(envelope) = serde_json::from_str::<Envelope>(&body)
            && !envelope.error.is_empty()
            && !envelope.is_ok()
        {
            return Err(ClientError::auth(format!(
                "menu request refused: {}",
                envelope.message
            )));
        }

        session.issued_at = Utc::now();
        info!(
            station = %self.credentials.url(),
            scheme = self.scheme.name(),
            "Logged in to station"
        );
        Ok(session)
    }

    /// Fetch one endpoint with the given session.
    pub async fn execute(&self, session: &mut Session, endpoint: EndpointId) -> Result<RawRecord> {
        let path = endpoint_path(endpoint);
        let response = self.request(Method::GET, path, Some(session)).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            session.expire();
            debug!(endpoint = %endpoint, status = %status, "Session rejected");
            return Err(ClientError::AuthExpired);
        }

        session.absorb_cookies(&response);
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::device(format!(
                "{} returned HTTP {}",
                path, status
            )));
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| ClientError::device(format!("{} returned malformed JSON: {}", path, e)))?;

        if !envelope.is_ok() {
            if envelope.is_session_lost() {
                session.expire();
                debug!(endpoint = %endpoint, message = %envelope.message, "Session lost");
                return Err(ClientError::AuthExpired);
            }
            return Err(ClientError::device(format!(
                "{} refused: {}",
                path, envelope.message
            )));
        }

        let data = envelope
            .data
            .ok_or_else(|| ClientError::device(format!("{} returned no data", path)))?;

        RawRecord::from_json(data)
            .ok_or_else(|| ClientError::device(format!("{} data is not an object", path)))
    }

    /// End the session. Failures are logged and otherwise ignored.
    pub async fn logout(&self, session: Session) {
        if !session.is_valid() {
            debug!("Logging out a session the station already rejected");
        }

        match self
            .request(Method::POST, LOGOUT_PATH, Some(&session))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(
                    station = %self.credentials.url(),
                    age_ms = session.age().num_milliseconds(),
                    "Logged out of station"
                );
            }
            Ok(response) => {
                warn!(
                    station = %self.credentials.url(),
                    status = %response.status(),
                    "Logout rejected by station"
                );
            }
            Err(e) => {
                warn!(
                    station = %self.credentials.url(),
                    error = %e,
                    "Logout failed"
                );
            }
        }
    }

    fn request(&self, method: Method, path: &str, session: Option<&Session>) -> RequestBuilder {
        let base = self.credentials.url();
        let mut request = self
            .http
            .request(method, format!("{}{}", base, path))
            .header("X-Requested-With", "XMLHttpRequest")
            .header(REFERER, format!("{}/", base))
            .header(ACCEPT, "application/json, text/javascript, */*");

        if let Some(session) = session {
            if let Some(cookies) = session.cookie_header() {
                request = request.header(COOKIE, cookies);
            }
            if let Some(nonce) = &session.nonce {
                request = request.header(CSRF_HEADER, nonce);
            }
        }

        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoginSchemeKind;
    use mockito::{Matcher, Server};

    fn config() -> StationConfig {
        StationConfig {
            login_scheme: LoginSchemeKind::Plaintext,
            request_timeout_ms: 2_000,
            ..Default::default()
        }
    }

    fn client(url: &str) -> SessionClient {
        let creds = Arc::new(Credentials::new(url, "admin", "secret"));
        SessionClient::new(creds, &config()).unwrap()
    }

    async fn mock_login(server: &mut Server) -> Vec<mockito::Mock> {
        let salts = server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::UrlEncoded("password".into(), SALT_REQUEST.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"ok","salt":"abc","saltwebui":"def"}"#)
            .create_async()
            .await;
        let login = server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::UrlEncoded("password".into(), "secret".into()))
            .with_status(200)
            .with_header("set-cookie", "PHPSESSID=sess42; path=/")
            .with_header(CSRF_HEADER, "nonce-1")
            .with_body(r#"{"error":"ok","message":"","data":{"user":"admin"}}"#)
            .create_async()
            .await;
        let menu = server
            .mock("GET", MENU_PATH)
            .match_header("cookie", "PHPSESSID=sess42")
            .with_status(200)
            .with_body(r#"{"error":"ok","data":{}}"#)
            .create_async()
            .await;
        vec![salts, login, menu]
    }

    #[tokio::test]
    async fn login_success() {
        let mut server = Server::new_async().await;
        let mocks = mock_login(&mut server).await;

        let session = client(&server.url()).login().await.unwrap();
        assert!(session.is_valid());
        assert_eq!(session.cookie_header().as_deref(), Some("PHPSESSID=sess42"));
        assert_eq!(session.nonce.as_deref(), Some("nonce-1"));

        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn login_refused_by_station() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", LOGIN_PATH)
            .with_status(200)
            .with_body(r#"{"error":"error","message":"MSG_LOGIN_150"}"#)
            .create_async()
            .await;

        let err = client(&server.url()).login().await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
        assert!(err.to_string().contains("MSG_LOGIN_150"));
    }

    #[tokio::test]
    async fn login_wrong_password() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::UrlEncoded("password".into(), SALT_REQUEST.into()))
            .with_status(200)
            .with_body(r#"{"error":"ok","salt":"abc","saltwebui":"def"}"#)
            .create_async()
            .await;
        server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::UrlEncoded("password".into(), "secret".into()))
            .with_status(200)
            .with_body(r#"{"error":"error","message":"wrong password"}"#)
            .create_async()
            .await;
        let menu = server.mock("GET", MENU_PATH).expect(0).create_async().await;

        let err = client(&server.url()).login().await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
        menu.assert_async().await;
    }

    #[tokio::test]
    async fn login_menu_rejection_is_auth_error() {
        let mut server = Server::new_async().await;
        let salts = server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::UrlEncoded("password".into(), SALT_REQUEST.into()))
            .with_status(200)
            .with_body(r#"{"error":"ok","salt":"abc","saltwebui":"def"}"#)
            .create_async()
            .await;
        let login = server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::UrlEncoded("password".into(), "secret".into()))
            .with_status(200)
            .with_header("set-cookie", "PHPSESSID=sess42; path=/")
            .with_body(r#"{"error":"ok","message":""}"#)
            .create_async()
            .await;
        let menu = server
            .mock("GET", MENU_PATH)
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server.url()).login().await.unwrap_err();
        match err {
            ClientError::Auth(message) => assert!(message.contains("menu"), "{message}"),
            other => panic!("expected an auth error, got {other:?}"),
        }

        salts.assert_async().await;
        login.assert_async().await;
        menu.assert_async().await;
    }

    #[tokio::test]
    async fn login_retry_starts_from_a_clean_session() {
        let mut server = Server::new_async().await;
        let client = client(&server.url());

        // First attempt: the station hands out a cookie, then refuses the menu.
        let salts = server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::UrlEncoded("password".into(), SALT_REQUEST.into()))
            .with_status(200)
            .with_body(r#"{"error":"ok","salt":"abc","saltwebui":"def"}"#)
            .create_async()
            .await;
        let login = server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::UrlEncoded("password".into(), "secret".into()))
            .with_status(200)
            .with_header("set-cookie", "stale_sid=1; path=/")
            .with_header(CSRF_HEADER, "nonce-stale")
            .with_body(r#"{"error":"ok","message":""}"#)
            .create_async()
            .await;
        let menu = server
            .mock("GET", MENU_PATH)
            .with_status(401)
            .create_async()
            .await;

        assert!(client.login().await.is_err());
        salts.remove_async().await;
        login.remove_async().await;
        menu.remove_async().await;

        // Second attempt on the same client must not replay the stale cookie.
        let salts = server
            .mock("POST", LOGIN_PATH)
            .match_header("cookie", Matcher::Missing)
            .match_body(Matcher::UrlEncoded("password".into(), SALT_REQUEST.into()))
            .with_status(200)
            .with_body(r#"{"error":"ok","salt":"abc","saltwebui":"def"}"#)
            .create_async()
            .await;
        let login = server
            .mock("POST", LOGIN_PATH)
            .match_header("cookie", Matcher::Missing)
            .match_body(Matcher::UrlEncoded("password".into(), "secret".into()))
            .with_status(200)
            .with_header("set-cookie", "PHPSESSID=fresh; path=/")
            .with_header(CSRF_HEADER, "nonce-2")
            .with_body(r#"{"error":"ok","message":""}"#)
            .create_async()
            .await;
        let menu = server
            .mock("GET", MENU_PATH)
            .match_header("cookie", "PHPSESSID=fresh")
            .match_header(CSRF_HEADER, "nonce-2")
            .with_status(200)
            .with_body(r#"{"error":"ok","data":{}}"#)
            .create_async()
            .await;

        let session = client.login().await.unwrap();
        assert_eq!(session.cookie_header().as_deref(), Some("PHPSESSID=fresh"));
        assert_eq!(session.nonce.as_deref(), Some("nonce-2"));

        salts.assert_async().await;
        login.assert_async().await;
        menu.assert_async().await;
    }

    #[tokio::test]
    async fn login_network_failure() {
        let err = client("http://127.0.0.1:1").login().await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }

    #[tokio::test]
    async fn execute_replays_cookie_and_nonce() {
        let mut server = Server::new_async().await;
        mock_login(&mut server).await;
        let data = server
            .mock("GET", "/api/v1/sta_led")
            .match_header("cookie", "PHPSESSID=sess42")
            .match_header(CSRF_HEADER, "nonce-1")
            .match_header("x-requested-with", "XMLHttpRequest")
            .with_status(200)
            .with_body(r#"{"error":"ok","message":"all values retrieved","data":{"led_enabled":"true"}}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let mut session = client.login().await.unwrap();
        let record = client.execute(&mut session, EndpointId::LedSetting).await.unwrap();

        assert_eq!(record.len(), 1);
        assert!(record.get("led_enabled").is_some());
        data.assert_async().await;
    }

    #[tokio::test]
    async fn execute_401_is_auth_expired() {
        let mut server = Server::new_async().await;
        mock_login(&mut server).await;
        server
            .mock("GET", "/api/v1/sta_status")
            .with_status(401)
            .create_async()
            .await;

        let client = client(&server.url());
        let mut session = client.login().await.unwrap();
        let err = client
            .execute(&mut session, EndpointId::StationStatus)
            .await
            .unwrap_err();

        assert!(err.is_auth_expired());
        assert!(!session.is_valid());
    }

    #[tokio::test]
    async fn execute_not_logged_in_payload_is_auth_expired() {
        let mut server = Server::new_async().await;
        mock_login(&mut server).await;
        server
            .mock("GET", "/api/v1/sta_status")
            .with_status(200)
            .with_body(r#"{"error":"error","message":"User not logged in"}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let mut session = client.login().await.unwrap();
        let err = client
            .execute(&mut session, EndpointId::StationStatus)
            .await
            .unwrap_err();

        assert!(err.is_auth_expired());
    }

    #[tokio::test]
    async fn execute_device_errors() {
        let mut server = Server::new_async().await;
        mock_login(&mut server).await;
        server
            .mock("GET", "/api/v1/sta_status")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/sta_led")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/sta_calllog")
            .with_status(200)
            .with_body(r#"{"error":"error","message":"invalid parameter"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/host/hostTbl")
            .with_status(200)
            .with_body(r#"{"error":"ok","data":[1,2,3]}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let mut session = client.login().await.unwrap();

        for endpoint in [
            EndpointId::StationStatus,
            EndpointId::LedSetting,
            EndpointId::CallLog,
            EndpointId::ConnectedHosts,
        ] {
            let err = client.execute(&mut session, endpoint).await.unwrap_err();
            assert!(
                matches!(err, ClientError::Device(_)),
                "{} should be a device error, got {:?}",
                endpoint,
                err
            );
        }
        assert!(session.is_valid());
    }

    #[tokio::test]
    async fn logout_failure_is_swallowed() {
        let mut server = Server::new_async().await;
        mock_login(&mut server).await;
        let logout = server
            .mock("POST", LOGOUT_PATH)
            .with_status(500)
            .create_async()
            .await;

        let client = client(&server.url());
        let session = client.login().await.unwrap();
        client.logout(session).await;

        logout.assert_async().await;
    }
}
