//! Station Client
//!
//! Talks to the web interface of a Vodafone Station cable modem.
//!
//! # Overview
//!
//! This crate provides:
//! - [`StationConfig`] and [`Credentials`] for the `station` configuration section
//! - [`SessionClient`] for the login handshake, endpoint requests and logout
//! - [`TelemetryFetcher`] for one scrape's worth of endpoint requests with
//!   lazy login, a single re-login and guaranteed logout
//! - [`LoginScheme`] for the password derivation used by the login handshake
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use station_client::{Credentials, SessionClient, StationConfig, TelemetryFetcher};
//!
//! let config = StationConfig::default();
//! let client = SessionClient::new(config.credentials(), &config)?;
//! let report = TelemetryFetcher::new(config.enabled_endpoints())
//!     .fetch_all(&client)
//!     .await;
//! ```

mod challenge;
mod config;
mod endpoint;
mod error;
mod fetcher;
mod session;

#[cfg(any(test, feature = "fake-station"))]
pub mod fake;

pub use challenge::{LoginChallenge, LoginScheme, Pbkdf2Scheme, PlaintextScheme, scheme_for};
pub use config::{Credentials, LoginSchemeKind, StationConfig};
pub use endpoint::{CSRF_HEADER, endpoint_path};
pub use error::{ClientError, Result};
pub use fetcher::{EndpointFailure, FetchReport, TelemetryFetcher};
pub use session::{Session, SessionClient};

pub use station_common::{EndpointId, RawRecord, RawValue};
