//! One scrape's worth of endpoint requests.
//!
//! The fetcher logs in lazily, requests every enabled endpoint in catalog
//! order, recovers from at most one session expiry per scrape and always
//! logs out before returning, including when the scrape deadline passes.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use station_common::{EndpointId, RawRecord};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::session::{Session, SessionClient};

/// Why an endpoint produced no record.
#[derive(Debug)]
pub struct EndpointFailure {
    pub endpoint: EndpointId,
    pub error: ClientError,
    /// Whether the failure happened on the retry after a re-login.
    pub retried: bool,
}

/// Itemized result of one fetch cycle.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Records of every endpoint that answered, keyed and ordered by endpoint.
    pub records: BTreeMap<EndpointId, RawRecord>,
    /// One entry per endpoint that produced no record, in fetch order.
    pub failures: Vec<EndpointFailure>,
    /// Error of the initial login, if it failed.
    pub login_error: Option<ClientError>,
    /// Number of re-logins performed (0 or 1).
    pub relogins: u32,
    /// Whether the time budget ran out before every endpoint was requested.
    pub deadline_exceeded: bool,
    /// Wall time of the whole cycle.
    pub duration: Duration,
}

impl FetchReport {
    /// Whether at least one endpoint returned data.
    pub fn any_success(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn succeeded(&self, endpoint: EndpointId) -> bool {
        self.records.contains_key(&endpoint)
    }
}

/// Per-endpoint retry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// First request with the current session.
    Fetching,
    /// Second and last request, after a re-login.
    RetryAfterReauth,
}

/// Budget for re-logins within one scrape.
#[derive(Debug)]
struct ReauthBudget {
    remaining: u32,
}

impl ReauthBudget {
    fn new() -> Self {
        Self { remaining: 1 }
    }

    fn take(&mut self) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }
}

/// Run `fut` unless the deadline passes first.
async fn before<F: Future>(deadline: Option<Instant>, fut: F) -> Result<F::Output, ClientError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| ClientError::DeadlineExceeded),
        None => Ok(fut.await),
    }
}

/// Fetches the configured endpoints through a [`SessionClient`].
#[derive(Debug, Clone)]
pub struct TelemetryFetcher {
    endpoints: Vec<EndpointId>,
    time_budget: Option<Duration>,
}

impl TelemetryFetcher {
    /// Create a fetcher for the given endpoints. Duplicates are dropped and
    /// the fetch order is always the catalog order.
    pub fn new(endpoints: impl IntoIterator<Item = EndpointId>) -> Self {
        let mut endpoints: Vec<_> = endpoints.into_iter().collect();
        endpoints.sort();
        endpoints.dedup();
        Self {
            endpoints,
            time_budget: None,
        }
    }

    /// Bound the login and endpoint requests of one cycle.
    ///
    /// Once the budget is spent, outstanding requests are abandoned and the
    /// remaining endpoints fail with [`ClientError::DeadlineExceeded`]. The
    /// logout still runs, bounded by the client's request timeout.
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn endpoints(&self) -> &[EndpointId] {
        &self.endpoints
    }

    /// Run one fetch cycle.
    ///
    /// Never fails as a whole: every problem is recorded in the report.
    pub async fn fetch_all(&self, client: &SessionClient) -> FetchReport {
        let started = Instant::now();
        let deadline = self.time_budget.map(|budget| started + budget);
        let mut report = FetchReport::default();

        let session = match before(deadline, client.login()).await.and_then(|r| r) {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    station = %client.credentials().url(),
                    error = %e,
                    "Login failed, skipping all endpoints"
                );
                report.deadline_exceeded = e.is_deadline_exceeded();
                for endpoint in &self.endpoints {
                    report.failures.push(EndpointFailure {
                        endpoint: *endpoint,
                        error: ClientError::auth("not logged in"),
                        retried: false,
                    });
                }
                report.login_error = Some(e);
                report.duration = started.elapsed();
                return report;
            }
        };

        let mut session = Some(session);
        let mut budget = ReauthBudget::new();

        for endpoint in &self.endpoints {
            if report.deadline_exceeded {
                report.failures.push(EndpointFailure {
                    endpoint: *endpoint,
                    error: ClientError::DeadlineExceeded,
                    retried: false,
                });
                continue;
            }

            match self
                .fetch_endpoint(client, deadline, &mut session, &mut budget, &mut report, *endpoint)
                .await
            {
                Ok(record) => {
                    debug!(endpoint = %endpoint, fields = record.len(), "Fetched endpoint");
                    report.records.insert(*endpoint, record);
                }
                Err(failure) => {
                    warn!(
                        endpoint = %endpoint,
                        error = %failure.error,
                        retried = failure.retried,
                        "Endpoint fetch failed"
                    );
                    if failure.error.is_deadline_exceeded() {
                        report.deadline_exceeded = true;
                    }
                    report.failures.push(failure);
                }
            }
        }

        if let Some(session) = session {
            client.logout(session).await;
        }

        report.duration = started.elapsed();
        info!(
            fetched = report.records.len(),
            failed = report.failures.len(),
            relogins = report.relogins,
            deadline_exceeded = report.deadline_exceeded,
            duration_ms = report.duration.as_millis() as u64,
            "Fetch cycle complete"
        );
        report
    }

    async fn fetch_endpoint(
        &self,
        client: &SessionClient,
        deadline: Option<Instant>,
        session: &mut Option<Session>,
        budget: &mut ReauthBudget,
        report: &mut FetchReport,
        endpoint: EndpointId,
    ) -> Result<RawRecord, EndpointFailure> {
        let mut attempt = Attempt::Fetching;

        loop {
            let retried = attempt == Attempt::RetryAfterReauth;
            let Some(current) = session.as_mut() else {
                return Err(EndpointFailure {
                    endpoint,
                    error: ClientError::auth("not logged in"),
                    retried,
                });
            };

            let error = match before(deadline, client.execute(current, endpoint))
                .await
                .and_then(|r| r)
            {
                Ok(record) => return Ok(record),
                Err(e) => e,
            };

            if !error.is_auth_expired() || retried || !budget.take() {
                return Err(EndpointFailure {
                    endpoint,
                    error,
                    retried,
                });
            }

            info!(endpoint = %endpoint, "Session expired, logging in again");

            // Free the slot in case the station still counts the old session.
            if let Some(stale) = session.take() {
                client.logout(stale).await;
            }

            let fresh = before(deadline, client.login())
                .await
                .and_then(|r| r)
                .map_err(|error| EndpointFailure {
                    endpoint,
                    error,
                    retried: false,
                })?;
            report.relogins += 1;
            *session = Some(fresh);
            attempt = Attempt::RetryAfterReauth;
        }
    }
}
