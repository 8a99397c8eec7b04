use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::config_path;
use crate::metrics::REPLICATION_DURATION_MS;
use crate::time::elapsed_ms;
use crate::ConfigEntry;
use crate::Connector;
use crate::EndpointDescriptor;
use crate::KvConnection;
use crate::SIMULATED_DOWN;

/// Outcome of polling one endpoint for a write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationRecord {
    pub endpoint: String,
    pub ok: bool,
    /// Fractional milliseconds until the value was observed, or until giving up
    pub elapsed_ms: f64,
    pub error: Option<String>,
}

/// What the endpoint under test should hold
struct Expectation<'a> {
    path: &'a str,
    value: &'a Value,
    timeout: Duration,
    interval: Duration,
}

/// Polls every endpoint on its own connection until a written value shows up.
/// Observes convergence; it guarantees nothing.
pub struct ReplicationChecker {
    endpoints: Vec<EndpointDescriptor>,
    connector: Arc<dyn Connector>,
}

impl ReplicationChecker {
    pub fn new(
        endpoints: Vec<EndpointDescriptor>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            endpoints,
            connector,
        }
    }

    /// One record per configured endpoint, in endpoint order. Endpoints in
    /// `sim_down` are not contacted.
    #[allow(clippy::too_many_arguments)]
    pub async fn check_replication(
        &self,
        namespace: &str,
        environment: &str,
        key: &str,
        expected: &Value,
        timeout: Duration,
        interval: Duration,
        sim_down: &BTreeSet<String>,
    ) -> Vec<ReplicationRecord> {
        let path = config_path(namespace, environment, key);
        let expectation = Expectation {
            path: &path,
            value: expected,
            timeout,
            interval,
        };

        join_all(self.endpoints.iter().map(|endpoint| {
            let expectation = &expectation;
            async move {
                let label = endpoint.label();
                if sim_down.contains(&label) {
                    return ReplicationRecord {
                        endpoint: label,
                        ok: false,
                        elapsed_ms: 0.0,
                        error: Some(SIMULATED_DOWN.to_string()),
                    };
                }
                let record = self.poll(endpoint, label, expectation).await;
                REPLICATION_DURATION_MS
                    .with_label_values(&[record.endpoint.as_str(), if record.ok { "true" } else { "false" }])
                    .observe(record.elapsed_ms);
                record
            }
        }))
        .await
    }

    /// Per-poll errors are retried until the deadline
    async fn poll(
        &self,
        endpoint: &EndpointDescriptor,
        label: String,
        expectation: &Expectation<'_>,
    ) -> ReplicationRecord {
        let started = Instant::now();
        let deadline = started + expectation.timeout;
        let mut conn: Option<Arc<dyn KvConnection>> = None;
        let mut last_error: Option<String> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let attempt = tokio::time::timeout(remaining, async {
                let current = match &conn {
                    Some(current) => current.clone(),
                    None => {
                        let opened = self.connector.connect(endpoint).await?;
                        conn = Some(opened.clone());
                        opened
                    }
                };
                current.get(expectation.path).await
            })
            .await;

            match attempt {
                Ok(Ok(Some(bytes))) => match ConfigEntry::decode(expectation.path, &bytes) {
                    Ok(entry) if entry.value == *expectation.value => {
                        let elapsed = elapsed_ms(started.elapsed());
                        debug!(endpoint = %label, elapsed_ms = elapsed, "Write observed");
                        return ReplicationRecord {
                            endpoint: label,
                            ok: true,
                            elapsed_ms: elapsed,
                            error: None,
                        };
                    }
                    Ok(_) => {}
                    Err(e) => last_error = Some(e.to_string()),
                },
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    conn = None;
                    last_error = Some(e.to_string());
                }
                Err(_) => break,
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(expectation.interval.min(remaining)).await;
        }

        let reason = format!("not observed within {:?}", expectation.timeout);
        ReplicationRecord {
            endpoint: label,
            ok: false,
            elapsed_ms: elapsed_ms(started.elapsed()),
            error: Some(match last_error {
                Some(e) => format!("{reason}; last error: {e}"),
                None => reason,
            }),
        }
    }
}
