use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::debug;

use super::types::{FailureKind, ProbeResult, Target};

/// A single reachability check against one target.
///
/// Implementations must resolve every failure into a [`ProbeResult`]; the
/// engine never sees an error from a probe.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &Target) -> ProbeResult;
}

/// HTTP GET probe
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Build a probe whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("comeback/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, target: &Target) -> ProbeResult {
        let start = Instant::now();

        let response = match self.client.get(target.as_str()).send().await {
            Ok(response) => response,
            Err(e) => return classify_failure(target, &e),
        };

        let latency = start.elapsed();
        let status = response.status();
        debug!(%target, status = status.as_u16(), latency_ms = latency.as_millis() as u64, "probe answered");

        // Anything but exactly 200 still counts as down, 204 and 3xx included.
        if status == StatusCode::OK {
            ProbeResult::Reachable { latency }
        } else {
            ProbeResult::Unreachable { status: status.as_u16(), latency }
        }
    }
}

fn classify_failure(target: &Target, error: &reqwest::Error) -> ProbeResult {
    let kind = if error.is_timeout() {
        FailureKind::Timeout
    } else if error.is_connect() {
        FailureKind::Connect
    } else {
        FailureKind::Request
    };

    debug!(%target, %kind, error = %error, "probe failed");
    ProbeResult::Error { kind, detail: error.to_string() }
}
