use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A URL watched for recovery.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for Target {
    fn from(url: String) -> Self {
        Self(url)
    }
}

/// Why a probe could not produce an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connect,
    Request,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Connect => write!(f, "connect"),
            FailureKind::Request => write!(f, "request"),
        }
    }
}

/// Outcome of probing one target once.
///
/// Only `Reachable` moves a target out of the pending set; the other two
/// variants differ only in what gets logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The target answered with status 200.
    Reachable { latency: Duration },
    /// The target answered, but not with 200.
    Unreachable { status: u16, latency: Duration },
    /// No response: DNS, connect, TLS or timeout failure.
    Error { kind: FailureKind, detail: String },
}

impl ProbeResult {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeResult::Reachable { .. })
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeResult::Reachable { .. } => write!(f, "up (status 200)"),
            ProbeResult::Unreachable { status, .. } => write!(f, "down (status {status})"),
            ProbeResult::Error { kind, detail } => write!(f, "down ({kind}: {detail})"),
        }
    }
}
