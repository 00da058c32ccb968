//! Bounds and format checks applied to the loaded configuration.
//!
//! Every failure here is fatal: the process refuses to start polling with a
//! configuration it cannot honour.

use anyhow::{Result, anyhow};
use lettre::Address;
use url::Url;

/// Validate a watched URL: absolute, `http` or `https`, with a host.
pub fn validate_target(target: &str) -> Result<()> {
    let url = Url::parse(target).map_err(|e| anyhow!("Invalid URL {target:?}: {e}"))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme for {target:?}: {other} (expected http or https)")),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(anyhow!("URL {target:?} has no host"));
    }

    if url.port() == Some(0) {
        return Err(anyhow!("Port 0 is not valid in {target:?}"));
    }

    Ok(())
}

/// Validate a recipient address
pub fn validate_recipient(recipient: &str) -> Result<()> {
    recipient
        .parse::<Address>()
        .map(|_| ())
        .map_err(|e| anyhow!("Invalid recipient {recipient:?}: {e}"))
}

/// Validate the retry interval between rounds
pub fn validate_check_interval(interval_seconds: u64) -> Result<()> {
    const MIN_INTERVAL: u64 = 1;
    const MAX_INTERVAL: u64 = 86400; // 24 hours

    if interval_seconds < MIN_INTERVAL {
        return Err(anyhow!(
            "Check interval too short: {} seconds (minimum: {})",
            interval_seconds,
            MIN_INTERVAL
        ));
    }

    if interval_seconds > MAX_INTERVAL {
        return Err(anyhow!(
            "Check interval too long: {} seconds (maximum: {})",
            interval_seconds,
            MAX_INTERVAL
        ));
    }

    Ok(())
}

/// Validate the per-probe timeout
pub fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    const MIN_TIMEOUT: u64 = 1;
    const MAX_TIMEOUT: u64 = 300; // 5 minutes

    if timeout_seconds < MIN_TIMEOUT {
        return Err(anyhow!(
            "Timeout too short: {} seconds (minimum: {})",
            timeout_seconds,
            MIN_TIMEOUT
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(anyhow!(
            "Timeout too long: {} seconds (maximum: {})",
            timeout_seconds,
            MAX_TIMEOUT
        ));
    }

    Ok(())
}

/// Validate the pause before the first round
pub fn validate_settle_delay(settle_seconds: u64) -> Result<()> {
    const MAX_SETTLE: u64 = 300;

    if settle_seconds > MAX_SETTLE {
        return Err(anyhow!(
            "Settle delay too long: {} seconds (maximum: {})",
            settle_seconds,
            MAX_SETTLE
        ));
    }

    Ok(())
}
