//! Wording of every email the watcher sends.

use chrono::{DateTime, Local};

use super::Notification;
use crate::monitoring::types::Target;

pub fn startup(targets: &[Target], started_at: DateTime<Local>) -> Notification {
    let list = if targets.is_empty() {
        "  (none)".to_string()
    } else {
        targets.iter().map(|target| format!("  - {target}")).collect::<Vec<_>>().join("\n")
    };

    Notification::new(
        format!("Uptime monitor started: watching {} site(s)", targets.len()),
        format!(
            "The uptime monitor started at {}.\n\nYou will get an email as soon as any of these sites returns a 200 OK status:\n{list}\n",
            started_at.format("%Y-%m-%d %H:%M:%S %Z"),
        ),
    )
}

pub fn recovered(target: &Target) -> Notification {
    Notification::new(
        format!("Website is UP: {target}"),
        format!("Good news! The website {target} is now reachable and returned a 200 OK status."),
    )
}

pub fn all_clear(recovered: usize) -> Notification {
    Notification::new(
        "All monitored websites are UP",
        format!(
            "All {recovered} monitored website(s) have returned a 200 OK status. The monitor has stopped checking."
        ),
    )
}
