//! The pending-target polling engine.
//!
//! ```text
//! Idle ──start──▶ Probing ──round done, pending empty──▶ Done
//!                   ▲  │
//!       timer fires │  │ round done, targets still pending
//!                   │  ▼
//!                 Waiting
//! ```
//!
//! A round probes a snapshot of the pending set. Probe results are applied
//! one at a time by the engine task itself, so removals and the recovery
//! notifications they trigger are serialized even when probes run
//! concurrently.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::checker::Probe;
use super::pending::PendingSet;
use super::types::{ProbeResult, Target};
use crate::notify::{Notification, Notifier, templates};

/// How the probes of one round are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPolicy {
    /// Every pending target is probed at once and the round waits for all.
    #[default]
    Concurrent,
    /// Targets are probed one after another in snapshot order.
    Sequential,
}

/// Whether recovery notifications are awaited before the round continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryPolicy {
    /// Send inline; notifications go out in the order they are raised.
    #[default]
    Await,
    /// Send on a background task; no ordering between notifications.
    /// Ignored under [`DispatchPolicy::Sequential`], which awaits every send.
    Detached,
}

impl FromStr for DispatchPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" | "parallel" => Ok(DispatchPolicy::Concurrent),
            "sequential" => Ok(DispatchPolicy::Sequential),
            _ => Err(()),
        }
    }
}

impl FromStr for DeliveryPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "await" | "awaited" => Ok(DeliveryPolicy::Await),
            "detached" | "fire-and-forget" => Ok(DeliveryPolicy::Detached),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchPolicy::Concurrent => write!(f, "concurrent"),
            DispatchPolicy::Sequential => write!(f, "sequential"),
        }
    }
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPolicy::Await => write!(f, "await"),
            DeliveryPolicy::Detached => write!(f, "detached"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Delay between the end of a round and the start of the next.
    pub interval: Duration,
    /// Pause before the very first round.
    pub settle_delay: Duration,
    pub dispatch: DispatchPolicy,
    pub delivery: DeliveryPolicy,
    pub notify_on_start: bool,
    pub notify_all_clear: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            settle_delay: Duration::ZERO,
            dispatch: DispatchPolicy::default(),
            delivery: DeliveryPolicy::default(),
            notify_on_start: true,
            notify_all_clear: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Probing,
    Waiting,
    /// Every target answered 200; no further rounds are scheduled.
    Done,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Probing => write!(f, "probing"),
            EngineState::Waiting => write!(f, "waiting"),
            EngineState::Done => write!(f, "done"),
        }
    }
}

/// Summary of one completed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u64,
    /// Size of the snapshot the round probed.
    pub probed: usize,
    /// Targets that left the pending set during this round.
    pub recovered: Vec<Target>,
    /// Pending targets after the round.
    pub remaining: usize,
}

/// Why [`PollingEngine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    Done { rounds: u64 },
    Shutdown { rounds: u64 },
}

pub struct PollingEngine {
    probe: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
    pending: PendingSet,
    settings: EngineSettings,
    state: watch::Sender<EngineState>,
    rounds: u64,
    watched: usize,
    in_flight: JoinSet<()>,
}

impl PollingEngine {
    pub fn new(
        probe: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        pending: PendingSet,
        settings: EngineSettings,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);

        Self {
            probe,
            notifier,
            pending,
            settings,
            state,
            rounds: 0,
            watched: 0,
            in_flight: JoinSet::new(),
        }
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Follow state transitions, e.g. from the liveness endpoint.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Send the startup notification and decide whether any round is needed.
    ///
    /// The startup notification is always awaited so it lands before any
    /// recovery email. Returns `Done` when there is nothing to watch and
    /// `Idle` otherwise.
    pub async fn start(&mut self) -> EngineState {
        let targets = self.pending.snapshot().await;
        self.watched = targets.len();
        info!(targets = self.watched, dispatch = %self.settings.dispatch, delivery = %self.settings.delivery, "starting uptime monitor");
        if self.settings.dispatch == DispatchPolicy::Sequential && self.settings.delivery == DeliveryPolicy::Detached {
            warn!("sequential dispatch awaits every notification; detached delivery is ignored");
        }

        if self.settings.notify_on_start {
            send_logged(self.notifier.as_ref(), &templates::startup(&targets, Local::now())).await;
        }

        if targets.is_empty() {
            info!("no targets to watch");
            self.set_state(EngineState::Done);
        }

        self.state()
    }

    /// Run one round and move to `Waiting` or `Done`.
    pub async fn step(&mut self) -> RoundReport {
        self.rounds += 1;
        let round = self.rounds;
        self.set_state(EngineState::Probing);

        let snapshot = self.pending.snapshot().await;
        info!(round, pending = snapshot.len(), "checking pending targets");

        let mut recovered = Vec::new();
        match self.settings.dispatch {
            DispatchPolicy::Concurrent => {
                let probe = &self.probe;
                let results = join_all(snapshot.iter().map(|target| probe.probe(target))).await;

                for (target, result) in snapshot.iter().zip(results) {
                    if self.apply(round, target, result).await {
                        recovered.push(target.clone());
                    }
                }
            }
            DispatchPolicy::Sequential => {
                for target in &snapshot {
                    let result = self.probe.probe(target).await;
                    if self.apply(round, target, result).await {
                        recovered.push(target.clone());
                    }
                }
            }
        }

        let remaining = self.pending.len().await;
        if remaining == 0 {
            info!(round, recovered = recovered.len(), "all targets are UP");
            if self.settings.notify_all_clear {
                self.deliver(templates::all_clear(self.watched)).await;
            }
            self.set_state(EngineState::Done);
        } else {
            info!(
                round,
                recovered = recovered.len(),
                remaining,
                "waiting {} seconds before retrying",
                self.settings.interval.as_secs()
            );
            self.set_state(EngineState::Waiting);
        }

        RoundReport { round, probed: snapshot.len(), recovered, remaining }
    }

    /// Drive the engine until every target is up or shutdown is requested.
    ///
    /// Shutdown is only honoured between rounds, so a round in flight always
    /// completes. A shutdown already requested when the engine starts skips
    /// every round. Detached notifications are drained before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> EngineExit {
        if self.start().await == EngineState::Done {
            self.drain().await;
            return EngineExit::Done { rounds: 0 };
        }

        if *shutdown.borrow_and_update() {
            info!("shutdown requested before the first round");
            self.drain().await;
            return EngineExit::Shutdown { rounds: 0 };
        }

        if !self.settings.settle_delay.is_zero() {
            debug!(delay_s = self.settings.settle_delay.as_secs(), "waiting for network to settle");
            tokio::select! {
                () = tokio::time::sleep(self.settings.settle_delay) => {}
                () = wait_for_shutdown(&mut shutdown) => {
                    self.drain().await;
                    return EngineExit::Shutdown { rounds: 0 };
                }
            }
        }

        let exit = loop {
            let report = self.step().await;
            if report.remaining == 0 {
                break EngineExit::Done { rounds: self.rounds };
            }

            tokio::select! {
                () = tokio::time::sleep(self.settings.interval) => {}
                () = wait_for_shutdown(&mut shutdown) => {
                    info!(rounds = self.rounds, "shutdown requested, no further rounds");
                    break EngineExit::Shutdown { rounds: self.rounds };
                }
            }
        };

        self.drain().await;
        exit
    }

    /// Apply one probe result. Returns whether the target just recovered.
    async fn apply(&mut self, round: u64, target: &Target, result: ProbeResult) -> bool {
        match result {
            ProbeResult::Reachable { latency } => {
                if !self.pending.remove(target).await {
                    return false;
                }
                info!(round, %target, latency_ms = latency.as_millis() as u64, "website is UP");
                self.deliver(templates::recovered(target)).await;
                true
            }
            ProbeResult::Unreachable { status, latency } => {
                warn!(round, %target, status, latency_ms = latency.as_millis() as u64, "website returned non-200 status");
                false
            }
            ProbeResult::Error { kind, detail } => {
                warn!(round, %target, %kind, error = %detail, "website is DOWN");
                false
            }
        }
    }

    /// Sequential dispatch completes each target's notification before the
    /// next probe, so it always sends inline.
    async fn deliver(&mut self, notification: Notification) {
        let delivery = match self.settings.dispatch {
            DispatchPolicy::Sequential => DeliveryPolicy::Await,
            DispatchPolicy::Concurrent => self.settings.delivery,
        };

        match delivery {
            DeliveryPolicy::Await => send_logged(self.notifier.as_ref(), &notification).await,
            DeliveryPolicy::Detached => {
                let notifier = Arc::clone(&self.notifier);
                self.in_flight.spawn(async move {
                    send_logged(notifier.as_ref(), &notification).await;
                });
            }
        }

        // Reap finished sends so the set does not grow without bound.
        while let Some(joined) = self.in_flight.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "notification task failed");
            }
        }
    }

    async fn drain(&mut self) {
        if !self.in_flight.is_empty() {
            debug!(pending = self.in_flight.len(), "waiting for notifications to finish");
        }
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "notification task failed");
            }
        }
    }

    fn set_state(&self, next: EngineState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "engine state change");
            *current = next;
            true
        });
    }
}

/// Deliver a notification, logging instead of propagating failures.
async fn send_logged(notifier: &dyn Notifier, notification: &Notification) {
    match notifier.notify(notification).await {
        Ok(()) => debug!(subject = %notification.subject, "notification delivered"),
        Err(e) => error!(subject = %notification.subject, error = %e, "failed to send notification"),
    }
}

/// Resolve once `true` is published. A dropped sender means nobody can ever
/// ask for shutdown, so this then never resolves.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
