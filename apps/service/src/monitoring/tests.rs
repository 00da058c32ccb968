/// Engine tests
///
/// These drive the polling engine with a scripted probe and a recording
/// notifier, covering:
/// - Round outcomes and state transitions
/// - Dispatch and delivery policies
/// - Convergence, shutdown and notification failures
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::monitoring::checker::Probe;
use crate::monitoring::engine::{
    DeliveryPolicy, DispatchPolicy, EngineExit, EngineSettings, EngineState, PollingEngine,
};
use crate::monitoring::pending::PendingSet;
use crate::monitoring::types::{FailureKind, ProbeResult, Target};
use crate::notify::{Notification, Notifier, NotifyError};

/// Probe that fails a fixed number of times per target before answering 200.
/// Targets without a script never come up.
#[derive(Default)]
struct ScriptedProbe {
    failures_before_up: HashMap<Target, u64>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Target>>,
}

impl ScriptedProbe {
    fn up_after(mut self, target: &str, failures: u64) -> Self {
        self.failures_before_up.insert(Target::from(target), failures);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> Vec<Target> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, target: &str) -> usize {
        let target = Target::from(target);
        self.calls.lock().unwrap().iter().filter(|t| **t == target).count()
    }
}

#[async_trait::async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, target: &Target) -> ProbeResult {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(target.clone());
            calls.iter().filter(|t| *t == target).count() as u64
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.failures_before_up.get(target) {
            Some(failures) if attempt > *failures => {
                ProbeResult::Reachable { latency: Duration::from_millis(12) }
            }
            // Alternate the two "still down" flavours; the engine must treat them alike.
            _ if attempt % 2 == 0 => {
                ProbeResult::Unreachable { status: 503, latency: Duration::from_millis(40) }
            }
            _ => ProbeResult::Error { kind: FailureKind::Timeout, detail: "operation timed out".into() },
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail: true }
    }

    fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.subject.clone()).collect()
    }

    fn recoveries(&self) -> Vec<String> {
        self.subjects()
            .into_iter()
            .filter_map(|subject| subject.strip_prefix("Website is UP: ").map(String::from))
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail { Err(NotifyError::NoRecipients) } else { Ok(()) }
    }
}

fn engine_with(
    targets: &[&str],
    probe: Arc<ScriptedProbe>,
    notifier: Arc<RecordingNotifier>,
    settings: EngineSettings,
) -> PollingEngine {
    let pending = PendingSet::new(targets.iter().map(|t| Target::from(*t)));
    PollingEngine::new(probe, notifier, pending, settings)
}

fn no_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // Keep the sender alive for the whole test run.
    std::mem::forget(tx);
    rx
}

/// Paused-clock timings land on whole seconds; allow for timer granularity.
fn assert_elapsed(started: Instant, secs: u64) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs) + Duration::from_millis(500),
        "expected ~{secs}s, took {elapsed:?}"
    );
}

const A: &str = "https://a.test/";
const B: &str = "https://b.test/";
const C: &str = "https://c.test/";

#[tokio::test]
async fn test_one_up_one_down_after_first_round() {
    let probe = Arc::new(ScriptedProbe::default().up_after(A, 0));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = engine_with(&[A, B], probe.clone(), notifier.clone(), EngineSettings::default());

    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.start().await, EngineState::Idle);

    let report = engine.step().await;
    assert_eq!(report.round, 1);
    assert_eq!(report.probed, 2);
    assert_eq!(report.recovered, vec![Target::from(A)]);
    assert_eq!(report.remaining, 1);

    assert_eq!(engine.pending().snapshot().await, vec![Target::from(B)]);
    assert_eq!(engine.state(), EngineState::Waiting);
    assert_eq!(notifier.recoveries(), vec![A.to_string()]);
    assert_eq!(notifier.subjects().len(), 2, "startup plus one recovery");
}

#[tokio::test]
async fn test_empty_target_list_is_done_without_rounds() {
    let probe = Arc::new(ScriptedProbe::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(&[], probe.clone(), notifier.clone(), EngineSettings::default());
    let state = engine.subscribe();

    let exit = engine.run(no_shutdown()).await;

    assert_eq!(exit, EngineExit::Done { rounds: 0 });
    assert_eq!(*state.borrow(), EngineState::Done);
    assert!(probe.calls().is_empty());
    assert!(notifier.recoveries().is_empty());
    assert_eq!(notifier.subjects().len(), 1, "only the startup notification");
}

#[tokio::test]
async fn test_recovery_on_third_round_notifies_once() {
    let probe = Arc::new(ScriptedProbe::default().up_after(A, 2));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = engine_with(&[A], probe.clone(), notifier.clone(), EngineSettings::default());
    engine.start().await;

    for round in 1..=2 {
        let report = engine.step().await;
        assert!(report.recovered.is_empty(), "round {round} should not recover");
        assert!(notifier.recoveries().is_empty());
        assert_eq!(engine.state(), EngineState::Waiting);
    }

    let report = engine.step().await;
    assert_eq!(report.recovered, vec![Target::from(A)]);
    assert_eq!(notifier.recoveries(), vec![A.to_string()]);
    assert_eq!(engine.state(), EngineState::Done);
    assert_eq!(probe.calls_for(A), 3);
}

#[tokio::test]
async fn test_never_reachable_target_stays_pending() {
    let probe = Arc::new(ScriptedProbe::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = engine_with(&[A], probe.clone(), notifier.clone(), EngineSettings::default());
    engine.start().await;

    let mut previous = engine.pending().len().await;
    for _ in 0..10 {
        let report = engine.step().await;
        assert!(report.remaining <= previous, "pending set must never grow");
        previous = report.remaining;
        assert_eq!(engine.state(), EngineState::Waiting);
    }

    assert!(engine.pending().contains(&Target::from(A)).await);
    assert!(notifier.recoveries().is_empty());
    assert_eq!(probe.calls_for(A), 10);
}

#[tokio::test]
async fn test_recovered_targets_are_not_probed_again() {
    let probe = Arc::new(ScriptedProbe::default().up_after(A, 0));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = engine_with(&[A, B], probe.clone(), notifier.clone(), EngineSettings::default());
    engine.start().await;

    for _ in 0..4 {
        engine.step().await;
    }

    assert_eq!(probe.calls_for(A), 1);
    assert_eq!(probe.calls_for(B), 4);
    assert_eq!(notifier.recoveries(), vec![A.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_every_target_recovers_exactly_once() {
    let cases: Vec<(Vec<&str>, Vec<(&str, u64)>)> = vec![
        (vec![], vec![]),
        (vec![A], vec![(A, 0)]),
        (vec![A, A, B], vec![(A, 1), (B, 0)]),
        (vec![C, B, A], vec![(A, 3), (B, 1), (C, 2)]),
    ];

    for (targets, script) in cases {
        for dispatch in [DispatchPolicy::Concurrent, DispatchPolicy::Sequential] {
            let probe = Arc::new(
                script.iter().fold(ScriptedProbe::default(), |probe, (t, n)| probe.up_after(t, *n)),
            );
            let notifier = Arc::new(RecordingNotifier::default());
            let settings = EngineSettings { dispatch, ..EngineSettings::default() };
            let engine = engine_with(&targets, probe.clone(), notifier.clone(), settings);
            let pending = engine.pending().clone();

            let exit = engine.run(no_shutdown()).await;
            assert!(matches!(exit, EngineExit::Done { .. }), "{targets:?} with {dispatch}");
            assert!(pending.is_empty().await);

            let mut recovered = notifier.recoveries();
            recovered.sort();
            let mut expected: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
            expected.sort();
            expected.dedup();
            assert_eq!(recovered, expected, "{targets:?} with {dispatch}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_reports_rounds_and_waits_interval() {
    let probe = Arc::new(ScriptedProbe::default().up_after(A, 2));
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = EngineSettings { interval: Duration::from_secs(20), ..EngineSettings::default() };
    let engine = engine_with(&[A], probe, notifier, settings);

    let started = Instant::now();
    let exit = engine.run(no_shutdown()).await;

    assert_eq!(exit, EngineExit::Done { rounds: 3 });
    assert_elapsed(started, 40);
}

#[tokio::test(start_paused = true)]
async fn test_settle_delay_precedes_first_round() {
    let probe = Arc::new(ScriptedProbe::default().up_after(A, 0));
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = EngineSettings { settle_delay: Duration::from_secs(5), ..EngineSettings::default() };
    let engine = engine_with(&[A], probe, notifier, settings);

    let started = Instant::now();
    let exit = engine.run(no_shutdown()).await;

    assert_eq!(exit, EngineExit::Done { rounds: 1 });
    assert_elapsed(started, 5);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_dispatch_overlaps_probes() {
    let probe = Arc::new(
        ScriptedProbe::default()
            .up_after(A, 0)
            .up_after(B, 0)
            .up_after(C, 0)
            .with_delay(Duration::from_secs(1)),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = EngineSettings { dispatch: DispatchPolicy::Concurrent, ..EngineSettings::default() };
    let mut engine = engine_with(&[A, B, C], probe, notifier, settings);
    engine.start().await;

    let started = Instant::now();
    let report = engine.step().await;

    assert_eq!(report.recovered.len(), 3);
    assert_elapsed(started, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_dispatch_keeps_snapshot_order() {
    let probe = Arc::new(
        ScriptedProbe::default()
            .up_after(A, 0)
            .up_after(B, 0)
            .up_after(C, 0)
            .with_delay(Duration::from_secs(1)),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = EngineSettings { dispatch: DispatchPolicy::Sequential, ..EngineSettings::default() };
    let mut engine = engine_with(&[C, A, B], probe.clone(), notifier.clone(), settings);
    engine.start().await;

    let snapshot = engine.pending().snapshot().await;
    let started = Instant::now();
    engine.step().await;

    assert_elapsed(started, 3);
    assert_eq!(probe.calls(), snapshot);

    let expected: Vec<String> = snapshot.iter().map(Target::to_string).collect();
    assert_eq!(notifier.recoveries(), expected);
}

/// Notifier that takes a while per send and records, for each finished send,
/// how many checks the probe had run by then.
struct SlowNotifier {
    probe: Arc<ScriptedProbe>,
    delay: Duration,
    finished: Mutex<Vec<(String, usize)>>,
}

#[async_trait::async_trait]
impl Notifier for SlowNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tokio::time::sleep(self.delay).await;
        let checks = self.probe.calls().len();
        self.finished.lock().unwrap().push((notification.subject.clone(), checks));
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_sequential_dispatch_awaits_notifications_even_when_detached() {
    let probe = Arc::new(ScriptedProbe::default().up_after(A, 0).up_after(B, 0));
    let notifier = Arc::new(SlowNotifier {
        probe: probe.clone(),
        delay: Duration::from_secs(5),
        finished: Mutex::default(),
    });
    let settings = EngineSettings {
        dispatch: DispatchPolicy::Sequential,
        delivery: DeliveryPolicy::Detached,
        notify_on_start: false,
        ..EngineSettings::default()
    };
    let pending = PendingSet::new([A, B].map(Target::from));
    let mut engine = PollingEngine::new(probe.clone(), notifier.clone(), pending, settings);
    engine.start().await;

    let started = Instant::now();
    let report = engine.step().await;
    assert_elapsed(started, 10);
    assert_eq!(report.recovered, vec![Target::from(A), Target::from(B)]);

    // A's email went out before B was checked.
    let finished = notifier.finished.lock().unwrap().clone();
    assert_eq!(finished, vec![(format!("Website is UP: {A}"), 1), (format!("Website is UP: {B}"), 2)]);
}

#[tokio::test]
async fn test_detached_delivery_is_drained_before_exit() {
    let probe = Arc::new(ScriptedProbe::default().up_after(A, 0).up_after(B, 0));
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = EngineSettings {
        delivery: DeliveryPolicy::Detached,
        notify_all_clear: true,
        ..EngineSettings::default()
    };
    let engine = engine_with(&[A, B], probe, notifier.clone(), settings);

    let exit = engine.run(no_shutdown()).await;
    assert_eq!(exit, EngineExit::Done { rounds: 1 });

    let mut recovered = notifier.recoveries();
    recovered.sort();
    assert_eq!(recovered, vec![A.to_string(), B.to_string()]);
    assert!(notifier.subjects().iter().any(|s| s == "All monitored websites are UP"));
    assert_eq!(notifier.subjects().len(), 4);
}

#[tokio::test]
async fn test_notification_failure_does_not_stop_polling() {
    let probe = Arc::new(ScriptedProbe::default().up_after(A, 0).up_after(B, 1));
    let notifier = Arc::new(RecordingNotifier::failing());
    let mut engine = engine_with(&[A, B], probe, notifier.clone(), EngineSettings::default());
    engine.start().await;

    let first = engine.step().await;
    assert_eq!(first.recovered, vec![Target::from(A)]);
    assert_eq!(engine.state(), EngineState::Waiting);

    let second = engine.step().await;
    assert_eq!(second.recovered, vec![Target::from(B)]);
    assert_eq!(engine.state(), EngineState::Done);

    // Each delivery was attempted exactly once, never retried.
    assert_eq!(notifier.recoveries(), vec![A.to_string(), B.to_string()]);
}

#[tokio::test]
async fn test_startup_notification_can_be_disabled() {
    let probe = Arc::new(ScriptedProbe::default().up_after(A, 0));
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = EngineSettings { notify_on_start: false, ..EngineSettings::default() };
    let engine = engine_with(&[A], probe, notifier.clone(), settings);

    engine.run(no_shutdown()).await;
    assert_eq!(notifier.subjects(), vec![format!("Website is UP: {A}")]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_waiting() {
    let probe = Arc::new(ScriptedProbe::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(&[A], probe.clone(), notifier, EngineSettings::default());
    let pending = engine.pending().clone();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(engine.run(rx));

    tokio::time::sleep(Duration::from_secs(45)).await;
    tx.send(true).unwrap();

    let exit = handle.await.unwrap();
    let EngineExit::Shutdown { rounds } = exit else {
        panic!("expected shutdown, got {exit:?}");
    };
    assert!(rounds >= 2);
    assert_eq!(probe.calls_for(A) as u64, rounds);
    assert!(pending.contains(&Target::from(A)).await);
}

#[tokio::test]
async fn test_shutdown_before_first_round_checks_nothing() {
    let probe = Arc::new(ScriptedProbe::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(&[A], probe.clone(), notifier.clone(), EngineSettings::default());
    let pending = engine.pending().clone();

    let (tx, rx) = watch::channel(true);
    let exit = engine.run(rx).await;
    drop(tx);

    assert_eq!(exit, EngineExit::Shutdown { rounds: 0 });
    assert_eq!(probe.calls_for(A), 0);
    assert!(pending.contains(&Target::from(A)).await);
    // The startup notification is sent before shutdown is checked.
    assert_eq!(notifier.subjects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_settle_delay_checks_nothing() {
    let probe = Arc::new(ScriptedProbe::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = EngineSettings { settle_delay: Duration::from_secs(60), ..EngineSettings::default() };
    let engine = engine_with(&[A], probe.clone(), notifier, settings);

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(engine.run(rx));

    tokio::time::sleep(Duration::from_secs(10)).await;
    tx.send(true).unwrap();

    assert_eq!(handle.await.unwrap(), EngineExit::Shutdown { rounds: 0 });
    assert_eq!(probe.calls_for(A), 0);
}
