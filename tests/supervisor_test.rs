// Integration tests for pair supervision, using in-memory consumers.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use rabbit_amazon_forwarder::consumer::{HealthChecks, StopSignal};
use rabbit_amazon_forwarder::{
    Consumer, ConsumerError, ForwardError, Forwarder, ForwarderKind, HealthReport, Mapping, Pair,
    PairState, Supervisor, SupervisorSettings,
};

fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        check_timeout: Duration::from_millis(200),
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(80),
        shutdown_timeout: Duration::from_secs(2),
    }
}

enum Behavior {
    /// Fail the first `n` runs, then run until stopped.
    FailFirst(usize),
    AlwaysFail,
    PanicFirst,
    /// Run until stopped without answering health checks.
    Silent,
    /// Return `Ok` on the first run without a stop, then behave.
    ReturnEarly,
    /// Never return, even when stopped.
    Stuck,
}

struct ScriptedConsumer {
    name: String,
    behavior: Behavior,
    starts: AtomicUsize,
    clean_stops: AtomicUsize,
}

impl ScriptedConsumer {
    fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            starts: AtomicUsize::new(0),
            clean_stops: AtomicUsize::new(0),
        })
    }

    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    async fn run_until_stopped(
        &self,
        forwarder: &dyn Forwarder,
        checks: &mut HealthChecks,
        mut stop: StopSignal,
        answer_checks: bool,
    ) -> Result<(), ConsumerError> {
        // A failed push is logged by real consumers and does not end the run.
        let _ = forwarder.push("hello").await;

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        self.clean_stops.fetch_add(1, Ordering::SeqCst);
                        return Ok(());
                    }
                }
                Some(reply) = checks.recv() => {
                    if answer_checks {
                        let _ = reply.send(true);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Consumer for ScriptedConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(
        &self,
        forwarder: Arc<dyn Forwarder>,
        checks: &mut HealthChecks,
        stop: StopSignal,
    ) -> Result<(), ConsumerError> {
        let run = self.starts.fetch_add(1, Ordering::SeqCst) + 1;

        match self.behavior {
            Behavior::FailFirst(n) if run <= n => Err(ConsumerError::StreamClosed),
            Behavior::AlwaysFail => Err(ConsumerError::StreamClosed),
            Behavior::PanicFirst if run == 1 => panic!("consumer blew up"),
            Behavior::ReturnEarly if run == 1 => Ok(()),
            Behavior::Stuck => std::future::pending().await,
            Behavior::Silent => {
                self.run_until_stopped(forwarder.as_ref(), checks, stop, false)
                    .await
            }
            _ => {
                self.run_until_stopped(forwarder.as_ref(), checks, stop, true)
                    .await
            }
        }
    }
}

struct CountingForwarder {
    name: String,
    pushes: AtomicUsize,
    fail: bool,
}

impl CountingForwarder {
    fn new(name: &str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            pushes: AtomicUsize::new(0),
            fail,
        })
    }
}

#[async_trait]
impl Forwarder for CountingForwarder {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ForwarderKind {
        ForwarderKind::Queue
    }

    async fn push(&self, message: &str) -> Result<(), ForwardError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ForwardError::Queue {
                target: self.name.clone(),
                reason: format!("rejected {}", message),
            });
        }
        Ok(())
    }
}

fn mapping(pairs: Vec<(Arc<ScriptedConsumer>, Arc<CountingForwarder>)>) -> Mapping {
    let mut mapping = Mapping::new();
    for (consumer, forwarder) in pairs {
        mapping
            .insert(Pair {
                consumer: consumer as Arc<dyn Consumer>,
                forwarder: forwarder as Arc<dyn Forwarder>,
            })
            .unwrap();
    }
    mapping
}

fn pair_alive(report: &HealthReport, consumer: &str) -> bool {
    report
        .pairs
        .iter()
        .find(|pair| pair.consumer == consumer)
        .map(|pair| pair.alive)
        .unwrap_or(false)
}

/// Poll health until `consumer` answers, or give up after two seconds.
async fn wait_until_alive(supervisor: &Supervisor, consumer: &str) -> HealthReport {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let report = supervisor.check().await;
        if pair_alive(&report, consumer) || Instant::now() > deadline {
            return report;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_failed_pair_is_restarted() {
    let consumer = ScriptedConsumer::new("flaky-rabbit", Behavior::FailFirst(2));
    let forwarder = CountingForwarder::new("flaky-sqs", false);
    let mut supervisor = Supervisor::start(
        mapping(vec![(consumer.clone(), forwarder.clone())]),
        fast_settings(),
    );

    let report = wait_until_alive(&supervisor, "flaky-rabbit").await;
    assert!(report.healthy);
    assert_eq!(consumer.starts(), 3);

    let status = supervisor.status("flaky-rabbit").unwrap();
    assert_eq!(status.state, PairState::Running);
    assert_eq!(status.restarts, 2);
    assert_eq!(forwarder.pushes.load(Ordering::SeqCst), 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_failing_pair_does_not_affect_others() {
    let broken = ScriptedConsumer::new("broken-rabbit", Behavior::AlwaysFail);
    let healthy = ScriptedConsumer::new("healthy-rabbit", Behavior::FailFirst(0));
    let mut supervisor = Supervisor::start(
        mapping(vec![
            (broken.clone(), CountingForwarder::new("broken-sns", false)),
            (healthy.clone(), CountingForwarder::new("healthy-sns", false)),
        ]),
        fast_settings(),
    );

    let report = wait_until_alive(&supervisor, "healthy-rabbit").await;
    assert!(pair_alive(&report, "healthy-rabbit"));
    assert!(!pair_alive(&report, "broken-rabbit"));
    assert!(!report.healthy);

    // Give the broken pair time for several restarts.
    sleep(Duration::from_millis(300)).await;
    assert!(broken.starts() >= 3);
    assert_eq!(healthy.starts(), 1);
    assert!(pair_alive(&supervisor.check().await, "healthy-rabbit"));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_push_failure_does_not_end_pair() {
    let consumer = ScriptedConsumer::new("test-rabbit", Behavior::FailFirst(0));
    let forwarder = CountingForwarder::new("rejecting-sqs", true);
    let mut supervisor = Supervisor::start(
        mapping(vec![(consumer.clone(), forwarder.clone())]),
        fast_settings(),
    );

    let report = wait_until_alive(&supervisor, "test-rabbit").await;
    assert!(report.healthy);
    assert_eq!(forwarder.pushes.load(Ordering::SeqCst), 1);
    assert_eq!(consumer.starts(), 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_panicking_consumer_is_restarted() {
    let consumer = ScriptedConsumer::new("panicky-rabbit", Behavior::PanicFirst);
    let mut supervisor = Supervisor::start(
        mapping(vec![(consumer.clone(), CountingForwarder::new("sns", false))]),
        fast_settings(),
    );

    let report = wait_until_alive(&supervisor, "panicky-rabbit").await;
    assert!(report.healthy);
    assert_eq!(consumer.starts(), 2);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_unanswered_check_times_out() {
    let consumer = ScriptedConsumer::new("silent-rabbit", Behavior::Silent);
    let mut supervisor = Supervisor::start(
        mapping(vec![(consumer.clone(), CountingForwarder::new("sns", false))]),
        fast_settings(),
    );
    sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let report = supervisor.check().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!report.healthy);
    assert_eq!(report.pairs[0].state, PairState::Running);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_pairs() {
    let first = ScriptedConsumer::new("first-rabbit", Behavior::FailFirst(0));
    let second = ScriptedConsumer::new("second-rabbit", Behavior::AlwaysFail);
    let mut supervisor = Supervisor::start(
        mapping(vec![
            (first.clone(), CountingForwarder::new("first-sns", false)),
            (second.clone(), CountingForwarder::new("second-sqs", false)),
        ]),
        fast_settings(),
    );
    wait_until_alive(&supervisor, "first-rabbit").await;

    let started = Instant::now();
    supervisor.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(first.clean_stops.load(Ordering::SeqCst), 1);
    assert!(supervisor.is_empty());

    // No relaunch after shutdown.
    let starts = second.starts();
    sleep(Duration::from_millis(150)).await;
    assert_eq!(second.starts(), starts);
}

#[tokio::test]
async fn test_early_return_is_restarted() {
    let consumer = ScriptedConsumer::new("quitting-rabbit", Behavior::ReturnEarly);
    let mut supervisor = Supervisor::start(
        mapping(vec![(consumer.clone(), CountingForwarder::new("sns", false))]),
        fast_settings(),
    );

    let report = wait_until_alive(&supervisor, "quitting-rabbit").await;
    assert!(report.healthy);
    assert_eq!(consumer.starts(), 2);

    let status = supervisor.status("quitting-rabbit").unwrap();
    assert_eq!(status.state, PairState::Running);
    assert!(status.restarts >= 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_waits_once_for_stuck_pairs() {
    let settings = SupervisorSettings {
        shutdown_timeout: Duration::from_millis(250),
        ..fast_settings()
    };
    let stuck: Vec<_> = (0..4)
        .map(|i| {
            (
                ScriptedConsumer::new(&format!("stuck-rabbit-{}", i), Behavior::Stuck),
                CountingForwarder::new(&format!("stuck-sqs-{}", i), false),
            )
        })
        .collect();
    let mut supervisor = Supervisor::start(mapping(stuck), settings);
    sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    supervisor.shutdown().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(250));
    assert!(elapsed < Duration::from_millis(700), "shutdown took {:?}", elapsed);
    assert!(supervisor.is_empty());
}

#[tokio::test]
async fn test_restart_replaces_pairs() {
    let old = ScriptedConsumer::new("old-rabbit", Behavior::FailFirst(0));
    let new = ScriptedConsumer::new("new-rabbit", Behavior::FailFirst(0));
    let mut supervisor = Supervisor::start(
        mapping(vec![(old.clone(), CountingForwarder::new("old-sns", false))]),
        fast_settings(),
    );
    wait_until_alive(&supervisor, "old-rabbit").await;

    supervisor
        .restart(mapping(vec![(new.clone(), CountingForwarder::new("new-sqs", false))]))
        .await;

    let report = wait_until_alive(&supervisor, "new-rabbit").await;
    assert!(report.healthy);
    assert_eq!(report.pairs.len(), 1);
    assert_eq!(report.pairs[0].forwarder, "new-sqs");
    assert_eq!(old.clean_stops.load(Ordering::SeqCst), 1);
    assert!(supervisor.status("old-rabbit").is_none());

    supervisor.shutdown().await;
}
