// src/supervisor.rs
// Every pair runs in its own tokio task: Idle -> Running -> {Stopped, Failed}.
// A failed run (error, early return or panic) is retried with exponential
// backoff until the supervisor stops. Pairs share only the stop flag.
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::consumer::{stop_requested, CheckRequest, HealthChecks, StopSignal};
use crate::mapping::{Mapping, Pair};

const CHECK_QUEUE_DEPTH: usize = 4;
// Lower bound for any restart delay.
const MIN_BACKOFF: Duration = Duration::from_millis(10);

/// Timing knobs for supervision.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Bounded wait for a health check reply.
    pub check_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// How long `shutdown` waits for all pairs before aborting the rest.
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(2),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PairState {
    Idle,
    Running,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairStatus {
    pub state: PairState,
    /// Number of relaunches after a failed run.
    pub restarts: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairHealth {
    pub consumer: String,
    pub forwarder: String,
    pub state: PairState,
    pub restarts: u64,
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    /// True when there is at least one pair and every pair answered.
    pub healthy: bool,
    pub pairs: Vec<PairHealth>,
}

struct PairHandle {
    consumer: String,
    forwarder: String,
    checks: mpsc::Sender<CheckRequest>,
    status: watch::Receiver<PairStatus>,
    task: JoinHandle<()>,
}

pub struct Supervisor {
    pairs: Vec<PairHandle>,
    stop: watch::Sender<bool>,
    settings: SupervisorSettings,
}

impl Supervisor {
    /// Spawn one task per pair and return immediately.
    pub fn start(mapping: Mapping, settings: SupervisorSettings) -> Self {
        let (stop, _) = watch::channel(false);
        let pairs = spawn_pairs(mapping, &stop, &settings);

        info!(pairs = pairs.len(), "Supervisor started");
        Self {
            pairs,
            stop,
            settings,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Current status of the pair whose consumer is `consumer`.
    pub fn status(&self, consumer: &str) -> Option<PairStatus> {
        self.pairs
            .iter()
            .find(|pair| pair.consumer == consumer)
            .map(|pair| *pair.status.borrow())
    }

    /// Check every pair concurrently. Never waits longer than the check
    /// timeout.
    pub async fn check(&self) -> HealthReport {
        let checks = self
            .pairs
            .iter()
            .map(|pair| check_pair(pair, self.settings.check_timeout));
        let pairs = futures::future::join_all(checks).await;

        HealthReport {
            checked_at: Utc::now(),
            healthy: !pairs.is_empty() && pairs.iter().all(|pair| pair.alive),
            pairs,
        }
    }

    /// Stop the running pairs and start `mapping` in their place.
    pub async fn restart(&mut self, mapping: Mapping) {
        info!("Restarting supervisor with {} pairs", mapping.len());
        self.shutdown().await;

        let (stop, _) = watch::channel(false);
        self.pairs = spawn_pairs(mapping, &stop, &self.settings);
        self.stop = stop;
    }

    /// Raise the stop flag and wait for every pair to return. Pairs still
    /// running after `shutdown_timeout` are aborted.
    pub async fn shutdown(&mut self) {
        self.stop.send_replace(true);

        let tasks = self.pairs.iter_mut().map(|pair| &mut pair.task);
        match timeout(self.settings.shutdown_timeout, futures::future::join_all(tasks)).await {
            Ok(results) => {
                for (pair, result) in self.pairs.iter().zip(results) {
                    if let Err(e) = result {
                        error!(consumer = %pair.consumer, "Pair task ended abnormally: {}", e);
                    }
                }
            }
            Err(_) => {
                for pair in self.pairs.iter().filter(|pair| !pair.task.is_finished()) {
                    warn!(consumer = %pair.consumer, "Pair did not stop in time, aborting");
                    pair.task.abort();
                }
            }
        }

        self.pairs.clear();
        info!("Supervisor stopped");
    }
}

fn spawn_pairs(
    mapping: Mapping,
    stop: &watch::Sender<bool>,
    settings: &SupervisorSettings,
) -> Vec<PairHandle> {
    mapping
        .into_iter()
        .map(|pair| {
            let (check_tx, check_rx) = mpsc::channel(CHECK_QUEUE_DEPTH);
            let (status_tx, status_rx) = watch::channel(PairStatus {
                state: PairState::Idle,
                restarts: 0,
            });

            let consumer = pair.consumer.name().to_string();
            let forwarder = pair.forwarder.name().to_string();
            let task = tokio::spawn(run_pair(
                pair,
                check_rx,
                stop.subscribe(),
                status_tx,
                settings.clone(),
            ));

            PairHandle {
                consumer,
                forwarder,
                checks: check_tx,
                status: status_rx,
                task,
            }
        })
        .collect()
}

async fn check_pair(pair: &PairHandle, check_timeout: Duration) -> PairHealth {
    let (reply_tx, reply_rx) = oneshot::channel();

    // A full check queue means earlier checks went unanswered.
    let alive = match pair.checks.try_send(reply_tx) {
        Ok(()) => matches!(timeout(check_timeout, reply_rx).await, Ok(Ok(true))),
        Err(_) => false,
    };

    let status = *pair.status.borrow();
    if !alive {
        warn!(consumer = %pair.consumer, state = ?status.state, "Pair failed health check");
    }

    PairHealth {
        consumer: pair.consumer.clone(),
        forwarder: pair.forwarder.clone(),
        state: status.state,
        restarts: status.restarts,
        alive,
    }
}

async fn run_pair(
    pair: Pair,
    mut checks: HealthChecks,
    stop: StopSignal,
    status: watch::Sender<PairStatus>,
    settings: SupervisorSettings,
) {
    let consumer = pair.consumer.name().to_string();
    let forwarder = pair.forwarder.name().to_string();
    let mut backoff = Backoff::new(settings.initial_backoff, settings.max_backoff);

    loop {
        status.send_modify(|s| s.state = PairState::Running);
        let started = Instant::now();

        let run = pair
            .consumer
            .start(pair.forwarder.clone(), &mut checks, stop.clone());
        let result = AssertUnwindSafe(run).catch_unwind().await;

        if stop_requested(&stop) {
            if let Ok(Err(e)) = &result {
                warn!(consumer = %consumer, "Consumer returned an error while stopping: {}", e);
            }
            status.send_modify(|s| s.state = PairState::Stopped);
            info!(consumer = %consumer, forwarder = %forwarder, "Pair stopped");
            return;
        }

        match result {
            Ok(Ok(())) => warn!(
                consumer = %consumer,
                forwarder = %forwarder,
                "Consumer returned without a stop request"
            ),
            Ok(Err(e)) => error!(
                consumer = %consumer,
                forwarder = %forwarder,
                "Consumer failed: {}",
                e
            ),
            Err(_) => error!(consumer = %consumer, forwarder = %forwarder, "Consumer panicked"),
        }

        backoff.observe_run(started.elapsed());
        let delay = backoff.next_delay();
        status.send_modify(|s| s.state = PairState::Failed);
        warn!(consumer = %consumer, "Restarting pair in {:?}", delay);

        if !wait_before_restart(delay, &mut checks, stop.clone()).await {
            status.send_modify(|s| s.state = PairState::Stopped);
            info!(consumer = %consumer, forwarder = %forwarder, "Pair stopped");
            return;
        }

        status.send_modify(|s| s.restarts += 1);
    }
}

/// Sleep through the backoff, answering health checks with `false`. Returns false
/// when a stop arrives first.
async fn wait_before_restart(
    delay: Duration,
    checks: &mut HealthChecks,
    mut stop: StopSignal,
) -> bool {
    let deadline = sleep(delay);
    tokio::pin!(deadline);

    loop {
        if stop_requested(&stop) {
            return false;
        }

        tokio::select! {
            _ = &mut deadline => return true,
            changed = stop.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            Some(reply) = checks.recv() => {
                let _ = reply.send(false);
            }
        }
    }
}

/// Exponential backoff with jitter, capped at `max` and never below
/// `MIN_BACKOFF`.
#[derive(Debug, Clone)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_BACKOFF);
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);

        let jitter = (rand::random::<f64>() * 0.3 - 0.15) * delay.as_secs_f64();
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0)).min(self.max)
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }

    /// A run that outlived the maximum delay starts the sequence over.
    fn observe_run(&mut self, ran_for: Duration) {
        if ran_for > self.max {
            self.reset();
        }
    }
}
