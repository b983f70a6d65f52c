// src/consumer.rs
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::common::ConsumerError;
use crate::forwarder::Forwarder;

/// A liveness check. The consumer answers with whether its source is still
/// connected; an unanswered check counts as dead.
pub type CheckRequest = oneshot::Sender<bool>;

/// Receiving end of the health check channel handed to a running consumer.
pub type HealthChecks = mpsc::Receiver<CheckRequest>;

/// Broadcast stop flag. The consumer returns `Ok(())` once it reads `true`.
pub type StopSignal = watch::Receiver<bool>;

/// Reads messages from a source and drives a forwarder with each of them.
#[async_trait]
pub trait Consumer: Send + Sync {
    fn name(&self) -> &str;

    /// Runs until `stop` is raised (returns `Ok`) or the source is lost
    /// (returns `Err`). Health checks arriving on `checks` must be answered while
    /// running. A failed push is not fatal to the run.
    async fn start(
        &self,
        forwarder: Arc<dyn Forwarder>,
        checks: &mut HealthChecks,
        stop: StopSignal,
    ) -> Result<(), ConsumerError>;
}

/// True once the stop flag has been raised, or its sender is gone.
pub fn stop_requested(stop: &StopSignal) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Drive `work` to completion while answering health checks with `alive()`.
pub async fn serve_checks_during<F, A>(work: F, checks: &mut HealthChecks, alive: A) -> F::Output
where
    F: Future,
    A: Fn() -> bool,
{
    tokio::pin!(work);

    loop {
        tokio::select! {
            output = &mut work => return output,
            Some(reply) = checks.recv() => {
                let _ = reply.send(alive());
            }
        }
    }
}

/// Run `work` unless a stop arrives first, answering health checks with
/// `false` meanwhile. Returns `None` when stopped; `work` is dropped.
pub async fn unless_stopped<F>(
    work: F,
    checks: &mut HealthChecks,
    stop: &mut StopSignal,
) -> Option<F::Output>
where
    F: Future,
{
    tokio::pin!(work);

    loop {
        if stop_requested(stop) {
            return None;
        }

        tokio::select! {
            output = &mut work => return Some(output),
            changed = stop.changed() => {
                if changed.is_err() {
                    return None;
                }
            }
            Some(reply) = checks.recv() => {
                let _ = reply.send(false);
            }
        }
    }
}
