//! Drives a reconciler over its trigger channel.
//!
//! Triggers are fed into a [`WorkQueue`] and processed by a small pool of
//! workers. A failed reconcile is re-queued after a Fibonacci backoff kept
//! per trigger; a success drops the backoff so the next failure starts over.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::metrics::ControllerMetrics;
use crate::queue::WorkQueue;
use crate::trigger::{ReconcileTrigger, TriggerReceiver};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A reconcile loop body.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Name used in logs, metrics and condition types.
    fn name(&self) -> &'static str;

    /// Key a trigger is queued under. Reconcilers that rebuild everything
    /// on any change map all triggers to one key so bursts collapse.
    fn queue_key(&self, trigger: ReconcileTrigger) -> ReconcileTrigger {
        trigger
    }

    async fn reconcile(&self, trigger: &ReconcileTrigger) -> Result<(), ControllerError>;
}

type Backoffs = Arc<Mutex<HashMap<ReconcileTrigger, FibonacciBackoff>>>;

/// Runs `reconciler` until `cancel` fires or the trigger channel closes.
pub async fn run_reconciler<R: Reconcile>(
    reconciler: Arc<R>,
    mut triggers: TriggerReceiver,
    workers: usize,
    metrics: Arc<ControllerMetrics>,
    cancel: CancellationToken,
) {
    let name = reconciler.name();
    info!("Starting {} with {} workers", name, workers);

    let queue = Arc::new(WorkQueue::new());
    let backoffs: Backoffs = Arc::default();
    let mut pool = JoinSet::new();
    for _ in 0..workers.max(1) {
        pool.spawn(worker(
            Arc::clone(&reconciler),
            Arc::clone(&queue),
            Arc::clone(&backoffs),
            Arc::clone(&metrics),
        ));
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            trigger = triggers.recv() => match trigger {
                Some(trigger) => {
                    queue.add(reconciler.queue_key(trigger));
                    metrics.queue_depth.with_label_values(&[name]).set(queue.len() as i64);
                }
                None => {
                    debug!("Trigger channel of {} closed", name);
                    break;
                }
            },
        }
    }

    queue.shut_down();
    // In-flight reconciles are aborted rather than awaited.
    pool.abort_all();
    while pool.join_next().await.is_some() {}
    info!("Stopped {}", name);
}

async fn worker<R: Reconcile>(
    reconciler: Arc<R>,
    queue: Arc<WorkQueue<ReconcileTrigger>>,
    backoffs: Backoffs,
    metrics: Arc<ControllerMetrics>,
) {
    let name = reconciler.name();
    while let Some(trigger) = queue.get().await {
        metrics.queue_depth.with_label_values(&[name]).set(queue.len() as i64);
        metrics.reconcile_total.with_label_values(&[name]).inc();
        let started = Instant::now();
        debug!("{} reconciling {}", name, trigger);

        let result = reconciler.reconcile(&trigger).await;
        metrics
            .reconcile_duration
            .with_label_values(&[name])
            .observe(started.elapsed().as_secs_f64());

        let retry = {
            let mut backoffs = backoffs.lock().unwrap_or_else(PoisonError::into_inner);
            match result {
                Ok(()) => {
                    backoffs.remove(&trigger);
                    None
                }
                Err(e) => {
                    metrics.reconcile_errors_total.with_label_values(&[name]).inc();
                    let delay = backoffs.entry(trigger.clone()).or_default().next_backoff();
                    error!("{} failed for {}: {}; retrying in {:?}", name, trigger, e, delay);
                    Some(delay)
                }
            }
        };
        if let Some(delay) = retry {
            queue.add_after(trigger.clone(), delay);
        }
        queue.done(&trigger);
    }
}
