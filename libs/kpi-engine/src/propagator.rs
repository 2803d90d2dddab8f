//! Change propagator
//!
//! Turns a changed metric value into recomputation of every metric that
//! depends on it, transitively. Notifications go through a bounded queue; a
//! dispatcher fans each one out into one recompute task per direct dependent,
//! all gated by a semaphore of `worker_count` permits.
//!
//! Each notification carries its causal chain (the ids whose changes led to
//! it). A dependent already in the chain is skipped and logged as a cycle, so
//! every cascade terminates.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kpi_model::{MetricId, MetricValue};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::calculator::Calculator;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::reverse_index::ReverseIndex;
use crate::traits::ValueSink;

/// A changed value waiting to be propagated
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: MetricId,
    pub value: MetricValue,
    pub source_tag: String,
    /// Ids whose changes caused this notification, oldest first
    pub chain: Vec<MetricId>,
}

/// Propagation counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationStats {
    pub notifications: u64,
    pub recomputations: u64,
    pub failures: u64,
    pub skipped_cycles: u64,
    pub sink_failures: u64,
}

#[derive(Default)]
struct Counters {
    notifications: AtomicU64,
    recomputations: AtomicU64,
    failures: AtomicU64,
    skipped_cycles: AtomicU64,
    sink_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PropagationStats {
        PropagationStats {
            notifications: self.notifications.load(Ordering::Relaxed),
            recomputations: self.recomputations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the handle, the dispatcher and propagation tasks
struct Shared {
    calculator: Arc<Calculator>,
    index: ReverseIndex,
    sink: Arc<dyn ValueSink>,
    sender: mpsc::Sender<Notification>,
    permits: Arc<Semaphore>,
    /// Queued plus in-flight notifications
    pending: AtomicUsize,
    idle: Notify,
    counters: Counters,
    follow_up_tag: String,
}

impl Shared {
    async fn enqueue(&self, notification: Notification) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(notification).await.is_err() {
            self.finish_one();
            return Err(EngineError::PropagatorClosed);
        }
        Ok(())
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn refresh_index(&self) {
        let registry = self.calculator.registry();
        if self.index.is_stale(registry) {
            self.index.rebuild(registry);
        }
    }
}

pub struct ChangePropagator {
    shared: Arc<Shared>,
    receiver: Mutex<Option<mpsc::Receiver<Notification>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    settle_delay: Duration,
}

impl ChangePropagator {
    pub fn new(
        config: &EngineConfig,
        calculator: Arc<Calculator>,
        sink: Arc<dyn ValueSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                calculator,
                index: ReverseIndex::new(),
                sink,
                sender,
                permits: Arc::new(Semaphore::new(config.worker_count.max(1))),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                counters: Counters::default(),
                follow_up_tag: config.persist_source_tag.clone(),
            }),
            receiver: Mutex::new(Some(receiver)),
            dispatcher: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            settle_delay: config.settle_delay(),
        }
    }

    /// Spawn the dispatcher; the index is first built after the settling delay
    ///
    /// Must be called from within a tokio runtime. A propagator can only be
    /// started once.
    pub fn start(&self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            warn!("Change propagator already running");
            return Ok(());
        }
        let Some(receiver) = self.receiver.lock().take() else {
            return Err(EngineError::PropagatorClosed);
        };

        self.running.store(true, Ordering::Release);
        info!(
            "Starting change propagator (settle delay {:?})",
            self.settle_delay
        );

        let handle = tokio::spawn(dispatch(
            Arc::clone(&self.shared),
            receiver,
            Arc::clone(&self.shutdown),
            Arc::clone(&self.running),
            self.settle_delay,
        ));
        *self.dispatcher.lock() = Some(handle);
        Ok(())
    }

    /// Stop the dispatcher
    ///
    /// Queued notifications are dropped; tasks already running finish.
    pub async fn shutdown(&self) {
        info!("Stopping change propagator...");
        self.shutdown.notify_one();
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Change propagator dispatcher failed: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Enqueue a changed value for propagation to its dependents
    ///
    /// Fails with [`EngineError::PropagatorClosed`] unless the propagator is
    /// running. Waits for room when the queue is full.
    pub async fn notify_changed(
        &self,
        id: MetricId,
        new_value: MetricValue,
        source_tag: impl Into<String>,
    ) -> Result<()> {
        if !self.is_running() {
            return Err(EngineError::PropagatorClosed);
        }
        let source_tag = source_tag.into();
        debug!("Change notified for {} from {}", id, source_tag);
        self.shared
            .enqueue(Notification {
                id,
                value: new_value,
                source_tag,
                chain: Vec::new(),
            })
            .await
    }

    /// Resolve once nothing is queued or in flight
    ///
    /// Returns at once when the propagator is not running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.pending.load(Ordering::Acquire) == 0 || !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    pub fn rebuild_index(&self) -> usize {
        self.shared.index.rebuild(self.shared.calculator.registry())
    }

    pub fn dependents_of(&self, id: &MetricId) -> BTreeSet<MetricId> {
        self.shared.refresh_index();
        self.shared.index.dependents_of(id)
    }

    pub fn dependency_chain(&self, id: &MetricId) -> Vec<MetricId> {
        self.shared.refresh_index();
        self.shared.index.dependency_chain(id)
    }

    pub fn has_cycle(&self) -> bool {
        self.shared.refresh_index();
        self.shared.index.has_cycle()
    }

    pub fn stats(&self) -> PropagationStats {
        self.shared.counters.snapshot()
    }
}

async fn dispatch(
    shared: Arc<Shared>,
    mut receiver: mpsc::Receiver<Notification>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    settle_delay: Duration,
) {
    let settled = tokio::select! {
        _ = tokio::time::sleep(settle_delay) => true,
        _ = shutdown.notified() => false,
    };

    if settled {
        shared.index.rebuild(shared.calculator.registry());
        info!("Change propagator ready");

        loop {
            let notification = tokio::select! {
                received = receiver.recv() => match received {
                    Some(n) => n,
                    None => break,
                },
                _ = shutdown.notified() => {
                    info!("Change propagator received shutdown signal");
                    break;
                }
            };

            shared.refresh_index();

            let permit = tokio::select! {
                permit = Arc::clone(&shared.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        shared.finish_one();
                        break;
                    },
                },
                _ = shutdown.notified() => {
                    shared.finish_one();
                    break;
                }
            };

            tokio::spawn(propagate(Arc::clone(&shared), notification, permit));
        }
    }

    receiver.close();
    let mut dropped = 0;
    while receiver.try_recv().is_ok() {
        shared.finish_one();
        dropped += 1;
    }
    if dropped > 0 {
        warn!("Dropped {} queued notifications on shutdown", dropped);
    }

    running.store(false, Ordering::Release);
    info!("Change propagator stopped");
}

/// Fan one changed metric out to its direct dependents
///
/// Each dependent is recomputed in its own task under its own permit, so a
/// slow subgraph holds back only its own cascade.
async fn propagate(
    shared: Arc<Shared>,
    notification: Notification,
    permit: OwnedSemaphorePermit,
) {
    let Notification {
        id,
        value,
        source_tag,
        chain,
    } = notification;
    shared.counters.notifications.fetch_add(1, Ordering::Relaxed);

    if value.is_valid() {
        let mut value = value;
        value.metric_id = id.clone();
        shared.calculator.cache().insert(value);
    }

    let dependents = shared.index.dependents_of(&id);
    debug!(
        "Propagating change of {} ({}) to {} dependents",
        id,
        source_tag,
        dependents.len()
    );
    drop(permit);

    let mut next_chain = chain;
    next_chain.push(id.clone());
    for dependent in dependents {
        if next_chain.contains(&dependent) {
            warn!(
                "Cycle in propagation: {} already changed in this cascade, skipping",
                dependent
            );
            shared.counters.skipped_cycles.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        shared.pending.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(recompute(
            Arc::clone(&shared),
            id.clone(),
            dependent,
            next_chain.clone(),
        ));
    }

    shared.finish_one();
}

/// Recompute one dependent, store it and queue its own follow-up
async fn recompute(
    shared: Arc<Shared>,
    changed: MetricId,
    dependent: MetricId,
    chain: Vec<MetricId>,
) {
    let Ok(permit) = Arc::clone(&shared.permits).acquire_owned().await else {
        shared.finish_one();
        return;
    };

    let calculator = &shared.calculator;
    calculator.invalidate(&dependent);
    let result = calculator.calculate(&dependent).await;
    shared.counters.recomputations.fetch_add(1, Ordering::Relaxed);

    if result.is_error() {
        warn!(
            "Recomputation of {} after change of {} failed: {}",
            dependent,
            changed,
            result.message.as_deref().unwrap_or("unknown error")
        );
        shared.counters.failures.fetch_add(1, Ordering::Relaxed);
        // Downstream values built on the old one must not be served
        for stale in shared.index.dependency_chain(&dependent) {
            calculator.invalidate(&stale);
        }
        drop(permit);
        shared.finish_one();
        return;
    }

    if result.is_valid() {
        if let Err(e) = shared.sink.store(&dependent, &result, result.timestamp).await {
            error!("Failed to store {}: {}", dependent, e);
            shared.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    // The follow-up may block on a full queue; do not hold a worker slot meanwhile
    drop(permit);
    let follow_up = Notification {
        id: dependent,
        value: result,
        source_tag: shared.follow_up_tag.clone(),
        chain,
    };
    if let Err(e) = shared.enqueue(follow_up).await {
        warn!("Follow-up notification not queued: {}", e);
    }

    shared.finish_one();
}
