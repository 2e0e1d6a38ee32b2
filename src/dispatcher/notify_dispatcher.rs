//! Elastic worker pool delivering change notifications
//!
//! ```text
//! Poller (tokio task):
//!   apply snapshot -> submit(job) -> try_send(job_queue) [non-blocking]
//!                                           |
//! Core workers (std threads, min_workers):  v
//!   job_queue.recv() -> snapshot listener table -> invoke callbacks
//!
//! Queue full:
//!   spawn surge worker (up to max_workers) handed the job directly,
//!   surge worker delivers what is queued ahead of it, then its own job,
//!   and exits after keep_alive idle
//! ```
//!
//! Callbacks run on dispatcher threads, never on a poller, so a slow
//! subscriber delays other notifications but never a poll cycle.
//!
//! Jobs are numbered on submission. Deliveries for one cluster (or one
//! group's command) run one at a time, and a job older than the last one
//! delivered for its key is skipped, so subscribers never move back to a
//! superseded state.

use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::TrySendError;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::metrics::NOTIFICATIONS_DELIVERED;
use crate::Address;
use crate::ClusterKey;
use crate::CommandListenerTable;
use crate::DispatchError;
use crate::NotifyConfig;
use crate::Result;
use crate::ServiceListenerTable;

/// One unit of delivery work
#[derive(Debug, Clone)]
pub enum NotifyJob {
    /// New address list of a cluster
    Service {
        key: ClusterKey,
        addresses: Arc<Vec<Address>>,
    },
    /// New routing command of a group
    Command { group: String, command: String },
}

impl NotifyJob {
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyJob::Service { .. } => "service",
            NotifyJob::Command { .. } => "command",
        }
    }

    fn order_key(&self) -> OrderKey {
        match self {
            NotifyJob::Service { key, .. } => OrderKey::Service(key.clone()),
            NotifyJob::Command { group, .. } => OrderKey::Command(group.clone()),
        }
    }
}

/// Key whose deliveries must not overtake each other
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum OrderKey {
    Service(ClusterKey),
    Command(String),
}

/// A job with its submission number
#[derive(Debug)]
struct Sequenced {
    seq: u64,
    job: NotifyJob,
}

struct DispatcherInner {
    service_listeners: Arc<ServiceListenerTable>,
    command_listeners: Arc<CommandListenerTable>,
    config: NotifyConfig,

    /// Live worker threads, core and surge
    workers: AtomicUsize,
    next_seq: AtomicU64,
    /// Last delivered submission number per key; the lock is held while
    /// that key's listeners run
    last_delivered: DashMap<OrderKey, Arc<Mutex<u64>>>,
    next_worker_id: AtomicUsize,
    delivered: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,

    handles: Mutex<Vec<JoinHandle<()>>>,

    /// Dropping the sender wakes every worker with a disconnect
    shutdown_tx: Mutex<Option<Sender<()>>>,
}

/// Bounded, elastic pool of notification workers
///
/// Cloning is cheap; all clones share the same queue and threads.
#[derive(Clone)]
pub struct NotifyDispatcher {
    inner: Arc<DispatcherInner>,
    job_tx: Sender<Sequenced>,
    job_rx: Receiver<Sequenced>,
    shutdown_rx: Receiver<()>,
}

impl std::fmt::Debug for NotifyDispatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("NotifyDispatcher")
            .field("config", &self.inner.config)
            .field("workers", &self.worker_count())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

impl NotifyDispatcher {
    /// Creates the pool and starts `min_workers` core workers
    pub fn start(
        config: NotifyConfig,
        service_listeners: Arc<ServiceListenerTable>,
        command_listeners: Arc<CommandListenerTable>,
    ) -> Self {
        let (job_tx, job_rx) = bounded(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let inner = Arc::new(DispatcherInner {
            service_listeners,
            command_listeners,
            config,
            workers: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            last_delivered: DashMap::new(),
            next_worker_id: AtomicUsize::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        });

        let dispatcher = Self {
            inner,
            job_tx,
            job_rx,
            shutdown_rx,
        };
        for _ in 0..dispatcher.inner.config.min_workers {
            dispatcher.inner.workers.fetch_add(1, Ordering::AcqRel);
            dispatcher.spawn_worker(WorkerRole::Core, None);
        }
        debug!(
            min_workers = dispatcher.inner.config.min_workers,
            max_workers = dispatcher.inner.config.max_workers,
            queue_capacity = dispatcher.inner.config.queue_capacity,
            "notify dispatcher started"
        );
        dispatcher
    }

    /// Queues `job` for delivery without blocking
    ///
    /// When the queue is full a surge worker takes the job directly and
    /// delivers it after the jobs already queued. Fails
    /// with [`DispatchError::QueueFull`] only when the queue is full and the
    /// pool is already at `max_workers`.
    pub fn submit(
        &self,
        job: NotifyJob,
    ) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown.into());
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::AcqRel) + 1;
        match self.job_tx.try_send(Sequenced { seq, job }) {
            Ok(()) => {
                // A pool sized with no core workers still needs someone to drain the queue
                if self.worker_count() == 0 && self.try_claim_surge_slot() {
                    self.spawn_worker(WorkerRole::Surge, None);
                }
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::ShutDown.into()),
            Err(TrySendError::Full(job)) => {
                if self.try_claim_surge_slot() {
                    trace!(kind = job.job.kind(), seq, "queue full, start surge worker");
                    self.spawn_worker(WorkerRole::Surge, Some(job));
                    Ok(())
                } else {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    Err(DispatchError::QueueFull {
                        capacity: self.inner.config.queue_capacity,
                    }
                    .into())
                }
            }
        }
    }

    /// Stops every worker and waits for them to exit
    ///
    /// Jobs still queued are discarded. Later submissions fail with
    /// [`DispatchError::ShutDown`]. Calling it twice is a no-op.
    pub fn shutdown(&self) {
        self.signal_shutdown();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                error!("notify worker exited abnormally");
            }
        }
        let discarded = self.job_rx.try_iter().count();
        if discarded > 0 {
            debug!(discarded, "discarded queued notifications on shutdown");
        }
    }

    /// Signals workers to stop without waiting for them
    pub fn signal_shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        if self.inner.shutdown_tx.lock().take().is_some() {
            debug!("notify dispatcher shutting down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.inner.workers.load(Ordering::Acquire)
    }

    /// Jobs waiting in the queue
    pub fn queued(&self) -> usize {
        self.job_tx.len()
    }

    /// Callbacks that returned normally
    pub fn delivered_count(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Submissions refused because the pool was saturated
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    fn try_claim_surge_slot(&self) -> bool {
        let max = self.inner.config.max_workers;
        self.inner
            .workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < max {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Spawns a worker whose slot is already counted in `workers`
    fn spawn_worker(
        &self,
        role: WorkerRole,
        handed: Option<Sequenced>,
    ) {
        let inner = self.inner.clone();
        let job_rx = self.job_rx.clone();
        let shutdown_rx = self.shutdown_rx.clone();
        let worker_id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);

        let handle = std::thread::spawn(move || {
            trace!(worker_id, ?role, "notify worker started");
            if let Some(job) = handed {
                // Jobs queued before the handed one go first
                let ahead: Vec<Sequenced> = job_rx.try_iter().take(inner.config.queue_capacity).collect();
                for queued in ahead {
                    deliver(&inner, queued);
                }
                deliver(&inner, job);
            }
            match role {
                WorkerRole::Core => run_core_worker(&inner, &job_rx, &shutdown_rx),
                WorkerRole::Surge => run_surge_worker(&inner, &job_rx, &shutdown_rx),
            }
            inner.workers.fetch_sub(1, Ordering::AcqRel);
            trace!(worker_id, ?role, "notify worker stopped");
        });

        let mut handles = self.inner.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

/// Core workers live as long as the pool; surge workers retire when idle
#[derive(Debug, Clone, Copy)]
enum WorkerRole {
    Core,
    Surge,
}

fn run_core_worker(
    inner: &DispatcherInner,
    job_rx: &Receiver<Sequenced>,
    shutdown_rx: &Receiver<()>,
) {
    loop {
        crossbeam_channel::select! {
            recv(job_rx) -> job => match job {
                Ok(job) => deliver(inner, job),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        }
    }
}

fn run_surge_worker(
    inner: &DispatcherInner,
    job_rx: &Receiver<Sequenced>,
    shutdown_rx: &Receiver<()>,
) {
    let keep_alive = inner.config.keep_alive();
    loop {
        crossbeam_channel::select! {
            recv(job_rx) -> job => match job {
                Ok(job) => deliver(inner, job),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
            default(keep_alive) => break,
        }
    }
}

/// Invokes every listener registered for the job's key
///
/// No listener table entry means nobody subscribed: the job is a no-op.
/// A job older than the last one delivered for its key is skipped.
fn deliver(
    inner: &DispatcherInner,
    Sequenced { seq, job }: Sequenced,
) {
    let kind = job.kind();
    let order = inner.last_delivered.entry(job.order_key()).or_default().clone();
    let mut last = order.lock();
    if seq <= *last {
        debug!(kind, seq, last = *last, "skip superseded notification");
        return;
    }
    *last = seq;

    match job {
        NotifyJob::Service { key, addresses } => {
            let Some(listeners) = inner.service_listeners.snapshot(&key) else {
                debug!(cluster = %key, "no service listeners, skip notification");
                return;
            };
            for (subscriber, listener) in listeners {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    listener.notify_service(&subscriber, &addresses)
                }));
                record_outcome(inner, kind, &subscriber, outcome.is_ok());
            }
        }
        NotifyJob::Command { group, command } => {
            let Some(listeners) = inner.command_listeners.snapshot(&group) else {
                debug!(%group, "no command listeners, skip notification");
                return;
            };
            for (subscriber, listener) in listeners {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    listener.notify_command(&subscriber, &group, &command)
                }));
                record_outcome(inner, kind, &subscriber, outcome.is_ok());
            }
        }
    }
}

fn record_outcome(
    inner: &DispatcherInner,
    kind: &'static str,
    subscriber: &Address,
    delivered: bool,
) {
    if delivered {
        inner.delivered.fetch_add(1, Ordering::Relaxed);
        NOTIFICATIONS_DELIVERED.with_label_values(&[kind]).inc();
    } else {
        error!(kind, %subscriber, "listener panicked during notification");
    }
}
