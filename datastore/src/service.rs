//! Datastore service: the single-writer actor and its request channel.
//!
//! [`Datastore::init`] allocates the subscriber tables and buffer pool,
//! builds the canonical arrays from the catalog, applies the optional
//! NVM restore, and spawns the worker thread. The worker stays parked
//! until [`Datastore::start`] releases it; it then performs the boot
//! notification sweep and drains the bounded request channel forever.
//!
//! Every external read/write becomes a [`Request`] message. The submit
//! is non-blocking — a full channel fails fast with `ResourceBusy` —
//! and a requested response is collected with a bounded wait on a
//! private single-slot channel. Once accepted, a message is always
//! eventually processed, even if its caller times out and walks away.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use common::catalog::Catalog;
use common::consts::{
    DATASTORE_QUEUE_DEPTH, RESPONSE_TIMEOUT, START_TIMEOUT, WORKER_THREAD_NAME,
};
use common::error::{Error, Result};
use common::types::{DatapointFlags, DatapointType, Value, TYPE_COUNT};

use crate::model::DataModel;
use crate::persist::{NoPersistence, PersistenceProvider};
use crate::pool::{BufferLease, BufferPool};
use crate::subscription::{SubscriberFn, Subscription, SubscriptionRegistry};

/// Sizing and scheduling limits supplied to [`Datastore::init`].
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum subscriptions per type, indexed by
    /// [`DatapointType::index`].
    pub max_subs: [usize; TYPE_COUNT],
    /// Worker thread priority (SCHED_FIFO under the `rt` feature).
    pub priority: i32,
    /// Number of blocks in the buffer pool.
    pub pool_slots: usize,
    /// Depth of the bounded request channel.
    pub queue_depth: usize,
}

impl Limits {
    /// Limits with the default queue depth.
    pub const fn new(max_subs: [usize; TYPE_COUNT], priority: i32, pool_slots: usize) -> Self {
        Self {
            max_subs,
            priority,
            pool_slots,
            queue_depth: DATASTORE_QUEUE_DEPTH,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        let max_subs = [8; TYPE_COUNT];
        Self::new(max_subs, 0, suggested_pool_slots(&max_subs))
    }
}

/// Pool size covering the worst-case simultaneous in-flight
/// operations: the largest subscriber table plus one block per
/// queued API call.
pub const fn suggested_pool_slots(max_subs: &[usize; TYPE_COUNT]) -> usize {
    let mut largest = 0;
    let mut i = 0;
    while i < TYPE_COUNT {
        if max_subs[i] > largest {
            largest = max_subs[i];
        }
        i += 1;
    }
    largest + DATASTORE_QUEUE_DEPTH
}

/// A queued read or write.
pub(crate) enum Request {
    Read {
        ty: DatapointType,
        start_id: u32,
        count: usize,
        lease: BufferLease,
        respond_to: SyncSender<Response>,
    },
    Write {
        ty: DatapointType,
        start_id: u32,
        count: usize,
        lease: BufferLease,
        respond_to: Option<SyncSender<Response>>,
    },
}

impl Request {
    fn into_lease(self) -> BufferLease {
        match self {
            Self::Read { lease, .. } | Self::Write { lease, .. } => lease,
        }
    }
}

/// Worker's answer to a request. Reads carry their staged buffer back
/// to the caller; writes only carry the status.
pub(crate) struct Response {
    pub(crate) status: Result<()>,
    pub(crate) lease: Option<BufferLease>,
}

/// Handle to a running datastore.
///
/// Created once by [`Datastore::init`]; all API entry points go
/// through it. Shareable across threads by reference (wrap in `Arc`
/// to share ownership). Dropping the handle closes the request
/// channel and lets the worker drain out.
pub struct Datastore {
    catalog: Arc<Catalog>,
    pool: Arc<BufferPool>,
    registry: Arc<RwLock<SubscriptionRegistry>>,
    tx: SyncSender<Request>,
    start_tx: SyncSender<SyncSender<()>>,
    started: AtomicBool,
}

impl Datastore {
    /// Initialize the datastore with catalog defaults.
    pub fn init(catalog: Catalog, limits: Limits) -> Result<Self> {
        Self::init_with(catalog, limits, &mut NoPersistence)
    }

    /// Initialize the datastore, restoring NVM-flagged datapoints
    /// through the given persistence provider.
    ///
    /// Allocates all per-type subscriber tables and the buffer pool,
    /// then spawns the worker thread. The worker stays parked until
    /// [`start`](Self::start) — register boot subscriptions in
    /// between so the initial notification sweep reaches them.
    pub fn init_with(
        catalog: Catalog,
        limits: Limits,
        persistence: &mut dyn PersistenceProvider,
    ) -> Result<Self> {
        if limits.queue_depth == 0 {
            return Err(Error::InvalidArgument {
                reason: "queue depth must be nonzero",
            });
        }

        let mut registry = SubscriptionRegistry::new();
        for ty in DatapointType::ALL {
            registry.allocate(ty, limits.max_subs[ty.index()], catalog.datapoint_count(ty))?;
        }
        let registry = Arc::new(RwLock::new(registry));

        // Blocks sized for the largest type; the pool dimension comes
        // from in-flight operations, not datapoint counts.
        let slot_size = catalog.max_datapoint_count().max(1);
        let pool = Arc::new(BufferPool::new(slot_size, limits.pool_slots)?);

        let mut model = DataModel::from_catalog(&catalog);
        restore_from_nvm(&catalog, &mut model, persistence);

        let (tx, rx) = mpsc::sync_channel(limits.queue_depth);
        let (start_tx, start_rx) = mpsc::sync_channel(1);

        let worker_registry = Arc::clone(&registry);
        let worker_pool = Arc::clone(&pool);
        let priority = limits.priority;
        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                worker_loop(model, worker_registry, worker_pool, rx, start_rx, priority)
            })
            .map_err(|_| Error::NoSpace {
                what: "worker thread",
            })?;

        info!(catalog = %catalog, pool_slots = limits.pool_slots, "datastore initialized");

        Ok(Self {
            catalog: Arc::new(catalog),
            pool,
            registry,
            tx,
            start_tx,
            started: AtomicBool::new(false),
        })
    }

    /// Release the worker: run the boot notification sweep, then begin
    /// draining the request channel. Idempotent.
    ///
    /// Blocks until the sweep completes so that callers observe the
    /// boot notifications exactly once, before any queued traffic.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.start_tx
            .try_send(ack_tx)
            .map_err(|_| Error::NotInitialized {
                what: "datastore worker",
            })?;
        ack_rx
            .recv_timeout(START_TIMEOUT)
            .map_err(|_| Error::Timeout {
                timeout_ms: START_TIMEOUT.as_millis() as u64,
            })
    }

    /// The static configuration table this datastore was built from.
    #[inline]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The staging buffer pool. Exposed for capacity introspection.
    #[inline]
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    // ─── Subscriptions ──────────────────────────────────────────────

    /// Register a subscription for a type.
    pub fn subscribe(&self, ty: DatapointType, sub: Subscription) -> Result<()> {
        self.registry.write().subscribe(ty, sub)
    }

    /// Pause every subscription of `ty` carrying `callback`.
    pub fn pause(&self, ty: DatapointType, callback: SubscriberFn) -> Result<()> {
        self.registry.write().set_paused(ty, callback, true)
    }

    /// Resume every subscription of `ty` carrying `callback`.
    pub fn unpause(&self, ty: DatapointType, callback: SubscriberFn) -> Result<()> {
        self.registry.write().set_paused(ty, callback, false)
    }

    /// Number of registered subscriptions for a type.
    pub fn subscription_count(&self, ty: DatapointType) -> usize {
        self.registry.read().active_count(ty)
    }

    // ─── Generic read/write ─────────────────────────────────────────

    /// Read `[start_id, start_id + out.len())` of a type into `out`.
    ///
    /// Stages through a pooled buffer, round-trips through the worker,
    /// and blocks (bounded) on the private response channel.
    pub fn read(&self, ty: DatapointType, start_id: u32, out: &mut [Value]) -> Result<()> {
        self.read_marshal(ty, start_id, out, Some)
    }

    /// Write `values` at `[start_id, start_id + values.len())` and
    /// wait for the worker's status.
    pub fn write(&self, ty: DatapointType, start_id: u32, values: &[Value]) -> Result<()> {
        self.write_marshal(ty, start_id, values, core::convert::identity, true)
    }

    /// Fire-and-forget write: returns once the message is accepted by
    /// the channel. Validation failures past that point are only
    /// logged by the worker.
    pub fn post(&self, ty: DatapointType, start_id: u32, values: &[Value]) -> Result<()> {
        self.write_marshal(ty, start_id, values, core::convert::identity, false)
    }

    pub(crate) fn acquire_lease(&self, count: usize) -> Result<BufferLease> {
        let lease = self.pool.acquire().ok_or(Error::NoSpace {
            what: "buffer pool",
        })?;
        if count > lease.len() {
            let _ = self.pool.release(lease);
            return Err(Error::InvalidArgument {
                reason: "count exceeds staging buffer capacity",
            });
        }
        Ok(lease)
    }

    /// Non-blocking enqueue. A full channel fails fast with
    /// `ResourceBusy`; the staged buffer goes back to the pool either
    /// way on failure.
    pub(crate) fn submit(&self, request: Request) -> Result<()> {
        match self.tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(request)) => {
                let _ = self.pool.release(request.into_lease());
                Err(Error::ResourceBusy)
            }
            Err(TrySendError::Disconnected(request)) => {
                let _ = self.pool.release(request.into_lease());
                Err(Error::NotInitialized {
                    what: "datastore worker",
                })
            }
        }
    }

    pub(crate) fn await_response(&self, resp_rx: &Receiver<Response>) -> Result<Response> {
        resp_rx.recv_timeout(RESPONSE_TIMEOUT).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::Timeout {
                timeout_ms: RESPONSE_TIMEOUT.as_millis() as u64,
            },
            RecvTimeoutError::Disconnected => Error::NotInitialized {
                what: "datastore worker",
            },
        })
    }
}

/// Offer every NVM-flagged datapoint to the persistence provider and
/// apply the returned replacements.
fn restore_from_nvm(
    catalog: &Catalog,
    model: &mut DataModel,
    provider: &mut dyn PersistenceProvider,
) {
    for ty in DatapointType::ALL {
        for (id, spec) in catalog.specs(ty).iter().enumerate() {
            if !spec.flags.contains(DatapointFlags::NVM) {
                continue;
            }
            let id = id as u32;
            if let Some(value) = provider.restore(ty, id, &spec.name, spec.default) {
                // Tag mismatches are logged and dropped by the model.
                let _ = model.restore_value(ty, id, value);
            }
        }
    }
}

/// The worker: parks until started, runs the boot sweep, then drains
/// the request channel until every sender is gone.
fn worker_loop(
    mut model: DataModel,
    registry: Arc<RwLock<SubscriptionRegistry>>,
    pool: Arc<BufferPool>,
    rx: Receiver<Request>,
    start_rx: Receiver<SyncSender<()>>,
    priority: i32,
) {
    apply_worker_priority(priority);

    let ack = match start_rx.recv() {
        Ok(ack) => ack,
        Err(_) => {
            debug!("datastore dropped before start");
            return;
        }
    };

    if let Err(e) = registry.read().notify_all(&model, &pool) {
        error!("unable to make initial notifications: {e}");
    }
    let _ = ack.try_send(());

    loop {
        let request = match rx.recv() {
            Ok(request) => request,
            Err(_) => break,
        };
        handle_request(request, &mut model, &registry, &pool);
    }
    debug!("datastore worker exiting");
}

fn handle_request(
    request: Request,
    model: &mut DataModel,
    registry: &RwLock<SubscriptionRegistry>,
    pool: &BufferPool,
) {
    match request {
        Request::Read {
            ty,
            start_id,
            count,
            mut lease,
            respond_to,
        } => {
            let status = if count > lease.len() {
                Err(Error::InvalidArgument {
                    reason: "count exceeds staging buffer capacity",
                })
            } else {
                model.read(ty, start_id, &mut lease.values_mut()[..count])
            };
            post_response(
                &respond_to,
                Response {
                    status,
                    lease: Some(lease),
                },
                pool,
            );
        }
        Request::Write {
            ty,
            start_id,
            count,
            lease,
            respond_to,
        } => {
            let status = if count > lease.len() {
                Err(Error::InvalidArgument {
                    reason: "count exceeds staging buffer capacity",
                })
            } else {
                model.write(ty, start_id, &lease.values()[..count])
            };
            let status = match status {
                Ok(changed) => {
                    if changed {
                        // Dispatch failures must not take the worker
                        // down; already-invoked callbacks stand.
                        if let Err(e) = registry.read().notify(ty, start_id, count, model, pool) {
                            error!(?ty, start_id, count, "notification dispatch failed: {e}");
                        }
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            };
            if let Err(e) = pool.release(lease) {
                error!("unable to return write buffer: {e}");
            }
            if let Some(respond_to) = respond_to {
                post_response(
                    &respond_to,
                    Response {
                        status,
                        lease: None,
                    },
                    pool,
                );
            }
        }
    }
}

/// Post a response; if the caller already timed out and dropped its
/// receiver, reclaim any buffer riding along.
fn post_response(respond_to: &SyncSender<Response>, response: Response, pool: &BufferPool) {
    if let Err(err) = respond_to.try_send(response) {
        warn!("response dropped, caller is gone");
        let response = match err {
            TrySendError::Full(response) | TrySendError::Disconnected(response) => response,
        };
        if let Some(lease) = response.lease {
            let _ = pool.release(lease);
        }
    }
}

#[cfg(feature = "rt")]
fn apply_worker_priority(priority: i32) {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        warn!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(feature = "rt"))]
fn apply_worker_priority(_priority: i32) {}
