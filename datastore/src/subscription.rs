//! Subscription registry and change notifier.
//!
//! Per-type fixed-capacity subscriber tables. A subscription covers a
//! contiguous id range of one type; registrations live for the process
//! lifetime and are only ever paused/unpaused. Notification copies the
//! subscription's own range of current values into a pooled buffer and
//! invokes the callback with it.
//!
//! Callback identity (fn-pointer equality) is part of the contract:
//! pause/unpause toggles every table entry carrying the same callback,
//! since one callback may be registered for several disjoint ranges.

use thiserror::Error;
use tracing::debug;

use common::consts::MAX_TYPE_SUBSCRIPTIONS;
use common::error::{Error, Result};
use common::types::{DatapointType, Value, TYPE_COUNT};

use crate::model::DataModel;
use crate::pool::BufferPool;

/// Error returned by a subscriber callback. Aborts the remaining
/// dispatch of the current notify pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("code {code}")]
pub struct SubscriberError {
    /// Subscriber-defined status code.
    pub code: i32,
}

/// Subscriber callback. Receives the subscription's own range of
/// current values, staged in a pooled buffer.
///
/// Must be a plain `fn` — the fn-pointer address is the identity used
/// by pause/unpause.
pub type SubscriberFn = fn(&[Value]) -> Result<(), SubscriberError>;

/// Failure during notification dispatch.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Datastore-side failure (pool exhausted, range error).
    #[error(transparent)]
    Store(#[from] Error),
    /// A subscriber callback reported failure.
    #[error("subscriber callback failed: {0}")]
    Subscriber(SubscriberError),
}

/// A registered interest in a contiguous datapoint range of one type.
#[derive(Debug, Clone, Copy)]
pub struct Subscription {
    /// First datapoint id covered.
    pub start_id: u32,
    /// Number of datapoints covered.
    pub count: usize,
    /// Paused subscriptions are skipped by notification.
    pub paused: bool,
    /// Callback invoked with the covered values.
    pub callback: SubscriberFn,
}

impl Subscription {
    /// New active subscription over `[start_id, start_id + count)`.
    pub const fn new(start_id: u32, count: usize, callback: SubscriberFn) -> Self {
        Self {
            start_id,
            count,
            paused: false,
            callback,
        }
    }

    /// True if this subscription's range intersects
    /// `[start, start + count)`.
    fn overlaps(&self, start: u32, count: usize) -> bool {
        let sub_start = self.start_id as usize;
        let sub_end = sub_start + self.count;
        let chg_start = start as usize;
        let chg_end = chg_start + count;
        sub_start < chg_end && chg_start < sub_end
    }
}

/// Log/display name of a type's subscriber table.
const fn table_name(ty: DatapointType) -> &'static str {
    match ty {
        DatapointType::Binary => "binary subscription records",
        DatapointType::Button => "button subscription records",
        DatapointType::Float => "float subscription records",
        DatapointType::Int => "signed integer subscription records",
        DatapointType::MultiState => "multi-state subscription records",
        DatapointType::Uint => "unsigned integer subscription records",
    }
}

/// One type's subscriber table.
///
/// Backed by a capacity-bounded vector; `max` is the configured
/// subscription limit, with one extra storage slot reserved as an
/// append margin.
#[derive(Debug)]
struct SubscriptionTable {
    subs: heapless::Vec<Subscription, MAX_TYPE_SUBSCRIPTIONS>,
    max: usize,
    datapoint_count: usize,
}

/// Per-type subscriber tables plus the notification engine.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    tables: [Option<SubscriptionTable>; TYPE_COUNT],
}

impl SubscriptionRegistry {
    /// Empty registry with no tables allocated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a type's subscriber table for up to `max_count`
    /// subscriptions over `datapoint_count` datapoints.
    ///
    /// Must be called once per type before any `subscribe`.
    pub fn allocate(
        &mut self,
        ty: DatapointType,
        max_count: usize,
        datapoint_count: usize,
    ) -> Result<()> {
        if max_count + 1 > MAX_TYPE_SUBSCRIPTIONS {
            return Err(Error::NoSpace {
                what: "subscriber table capacity",
            });
        }
        let table = &mut self.tables[ty.index()];
        if table.is_some() {
            return Err(Error::InvalidArgument {
                reason: "subscriber table already allocated",
            });
        }
        *table = Some(SubscriptionTable {
            subs: heapless::Vec::new(),
            max: max_count,
            datapoint_count,
        });
        Ok(())
    }

    /// Append a subscription to a type's table.
    pub fn subscribe(&mut self, ty: DatapointType, sub: Subscription) -> Result<()> {
        let table = self.tables[ty.index()].as_mut().ok_or(Error::NotInitialized {
            what: table_name(ty),
        })?;

        if sub.count == 0 {
            return Err(Error::InvalidArgument {
                reason: "subscription count must be nonzero",
            });
        }
        let end = (sub.start_id as usize).checked_add(sub.count);
        if !end.is_some_and(|end| end <= table.datapoint_count) {
            return Err(Error::OutOfRange {
                ty,
                start_id: sub.start_id,
                count: sub.count,
                limit: table.datapoint_count,
            });
        }
        if table.subs.len() >= table.max {
            return Err(Error::NoSpace {
                what: "subscriber table",
            });
        }

        table.subs.push(sub).map_err(|_| Error::NoSpace {
            what: "subscriber table",
        })?;
        debug!(?ty, start_id = sub.start_id, count = sub.count, "subscription added");
        Ok(())
    }

    /// Pause or resume every subscription of a type carrying the given
    /// callback.
    ///
    /// Scans the whole table: the same callback may be registered for
    /// several disjoint ranges, and all of them toggle together.
    pub fn set_paused(
        &mut self,
        ty: DatapointType,
        callback: SubscriberFn,
        paused: bool,
    ) -> Result<()> {
        let table = self.tables[ty.index()].as_mut().ok_or(Error::NotInitialized {
            what: table_name(ty),
        })?;

        let mut found = false;
        for sub in table.subs.iter_mut() {
            if core::ptr::fn_addr_eq(sub.callback, callback) {
                sub.paused = paused;
                found = true;
            }
        }
        if found { Ok(()) } else { Err(Error::NotFound) }
    }

    /// Number of registered subscriptions for a type.
    pub fn active_count(&self, ty: DatapointType) -> usize {
        self.tables[ty.index()]
            .as_ref()
            .map_or(0, |table| table.subs.len())
    }

    /// Dispatch notifications for a changed range of one type.
    ///
    /// Every active, non-paused subscription whose range intersects
    /// `[changed_start, changed_start + changed_count)` receives its
    /// own full range of current values. If the pool runs dry or a
    /// callback fails, the remaining dispatch is aborted;
    /// already-invoked callbacks stand.
    pub fn notify(
        &self,
        ty: DatapointType,
        changed_start: u32,
        changed_count: usize,
        model: &DataModel,
        pool: &BufferPool,
    ) -> Result<(), NotifyError> {
        let Some(table) = self.tables[ty.index()].as_ref() else {
            return Err(NotifyError::Store(Error::NotInitialized {
                what: table_name(ty),
            }));
        };
        for sub in table
            .subs
            .iter()
            .filter(|sub| !sub.paused && sub.overlaps(changed_start, changed_count))
        {
            dispatch(sub, ty, model, pool)?;
        }
        Ok(())
    }

    /// One notification pass over every non-paused subscription of
    /// every allocated type, independent of any write. Run once at
    /// startup so subscribers see the boot-time values.
    pub fn notify_all(
        &self,
        model: &DataModel,
        pool: &BufferPool,
    ) -> Result<(), NotifyError> {
        for ty in DatapointType::ALL {
            let Some(table) = self.tables[ty.index()].as_ref() else {
                continue;
            };
            for sub in table.subs.iter().filter(|sub| !sub.paused) {
                dispatch(sub, ty, model, pool)?;
            }
        }
        Ok(())
    }
}

/// Stage one subscription's range into a pooled buffer and invoke its
/// callback. The buffer is held only for the duration of the copy and
/// the synchronous callback.
fn dispatch(
    sub: &Subscription,
    ty: DatapointType,
    model: &DataModel,
    pool: &BufferPool,
) -> Result<(), NotifyError> {
    let mut lease = pool.acquire().ok_or(Error::NoSpace {
        what: "buffer pool exhausted during notify",
    })?;
    if sub.count > lease.len() {
        let _ = pool.release(lease);
        return Err(NotifyError::Store(Error::InvalidArgument {
            reason: "subscription range exceeds buffer capacity",
        }));
    }

    match model.read(ty, sub.start_id, &mut lease.values_mut()[..sub.count]) {
        Ok(()) => {
            let cb_result = (sub.callback)(&lease.values()[..sub.count]);
            pool.release(lease)?;
            cb_result.map_err(NotifyError::Subscriber)
        }
        Err(e) => {
            let _ = pool.release(lease);
            Err(NotifyError::Store(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::catalog::Catalog;
    use common::types::DatapointFlags;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_model() -> DataModel {
        let mut builder = Catalog::builder();
        for (i, name) in ["F0", "F1", "F2", "F3", "F4", "F5", "F6"].iter().enumerate() {
            builder = builder.datapoint(
                DatapointType::Float,
                name,
                DatapointFlags::empty(),
                Value::Float(i as f32),
            );
        }
        builder = builder.datapoint(
            DatapointType::Uint,
            "U0",
            DatapointFlags::empty(),
            Value::Uint(100),
        );
        DataModel::from_catalog(&builder.build().unwrap())
    }

    fn noop_cb(_values: &[Value]) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn other_cb(_values: &[Value]) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn failing_cb(_values: &[Value]) -> Result<(), SubscriberError> {
        Err(SubscriberError { code: -5 })
    }

    #[test]
    fn subscribe_requires_allocate() {
        let mut registry = SubscriptionRegistry::new();
        let err = registry
            .subscribe(DatapointType::Float, Subscription::new(0, 1, noop_cb))
            .unwrap_err();
        assert!(matches!(err, Error::NotInitialized { .. }));
    }

    #[test]
    fn double_allocate_rejected() {
        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 2, 7).unwrap();
        assert!(registry.allocate(DatapointType::Float, 2, 7).is_err());
    }

    #[test]
    fn allocate_respects_compile_time_bound() {
        let mut registry = SubscriptionRegistry::new();
        let err = registry
            .allocate(DatapointType::Float, MAX_TYPE_SUBSCRIPTIONS, 7)
            .unwrap_err();
        assert!(matches!(err, Error::NoSpace { .. }));
        registry
            .allocate(DatapointType::Float, MAX_TYPE_SUBSCRIPTIONS - 1, 7)
            .unwrap();
    }

    #[test]
    fn table_capacity_enforced() {
        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 2, 7).unwrap();

        registry
            .subscribe(DatapointType::Float, Subscription::new(0, 1, noop_cb))
            .unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(1, 1, noop_cb))
            .unwrap();
        assert_eq!(registry.active_count(DatapointType::Float), 2);

        // The (max + 1)-th registration is rejected.
        let err = registry
            .subscribe(DatapointType::Float, Subscription::new(2, 1, noop_cb))
            .unwrap_err();
        assert!(matches!(err, Error::NoSpace { .. }));
        assert_eq!(registry.active_count(DatapointType::Float), 2);
    }

    #[test]
    fn malformed_subscriptions_rejected() {
        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 4, 7).unwrap();

        assert!(matches!(
            registry.subscribe(DatapointType::Float, Subscription::new(0, 0, noop_cb)),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            registry.subscribe(DatapointType::Float, Subscription::new(5, 3, noop_cb)),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            registry.subscribe(
                DatapointType::Float,
                Subscription::new(u32::MAX, 2, noop_cb)
            ),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn pause_toggles_all_matching_entries() {
        static TWICE: AtomicUsize = AtomicUsize::new(0);
        static BETWEEN: AtomicUsize = AtomicUsize::new(0);
        fn twice_cb(_values: &[Value]) -> Result<(), SubscriberError> {
            TWICE.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn between_cb(_values: &[Value]) -> Result<(), SubscriberError> {
            BETWEEN.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 4, 7).unwrap();

        // Same callback registered for two disjoint ranges, another
        // callback in between.
        registry
            .subscribe(DatapointType::Float, Subscription::new(0, 2, twice_cb))
            .unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(2, 2, between_cb))
            .unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(4, 2, twice_cb))
            .unwrap();

        registry
            .set_paused(DatapointType::Float, twice_cb, true)
            .unwrap();

        let model = test_model();
        let pool = BufferPool::new(8, 2).unwrap();
        // Both twice_cb entries are paused: a sweep only reaches between_cb.
        registry.notify_all(&model, &pool).unwrap();
        assert_eq!(TWICE.load(Ordering::SeqCst), 0);
        assert_eq!(BETWEEN.load(Ordering::SeqCst), 1);

        registry
            .set_paused(DatapointType::Float, twice_cb, false)
            .unwrap();
        registry.notify_all(&model, &pool).unwrap();
        assert_eq!(TWICE.load(Ordering::SeqCst), 2);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn pause_unknown_callback_not_found() {
        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 4, 7).unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(0, 2, noop_cb))
            .unwrap();

        let err = registry
            .set_paused(DatapointType::Float, other_cb, true)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn overlap_matrix() {
        let sub = Subscription::new(2, 3, noop_cb); // covers [2, 5)
        assert!(sub.overlaps(2, 1));
        assert!(sub.overlaps(3, 1));
        assert!(sub.overlaps(4, 1));
        assert!(sub.overlaps(0, 3)); // [0,3) touches 2
        assert!(sub.overlaps(4, 10)); // [4,14) touches 4
        assert!(!sub.overlaps(5, 2)); // [5,7) disjoint
        assert!(!sub.overlaps(0, 2)); // [0,2) disjoint
    }

    #[test]
    fn notify_delivers_subscription_range() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        static RECEIVED: Mutex<Vec<Vec<Value>>> = Mutex::new(Vec::new());
        fn recording_cb(values: &[Value]) -> Result<(), SubscriberError> {
            CALLS.fetch_add(1, Ordering::SeqCst);
            RECEIVED.lock().push(values.to_vec());
            Ok(())
        }

        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 4, 7).unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(2, 3, recording_cb))
            .unwrap();

        let model = test_model();
        let pool = BufferPool::new(8, 2).unwrap();

        // Write confined to id 5 — disjoint from [2,5), no dispatch.
        registry
            .notify(DatapointType::Float, 5, 2, &model, &pool)
            .unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        // Change touching id 3 — the callback receives the whole
        // subscribed range [2,5), not just the changed id.
        registry
            .notify(DatapointType::Float, 3, 1, &model, &pool)
            .unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(
            RECEIVED.lock().pop().unwrap(),
            vec![Value::Float(2.0), Value::Float(3.0), Value::Float(4.0)]
        );
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn notify_skips_paused() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn counted_cb(_values: &[Value]) -> Result<(), SubscriberError> {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 4, 7).unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(0, 2, counted_cb))
            .unwrap();

        let model = test_model();
        let pool = BufferPool::new(8, 2).unwrap();

        registry
            .set_paused(DatapointType::Float, counted_cb, true)
            .unwrap();
        registry
            .notify(DatapointType::Float, 0, 1, &model, &pool)
            .unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        registry
            .set_paused(DatapointType::Float, counted_cb, false)
            .unwrap();
        registry
            .notify(DatapointType::Float, 0, 1, &model, &pool)
            .unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notify_aborts_when_pool_exhausted() {
        static FIRST: AtomicUsize = AtomicUsize::new(0);
        static SECOND: AtomicUsize = AtomicUsize::new(0);
        fn first_cb(_values: &[Value]) -> Result<(), SubscriberError> {
            FIRST.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn second_cb(_values: &[Value]) -> Result<(), SubscriberError> {
            SECOND.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 4, 7).unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(0, 2, first_cb))
            .unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(0, 2, second_cb))
            .unwrap();

        let model = test_model();
        let pool = BufferPool::new(8, 1).unwrap();
        // Hold the only buffer: dispatch cannot even start.
        let held = pool.acquire().unwrap();
        let err = registry
            .notify(DatapointType::Float, 0, 1, &model, &pool)
            .unwrap_err();
        assert!(matches!(err, NotifyError::Store(Error::NoSpace { .. })));
        assert_eq!(FIRST.load(Ordering::SeqCst), 0);
        pool.release(held).unwrap();

        // With a buffer available the pass reaches both subscribers,
        // releasing between dispatches.
        registry
            .notify(DatapointType::Float, 0, 1, &model, &pool)
            .unwrap();
        assert_eq!(FIRST.load(Ordering::SeqCst), 1);
        assert_eq!(SECOND.load(Ordering::SeqCst), 1);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn callback_failure_aborts_remaining_dispatch() {
        static LATER: AtomicUsize = AtomicUsize::new(0);
        fn later_cb(_values: &[Value]) -> Result<(), SubscriberError> {
            LATER.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 4, 7).unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(0, 1, failing_cb))
            .unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(0, 1, later_cb))
            .unwrap();

        let model = test_model();
        let pool = BufferPool::new(8, 2).unwrap();
        let err = registry
            .notify(DatapointType::Float, 0, 1, &model, &pool)
            .unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Subscriber(SubscriberError { code: -5 })
        ));
        assert_eq!(LATER.load(Ordering::SeqCst), 0);
        // The in-flight buffer was still returned.
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn notify_all_sweeps_every_type() {
        static FLOAT_CALLS: AtomicUsize = AtomicUsize::new(0);
        static UINT_CALLS: AtomicUsize = AtomicUsize::new(0);
        static UINT_SEEN: Mutex<Vec<Value>> = Mutex::new(Vec::new());
        fn float_cb(_values: &[Value]) -> Result<(), SubscriberError> {
            FLOAT_CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn uint_cb(values: &[Value]) -> Result<(), SubscriberError> {
            UINT_CALLS.fetch_add(1, Ordering::SeqCst);
            UINT_SEEN.lock().extend_from_slice(values);
            Ok(())
        }

        let mut registry = SubscriptionRegistry::new();
        registry.allocate(DatapointType::Float, 2, 7).unwrap();
        registry.allocate(DatapointType::Uint, 2, 1).unwrap();
        registry
            .subscribe(DatapointType::Float, Subscription::new(0, 3, float_cb))
            .unwrap();
        registry
            .subscribe(DatapointType::Uint, Subscription::new(0, 1, uint_cb))
            .unwrap();

        let model = test_model();
        let pool = BufferPool::new(8, 2).unwrap();
        registry.notify_all(&model, &pool).unwrap();

        assert_eq!(FLOAT_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(UINT_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(*UINT_SEEN.lock(), vec![Value::Uint(100)]);
        assert_eq!(pool.outstanding(), 0);
    }
}
