//! Fixed-capacity buffer pool.
//!
//! Hands out equally-sized scratch blocks of [`Value`] slots used to
//! stage values for reads, writes, and notifications without per-call
//! heap allocation. All blocks are allocated once at init; afterwards
//! they only cycle between the free stack and their current holder.
//!
//! A checked-out block travels as a [`BufferLease`]. The lease is
//! move-only, so use-after-return and double-return do not compile;
//! returning a lease to a pool that did not issue it is caught by the
//! pool tag and rejected instead of corrupting the freelist.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use common::error::{Error, Result};
use common::types::Value;

/// Source of unique pool tags, one per pool instance.
static NEXT_POOL_TAG: AtomicU32 = AtomicU32::new(1);

/// A buffer checked out of a [`BufferPool`].
///
/// Holds exactly `slot_size` value slots. Contents are scratch: a
/// freshly acquired lease carries whatever the previous holder left.
#[derive(Debug)]
pub struct BufferLease {
    pool_tag: u32,
    slot: u16,
    values: Box<[Value]>,
}

impl BufferLease {
    /// Number of value slots in the block.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the block has no slots. Never the case for leases
    /// issued by a valid pool.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The staged values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Mutable access to the staged values.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    /// Copy `src` into the block starting at slot 0.
    pub fn fill(&mut self, src: &[Value]) -> Result<()> {
        if src.len() > self.values.len() {
            return Err(Error::InvalidArgument {
                reason: "values exceed buffer capacity",
            });
        }
        self.values[..src.len()].copy_from_slice(src);
        Ok(())
    }
}

struct FreeList {
    /// LIFO stack of free blocks with their slot index.
    stack: Vec<(u16, Box<[Value]>)>,
    /// Per-slot checkout state, indexed by slot.
    checked_out: Box<[bool]>,
}

/// Fixed pool of equally-sized value blocks.
///
/// Shared by API callers and the worker thread; only the freelist is
/// locked, block contents belong to the current lease holder.
pub struct BufferPool {
    tag: u32,
    slot_size: usize,
    slot_count: usize,
    free: Mutex<FreeList>,
}

impl BufferPool {
    /// Allocate a pool of `slot_count` blocks of `slot_size` value
    /// slots each.
    pub fn new(slot_size: usize, slot_count: usize) -> Result<Self> {
        if slot_size == 0 || slot_count == 0 {
            return Err(Error::InvalidArgument {
                reason: "buffer pool dimensions must be nonzero",
            });
        }
        if slot_count > u16::MAX as usize {
            return Err(Error::InvalidArgument {
                reason: "buffer pool slot count exceeds index range",
            });
        }

        let stack: Vec<(u16, Box<[Value]>)> = (0..slot_count)
            .map(|slot| {
                (
                    slot as u16,
                    vec![Value::Uint(0); slot_size].into_boxed_slice(),
                )
            })
            .collect();

        Ok(Self {
            tag: NEXT_POOL_TAG.fetch_add(1, Ordering::Relaxed),
            slot_size,
            slot_count,
            free: Mutex::new(FreeList {
                stack,
                checked_out: vec![false; slot_count].into_boxed_slice(),
            }),
        })
    }

    /// Size of each block, in value slots.
    #[inline]
    pub const fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Number of blocks in the pool.
    #[inline]
    pub const fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Number of blocks currently checked out.
    pub fn outstanding(&self) -> usize {
        self.slot_count - self.free.lock().stack.len()
    }

    /// Check a block out of the pool. Non-blocking: an exhausted pool
    /// returns `None`, a transient capacity condition the caller must
    /// treat as retryable.
    pub fn acquire(&self) -> Option<BufferLease> {
        let mut free = self.free.lock();
        let Some((slot, values)) = free.stack.pop() else {
            warn!("no more buffer in the pool");
            return None;
        };
        free.checked_out[slot as usize] = true;
        Some(BufferLease {
            pool_tag: self.tag,
            slot,
            values,
        })
    }

    /// Return a lease to the pool.
    ///
    /// Rejects leases issued by another pool and any return that would
    /// overfill the free stack, leaving the freelist intact.
    pub fn release(&self, lease: BufferLease) -> Result<()> {
        if lease.pool_tag != self.tag || (lease.slot as usize) >= self.slot_count {
            return Err(Error::InvalidArgument {
                reason: "buffer does not belong to this pool",
            });
        }

        let mut free = self.free.lock();
        if !free.checked_out[lease.slot as usize] {
            return Err(Error::InvalidArgument {
                reason: "buffer slot is not checked out",
            });
        }
        if free.stack.len() >= self.slot_count {
            return Err(Error::NoSpace {
                what: "buffer pool free stack",
            });
        }
        free.checked_out[lease.slot as usize] = false;
        free.stack.push((lease.slot, lease.values));
        Ok(())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("slot_size", &self.slot_size)
            .field("slot_count", &self.slot_count)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
