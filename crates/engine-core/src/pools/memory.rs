//! Scratch-buffer pool for outbound request serialization
//!
//! Every request crossing the boundary is serialized into a buffer
//! rented here and returned the moment the engine has consumed it. The
//! pool keys its free lists by backing capacity (size class), not by the
//! logical length of any particular rental, so a released buffer can
//! serve any later rental that fits.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::MemoryPoolConfig;

/// Counters exposed for observability and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPoolStats {
    /// Total rentals served
    pub rentals: u64,
    /// Rentals that allocated fresh backing storage
    pub allocations: u64,
    /// Rentals served from recycled storage
    pub reuses: u64,
}

/// Size-classed pool of byte buffers.
pub struct MemoryPool {
    config: MemoryPoolConfig,
    // capacity class -> idle buffers of exactly that capacity
    classes: Mutex<BTreeMap<usize, Vec<Vec<u8>>>>,
    rentals: AtomicU64,
    allocations: AtomicU64,
    reuses: AtomicU64,
}

impl MemoryPool {
    /// Create a pool with the given retention configuration.
    pub fn new(config: MemoryPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            classes: Mutex::new(BTreeMap::new()),
            rentals: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
        })
    }

    /// Create a pool with default configuration.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(MemoryPoolConfig::default())
    }

    fn class_for(&self, byte_size: usize) -> usize {
        byte_size
            .max(self.config.min_class_bytes)
            .next_power_of_two()
    }

    /// Rent a buffer whose usable length is exactly `byte_size`.
    ///
    /// Backing storage may be larger, and may be recycled from a
    /// previous, larger rental. The lease returns the storage to this
    /// pool when dropped, on every exit path.
    pub fn rent(self: &Arc<Self>, byte_size: usize) -> MemoryLease {
        self.rentals.fetch_add(1, Ordering::Relaxed);
        let class = self.class_for(byte_size);

        let recycled = {
            let mut classes = self.classes.lock();
            // Smallest idle capacity that fits; a buffer released at
            // capacity N serves any later rental of size <= N.
            let found = classes
                .range_mut(class..)
                .find(|(_, bufs)| !bufs.is_empty())
                .map(|(_, bufs)| bufs.pop());
            found.flatten()
        };

        let storage = match recycled {
            Some(buf) => {
                self.reuses.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                vec![0u8; class]
            }
        };

        MemoryLease {
            storage: Some(storage),
            len: byte_size,
            pool: Arc::clone(self),
        }
    }

    fn restore(&self, storage: Vec<u8>) {
        let class = storage.len();
        let mut classes = self.classes.lock();
        let bucket = classes.entry(class).or_default();
        if bucket.len() < self.config.max_retained_per_class {
            bucket.push(storage);
        }
        // Over-retention: let the buffer drop.
    }

    /// Number of idle buffers across all size classes.
    pub fn idle_count(&self) -> usize {
        self.classes.lock().values().map(Vec::len).sum()
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> MemoryPoolStats {
        MemoryPoolStats {
            rentals: self.rentals.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
        }
    }

    /// Drop all idle buffers.
    pub fn clear(&self) {
        self.classes.lock().clear();
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("idle", &self.idle_count())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A byte buffer on loan from a [`MemoryPool`].
///
/// Derefs to exactly the requested length; the backing storage goes back
/// to the issuing pool on drop. The buffer must not be touched after the
/// lease ends, which the borrow checker enforces here.
pub struct MemoryLease {
    storage: Option<Vec<u8>>,
    len: usize,
    pool: Arc<MemoryPool>,
}

impl MemoryLease {
    /// Usable length of the lease.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the lease has zero usable bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for MemoryLease {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // storage is Some until drop
        &self.storage.as_ref().unwrap()[..self.len]
    }
}

impl DerefMut for MemoryLease {
    fn deref_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.storage.as_mut().unwrap()[..len]
    }
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.pool.restore(storage);
        }
    }
}

impl std::fmt::Debug for MemoryLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLease").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rental_has_exactly_the_requested_length() {
        let pool = MemoryPool::with_defaults();
        let lease = pool.rent(100);
        assert_eq!(lease.len(), 100);
        assert_eq!(lease.iter().count(), 100);
    }

    #[test]
    fn released_capacity_serves_a_smaller_rental_without_allocation() {
        let pool = MemoryPool::with_defaults();
        let lease = pool.rent(1000);
        drop(lease);
        assert_eq!(pool.stats().allocations, 1);

        // Smaller rental fits in the recycled backing storage.
        let lease = pool.rent(100);
        assert_eq!(lease.len(), 100);
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
    }

    #[test]
    fn larger_rental_allocates_fresh_storage() {
        let pool = MemoryPool::with_defaults();
        drop(pool.rent(64));
        drop(pool.rent(100_000));
        assert_eq!(pool.stats().allocations, 2);
    }

    #[test]
    fn lease_returns_on_every_exit_path() {
        let pool = MemoryPool::with_defaults();
        let attempt = || -> Result<(), &'static str> {
            let mut lease = pool.rent(32);
            lease[0] = 0xff;
            Err("serialization failed")
        };
        assert!(attempt().is_err());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn retention_is_bounded_per_class() {
        let pool = MemoryPool::new(MemoryPoolConfig {
            max_retained_per_class: 2,
            ..Default::default()
        });
        let a = pool.rent(10);
        let b = pool.rent(10);
        let c = pool.rent(10);
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn writes_through_the_lease_are_visible() {
        let pool = MemoryPool::with_defaults();
        let mut lease = pool.rent(4);
        lease.copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&lease[..], &[1, 2, 3, 4]);
    }
}
