//! Generic recycling pool for callback-born wrapper objects

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Counters exposed for observability and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPoolStats {
    /// Total `get` calls served
    pub gets: u64,
    /// Total `release` calls accepted
    pub releases: u64,
    /// `get` calls that had to allocate because the free set was empty
    pub allocations: u64,
}

/// A recycling pool of `T`.
///
/// `get` never blocks waiting for a freed instance; when the free set is
/// empty it allocates through the create function. `release` runs the
/// optional reset hook and returns the instance to the free set. The free
/// set is lock-protected so engine callback threads can return objects
/// while application threads request new ones.
pub struct ObjectPool<T> {
    create: Box<dyn Fn() -> T + Send + Sync>,
    reset: Option<Box<dyn Fn(&T) + Send + Sync>>,
    free: Mutex<Vec<T>>,
    gets: AtomicU64,
    releases: AtomicU64,
    allocations: AtomicU64,
}

impl<T> ObjectPool<T> {
    /// Create a pool with the given allocation function.
    pub fn new(create: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            create: Box::new(create),
            reset: None,
            free: Mutex::new(Vec::new()),
            gets: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
        }
    }

    /// Create a pool whose `release` runs `reset` before re-pooling.
    pub fn with_reset(
        create: impl Fn() -> T + Send + Sync + 'static,
        reset: impl Fn(&T) + Send + Sync + 'static,
    ) -> Self {
        let mut pool = Self::new(create);
        pool.reset = Some(Box::new(reset));
        pool
    }

    /// Take a recycled instance, or allocate a fresh one if none is idle.
    pub fn get(&self) -> T {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(instance) = self.free.lock().pop() {
            return instance;
        }
        self.allocations.fetch_add(1, Ordering::Relaxed);
        (self.create)()
    }

    /// Return an instance to the free set.
    pub fn release(&self, instance: T) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        if let Some(reset) = &self.reset {
            reset(&instance);
        }
        self.free.lock().push(instance);
    }

    /// Number of idle instances currently pooled.
    pub fn idle_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> ObjectPoolStats {
        ObjectPoolStats {
            gets: self.gets.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
        }
    }

    /// Drop all idle instances.
    pub fn clear(&self) {
        self.free.lock().clear();
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle", &self.idle_count())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn get_after_release_reuses_the_same_instance() {
        let pool = ObjectPool::new(|| Arc::new(5u32));
        let first = pool.get();
        pool.release(Arc::clone(&first));
        assert_eq!(pool.idle_count(), 1);

        let second = pool.get();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.stats().allocations, 1);
    }

    #[test]
    fn empty_free_set_allocates_instead_of_blocking() {
        let pool = ObjectPool::new(String::new);
        let _a = pool.get();
        let _b = pool.get();
        let stats = pool.stats();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.allocations, 2);
    }

    #[test]
    fn reset_hook_runs_on_release() {
        let pool = ObjectPool::with_reset(
            || Arc::new(Mutex::new(vec![1, 2, 3])),
            |cell: &Arc<Mutex<Vec<i32>>>| cell.lock().clear(),
        );
        let item = pool.get();
        pool.release(Arc::clone(&item));
        assert!(item.lock().is_empty());
    }

    #[test]
    fn concurrent_get_and_release_keep_the_free_set_consistent() {
        let pool = Arc::new(ObjectPool::new(|| Box::new(0u64)));
        let mut workers = Vec::new();
        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            workers.push(std::thread::spawn(move || {
                for _ in 0..250 {
                    let item = pool.get();
                    pool.release(item);
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.gets, 1000);
        assert_eq!(stats.releases, 1000);
        assert_eq!(pool.idle_count() as u64, stats.allocations);
    }
}
