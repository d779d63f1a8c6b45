//! Handle registry - single owner of native handle identity
//!
//! The registry is the only party allowed to mint and release
//! [`NativeHandle`] wrappers. Release is idempotent: exactly one native
//! drop call is issued per distinct acquire that produced a valid handle,
//! and releasing an already-invalid handle is silently absorbed. Wrapper
//! objects are recycled through an internal free list instead of being
//! dropped, since handle churn tracks remote session churn rather than
//! local allocation pressure.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::handle::{LightHandle, NativeHandle};
use crate::transport::EngineTransport;

/// Registry owning native handle identity and wrapper recycling.
///
/// Safe to call from any thread: engine completion callbacks acquire
/// handles on engine-owned threads while application calls release them
/// elsewhere.
pub struct HandleRegistry {
    transport: Arc<dyn EngineTransport>,
    free: Mutex<Vec<Arc<NativeHandle>>>,
}

impl HandleRegistry {
    /// Create a registry that issues native drop calls through `transport`.
    pub fn new(transport: Arc<dyn EngineTransport>) -> Self {
        Self {
            transport,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Take a recycled wrapper (or allocate a fresh one) and bind it to
    /// `raw`.
    pub fn acquire(&self, raw: u64) -> Arc<NativeHandle> {
        let handle = {
            let mut free = self.free.lock();
            free.pop()
                .unwrap_or_else(|| Arc::new(NativeHandle::empty()))
        };
        handle.construct(raw);
        handle
    }

    /// Release the underlying engine resource and re-pool the wrapper.
    ///
    /// No-op when the handle is already invalid; otherwise issues exactly
    /// one native drop call. Stale `Arc` clones held elsewhere observe
    /// `is_invalid() == true` afterward, which is their cue to stop using
    /// the handle.
    pub fn release(&self, handle: &Arc<NativeHandle>) {
        let Some(raw) = handle.take_raw() else {
            return;
        };
        self.transport.drop_handle(raw);
        handle.clear();
        self.free.lock().push(Arc::clone(handle));
    }

    /// Release a value-type handle.
    ///
    /// [`LightHandle`] is `Copy`, so idempotence cannot be tracked in the
    /// value itself: the owning call site must call this exactly once.
    pub fn release_light(&self, handle: LightHandle) {
        if handle.is_invalid() {
            return;
        }
        self.transport.drop_handle(handle.raw());
    }

    /// Number of recycled wrappers currently idle in the free list.
    pub fn idle_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Drain the free list. Part of the defined teardown order: the
    /// registry is explicitly owned process state, not an implicit
    /// static, so shutdown is observable and testable.
    pub fn shutdown(&self) {
        let drained = {
            let mut free = self.free.lock();
            std::mem::take(&mut *free)
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "handle registry drained");
        }
    }
}

/// Scoped owner of a registry handle.
///
/// The drop path performs the release, so a handle owned this way cannot
/// leak on an early return; the registry's idempotent release remains the
/// safety net if a caller also released explicitly.
pub struct OwnedHandle {
    registry: Arc<HandleRegistry>,
    handle: Arc<NativeHandle>,
}

impl OwnedHandle {
    /// Acquire a handle from `registry` and take scoped ownership of it.
    pub fn acquire(registry: Arc<HandleRegistry>, raw: u64) -> Self {
        let handle = registry.acquire(raw);
        Self { registry, handle }
    }

    /// The wrapped handle, for borrowing into domain objects.
    pub fn handle(&self) -> &Arc<NativeHandle> {
        &self.handle
    }

    /// The raw engine value.
    pub fn raw(&self) -> u64 {
        self.handle.raw()
    }

    /// Release ahead of drop. Idempotent.
    pub fn release(&self) {
        self.registry.release(&self.handle);
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        self.registry.release(&self.handle);
    }
}

impl std::fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("raw", &self.handle.raw())
            .finish()
    }
}
