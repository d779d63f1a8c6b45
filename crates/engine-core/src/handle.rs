//! Native handle wrappers
//!
//! A handle is the engine's opaque identifier for a resource it owns. The
//! raw value is a `u64`; zero and the all-bits-set sentinel both mean
//! "invalid". [`NativeHandle`] is the pooled wrapper recycled by the
//! [`crate::registry::HandleRegistry`]; [`LightHandle`] is a `Copy`
//! variant for hot paths where pooling overhead is undesirable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Raw value the engine uses for "no handle"
pub const INVALID_HANDLE_RAW: u64 = 0;

/// Pointer-sized all-bits-set sentinel, also treated as invalid
pub const INVALID_HANDLE_SENTINEL: u64 = u64::MAX;

fn raw_is_invalid(raw: u64) -> bool {
    raw == INVALID_HANDLE_RAW || raw == INVALID_HANDLE_SENTINEL
}

/// Pooled wrapper around an opaque engine resource handle.
///
/// Instances are never destroyed individually once created: the registry
/// `construct`s a recycled wrapper when the engine returns a new raw
/// value and `clear`s it back into the free list on release. Once
/// released, the raw value is gone and [`NativeHandle::is_invalid`] is
/// the authoritative check before any use.
#[derive(Debug)]
pub struct NativeHandle {
    raw: AtomicU64,
    closed: AtomicBool,
}

impl NativeHandle {
    /// Create an empty (invalid) wrapper. Registry-internal; callers
    /// receive constructed handles from [`crate::registry::HandleRegistry::acquire`].
    pub(crate) fn empty() -> Self {
        Self {
            raw: AtomicU64::new(INVALID_HANDLE_RAW),
            closed: AtomicBool::new(false),
        }
    }

    /// Bind this wrapper to a raw engine value.
    pub(crate) fn construct(&self, raw: u64) {
        self.raw.store(raw, Ordering::Release);
        self.closed.store(false, Ordering::Release);
    }

    /// Wipe the wrapper for re-pooling.
    pub(crate) fn clear(&self) {
        self.raw.store(INVALID_HANDLE_RAW, Ordering::Release);
        self.closed.store(false, Ordering::Release);
    }

    /// Atomically take the raw value, leaving the wrapper invalid and
    /// closed. Returns `None` when the handle was already invalid, which
    /// is what makes release idempotent: only one caller ever observes
    /// the live raw value.
    pub(crate) fn take_raw(&self) -> Option<u64> {
        let raw = self.raw.swap(INVALID_HANDLE_RAW, Ordering::AcqRel);
        self.closed.store(true, Ordering::Release);
        if raw_is_invalid(raw) {
            None
        } else {
            Some(raw)
        }
    }

    /// The raw engine value. Only meaningful while `is_invalid()` is
    /// false; encode it into a request immediately, do not cache it.
    pub fn raw(&self) -> u64 {
        self.raw.load(Ordering::Acquire)
    }

    /// Authoritative validity check. True when the wrapper holds no live
    /// engine resource.
    pub fn is_invalid(&self) -> bool {
        raw_is_invalid(self.raw())
    }

    /// Whether this wrapper has been through a release since it was last
    /// constructed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Borrow the raw value as a [`LightHandle`] for request encoding.
    pub fn light(&self) -> LightHandle {
        LightHandle::new(self.raw())
    }
}

/// Value-type handle for hot paths.
///
/// Copied freely, so it carries no shared release semantics: release must
/// happen exactly once across all copies, by convention at the owning
/// call site (via [`crate::registry::HandleRegistry::release_light`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightHandle {
    raw: u64,
}

impl LightHandle {
    /// Wrap a raw engine value.
    pub fn new(raw: u64) -> Self {
        Self { raw }
    }

    /// The raw engine value.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Same validity rule as [`NativeHandle::is_invalid`].
    pub fn is_invalid(&self) -> bool {
        raw_is_invalid(self.raw)
    }
}
