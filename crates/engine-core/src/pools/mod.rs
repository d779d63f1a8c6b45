//! Recycling pools for the engine boundary
//!
//! Two kinds of reuse live here:
//!
//! - [`object::ObjectPool`] recycles wrapper objects whose birth is
//!   driven by engine callbacks (participants joining, tracks appearing)
//!   rather than application allocation.
//! - [`memory::MemoryPool`] recycles the scratch byte buffers every
//!   outbound request is serialized into.
//!
//! Both are throughput optimizations, never capacity limiters: a `get`
//! or `rent` that finds the free set empty allocates fresh storage
//! instead of blocking.

pub mod memory;
pub mod object;
