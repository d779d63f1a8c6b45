//! The transport seam to the black-box engine
//!
//! Everything this runtime knows about the engine fits in two traits: a
//! way to hand over serialized requests and get immediate responses, and
//! a callback the engine drives with serialized events from its own
//! threads. Production wires these to the native library; tests script
//! them.

use std::sync::Arc;

use crate::error::EngineResult;

/// Receiver for serialized events pushed by the engine.
///
/// Called from engine-owned threads, potentially several at once. The
/// sink must not assume any particular calling thread.
pub trait EngineEventSink: Send + Sync {
    /// Handle one serialized [`crate::proto::EngineEvent`].
    fn on_engine_event(&self, payload: &[u8]);
}

/// Low-level call surface of the engine.
pub trait EngineTransport: Send + Sync {
    /// Install the event sink. Must be called once before any `submit`;
    /// events may start arriving as soon as this returns.
    fn initialize(&self, sink: Arc<dyn EngineEventSink>) -> EngineResult<()>;

    /// Submit one serialized [`crate::proto::EngineRequest`] and return
    /// the serialized immediate [`crate::proto::EngineResponse`]. The
    /// request buffer is only borrowed for the duration of the call; the
    /// engine copies what it needs.
    fn submit(&self, request: &[u8]) -> EngineResult<Vec<u8>>;

    /// Tell the engine to drop the resource behind `raw`. Infallible by
    /// contract: the engine absorbs drops of ids it no longer knows.
    fn drop_handle(&self, raw: u64);
}
