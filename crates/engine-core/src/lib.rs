//! # roomlink-engine-core
//!
//! Boundary runtime between application code and the out-of-process
//! real-time media engine. The engine owns the media pipeline; this crate
//! owns the seam:
//!
//! - **Handle lifecycle** - opaque native resource handles with
//!   guaranteed single release and wrapper recycling ([`registry`])
//! - **Object pooling** - reusable wrappers for entities whose lifetime
//!   is dictated by engine callbacks, not local allocation ([`pools`])
//! - **Async correlation** - matching fire-and-forget requests with
//!   their eventual completion events ([`correlation`])
//! - **Buffer pooling** - scratch buffers for request serialization
//!   without per-call heap churn ([`pools::memory`])
//! - **The engine client** - request submission and inbound event
//!   routing over a pluggable transport ([`client`])
//!
//! The engine itself is a black box reached only through
//! [`transport::EngineTransport`]: a serialized request goes in, an
//! immediate serialized response comes out, and asynchronous results
//! arrive later on the event callback identified by a correlation id.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roomlink_engine_core::{EngineClient, EngineConfig};
//! use roomlink_engine_core::transport::EngineTransport;
//!
//! fn start(transport: Arc<dyn EngineTransport>) -> anyhow::Result<()> {
//!     let client = EngineClient::new(transport, EngineConfig::default())?;
//!     // hand `client` to the domain layer (roomlink-room-core)
//!     client.dispose();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod correlation;
pub mod error;
pub mod handle;
pub mod logging;
pub mod pools;
pub mod proto;
pub mod registry;
pub mod transport;

// Re-export main types
pub use client::{EngineClient, RoomEventSink};
pub use config::{EngineConfig, MemoryPoolConfig};
pub use correlation::{AsyncInstruction, Correlator};
pub use error::{EngineError, EngineResult};
pub use handle::{LightHandle, NativeHandle, INVALID_HANDLE_RAW, INVALID_HANDLE_SENTINEL};
pub use pools::memory::{MemoryLease, MemoryPool};
pub use pools::object::ObjectPool;
pub use registry::{HandleRegistry, OwnedHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
