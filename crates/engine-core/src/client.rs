//! The engine client
//!
//! One [`EngineClient`] is the process's connection to the engine. It
//! owns the shared recycling resources (handle registry, scratch-buffer
//! pool, correlation table) as explicitly initialized state with a
//! defined teardown, rather than as implicit statics: construct it once,
//! thread it to whoever needs it, call [`EngineClient::dispose`] on the
//! way out.
//!
//! Outbound: every request is serialized into a rented scratch buffer
//! sized to its exact encoded length, submitted, and the buffer returns
//! to the pool as soon as the engine has consumed it. Inbound: the
//! engine pushes serialized events from its own threads; the client
//! routes completion events to the correlator and room events to the
//! sink registered for that room handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, trace, warn};

use crate::config::EngineConfig;
use crate::correlation::{AsyncInstruction, Correlator};
use crate::error::{EngineError, EngineResult};
use crate::pools::memory::MemoryPool;
use crate::proto::{self, CompletionEvent, EngineEvent, EngineRequest, EngineResponse, RoomEvent};
use crate::registry::HandleRegistry;
use crate::transport::{EngineEventSink, EngineTransport};

/// Receiver for room-scoped entity lifecycle events.
///
/// Implemented by the domain layer; called synchronously on whatever
/// engine thread delivered the event, in engine emission order.
pub trait RoomEventSink: Send + Sync {
    /// Handle one lifecycle event for the room this sink is attached to.
    fn on_room_event(&self, event: &RoomEvent);
}

struct RouterState {
    correlator: Correlator,
    rooms: DashMap<u64, Arc<dyn RoomEventSink>>,
    disposed: AtomicBool,
}

/// The client's half of the engine callback channel.
struct EventRouter {
    state: Arc<RouterState>,
}

impl EngineEventSink for EventRouter {
    fn on_engine_event(&self, payload: &[u8]) {
        if self.state.disposed.load(Ordering::Acquire) {
            return;
        }

        let event: EngineEvent = match proto::decode(payload) {
            Ok(event) => event,
            Err(err) => {
                // Contract violation. This layer translates; it does not
                // repair a misbehaving engine.
                error!(%err, "undecodable engine event, dropping callback");
                return;
            }
        };

        match event {
            EngineEvent::Completion(completion) => {
                self.state.correlator.resolve(&completion);
            }
            EngineEvent::Room(envelope) => {
                match self.state.rooms.get(&envelope.room_handle) {
                    Some(sink) => sink.on_room_event(&envelope.event),
                    None => {
                        debug!(
                            room_handle = envelope.room_handle,
                            "room event for unknown room, dropped"
                        );
                    }
                }
            }
            EngineEvent::Logs { records } => {
                for record in records {
                    debug!(target: "engine", "{record}");
                }
            }
            EngineEvent::Panic { message } => {
                error!("panic received from engine: {message}");
            }
        }
    }
}

/// Client connection to the out-of-process engine.
pub struct EngineClient {
    transport: Arc<dyn EngineTransport>,
    memory: Arc<MemoryPool>,
    registry: Arc<HandleRegistry>,
    state: Arc<RouterState>,
}

impl EngineClient {
    /// Construct the client and install the event sink on the transport.
    /// Events may begin arriving before this returns.
    pub fn new(
        transport: Arc<dyn EngineTransport>,
        config: EngineConfig,
    ) -> EngineResult<Arc<Self>> {
        let state = Arc::new(RouterState {
            correlator: Correlator::new(),
            rooms: DashMap::new(),
            disposed: AtomicBool::new(false),
        });

        transport.initialize(Arc::new(EventRouter {
            state: Arc::clone(&state),
        }))?;
        debug!("engine client initialized");

        Ok(Arc::new(Self {
            memory: MemoryPool::new(config.memory_pool),
            registry: Arc::new(HandleRegistry::new(Arc::clone(&transport))),
            transport,
            state,
        }))
    }

    /// Serialize `request` into a rented scratch buffer, submit it, and
    /// parse the immediate response.
    pub fn send(&self, request: &EngineRequest) -> EngineResult<EngineResponse> {
        if self.is_disposed() {
            return Err(EngineError::Disposed);
        }

        let len = proto::encoded_len(request)?;
        let mut lease = self.memory.rent(len);
        proto::encode_into(&mut lease, request)?;

        let response_bytes = self.transport.submit(&lease)?;
        // The engine has consumed the request; the scratch buffer can go
        // back to the pool before we parse the response.
        drop(lease);

        let response: EngineResponse = proto::decode(&response_bytes)?;
        trace!(?request, ?response, "engine round trip");
        Ok(response)
    }

    /// Register a pending operation against the shared completion stream.
    pub fn register_instruction(&self, async_id: u64) -> AsyncInstruction {
        self.state.correlator.register(async_id)
    }

    /// Register a pending operation whose hook applies completion side
    /// effects before the operation reads as done.
    pub fn register_instruction_with_hook(
        &self,
        async_id: u64,
        hook: impl FnOnce(&CompletionEvent) + Send + Sync + 'static,
    ) -> AsyncInstruction {
        self.state.correlator.register_with_hook(async_id, hook)
    }

    /// Route subsequent events for `room_handle` to `sink`.
    pub fn attach_room(&self, room_handle: u64, sink: Arc<dyn RoomEventSink>) {
        self.state.rooms.insert(room_handle, sink);
    }

    /// Stop routing events for `room_handle`. Events already in flight
    /// for that handle are dropped at the router.
    pub fn detach_room(&self, room_handle: u64) {
        self.state.rooms.remove(&room_handle);
    }

    /// The registry owning native handle identity for this client.
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// The scratch-buffer pool backing request serialization.
    pub fn memory(&self) -> &Arc<MemoryPool> {
        &self.memory
    }

    /// The correlation table. Exposed for observability.
    pub fn correlator(&self) -> &Correlator {
        &self.state.correlator
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }

    /// Tear down: tell the engine to dispose, cancel all pending
    /// operations, and drain the owned pools. Idempotent; the first call
    /// wins and later events are ignored at the router.
    pub fn dispose(&self) {
        // One dispose request per client lifetime.
        let len = proto::encoded_len(&EngineRequest::Dispose).unwrap_or(0);
        if self.state.disposed.swap(true, Ordering::AcqRel) {
            debug!("engine client already disposed");
            return;
        }

        let mut lease = self.memory.rent(len);
        let dispose_sent = proto::encode_into(&mut lease, &EngineRequest::Dispose)
            .and_then(|_| self.transport.submit(&lease));
        drop(lease);
        if let Err(err) = dispose_sent {
            warn!(%err, "dispose request failed, tearing down anyway");
        }

        self.state.correlator.cancel_all();
        self.state.rooms.clear();
        self.registry.shutdown();
        self.memory.clear();
        debug!("engine client disposed");
    }
}

impl std::fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("disposed", &self.is_disposed())
            .field("pending", &self.state.correlator.pending_count())
            .field("rooms", &self.state.rooms.len())
            .finish()
    }
}
