//! Scripted in-process engine for integration tests
//!
//! Plays the engine's side of the boundary: answers every submitted
//! request with a canned immediate response (handing out sequential
//! correlation ids), records what was asked, and lets tests push
//! completion and room events through the installed sink exactly the way
//! the native engine would - synchronously, from whatever thread the
//! test chooses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use roomlink_engine_core::proto::{
    self, CompletionEvent, CompletionPayload, ConnectResult, EngineEvent, EngineRequest,
    EngineResponse, OwnedParticipant, OwnedPublication, OwnedRoom, OwnedTrack, ParticipantInfo,
    PublicationInfo, RoomEvent, RoomEventEnvelope, RoomInfo, TrackInfo,
};
use roomlink_engine_core::transport::{EngineEventSink, EngineTransport};
use roomlink_engine_core::EngineResult;

/// Handle value the mock assigns to the room session.
pub const ROOM_HANDLE: u64 = 100;

/// Install a test subscriber so `RUST_LOG` reveals routing decisions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub struct MockEngine {
    sink: Mutex<Option<Arc<dyn EngineEventSink>>>,
    requests: Mutex<Vec<EngineRequest>>,
    dropped: Mutex<Vec<u64>>,
    next_async_id: AtomicU64,
    next_handle: AtomicU64,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sink: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            dropped: Mutex::new(Vec::new()),
            next_async_id: AtomicU64::new(1),
            next_handle: AtomicU64::new(1000),
        })
    }

    fn next_async_id(&self) -> u64 {
        self.next_async_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Requests recorded so far, in submission order.
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().clone()
    }

    /// Raw handle values the client asked us to drop.
    pub fn dropped_handles(&self) -> Vec<u64> {
        self.dropped.lock().clone()
    }

    /// Push a serialized event through the installed sink.
    pub fn emit(&self, event: &EngineEvent) {
        let sink = self.sink.lock().clone().expect("event sink installed");
        let payload = proto::encode_to_vec(event).expect("event encodes");
        sink.on_engine_event(&payload);
    }

    /// Deliver a successful completion for `async_id`.
    pub fn complete(&self, async_id: u64, payload: CompletionPayload) {
        self.emit(&EngineEvent::Completion(CompletionEvent {
            async_id,
            error: String::new(),
            payload,
        }));
    }

    /// Deliver a failed completion for `async_id`.
    pub fn complete_error(&self, async_id: u64, message: &str) {
        self.emit(&EngineEvent::Completion(CompletionEvent {
            async_id,
            error: message.to_string(),
            payload: CompletionPayload::None,
        }));
    }

    /// Deliver a room-scoped lifecycle event.
    pub fn emit_room(&self, room_handle: u64, event: RoomEvent) {
        self.emit(&EngineEvent::Room(RoomEventEnvelope { room_handle, event }));
    }
}

impl EngineTransport for MockEngine {
    fn initialize(&self, sink: Arc<dyn EngineEventSink>) -> EngineResult<()> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn submit(&self, request: &[u8]) -> EngineResult<Vec<u8>> {
        let request: EngineRequest = proto::decode(request)?;
        let response = match &request {
            EngineRequest::Connect { .. } => EngineResponse::Connect {
                async_id: self.next_async_id(),
            },
            EngineRequest::Disconnect { .. } => EngineResponse::Disconnect {
                async_id: self.next_async_id(),
            },
            EngineRequest::PublishTrack { .. } => EngineResponse::PublishTrack {
                async_id: self.next_async_id(),
            },
            EngineRequest::UnpublishTrack { .. } => EngineResponse::UnpublishTrack {
                async_id: self.next_async_id(),
            },
            EngineRequest::CreateLocalTrack { name, kind, .. } => {
                EngineResponse::CreateLocalTrack {
                    track: OwnedTrack {
                        handle: self.next_handle.fetch_add(1, Ordering::SeqCst),
                        info: TrackInfo {
                            sid: format!("TR_{name}"),
                            name: name.clone(),
                            kind: *kind,
                            muted: false,
                            remote: false,
                        },
                    },
                }
            }
            EngineRequest::SetSubscribed { .. } => EngineResponse::SetSubscribed,
            EngineRequest::SetLocalMetadata { .. } => EngineResponse::SetLocalMetadata {
                async_id: self.next_async_id(),
            },
            EngineRequest::SetLocalName { .. } => EngineResponse::SetLocalName {
                async_id: self.next_async_id(),
            },
            EngineRequest::Dispose => EngineResponse::Dispose {
                async_id: self.next_async_id(),
            },
        };
        self.requests.lock().push(request);
        proto::encode_to_vec(&response)
    }

    fn drop_handle(&self, raw: u64) {
        self.dropped.lock().push(raw);
    }
}

// ---------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------

pub fn participant_info(identity: &str) -> ParticipantInfo {
    ParticipantInfo {
        sid: format!("PA_{identity}"),
        identity: identity.to_string(),
        name: identity.to_string(),
        metadata: String::new(),
    }
}

pub fn owned_participant(identity: &str, handle: u64) -> OwnedParticipant {
    OwnedParticipant {
        handle,
        info: participant_info(identity),
    }
}

pub fn remote_publication(sid: &str, handle: u64) -> OwnedPublication {
    OwnedPublication {
        handle,
        info: PublicationInfo {
            sid: sid.to_string(),
            name: format!("{sid}-camera"),
            remote: true,
            ..Default::default()
        },
    }
}

pub fn remote_track(sid: &str, handle: u64) -> OwnedTrack {
    OwnedTrack {
        handle,
        info: TrackInfo {
            sid: sid.to_string(),
            remote: true,
            ..Default::default()
        },
    }
}

/// A connect result with the local participant and no remote peers.
pub fn connect_result() -> ConnectResult {
    ConnectResult {
        room: OwnedRoom {
            handle: ROOM_HANDLE,
            info: RoomInfo {
                sid: "RM_test".to_string(),
                name: "test-room".to_string(),
                metadata: String::new(),
            },
        },
        local_participant: owned_participant("me", 11),
        participants: Vec::new(),
    }
}
