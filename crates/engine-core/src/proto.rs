//! Wire surface exchanged with the engine
//!
//! The engine speaks serialized messages: a request goes down with every
//! call, an immediate response comes back, and asynchronous results
//! arrive later as events on the callback channel. Completion events
//! answer a specific request by correlation id; room events report
//! entity lifecycle changes nobody asked for. The encoding is bincode
//! over these serde types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

// ---------------------------------------------------------------------
// Metadata snapshots
// ---------------------------------------------------------------------

/// Engine-reported participant metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// Session-scoped id assigned by the engine
    pub sid: String,
    /// Stable identity of the participant
    pub identity: String,
    /// Display name
    pub name: String,
    /// Application-defined metadata blob
    pub metadata: String,
}

/// Media kind of a track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    #[default]
    Audio,
    Video,
}

/// Capture source of a track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackSource {
    #[default]
    Unknown,
    Camera,
    Microphone,
    ScreenShare,
    ScreenShareAudio,
}

/// Engine-reported track metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub sid: String,
    pub name: String,
    pub kind: TrackKind,
    pub muted: bool,
    /// True when the track originates from a remote participant
    pub remote: bool,
}

/// Engine-reported track publication metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationInfo {
    pub sid: String,
    pub name: String,
    pub kind: TrackKind,
    pub source: TrackSource,
    pub simulcasted: bool,
    /// Video width in pixels, zero for audio
    pub width: u32,
    /// Video height in pixels, zero for audio
    pub height: u32,
    pub mime_type: String,
    pub muted: bool,
    pub remote: bool,
}

/// Engine-reported room metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub sid: String,
    pub name: String,
    pub metadata: String,
}

/// Connection state of a room session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    Reconnecting,
}

/// Engine's estimate of a participant's connection quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionQuality {
    Poor,
    #[default]
    Good,
    Excellent,
    Lost,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    #[default]
    Unknown,
    ClientInitiated,
    DuplicateIdentity,
    ServerShutdown,
    ParticipantRemoved,
    RoomDeleted,
    JoinFailure,
}

// ---------------------------------------------------------------------
// Owned payloads: a freshly minted engine handle plus its metadata
// ---------------------------------------------------------------------

/// A new room handle with its metadata snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnedRoom {
    pub handle: u64,
    pub info: RoomInfo,
}

/// A new participant handle with its metadata snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnedParticipant {
    pub handle: u64,
    pub info: ParticipantInfo,
}

/// A new track handle with its metadata snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnedTrack {
    pub handle: u64,
    pub info: TrackInfo,
}

/// A new publication handle with its metadata snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnedPublication {
    pub handle: u64,
    pub info: PublicationInfo,
}

/// A participant together with everything they had already published
/// before we joined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantWithTracks {
    pub participant: OwnedParticipant,
    pub publications: Vec<OwnedPublication>,
}

// ---------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------

/// Options for publishing a local track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackPublishOptions {
    pub source: TrackSource,
    pub simulcast: bool,
    /// Discontinuous transmission for audio
    pub dtx: bool,
}

/// Outbound request to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineRequest {
    Connect {
        url: String,
        token: String,
        auto_subscribe: bool,
    },
    Disconnect {
        room_handle: u64,
    },
    PublishTrack {
        local_participant_handle: u64,
        track_handle: u64,
        options: TrackPublishOptions,
    },
    UnpublishTrack {
        local_participant_handle: u64,
        track_sid: String,
        stop_on_unpublish: bool,
    },
    CreateLocalTrack {
        name: String,
        kind: TrackKind,
        source_handle: u64,
    },
    SetSubscribed {
        publication_handle: u64,
        subscribe: bool,
    },
    SetLocalMetadata {
        local_participant_handle: u64,
        metadata: String,
    },
    SetLocalName {
        local_participant_handle: u64,
        name: String,
    },
    Dispose,
}

/// Immediate response to an [`EngineRequest`].
///
/// Asynchronous calls only acknowledge the correlation id here; the real
/// result arrives later as a [`CompletionEvent`] carrying the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineResponse {
    Connect { async_id: u64 },
    Disconnect { async_id: u64 },
    PublishTrack { async_id: u64 },
    UnpublishTrack { async_id: u64 },
    CreateLocalTrack { track: OwnedTrack },
    SetSubscribed,
    SetLocalMetadata { async_id: u64 },
    SetLocalName { async_id: u64 },
    Dispose { async_id: u64 },
}

// ---------------------------------------------------------------------
// Completion events
// ---------------------------------------------------------------------

/// Payload delivered with a successful completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum CompletionPayload {
    /// Error completions carry no payload
    #[default]
    None,
    Connect(ConnectResult),
    Disconnect,
    PublishTrack {
        publication: OwnedPublication,
    },
    UnpublishTrack,
    SetLocalMetadata,
    SetLocalName,
    Dispose,
}

/// Result payload of a successful connect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectResult {
    pub room: OwnedRoom,
    pub local_participant: OwnedParticipant,
    pub participants: Vec<ParticipantWithTracks>,
}

/// Asynchronous answer to a previously issued request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    /// Correlation id this event answers
    pub async_id: u64,
    /// Empty text means success
    pub error: String,
    pub payload: CompletionPayload,
}

impl CompletionEvent {
    /// Whether the engine reported a failure for this operation.
    pub fn is_error(&self) -> bool {
        !self.error.trim().is_empty()
    }

    /// The error text, when present.
    pub fn error_message(&self) -> Option<&str> {
        if self.is_error() {
            Some(self.error.as_str())
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------
// Room events
// ---------------------------------------------------------------------

/// Entity lifecycle notification scoped to one room session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoomEvent {
    ParticipantConnected {
        participant: OwnedParticipant,
    },
    ParticipantDisconnected {
        participant_identity: String,
    },
    LocalTrackPublished {
        publication_sid: String,
    },
    LocalTrackUnpublished {
        publication_sid: String,
    },
    TrackPublished {
        participant_identity: String,
        publication: OwnedPublication,
    },
    TrackUnpublished {
        participant_identity: String,
        publication_sid: String,
    },
    TrackSubscribed {
        participant_identity: String,
        track: OwnedTrack,
    },
    TrackUnsubscribed {
        participant_identity: String,
        track_sid: String,
    },
    TrackMuted {
        participant_identity: String,
        track_sid: String,
    },
    TrackUnmuted {
        participant_identity: String,
        track_sid: String,
    },
    ActiveSpeakersChanged {
        participant_identities: Vec<String>,
    },
    RoomMetadataChanged {
        metadata: String,
    },
    RoomSidChanged {
        sid: String,
    },
    ParticipantMetadataChanged {
        participant_identity: String,
        metadata: String,
    },
    ParticipantNameChanged {
        participant_identity: String,
        name: String,
    },
    ConnectionQualityChanged {
        participant_identity: String,
        quality: ConnectionQuality,
    },
    ConnectionStateChanged {
        state: ConnectionState,
    },
    Reconnecting,
    Reconnected,
    Disconnected {
        reason: DisconnectReason,
    },
}

/// A [`RoomEvent`] tagged with the room session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEventEnvelope {
    pub room_handle: u64,
    pub event: RoomEvent,
}

/// Any inbound message on the engine's callback channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    Completion(CompletionEvent),
    Room(RoomEventEnvelope),
    /// Forwarded engine log records, present when log capture is enabled
    Logs { records: Vec<String> },
    /// The engine hit an unrecoverable internal error
    Panic { message: String },
}

// ---------------------------------------------------------------------
// Codec helpers
// ---------------------------------------------------------------------

/// Exact encoded length of `value`, used to size buffer rentals.
pub fn encoded_len<T: Serialize>(value: &T) -> EngineResult<usize> {
    Ok(bincode::serialized_size(value)? as usize)
}

/// Encode `value` into `buf`, which must be exactly `encoded_len` bytes.
pub fn encode_into<T: Serialize>(buf: &mut [u8], value: &T) -> EngineResult<()> {
    bincode::serialize_into(buf, value)?;
    Ok(())
}

/// Decode a message received from the engine.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> EngineResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Encode a message into a fresh vector. Event emission helper for
/// transports; request encoding goes through the buffer pool instead.
pub fn encode_to_vec<T: Serialize>(value: &T) -> EngineResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}
