//! Room sessions
//!
//! A [`Room`] is one session against the engine: it issues the connect /
//! disconnect / publish requests, and it is the sink for the engine's
//! room-scoped lifecycle events, which drive the pooled participant,
//! track and publication wrappers and fan out through [`RoomEvents`].
//!
//! All completion side effects (wiring the room handle, materializing
//! participants) run inside the async instruction's completion hook, so
//! a caller that observes a done instruction always sees the fully
//! updated object graph.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use roomlink_engine_core::client::{EngineClient, RoomEventSink};
use roomlink_engine_core::proto::{
    CompletionPayload, ConnectResult, ConnectionState, EngineRequest, EngineResponse, RoomEvent,
    TrackKind, TrackPublishOptions,
};
use roomlink_engine_core::{AsyncInstruction, EngineError, LightHandle, OwnedHandle};

use crate::error::{RoomError, RoomResult};
use crate::events::{ConnectionUpdate, ParticipantUpdate, RoomEvents};
use crate::hub::ParticipantsHub;
use crate::participant::{Origin, Participant, ParticipantFactory};
use crate::publication::{TrackPublication, TrackPublicationFactory};
use crate::speakers::{
    ActiveSpeakers, DefaultActiveSpeakers, MutableActiveSpeakers, NoActiveSpeakers,
};
use crate::track::{Track, TracksFactory};

/// Options for joining a room.
#[derive(Debug, Clone)]
pub struct RoomOptions {
    /// Automatically subscribe to remote publications
    pub auto_subscribe: bool,
    /// Track the active speaker set; when false the room exposes the
    /// permanently empty tracker
    pub track_active_speakers: bool,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            auto_subscribe: true,
            track_active_speakers: true,
        }
    }
}

impl RoomOptions {
    /// Disable automatic subscription to remote publications
    pub fn without_auto_subscribe(mut self) -> Self {
        self.auto_subscribe = false;
        self
    }

    /// Disable active speaker tracking
    pub fn without_active_speakers(mut self) -> Self {
        self.track_active_speakers = false;
        self
    }
}

/// The process-wide recycling pools for domain wrappers.
///
/// Explicitly constructed and threaded into each [`Room`] instead of
/// living behind global statics, so lifetime and teardown are plain to
/// see and test. Sharing one instance across rooms shares the recycled
/// storage.
#[derive(Debug, Default)]
pub struct DomainPools {
    participants: ParticipantFactory,
    tracks: TracksFactory,
    publications: TrackPublicationFactory,
}

impl DomainPools {
    /// Create empty pools.
    pub fn new() -> Self {
        Self::default()
    }

    /// The participant factory.
    pub fn participants(&self) -> &ParticipantFactory {
        &self.participants
    }

    /// The track factory.
    pub fn tracks(&self) -> &TracksFactory {
        &self.tracks
    }

    /// The publication factory.
    pub fn publications(&self) -> &TrackPublicationFactory {
        &self.publications
    }
}

struct RoomState {
    sid: String,
    name: String,
    metadata: String,
    connection_state: ConnectionState,
}

/// One room session.
pub struct Room {
    client: Arc<EngineClient>,
    pools: Arc<DomainPools>,
    options: RoomOptions,
    handle: Mutex<Option<OwnedHandle>>,
    state: RwLock<RoomState>,
    participants: ParticipantsHub,
    events: RoomEvents,
    speakers: Arc<dyn MutableActiveSpeakers>,
    speakers_view: Arc<dyn ActiveSpeakers>,
}

/// Adapter the engine client calls with this room's lifecycle events.
/// Holds the room weakly so a dropped room stops routing by itself.
struct RoomSink {
    room: Weak<Room>,
}

impl RoomEventSink for RoomSink {
    fn on_room_event(&self, event: &RoomEvent) {
        if let Some(room) = self.room.upgrade() {
            room.handle_room_event(event);
        }
    }
}

impl Room {
    /// Create a disconnected room bound to `client` and `pools`.
    pub fn new(client: Arc<EngineClient>, pools: Arc<DomainPools>, options: RoomOptions) -> Arc<Self> {
        let (speakers, speakers_view): (Arc<dyn MutableActiveSpeakers>, Arc<dyn ActiveSpeakers>) =
            if options.track_active_speakers {
                let tracker = Arc::new(DefaultActiveSpeakers::new());
                (tracker.clone(), tracker)
            } else {
                let tracker = Arc::new(NoActiveSpeakers);
                (tracker.clone(), tracker)
            };

        Arc::new(Self {
            client,
            pools,
            options,
            handle: Mutex::new(None),
            state: RwLock::new(RoomState {
                sid: String::new(),
                name: String::new(),
                metadata: String::new(),
                connection_state: ConnectionState::Disconnected,
            }),
            participants: ParticipantsHub::new(),
            events: RoomEvents::default(),
            speakers,
            speakers_view,
        })
    }

    /// Session-scoped room id.
    pub fn sid(&self) -> String {
        self.state.read().sid.clone()
    }

    /// Room name.
    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    /// Application-defined room metadata.
    pub fn metadata(&self) -> String {
        self.state.read().metadata.clone()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().connection_state
    }

    /// Whether a session handle is currently held.
    pub fn is_connected(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// The room's notification channels.
    pub fn events(&self) -> &RoomEvents {
        &self.events
    }

    /// The participant registry.
    pub fn participants(&self) -> &ParticipantsHub {
        &self.participants
    }

    /// The active speaker set (permanently empty when tracking is
    /// disabled in [`RoomOptions`]).
    pub fn active_speakers(&self) -> Arc<dyn ActiveSpeakers> {
        Arc::clone(&self.speakers_view)
    }

    /// Connect to a room.
    ///
    /// Returns the pending instruction; on successful completion the
    /// room handle, local participant and pre-existing remote
    /// participants are wired into the object graph before the
    /// instruction reads as done.
    pub fn connect(
        self: &Arc<Self>,
        url: impl Into<String>,
        token: impl Into<String>,
    ) -> RoomResult<AsyncInstruction> {
        if self.is_connected() {
            return Err(RoomError::invalid_state("room is already connected"));
        }

        let response = self.client.send(&EngineRequest::Connect {
            url: url.into(),
            token: token.into(),
            auto_subscribe: self.options.auto_subscribe,
        })?;
        let EngineResponse::Connect { async_id } = response else {
            return Err(EngineError::protocol("unexpected response to Connect").into());
        };

        let room = Arc::clone(self);
        Ok(self
            .client
            .register_instruction_with_hook(async_id, move |event| {
                let CompletionPayload::Connect(result) = &event.payload else {
                    warn!("connect completion carried no connect payload");
                    return;
                };
                room.on_connect(result);
            }))
    }

    fn on_connect(self: &Arc<Self>, result: &ConnectResult) {
        let registry = Arc::clone(self.client.registry());
        let owned = OwnedHandle::acquire(Arc::clone(&registry), result.room.handle);
        let room_handle = owned.raw();

        {
            let mut state = self.state.write();
            state.sid = result.room.info.sid.clone();
            state.name = result.room.info.name.clone();
            state.metadata = result.room.info.metadata.clone();
            state.connection_state = ConnectionState::Connected;
        }

        let local = self.pools.participants().new_participant(
            result.local_participant.info.clone(),
            registry.acquire(result.local_participant.handle),
            Origin::Local,
        );
        self.participants.assign_local(local);

        for entry in &result.participants {
            let participant = self.pools.participants().new_participant(
                entry.participant.info.clone(),
                registry.acquire(entry.participant.handle),
                Origin::Remote,
            );
            for publication in &entry.publications {
                let publication = self.pools.publications().new_publication(
                    Some(registry.acquire(publication.handle)),
                    publication.info.clone(),
                );
                participant.add_publication(publication);
            }
            self.participants.add_remote(participant);
        }

        self.client.attach_room(
            room_handle,
            Arc::new(RoomSink {
                room: Arc::downgrade(self),
            }),
        );
        *self.handle.lock() = Some(owned);

        debug!(room = %self.name(), remotes = self.participants.remote_count(), "room connected");
        self.events
            .connection_state_changed
            .emit(&ConnectionState::Connected);
    }

    /// Disconnect from the room. `Ok(None)` when no session is active.
    ///
    /// On completion every pooled wrapper this session materialized is
    /// recycled and the room handle is released.
    pub fn disconnect(self: &Arc<Self>) -> RoomResult<Option<AsyncInstruction>> {
        let Some(room_handle) = self.handle.lock().as_ref().map(|handle| handle.raw()) else {
            return Ok(None);
        };

        let response = self.client.send(&EngineRequest::Disconnect { room_handle })?;
        let EngineResponse::Disconnect { async_id } = response else {
            return Err(EngineError::protocol("unexpected response to Disconnect").into());
        };

        let room = Arc::clone(self);
        Ok(Some(self.client.register_instruction_with_hook(
            async_id,
            move |_event| room.on_disconnect(),
        )))
    }

    fn on_disconnect(&self) {
        if let Some(owned) = self.handle.lock().take() {
            self.client.detach_room(owned.raw());
            owned.release();
        }

        for participant in self.participants.take_all() {
            self.release_participant(participant);
        }
        self.speakers.clear();

        {
            let mut state = self.state.write();
            state.connection_state = ConnectionState::Disconnected;
        }
        debug!("room disconnected");
        self.events
            .connection_state_changed
            .emit(&ConnectionState::Disconnected);
    }

    /// Create a local track backed by a capture source handle.
    pub fn create_local_track(
        &self,
        name: impl Into<String>,
        kind: TrackKind,
        source: LightHandle,
    ) -> RoomResult<Arc<Track>> {
        let local = self.participants.local_participant()?;
        self.pools
            .tracks()
            .new_local_track(&self.client, name, kind, source, &local)
    }

    /// Publish a local track.
    ///
    /// Local-origin only; the track and participant handles are
    /// validated locally before anything is sent. On successful
    /// completion the new publication is attached to the local
    /// participant, before the instruction reads as done.
    pub fn publish_track(
        self: &Arc<Self>,
        track: &Arc<Track>,
        options: TrackPublishOptions,
    ) -> RoomResult<AsyncInstruction> {
        if track.origin() != Origin::Local {
            return Err(RoomError::wrong_origin("publish_track", "local"));
        }
        let local = self.participants.local_participant()?;
        let local_handle = local.handle();
        if local_handle.is_invalid() {
            return Err(EngineError::invalid_handle("local participant handle is invalid").into());
        }
        let track_handle = track
            .handle()
            .filter(|handle| !handle.is_invalid())
            .ok_or_else(|| EngineError::invalid_handle("track handle is invalid"))?;

        let response = self.client.send(&EngineRequest::PublishTrack {
            local_participant_handle: local_handle.raw(),
            track_handle: track_handle.raw(),
            options,
        })?;
        let EngineResponse::PublishTrack { async_id } = response else {
            return Err(EngineError::protocol("unexpected response to PublishTrack").into());
        };

        let room = Arc::clone(self);
        let track = Arc::clone(track);
        Ok(self
            .client
            .register_instruction_with_hook(async_id, move |event| {
                let CompletionPayload::PublishTrack { publication } = &event.payload else {
                    warn!("publish completion carried no publication payload");
                    return;
                };
                let Ok(local) = room.participants.local_participant() else {
                    warn!("publish completed without a local participant");
                    return;
                };
                let publication = room.pools.publications().new_publication(
                    Some(room.client.registry().acquire(publication.handle)),
                    publication.info.clone(),
                );
                publication.update_track(Arc::clone(&track));
                local.add_publication(publication);
            }))
    }

    /// Withdraw a local publication.
    pub fn unpublish_track(
        &self,
        publication_sid: &str,
        stop_on_unpublish: bool,
    ) -> RoomResult<AsyncInstruction> {
        let local = self.participants.local_participant()?;
        if local.publication(publication_sid).is_none() {
            return Err(RoomError::publication_not_found(publication_sid));
        }
        let local_handle = local.handle();
        if local_handle.is_invalid() {
            return Err(EngineError::invalid_handle("local participant handle is invalid").into());
        }

        let response = self.client.send(&EngineRequest::UnpublishTrack {
            local_participant_handle: local_handle.raw(),
            track_sid: publication_sid.to_string(),
            stop_on_unpublish,
        })?;
        let EngineResponse::UnpublishTrack { async_id } = response else {
            return Err(EngineError::protocol("unexpected response to UnpublishTrack").into());
        };
        Ok(self.client.register_instruction(async_id))
    }

    /// Replace the local participant's metadata. Applied eagerly on this
    /// side; the engine acknowledges asynchronously.
    pub fn set_local_metadata(&self, metadata: impl Into<String>) -> RoomResult<AsyncInstruction> {
        let local = self.participants.local_participant()?;
        let metadata = metadata.into();

        let response = self.client.send(&EngineRequest::SetLocalMetadata {
            local_participant_handle: local.handle().raw(),
            metadata: metadata.clone(),
        })?;
        let EngineResponse::SetLocalMetadata { async_id } = response else {
            return Err(EngineError::protocol("unexpected response to SetLocalMetadata").into());
        };
        local.update_metadata(metadata);
        Ok(self.client.register_instruction(async_id))
    }

    /// Replace the local participant's display name. Applied eagerly on
    /// this side; the engine acknowledges asynchronously.
    pub fn set_local_name(&self, name: impl Into<String>) -> RoomResult<AsyncInstruction> {
        let local = self.participants.local_participant()?;
        let name = name.into();

        let response = self.client.send(&EngineRequest::SetLocalName {
            local_participant_handle: local.handle().raw(),
            name: name.clone(),
        })?;
        let EngineResponse::SetLocalName { async_id } = response else {
            return Err(EngineError::protocol("unexpected response to SetLocalName").into());
        };
        local.update_name(name);
        Ok(self.client.register_instruction(async_id))
    }

    // -----------------------------------------------------------------
    // Engine event routing
    // -----------------------------------------------------------------

    fn handle_room_event(self: &Arc<Self>, event: &RoomEvent) {
        match event {
            RoomEvent::ParticipantConnected { participant } => {
                let remote = self.pools.participants().new_participant(
                    participant.info.clone(),
                    self.client.registry().acquire(participant.handle),
                    Origin::Remote,
                );
                self.participants.add_remote(Arc::clone(&remote));
                self.events
                    .participant_updated
                    .emit(&(remote, ParticipantUpdate::Connected));
            }
            RoomEvent::ParticipantDisconnected { participant_identity } => {
                let Some(remote) = self.participants.remove_remote(participant_identity) else {
                    debug!(identity = %participant_identity, "disconnect for unknown participant");
                    return;
                };
                self.events
                    .participant_updated
                    .emit(&(Arc::clone(&remote), ParticipantUpdate::Disconnected));
                self.release_participant(remote);
            }
            RoomEvent::LocalTrackPublished { publication_sid } => {
                let Ok(local) = self.participants.local_participant() else {
                    return;
                };
                match local.publication(publication_sid) {
                    Some(publication) => {
                        self.events
                            .local_track_published
                            .emit(&(publication, local));
                    }
                    None => {
                        debug!(sid = %publication_sid, "no local publication found after publish");
                    }
                }
            }
            RoomEvent::LocalTrackUnpublished { publication_sid } => {
                let Ok(local) = self.participants.local_participant() else {
                    return;
                };
                match local.remove_publication(publication_sid) {
                    Some(publication) => {
                        self.events
                            .local_track_unpublished
                            .emit(&(Arc::clone(&publication), local));
                        // The local track wrapper stays with its owner;
                        // only the publication is recycled.
                        publication.remove_track();
                        self.release_publication(publication);
                    }
                    None => {
                        debug!(sid = %publication_sid, "no local publication found after unpublish");
                    }
                }
            }
            RoomEvent::TrackPublished {
                participant_identity,
                publication,
            } => {
                let Ok(remote) = self.participants.remote_ensured(participant_identity) else {
                    debug!(identity = %participant_identity, "publish from unknown participant");
                    return;
                };
                let publication = self.pools.publications().new_publication(
                    Some(self.client.registry().acquire(publication.handle)),
                    publication.info.clone(),
                );
                remote.add_publication(Arc::clone(&publication));
                self.events.track_published.emit(&(publication, remote));
            }
            RoomEvent::TrackUnpublished {
                participant_identity,
                publication_sid,
            } => {
                let Ok(remote) = self.participants.remote_ensured(participant_identity) else {
                    return;
                };
                let Some(publication) = remote.remove_publication(publication_sid) else {
                    debug!(sid = %publication_sid, "unpublish for unknown publication");
                    return;
                };
                self.events
                    .track_unpublished
                    .emit(&(Arc::clone(&publication), remote));
                self.release_publication(publication);
            }
            RoomEvent::TrackSubscribed {
                participant_identity,
                track,
            } => {
                let Ok(remote) = self.participants.remote_ensured(participant_identity) else {
                    return;
                };
                let Some(publication) = remote.publication(&track.info.sid) else {
                    debug!(sid = %track.info.sid, "subscribed to unknown publication");
                    return;
                };
                let track = self.pools.tracks().new_track(
                    Some(self.client.registry().acquire(track.handle)),
                    track.info.clone(),
                    &remote,
                );
                publication.update_track(Arc::clone(&track));
                self.events
                    .track_subscribed
                    .emit(&(track, publication, remote));
            }
            RoomEvent::TrackUnsubscribed {
                participant_identity,
                track_sid,
            } => {
                let Ok(remote) = self.participants.participant_ensured(participant_identity) else {
                    return;
                };
                let Some(publication) = remote.publication(track_sid) else {
                    return;
                };
                let Some(track) = publication.remove_track() else {
                    return;
                };
                self.events
                    .track_unsubscribed
                    .emit(&(Arc::clone(&track), publication, remote));
                self.release_track(track);
            }
            RoomEvent::TrackMuted {
                participant_identity,
                track_sid,
            } => {
                self.apply_mute(participant_identity, track_sid, true);
            }
            RoomEvent::TrackUnmuted {
                participant_identity,
                track_sid,
            } => {
                self.apply_mute(participant_identity, track_sid, false);
            }
            RoomEvent::ActiveSpeakersChanged {
                participant_identities,
            } => {
                self.speakers.update_current(participant_identities.clone());
            }
            RoomEvent::RoomMetadataChanged { metadata } => {
                self.state.write().metadata = metadata.clone();
                self.events.room_metadata_changed.emit(metadata);
            }
            RoomEvent::RoomSidChanged { sid } => {
                self.state.write().sid = sid.clone();
                self.events.room_sid_changed.emit(sid);
            }
            RoomEvent::ParticipantMetadataChanged {
                participant_identity,
                metadata,
            } => {
                let Ok(participant) = self.participants.participant_ensured(participant_identity)
                else {
                    return;
                };
                participant.update_metadata(metadata.clone());
                self.events
                    .participant_updated
                    .emit(&(participant, ParticipantUpdate::MetadataChanged));
            }
            RoomEvent::ParticipantNameChanged {
                participant_identity,
                name,
            } => {
                let Ok(participant) = self.participants.participant_ensured(participant_identity)
                else {
                    return;
                };
                participant.update_name(name.clone());
                self.events
                    .participant_updated
                    .emit(&(participant, ParticipantUpdate::NameChanged));
            }
            RoomEvent::ConnectionQualityChanged {
                participant_identity,
                quality,
            } => {
                let Ok(participant) = self.participants.participant_ensured(participant_identity)
                else {
                    return;
                };
                participant.update_quality(*quality);
                self.events
                    .connection_quality_changed
                    .emit(&(participant, *quality));
            }
            RoomEvent::ConnectionStateChanged { state } => {
                self.state.write().connection_state = *state;
                self.events.connection_state_changed.emit(state);
            }
            RoomEvent::Reconnecting => {
                self.events
                    .connection_updated
                    .emit(&ConnectionUpdate::Reconnecting);
            }
            RoomEvent::Reconnected => {
                self.events
                    .connection_updated
                    .emit(&ConnectionUpdate::Reconnected);
            }
            RoomEvent::Disconnected { reason } => {
                self.events
                    .connection_updated
                    .emit(&ConnectionUpdate::Disconnected(*reason));
            }
        }
    }

    fn apply_mute(&self, participant_identity: &str, track_sid: &str, muted: bool) {
        let Ok(participant) = self.participants.participant_ensured(participant_identity) else {
            debug!(identity = %participant_identity, "mute for unknown participant");
            return;
        };
        let Some(publication) = participant.publication(track_sid) else {
            debug!(sid = %track_sid, "mute for unknown publication");
            return;
        };
        publication.update_muted(muted);
        let channel = if muted {
            &self.events.track_muted
        } else {
            &self.events.track_unmuted
        };
        channel.emit(&(publication, participant));
    }

    // -----------------------------------------------------------------
    // Wrapper recycling
    // -----------------------------------------------------------------

    fn release_participant(&self, participant: Arc<Participant>) {
        for publication in participant.publications() {
            participant.remove_publication(&publication.sid());
            self.release_publication(publication);
        }
        self.client.registry().release(&participant.handle());
        self.pools.participants().release(participant);
    }

    fn release_publication(&self, publication: Arc<TrackPublication>) {
        if let Some(track) = publication.remove_track() {
            self.release_track(track);
        }
        if let Some(handle) = publication.handle() {
            self.client.registry().release(&handle);
        }
        self.pools.publications().release(publication);
    }

    fn release_track(&self, track: Arc<Track>) {
        if let Some(handle) = track.handle() {
            self.client.registry().release(&handle);
        }
        self.pools.tracks().release(track);
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name())
            .field("connected", &self.is_connected())
            .field("remotes", &self.participants.remote_count())
            .finish()
    }
}
