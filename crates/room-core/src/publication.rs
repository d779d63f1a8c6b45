//! Pooled track publication wrapper and factory

use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use roomlink_engine_core::client::EngineClient;
use roomlink_engine_core::proto::{
    EngineRequest, EngineResponse, PublicationInfo, TrackKind, TrackSource,
};
use roomlink_engine_core::{EngineError, NativeHandle, ObjectPool};

use crate::error::{RoomError, RoomResult};
use crate::participant::Origin;
use crate::track::Track;

struct PublicationState {
    info: PublicationInfo,
    handle: Option<Arc<NativeHandle>>,
    // present while the publication's media is subscribed/attached
    track: Option<Arc<Track>>,
}

/// A track publication: a participant's announcement of a track, with or
/// without the media itself attached.
pub struct TrackPublication {
    state: RwLock<Option<PublicationState>>,
}

impl TrackPublication {
    pub(crate) fn empty() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    pub(crate) fn construct(&self, handle: Option<Arc<NativeHandle>>, info: PublicationInfo) {
        *self.state.write() = Some(PublicationState {
            info,
            handle,
            track: None,
        });
    }

    /// Wipe references, notably the track, so publication and track
    /// recycling cannot leak cross-references.
    pub(crate) fn clear(&self) {
        *self.state.write() = None;
    }

    fn snapshot(&self) -> MappedRwLockReadGuard<'_, PublicationState> {
        RwLockReadGuard::map(self.state.read(), |state| {
            state.as_ref().expect("publication used after clear")
        })
    }

    /// Whether this wrapper currently represents a live publication.
    pub fn is_live(&self) -> bool {
        self.state.read().is_some()
    }

    /// Session-scoped id assigned by the engine.
    pub fn sid(&self) -> String {
        self.snapshot().info.sid.clone()
    }

    /// Publication name.
    pub fn name(&self) -> String {
        self.snapshot().info.name.clone()
    }

    /// Audio or video.
    pub fn kind(&self) -> TrackKind {
        self.snapshot().info.kind
    }

    /// Capture source reported by the publisher.
    pub fn source(&self) -> TrackSource {
        self.snapshot().info.source
    }

    /// Whether the publisher sends simulcast layers.
    pub fn simulcasted(&self) -> bool {
        self.snapshot().info.simulcasted
    }

    /// Video width in pixels, zero for audio.
    pub fn width(&self) -> u32 {
        self.snapshot().info.width
    }

    /// Video height in pixels, zero for audio.
    pub fn height(&self) -> u32 {
        self.snapshot().info.height
    }

    /// Negotiated mime type.
    pub fn mime_type(&self) -> String {
        self.snapshot().info.mime_type.clone()
    }

    /// Current mute state.
    pub fn muted(&self) -> bool {
        self.snapshot().info.muted
    }

    /// Local or remote origin.
    pub fn origin(&self) -> Origin {
        if self.snapshot().info.remote {
            Origin::Remote
        } else {
            Origin::Local
        }
    }

    /// The attached track, when media is flowing.
    pub fn track(&self) -> Option<Arc<Track>> {
        self.snapshot().track.clone()
    }

    /// The borrowed native handle, when one exists.
    pub(crate) fn handle(&self) -> Option<Arc<NativeHandle>> {
        self.snapshot().handle.clone()
    }

    pub(crate) fn update_track(&self, track: Arc<Track>) {
        if let Some(state) = self.state.write().as_mut() {
            state.track = Some(track);
        }
    }

    pub(crate) fn remove_track(&self) -> Option<Arc<Track>> {
        self.state.write().as_mut().and_then(|state| state.track.take())
    }

    /// Propagate a mute transition to the publication and any attached
    /// track.
    pub(crate) fn update_muted(&self, muted: bool) {
        let track = {
            let mut state = self.state.write();
            let Some(state) = state.as_mut() else {
                return;
            };
            state.info.muted = muted;
            state.track.clone()
        };
        if let Some(track) = track {
            track.update_muted(muted);
        }
    }

    /// Ask the engine to start or stop delivering this publication's
    /// media. Remote publications only; the origin and handle are
    /// validated locally before anything is sent.
    pub fn set_subscribed(&self, client: &EngineClient, subscribe: bool) -> RoomResult<()> {
        if self.origin() != Origin::Remote {
            return Err(RoomError::wrong_origin("set_subscribed", "remote"));
        }
        let handle = self
            .handle()
            .filter(|handle| !handle.is_invalid())
            .ok_or_else(|| EngineError::invalid_handle("publication handle is invalid"))?;

        let response = client.send(&EngineRequest::SetSubscribed {
            publication_handle: handle.raw(),
            subscribe,
        })?;
        match response {
            EngineResponse::SetSubscribed => Ok(()),
            _ => Err(EngineError::protocol("unexpected response to SetSubscribed").into()),
        }
    }
}

impl std::fmt::Debug for TrackPublication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        match state.as_ref() {
            Some(state) => f
                .debug_struct("TrackPublication")
                .field("sid", &state.info.sid)
                .field("kind", &state.info.kind)
                .field("muted", &state.info.muted)
                .field("subscribed", &state.track.is_some())
                .finish(),
            None => f.write_str("TrackPublication(cleared)"),
        }
    }
}

/// Recycling factory for [`TrackPublication`] wrappers.
pub struct TrackPublicationFactory {
    pool: ObjectPool<Arc<TrackPublication>>,
}

impl TrackPublicationFactory {
    /// Create a factory with an empty pool.
    pub fn new() -> Self {
        Self {
            pool: ObjectPool::new(|| Arc::new(TrackPublication::empty())),
        }
    }

    /// Materialize a publication from engine-reported metadata and a
    /// borrowed handle.
    pub fn new_publication(
        &self,
        handle: Option<Arc<NativeHandle>>,
        info: PublicationInfo,
    ) -> Arc<TrackPublication> {
        let publication = self.pool.get();
        publication.construct(handle, info);
        publication
    }

    /// Clear and re-pool a publication whose engine entity is gone.
    pub fn release(&self, publication: Arc<TrackPublication>) {
        publication.clear();
        self.pool.release(publication);
    }

    /// Idle wrappers currently pooled.
    pub fn idle_count(&self) -> usize {
        self.pool.idle_count()
    }
}

impl Default for TrackPublicationFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TrackPublicationFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackPublicationFactory")
            .field("idle", &self.idle_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::{Origin, ParticipantFactory};
    use roomlink_engine_core::proto::{ParticipantInfo, TrackInfo};
    use roomlink_engine_core::transport::{EngineEventSink, EngineTransport};
    use roomlink_engine_core::{EngineResult, HandleRegistry};

    struct NullTransport;

    impl EngineTransport for NullTransport {
        fn initialize(&self, _sink: Arc<dyn EngineEventSink>) -> EngineResult<()> {
            Ok(())
        }

        fn submit(&self, _request: &[u8]) -> EngineResult<Vec<u8>> {
            Ok(Vec::new())
        }

        fn drop_handle(&self, _raw: u64) {}
    }

    fn remote_info(sid: &str) -> PublicationInfo {
        PublicationInfo {
            sid: sid.to_string(),
            remote: true,
            ..Default::default()
        }
    }

    #[test]
    fn factory_reuses_released_wrappers() {
        let factory = TrackPublicationFactory::new();
        let first = factory.new_publication(None, remote_info("PU_1"));
        factory.release(Arc::clone(&first));

        let second = factory.new_publication(None, remote_info("PU_2"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.sid(), "PU_2");
    }

    #[test]
    fn mute_propagates_to_the_attached_track() {
        let registry = HandleRegistry::new(Arc::new(NullTransport));
        let owner = ParticipantFactory::new().new_participant(
            ParticipantInfo::default(),
            registry.acquire(1),
            Origin::Remote,
        );
        let publication = TrackPublicationFactory::new().new_publication(None, remote_info("PU_3"));
        let track = crate::track::TracksFactory::new().new_track(None, TrackInfo::default(), &owner);
        publication.update_track(Arc::clone(&track));

        publication.update_muted(true);
        assert!(publication.muted());
        assert!(track.muted());
    }

    #[test]
    fn set_subscribed_rejects_local_publications() {
        let transport: Arc<dyn EngineTransport> = Arc::new(NullTransport);
        let client = EngineClient::new(transport, Default::default()).unwrap();
        let publication = TrackPublicationFactory::new().new_publication(
            None,
            PublicationInfo {
                remote: false,
                ..Default::default()
            },
        );

        assert!(matches!(
            publication.set_subscribed(&client, true),
            Err(RoomError::WrongOrigin { .. })
        ));
    }

    #[test]
    fn set_subscribed_rejects_invalid_handles_locally() {
        let transport: Arc<dyn EngineTransport> = Arc::new(NullTransport);
        let client = EngineClient::new(transport, Default::default()).unwrap();
        let publication = TrackPublicationFactory::new().new_publication(None, remote_info("PU_4"));

        assert!(matches!(
            publication.set_subscribed(&client, true),
            Err(RoomError::Engine(EngineError::InvalidHandle { .. }))
        ));
    }
}
