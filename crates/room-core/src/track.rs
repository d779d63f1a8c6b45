//! Pooled track wrapper and factory
//!
//! Remote tracks materialize when the engine reports a subscription;
//! local tracks are created through an engine request against a capture
//! source handle. Both kinds share the recycled [`Track`] wrapper.

use std::sync::{Arc, Weak};

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use roomlink_engine_core::client::EngineClient;
use roomlink_engine_core::proto::{EngineRequest, EngineResponse, TrackInfo, TrackKind};
use roomlink_engine_core::{EngineError, LightHandle, NativeHandle, ObjectPool};

use crate::error::RoomResult;
use crate::participant::{Origin, Participant};

struct TrackState {
    info: TrackInfo,
    // None for remote tracks we never own a handle to
    handle: Option<Arc<NativeHandle>>,
    participant: Weak<Participant>,
}

/// A media track, live between `construct` and `clear`.
pub struct Track {
    state: RwLock<Option<TrackState>>,
}

impl Track {
    pub(crate) fn empty() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    pub(crate) fn construct(
        &self,
        handle: Option<Arc<NativeHandle>>,
        info: TrackInfo,
        participant: &Arc<Participant>,
    ) {
        *self.state.write() = Some(TrackState {
            info,
            handle,
            participant: Arc::downgrade(participant),
        });
    }

    pub(crate) fn clear(&self) {
        *self.state.write() = None;
    }

    fn snapshot(&self) -> MappedRwLockReadGuard<'_, TrackState> {
        RwLockReadGuard::map(self.state.read(), |state| {
            state.as_ref().expect("track used after clear")
        })
    }

    /// Whether this wrapper currently represents a live track.
    pub fn is_live(&self) -> bool {
        self.state.read().is_some()
    }

    /// Session-scoped id assigned by the engine.
    pub fn sid(&self) -> String {
        self.snapshot().info.sid.clone()
    }

    /// Track name.
    pub fn name(&self) -> String {
        self.snapshot().info.name.clone()
    }

    /// Audio or video.
    pub fn kind(&self) -> TrackKind {
        self.snapshot().info.kind
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

    /// True when this side owns a live handle to the track.
    pub fn is_owned(&self) -> bool {
        self.snapshot()
            .handle
            .as_ref()
            .map(|handle| !handle.is_invalid())
            .unwrap_or(false)
    }

    /// The borrowed native handle, when one exists.
    pub fn handle(&self) -> Option<Arc<NativeHandle>> {
        self.snapshot().handle.clone()
    }

    /// The owning participant, while it is still live.
    pub fn participant(&self) -> Option<Arc<Participant>> {
        self.snapshot().participant.upgrade()
    }

    pub(crate) fn update_muted(&self, muted: bool) {
        if let Some(state) = self.state.write().as_mut() {
            state.info.muted = muted;
        }
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        match state.as_ref() {
            Some(state) => f
                .debug_struct("Track")
                .field("sid", &state.info.sid)
                .field("kind", &state.info.kind)
                .field("muted", &state.info.muted)
                .finish(),
            None => f.write_str("Track(cleared)"),
        }
    }
}

/// Recycling factory for [`Track`] wrappers.
pub struct TracksFactory {
    pool: ObjectPool<Arc<Track>>,
}

impl TracksFactory {
    /// Create a factory with an empty pool.
    pub fn new() -> Self {
        Self {
            pool: ObjectPool::new(|| Arc::new(Track::empty())),
        }
    }

    /// Materialize a track from engine-reported metadata.
    pub fn new_track(
        &self,
        handle: Option<Arc<NativeHandle>>,
        info: TrackInfo,
        participant: &Arc<Participant>,
    ) -> Arc<Track> {
        let track = self.pool.get();
        track.construct(handle, info, participant);
        track
    }

    /// Create a local track backed by a capture source handle.
    ///
    /// The source handle is validated locally before anything is sent;
    /// the engine mints the track handle in its immediate response.
    pub fn new_local_track(
        &self,
        client: &EngineClient,
        name: impl Into<String>,
        kind: TrackKind,
        source: LightHandle,
        local_participant: &Arc<Participant>,
    ) -> RoomResult<Arc<Track>> {
        if source.is_invalid() {
            return Err(
                EngineError::invalid_handle("capture source handle is invalid").into(),
            );
        }

        let response = client.send(&EngineRequest::CreateLocalTrack {
            name: name.into(),
            kind,
            source_handle: source.raw(),
        })?;
        let EngineResponse::CreateLocalTrack { track: owned } = response else {
            return Err(EngineError::protocol("unexpected response to CreateLocalTrack").into());
        };

        let handle = client.registry().acquire(owned.handle);
        Ok(self.new_track(Some(handle), owned.info, local_participant))
    }

    /// Clear and re-pool a track whose engine entity is gone.
    pub fn release(&self, track: Arc<Track>) {
        track.clear();
        self.pool.release(track);
    }

    /// Idle wrappers currently pooled.
    pub fn idle_count(&self) -> usize {
        self.pool.idle_count()
    }
}

impl Default for TracksFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TracksFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracksFactory")
            .field("idle", &self.idle_count())
            .finish()
    }
}
