//! Pooled participant wrapper
//!
//! A [`Participant`] represents exactly one engine-side participant
//! between `construct` and `clear`. The wrapper itself is recycled
//! through a [`ParticipantFactory`] because participants come and go at
//! a rate set by remote session churn, not by local allocation pressure.
//!
//! Snapshots are committed atomically under a lock swap: the runtime
//! guarantees a single mutator per instance (engine events for one
//! entity are not delivered concurrently), but readers on other threads
//! must never observe a half-applied update.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use roomlink_engine_core::proto::{ConnectionQuality, ParticipantInfo};
use roomlink_engine_core::{NativeHandle, ObjectPool};

use crate::publication::TrackPublication;

/// Where an entity originates relative to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Created by this process
    Local,
    /// Reported by the engine for a remote peer
    Remote,
}

struct ParticipantState {
    info: ParticipantInfo,
    handle: Arc<NativeHandle>,
    origin: Origin,
    // keyed by publication sid
    publications: HashMap<String, Arc<TrackPublication>>,
    connection_quality: ConnectionQuality,
}

/// A room participant, live between `construct` and `clear`.
pub struct Participant {
    state: RwLock<Option<ParticipantState>>,
}

impl Participant {
    pub(crate) fn empty() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    pub(crate) fn construct(&self, info: ParticipantInfo, handle: Arc<NativeHandle>, origin: Origin) {
        *self.state.write() = Some(ParticipantState {
            info,
            handle,
            origin,
            publications: HashMap::new(),
            connection_quality: ConnectionQuality::default(),
        });
    }

    /// Wipe all references, notably the publications map, so recycling
    /// cannot leak cross-references between pooled objects.
    pub(crate) fn clear(&self) {
        *self.state.write() = None;
    }

    fn snapshot(&self) -> MappedRwLockReadGuard<'_, ParticipantState> {
        RwLockReadGuard::map(self.state.read(), |state| {
            // A cleared wrapper reachable from application code is a
            // recycling defect; fail fast rather than hand out garbage.
            state.as_ref().expect("participant used after clear")
        })
    }

    /// Whether this wrapper currently represents a live participant.
    pub fn is_live(&self) -> bool {
        self.state.read().is_some()
    }

    /// Session-scoped id assigned by the engine.
    pub fn sid(&self) -> String {
        self.snapshot().info.sid.clone()
    }

    /// Stable identity.
    pub fn identity(&self) -> String {
        self.snapshot().info.identity.clone()
    }

    /// Display name.
    pub fn name(&self) -> String {
        self.snapshot().info.name.clone()
    }

    /// Application-defined metadata blob.
    pub fn metadata(&self) -> String {
        self.snapshot().info.metadata.clone()
    }

    /// Local or remote origin.
    pub fn origin(&self) -> Origin {
        self.snapshot().origin
    }

    /// True for the participant representing this process.
    pub fn is_local(&self) -> bool {
        self.origin() == Origin::Local
    }

    /// The borrowed native handle. The handle registry stays its owner.
    pub fn handle(&self) -> Arc<NativeHandle> {
        Arc::clone(&self.snapshot().handle)
    }

    /// Engine's current quality estimate for this participant.
    pub fn connection_quality(&self) -> ConnectionQuality {
        self.snapshot().connection_quality
    }

    /// Look up a publication by sid.
    pub fn publication(&self, sid: &str) -> Option<Arc<TrackPublication>> {
        self.snapshot().publications.get(sid).cloned()
    }

    /// All current publications.
    pub fn publications(&self) -> Vec<Arc<TrackPublication>> {
        self.snapshot().publications.values().cloned().collect()
    }

    pub(crate) fn add_publication(&self, publication: Arc<TrackPublication>) {
        let mut state = self.state.write();
        if let Some(state) = state.as_mut() {
            state.publications.insert(publication.sid(), publication);
        }
    }

    pub(crate) fn remove_publication(&self, sid: &str) -> Option<Arc<TrackPublication>> {
        let mut state = self.state.write();
        state.as_mut().and_then(|state| state.publications.remove(sid))
    }

    pub(crate) fn update_metadata(&self, metadata: String) {
        if let Some(state) = self.state.write().as_mut() {
            state.info.metadata = metadata;
        }
    }

    pub(crate) fn update_name(&self, name: String) {
        if let Some(state) = self.state.write().as_mut() {
            state.info.name = name;
        }
    }

    pub(crate) fn update_quality(&self, quality: ConnectionQuality) {
        if let Some(state) = self.state.write().as_mut() {
            state.connection_quality = quality;
        }
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        match state.as_ref() {
            Some(state) => f
                .debug_struct("Participant")
                .field("identity", &state.info.identity)
                .field("origin", &state.origin)
                .field("publications", &state.publications.len())
                .finish(),
            None => f.write_str("Participant(cleared)"),
        }
    }
}

/// Recycling factory for [`Participant`] wrappers.
pub struct ParticipantFactory {
    pool: ObjectPool<Arc<Participant>>,
}

impl ParticipantFactory {
    /// Create a factory with an empty pool.
    pub fn new() -> Self {
        Self {
            pool: ObjectPool::new(|| Arc::new(Participant::empty())),
        }
    }

    /// Materialize a participant from engine-reported metadata and a
    /// borrowed handle.
    pub fn new_participant(
        &self,
        info: ParticipantInfo,
        handle: Arc<NativeHandle>,
        origin: Origin,
    ) -> Arc<Participant> {
        let participant = self.pool.get();
        participant.construct(info, handle, origin);
        participant
    }

    /// Clear and re-pool a participant whose engine entity is gone.
    pub fn release(&self, participant: Arc<Participant>) {
        participant.clear();
        self.pool.release(participant);
    }

    /// Idle wrappers currently pooled.
    pub fn idle_count(&self) -> usize {
        self.pool.idle_count()
    }
}

impl Default for ParticipantFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ParticipantFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantFactory")
            .field("idle", &self.idle_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomlink_engine_core::HandleRegistry;
    use roomlink_engine_core::transport::{EngineEventSink, EngineTransport};
    use roomlink_engine_core::EngineResult;

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

    fn info(identity: &str) -> ParticipantInfo {
        ParticipantInfo {
            sid: format!("PA_{identity}"),
            identity: identity.to_string(),
            name: identity.to_string(),
            metadata: String::new(),
        }
    }

    #[test]
    fn factory_reuses_released_wrappers() {
        let registry = HandleRegistry::new(Arc::new(NullTransport));
        let factory = ParticipantFactory::new();

        let first = factory.new_participant(info("alice"), registry.acquire(1), Origin::Remote);
        assert_eq!(first.identity(), "alice");

        factory.release(Arc::clone(&first));
        assert_eq!(factory.idle_count(), 1);
        assert!(!first.is_live());

        let second = factory.new_participant(info("bob"), registry.acquire(2), Origin::Remote);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.identity(), "bob");
    }

    #[test]
    fn clear_drops_publication_references() {
        let registry = HandleRegistry::new(Arc::new(NullTransport));
        let factory = ParticipantFactory::new();
        let participant = factory.new_participant(info("carol"), registry.acquire(3), Origin::Remote);

        let publication = Arc::new(crate::publication::TrackPublication::empty());
        publication.construct(None, Default::default());
        participant.add_publication(Arc::clone(&publication));
        assert_eq!(participant.publications().len(), 1);

        // Two refs: ours and the participant's map.
        assert_eq!(Arc::strong_count(&publication), 2);
        participant.clear();
        assert_eq!(Arc::strong_count(&publication), 1);
    }

    #[test]
    fn updates_are_visible_to_readers() {
        let registry = HandleRegistry::new(Arc::new(NullTransport));
        let factory = ParticipantFactory::new();
        let participant = factory.new_participant(info("dave"), registry.acquire(4), Origin::Remote);

        participant.update_metadata("lobby".to_string());
        participant.update_name("Dave".to_string());
        participant.update_quality(ConnectionQuality::Excellent);

        assert_eq!(participant.metadata(), "lobby");
        assert_eq!(participant.name(), "Dave");
        assert_eq!(participant.connection_quality(), ConnectionQuality::Excellent);
    }
}
