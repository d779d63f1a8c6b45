//! Domain event hub
//!
//! Engine-driven state transitions fan out to subscribers through typed
//! channels. Delivery is synchronous on whatever thread the underlying
//! engine callback arrived on, in the order the engine reported the
//! transitions; the hub performs no reordering or batching. Subscribers
//! that need to defer work should hand it to their own executor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use roomlink_engine_core::proto::{ConnectionQuality, ConnectionState, DisconnectReason};

use crate::participant::Participant;
use crate::publication::TrackPublication;
use crate::track::Track;

/// Identifies one subscription on one channel.
pub type SubscriptionId = u64;

/// One typed notification channel.
///
/// `emit` snapshots the subscriber list and invokes each callback in
/// subscription order, so a callback may subscribe or unsubscribe
/// without deadlocking the channel.
pub struct EventChannel<T> {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn Fn(&T) + Send + Sync>)>>,
    next_id: AtomicU64,
}

impl<T> EventChannel<T> {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a subscriber. The returned id unsubscribes it later.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a subscriber. Returns whether it was present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Deliver `value` to every current subscriber, synchronously, on
    /// the calling thread.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<_> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<T> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// What changed about a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantUpdate {
    Connected,
    Disconnected,
    MetadataChanged,
    NameChanged,
}

/// Coarse connection transitions of the room session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionUpdate {
    Disconnected(DisconnectReason),
    Reconnecting,
    Reconnected,
}

/// The room's notification channels, one per engine-driven transition.
///
/// Track channels deliver the affected publication (or subscribed track)
/// together with the owning participant.
#[derive(Debug, Default)]
pub struct RoomEvents {
    /// A local publication became visible to the room
    pub local_track_published: EventChannel<(Arc<TrackPublication>, Arc<Participant>)>,
    /// A local publication was withdrawn
    pub local_track_unpublished: EventChannel<(Arc<TrackPublication>, Arc<Participant>)>,
    /// A remote participant published a track
    pub track_published: EventChannel<(Arc<TrackPublication>, Arc<Participant>)>,
    /// A remote participant withdrew a publication
    pub track_unpublished: EventChannel<(Arc<TrackPublication>, Arc<Participant>)>,
    /// Media for a remote publication started flowing to us
    pub track_subscribed: EventChannel<(Arc<Track>, Arc<TrackPublication>, Arc<Participant>)>,
    /// Media for a remote publication stopped flowing to us
    pub track_unsubscribed: EventChannel<(Arc<Track>, Arc<TrackPublication>, Arc<Participant>)>,
    pub track_muted: EventChannel<(Arc<TrackPublication>, Arc<Participant>)>,
    pub track_unmuted: EventChannel<(Arc<TrackPublication>, Arc<Participant>)>,
    /// Participant joined, left, or changed metadata/name
    pub participant_updated: EventChannel<(Arc<Participant>, ParticipantUpdate)>,
    pub connection_quality_changed: EventChannel<(Arc<Participant>, ConnectionQuality)>,
    pub room_metadata_changed: EventChannel<String>,
    pub room_sid_changed: EventChannel<String>,
    pub connection_state_changed: EventChannel<ConnectionState>,
    pub connection_updated: EventChannel<ConnectionUpdate>,
}
