//! Active speaker tracking
//!
//! The engine reports the active speaker set as an ordered list of
//! participant identities. [`DefaultActiveSpeakers`] mirrors that list;
//! [`NoActiveSpeakers`] is the permanently empty variant for contexts
//! where speaker tracking is disabled, so callers can depend on the same
//! interface unconditionally.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::events::{EventChannel, SubscriptionId};

/// Read surface over the current active speaker set.
pub trait ActiveSpeakers: Send + Sync {
    /// Number of currently active speakers.
    fn count(&self) -> usize;

    /// Identities of the active speakers, in engine-reported order.
    fn identities(&self) -> Vec<String>;

    /// Be notified whenever the set changes.
    fn subscribe_updated(&self, listener: Arc<dyn Fn() + Send + Sync>) -> SubscriptionId;

    /// Remove a change subscription.
    fn unsubscribe_updated(&self, id: SubscriptionId);
}

/// Write surface used by the room's event router.
pub trait MutableActiveSpeakers: ActiveSpeakers {
    /// Replace the set with a new engine-reported list.
    fn update_current(&self, identities: Vec<String>);

    /// Drop all speakers, e.g. on disconnect.
    fn clear(&self);
}

/// Speaker tracking backed by the engine's reports.
#[derive(Debug, Default)]
pub struct DefaultActiveSpeakers {
    actives: RwLock<Vec<String>>,
    updated: EventChannel<()>,
}

impl DefaultActiveSpeakers {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActiveSpeakers for DefaultActiveSpeakers {
    fn count(&self) -> usize {
        self.actives.read().len()
    }

    fn identities(&self) -> Vec<String> {
        self.actives.read().clone()
    }

    fn subscribe_updated(&self, listener: Arc<dyn Fn() + Send + Sync>) -> SubscriptionId {
        self.updated.subscribe(move |_| listener())
    }

    fn unsubscribe_updated(&self, id: SubscriptionId) {
        self.updated.unsubscribe(id);
    }
}

impl MutableActiveSpeakers for DefaultActiveSpeakers {
    fn update_current(&self, identities: Vec<String>) {
        *self.actives.write() = identities;
        self.updated.emit(&());
    }

    fn clear(&self) {
        self.actives.write().clear();
        self.updated.emit(&());
    }
}

/// Disabled speaker tracking: always empty, updates are no-ops.
#[derive(Debug, Default)]
pub struct NoActiveSpeakers;

impl ActiveSpeakers for NoActiveSpeakers {
    fn count(&self) -> usize {
        0
    }

    fn identities(&self) -> Vec<String> {
        Vec::new()
    }

    fn subscribe_updated(&self, _listener: Arc<dyn Fn() + Send + Sync>) -> SubscriptionId {
        0
    }

    fn unsubscribe_updated(&self, _id: SubscriptionId) {}
}

impl MutableActiveSpeakers for NoActiveSpeakers {
    fn update_current(&self, _identities: Vec<String>) {}

    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn default_tracker_mirrors_engine_reports() {
        let speakers = DefaultActiveSpeakers::new();
        let updates = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&updates);
        speakers.subscribe_updated(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        speakers.update_current(vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(speakers.count(), 2);
        assert_eq!(speakers.identities(), vec!["alice", "bob"]);
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        speakers.clear();
        assert_eq!(speakers.count(), 0);
        assert_eq!(updates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disabled_tracker_stays_empty() {
        let speakers = NoActiveSpeakers;
        speakers.update_current(vec!["alice".to_string()]);
        assert_eq!(speakers.count(), 0);
        assert!(speakers.identities().is_empty());
    }
}
