//! Participant registry for one room

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::{RoomError, RoomResult};
use crate::participant::Participant;

/// The room's participant registry: one local slot plus the remote set
/// keyed by identity. Safe to query from any thread while engine
/// callbacks mutate it.
#[derive(Default)]
pub struct ParticipantsHub {
    local: RwLock<Option<Arc<Participant>>>,
    remote: DashMap<String, Arc<Participant>>,
}

impl ParticipantsHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// The participant representing this process.
    pub fn local_participant(&self) -> RoomResult<Arc<Participant>> {
        self.local
            .read()
            .clone()
            .ok_or_else(|| RoomError::invalid_state("local participant not assigned yet"))
    }

    /// Look up a remote participant by identity.
    pub fn remote_participant(&self, identity: &str) -> Option<Arc<Participant>> {
        self.remote.get(identity).map(|entry| Arc::clone(&entry))
    }

    /// Like [`remote_participant`](Self::remote_participant), but an
    /// unknown identity is an error.
    pub fn remote_ensured(&self, identity: &str) -> RoomResult<Arc<Participant>> {
        self.remote_participant(identity)
            .ok_or_else(|| RoomError::participant_not_found(identity))
    }

    /// Look up any participant (local included) by identity.
    pub fn participant_ensured(&self, identity: &str) -> RoomResult<Arc<Participant>> {
        if let Some(local) = self.local.read().clone() {
            if local.identity() == identity {
                return Ok(local);
            }
        }
        self.remote_ensured(identity)
    }

    /// All current remote participants.
    pub fn remote_participants(&self) -> Vec<Arc<Participant>> {
        self.remote.iter().map(|entry| Arc::clone(&entry)).collect()
    }

    /// Number of remote participants.
    pub fn remote_count(&self) -> usize {
        self.remote.len()
    }

    pub(crate) fn assign_local(&self, participant: Arc<Participant>) {
        *self.local.write() = Some(participant);
    }

    pub(crate) fn add_remote(&self, participant: Arc<Participant>) {
        self.remote.insert(participant.identity(), participant);
    }

    pub(crate) fn remove_remote(&self, identity: &str) -> Option<Arc<Participant>> {
        self.remote.remove(identity).map(|(_, participant)| participant)
    }

    /// Empty the hub, yielding everything that was registered. Used on
    /// disconnect so the pools can reclaim every wrapper.
    pub(crate) fn take_all(&self) -> Vec<Arc<Participant>> {
        let mut all = Vec::with_capacity(self.remote.len() + 1);
        if let Some(local) = self.local.write().take() {
            all.push(local);
        }
        let identities: Vec<String> = self.remote.iter().map(|entry| entry.key().clone()).collect();
        for identity in identities {
            if let Some((_, participant)) = self.remote.remove(&identity) {
                all.push(participant);
            }
        }
        all
    }
}

impl std::fmt::Debug for ParticipantsHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantsHub")
            .field("has_local", &self.local.read().is_some())
            .field("remote", &self.remote.len())
            .finish()
    }
}
