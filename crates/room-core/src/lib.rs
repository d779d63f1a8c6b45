//! # roomlink-room-core
//!
//! Room domain layer over the engine boundary runtime
//! (`roomlink-engine-core`). Rooms, participants, tracks and track
//! publications are thin pooled wrappers whose lifetimes are driven by
//! engine lifecycle events: a "participant joined" event materializes a
//! recycled [`Participant`] wrapper, a "participant left" event returns
//! it to its pool, and every transition fans out synchronously through
//! the typed channels of [`RoomEvents`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roomlink_engine_core::{EngineClient, EngineConfig};
//! use roomlink_engine_core::transport::EngineTransport;
//! use roomlink_room_core::{DomainPools, Room, RoomOptions};
//!
//! async fn join(transport: Arc<dyn EngineTransport>) -> Result<(), Box<dyn std::error::Error>> {
//!     let client = EngineClient::new(transport, EngineConfig::default())?;
//!     let pools = Arc::new(DomainPools::new());
//!     let room = Room::new(client, pools, RoomOptions::default());
//!
//!     room.events().track_published.subscribe(|(publication, participant)| {
//!         println!("{} published {}", participant.identity(), publication.sid());
//!     });
//!
//!     let connecting = room.connect("wss://engine.example", "token")?;
//!     connecting.await_completion().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod events;
pub mod hub;
pub mod participant;
pub mod publication;
pub mod room;
pub mod speakers;
pub mod track;

// Re-export main types
pub use error::{RoomError, RoomResult};
pub use events::{ConnectionUpdate, EventChannel, ParticipantUpdate, RoomEvents, SubscriptionId};
pub use hub::ParticipantsHub;
pub use participant::{Origin, Participant, ParticipantFactory};
pub use publication::{TrackPublication, TrackPublicationFactory};
pub use room::{DomainPools, Room, RoomOptions};
pub use speakers::{ActiveSpeakers, DefaultActiveSpeakers, MutableActiveSpeakers, NoActiveSpeakers};
pub use track::{Track, TracksFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
