//! Track publish/subscribe/mute lifecycle driven by a scripted engine

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use roomlink_engine_core::proto::{
    CompletionPayload, EngineRequest, OwnedPublication, PublicationInfo, RoomEvent, TrackKind,
    TrackPublishOptions, TrackSource,
};
use roomlink_engine_core::{EngineClient, EngineConfig, LightHandle};
use roomlink_room_core::{DomainPools, Room, RoomOptions};

use common::{
    connect_result, init_tracing, owned_participant, remote_publication, remote_track, MockEngine,
    ROOM_HANDLE,
};

fn connected_room(engine: &Arc<MockEngine>) -> (Arc<DomainPools>, Arc<Room>) {
    let transport: Arc<dyn roomlink_engine_core::transport::EngineTransport> = engine.clone();
    let client = EngineClient::new(transport, EngineConfig::default()).unwrap();
    let pools = Arc::new(DomainPools::new());
    let room = Room::new(client, Arc::clone(&pools), RoomOptions::default());

    let connecting = room.connect("wss://engine.test", "token").unwrap();
    engine.complete(
        connecting.async_id(),
        CompletionPayload::Connect(connect_result()),
    );
    (pools, room)
}

fn local_publication(sid: &str, handle: u64) -> OwnedPublication {
    OwnedPublication {
        handle,
        info: PublicationInfo {
            sid: sid.to_string(),
            remote: false,
            ..Default::default()
        },
    }
}

#[test]
fn local_track_publish_flow_attaches_the_publication() {
    init_tracing();
    let engine = MockEngine::new();
    let (_pools, room) = connected_room(&engine);

    let track = room
        .create_local_track("mic", TrackKind::Audio, LightHandle::new(7))
        .unwrap();
    assert_eq!(track.sid(), "TR_mic");
    assert!(track.is_owned());

    let publishing = room
        .publish_track(
            &track,
            TrackPublishOptions {
                source: TrackSource::Microphone,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!publishing.is_done());

    let fired = Arc::new(Mutex::new(Vec::new()));
    let capture = Arc::clone(&fired);
    room.events()
        .local_track_published
        .subscribe(move |(publication, participant)| {
            capture
                .lock()
                .push((publication.sid(), participant.identity()));
        });

    engine.complete(
        publishing.async_id(),
        CompletionPayload::PublishTrack {
            publication: local_publication("PU_local", 41),
        },
    );
    assert!(publishing.is_done());

    // The completion wired the publication before done flipped.
    let local = room.participants().local_participant().unwrap();
    let publication = local.publication("PU_local").unwrap();
    assert!(Arc::ptr_eq(&publication.track().unwrap(), &track));

    // The room event then announces it to subscribers.
    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::LocalTrackPublished {
            publication_sid: "PU_local".to_string(),
        },
    );
    assert_eq!(
        *fired.lock(),
        vec![("PU_local".to_string(), "me".to_string())]
    );
}

#[test]
fn local_track_unpublish_flow_recycles_the_publication() {
    let engine = MockEngine::new();
    let (pools, room) = connected_room(&engine);

    let track = room
        .create_local_track("mic", TrackKind::Audio, LightHandle::new(7))
        .unwrap();
    let publishing = room
        .publish_track(&track, TrackPublishOptions::default())
        .unwrap();
    engine.complete(
        publishing.async_id(),
        CompletionPayload::PublishTrack {
            publication: local_publication("PU_local", 41),
        },
    );

    let unpublishing = room.unpublish_track("PU_local", true).unwrap();
    engine.complete(unpublishing.async_id(), CompletionPayload::UnpublishTrack);
    assert!(unpublishing.is_done());

    let fired = Arc::new(Mutex::new(Vec::new()));
    let capture = Arc::clone(&fired);
    room.events()
        .local_track_unpublished
        .subscribe(move |(publication, _participant)| {
            capture.lock().push(publication.sid());
        });

    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::LocalTrackUnpublished {
            publication_sid: "PU_local".to_string(),
        },
    );

    assert_eq!(*fired.lock(), vec!["PU_local".to_string()]);
    let local = room.participants().local_participant().unwrap();
    assert!(local.publication("PU_local").is_none());
    assert_eq!(pools.publications().idle_count(), 1);

    // The local track wrapper stays with its owner.
    assert!(track.is_live());
    assert!(track.is_owned());
}

#[test]
fn unpublish_of_an_unknown_publication_is_rejected_locally() {
    let engine = MockEngine::new();
    let (_pools, room) = connected_room(&engine);

    assert!(room.unpublish_track("PU_nope", true).is_err());
    // Nothing reached the engine for it.
    assert!(!engine
        .requests()
        .iter()
        .any(|request| matches!(request, EngineRequest::UnpublishTrack { .. })));
}

#[test]
fn remote_subscription_flow_attaches_and_detaches_the_track() {
    let engine = MockEngine::new();
    let (pools, room) = connected_room(&engine);

    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::ParticipantConnected {
            participant: owned_participant("alice", 21),
        },
    );
    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::TrackPublished {
            participant_identity: "alice".to_string(),
            publication: remote_publication("PU_1", 31),
        },
    );

    let subscribed = Arc::new(Mutex::new(Vec::new()));
    let capture = Arc::clone(&subscribed);
    room.events()
        .track_subscribed
        .subscribe(move |(track, publication, participant)| {
            capture
                .lock()
                .push((track.sid(), publication.sid(), participant.identity()));
        });

    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::TrackSubscribed {
            participant_identity: "alice".to_string(),
            track: remote_track("PU_1", 51),
        },
    );

    assert_eq!(
        *subscribed.lock(),
        vec![(
            "PU_1".to_string(),
            "PU_1".to_string(),
            "alice".to_string()
        )]
    );
    let alice = room.participants().remote_participant("alice").unwrap();
    let publication = alice.publication("PU_1").unwrap();
    let track = publication.track().unwrap();
    assert_eq!(track.participant().unwrap().identity(), "alice");

    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::TrackUnsubscribed {
            participant_identity: "alice".to_string(),
            track_sid: "PU_1".to_string(),
        },
    );

    assert!(publication.track().is_none());
    assert_eq!(pools.tracks().idle_count(), 1);
    assert!(engine.dropped_handles().contains(&51));
}

#[test]
fn mute_transitions_propagate_to_publication_and_track() {
    let engine = MockEngine::new();
    let (_pools, room) = connected_room(&engine);

    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::ParticipantConnected {
            participant: owned_participant("alice", 21),
        },
    );
    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::TrackPublished {
            participant_identity: "alice".to_string(),
            publication: remote_publication("PU_1", 31),
        },
    );
    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::TrackSubscribed {
            participant_identity: "alice".to_string(),
            track: remote_track("PU_1", 51),
        },
    );

    let muted_events = Arc::new(Mutex::new(Vec::new()));
    let capture = Arc::clone(&muted_events);
    room.events()
        .track_muted
        .subscribe(move |(publication, _participant)| {
            capture.lock().push(publication.sid());
        });
    let unmuted_events = Arc::new(Mutex::new(Vec::new()));
    let capture = Arc::clone(&unmuted_events);
    room.events()
        .track_unmuted
        .subscribe(move |(publication, _participant)| {
            capture.lock().push(publication.sid());
        });

    let alice = room.participants().remote_participant("alice").unwrap();
    let publication = alice.publication("PU_1").unwrap();
    let track = publication.track().unwrap();

    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::TrackMuted {
            participant_identity: "alice".to_string(),
            track_sid: "PU_1".to_string(),
        },
    );
    assert!(publication.muted());
    assert!(track.muted());
    assert_eq!(*muted_events.lock(), vec!["PU_1".to_string()]);

    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::TrackUnmuted {
            participant_identity: "alice".to_string(),
            track_sid: "PU_1".to_string(),
        },
    );
    assert!(!publication.muted());
    assert!(!track.muted());
    assert_eq!(*unmuted_events.lock(), vec!["PU_1".to_string()]);
}

#[test]
fn publishing_a_remote_track_is_rejected_locally() {
    let engine = MockEngine::new();
    let (_pools, room) = connected_room(&engine);

    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::ParticipantConnected {
            participant: owned_participant("alice", 21),
        },
    );
    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::TrackPublished {
            participant_identity: "alice".to_string(),
            publication: remote_publication("PU_1", 31),
        },
    );
    engine.emit_room(
        ROOM_HANDLE,
        RoomEvent::TrackSubscribed {
            participant_identity: "alice".to_string(),
            track: remote_track("PU_1", 51),
        },
    );

    let alice = room.participants().remote_participant("alice").unwrap();
    let remote = alice.publication("PU_1").unwrap().track().unwrap();
    let before = engine.requests().len();

    assert!(room
        .publish_track(&remote, TrackPublishOptions::default())
        .is_err());
    assert_eq!(engine.requests().len(), before);
}
