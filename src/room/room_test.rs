use std::sync::Mutex as SyncMutex;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Duration;

use super::*;
use crate::handler::handler_test::*;
use crate::signaling::{Message, Request};
use crate::track::TrackSimple;

struct RoomRecorder {
    events_tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl RoomEventHandler for RoomRecorder {
    async fn on_new_peer(&self, peer: Arc<Peer>) {
        let _ = self.events_tx.send(format!("newpeer:{}", peer.name()));
    }

    async fn on_close(&self, originator: Originator, _app_data: Value) {
        let _ = self.events_tx.send(format!("close:{originator}"));
    }
}

struct TestRoom {
    room: Room,
    device: Arc<MockDevice>,
    messages: Arc<SyncMutex<Vec<Message>>>,
    events_rx: mpsc::UnboundedReceiver<String>,
}

fn new_room(setting_engine: SettingEngine, responder: Responder) -> TestRoom {
    let (messages_tx, messages_rx) = mpsc::unbounded_channel::<Message>();
    let device = Arc::new(MockDevice::new());
    let room = Room::new(
        Arc::new(setting_engine),
        Arc::clone(&device) as Arc<dyn Device>,
        Arc::new(messages_tx),
    );
    let messages = spawn_router(Arc::clone(&room.signaler), messages_rx, responder);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    room.set_event_handler(Box::new(RoomRecorder { events_tx }));

    TestRoom {
        room,
        device,
        messages,
        events_rx,
    }
}

async fn joined_room() -> Result<TestRoom> {
    let t = new_room(SettingEngine::default(), default_responder());
    t.room.join("alice", json!({ "device": "test" })).await?;
    Ok(t)
}

fn responder_with(method: RequestMethod, data: Value) -> Responder {
    Arc::new(move |request: &Request| {
        let response = if request.method == method {
            Response::success(request.id, data.clone())
        } else {
            default_response(request)
        };
        Some((response, Duration::ZERO))
    })
}

fn consumer_data(id: u32, peer_name: &str, payload_type: u8) -> Value {
    json!({
        "id": id,
        "kind": "audio",
        "peerName": peer_name,
        "rtpParameters": {
            "codecs": [
                { "name": "opus", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2, "payloadType": payload_type }
            ],
            "encodings": [ { "ssrc": 1111 } ]
        },
        "paused": false,
        "appData": { "source": "mic" }
    })
}

fn drain(events_rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut events = vec![];
    while let Ok(event) = events_rx.try_recv() {
        events.push(event);
    }
    events
}

async fn notify(room: &Room, method: &str, data: Value) -> Result<()> {
    room.receive_notification(Notification::new(method, data))
        .await
}

#[tokio::test]
async fn test_room_join() -> Result<()> {
    let t = new_room(SettingEngine::default(), default_responder());
    assert_eq!(t.room.state(), RoomState::New);
    assert!(!t.room.can_send(MediaKind::Audio));

    let peers = t.room.join("alice", json!({ "device": "test" })).await?;

    assert!(peers.is_empty());
    assert!(t.room.joined());
    assert_eq!(t.room.peer_name().await.as_deref(), Some("alice"));
    assert!(t.room.can_send(MediaKind::Audio));
    assert!(t.room.can_send(MediaKind::Video));

    let rtp_capabilities = t.room.rtp_capabilities().await.unwrap();
    let payload_types: Vec<u8> = rtp_capabilities
        .codecs
        .iter()
        .map(|c| c.preferred_payload_type)
        .collect();
    assert_eq!(payload_types, vec![100, 101, 102]);

    let sent = sent(&t.messages);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], ("queryRoom".to_owned(), json!({})));
    let (method, data) = &sent[1];
    assert_eq!(method, "join");
    assert_eq!(data["peerName"], json!("alice"));
    assert_eq!(data["spy"], json!(false));
    assert_eq!(data["appData"], json!({ "device": "test" }));
    assert_eq!(data["rtpCapabilities"], serde_json::to_value(&rtp_capabilities)?);

    assert_eq!(
        t.room.join("alice", Value::Null).await.err(),
        Some(Error::ErrRoomAlreadyJoined)
    );

    Ok(())
}

#[tokio::test]
async fn test_room_join_with_peers() -> Result<()> {
    let responder = responder_with(
        RequestMethod::Join,
        json!({
            "peers": [
                {
                    "name": "bob",
                    "appData": { "displayName": "Bob" },
                    "consumers": [ consumer_data(1, "bob", 100), consumer_data(2, "bob", 120) ]
                },
                { "name": "carol" }
            ]
        }),
    );
    let mut t = new_room(SettingEngine::default(), responder);

    let mut peers = t.room.join("alice", Value::Null).await?;
    peers.sort_by(|a, b| a.name().cmp(b.name()));

    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].name(), "bob");
    assert_eq!(peers[0].app_data(), &json!({ "displayName": "Bob" }));
    assert_eq!(peers[1].name(), "carol");

    let supported = peers[0].get_consumer_by_id(1).await.unwrap();
    assert!(supported.supported());
    assert_eq!(supported.peer_name(), "bob");
    assert_eq!(supported.app_data(), &json!({ "source": "mic" }));
    let unsupported = peers[0].get_consumer_by_id(2).await.unwrap();
    assert!(!unsupported.supported());

    assert!(drain(&mut t.events_rx).is_empty(), "join does not emit newpeer");

    Ok(())
}

#[tokio::test]
async fn test_room_join_unsupported_codecs() -> Result<()> {
    let mut room_capabilities = room_capabilities();
    room_capabilities.codecs.push(
        serde_json::from_value(json!({
            "name": "PCMU", "mimeType": "audio/PCMU", "kind": "audio", "clockRate": 8000, "preferredPayloadType": 0
        }))
        .unwrap(),
    );
    let responder = responder_with(
        RequestMethod::QueryRoom,
        json!({
            "rtpCapabilities": room_capabilities,
            "mandatoryCodecPayloadTypes": [100, 0],
        }),
    );
    let t = new_room(SettingEngine::default(), responder);

    let err = t.room.join("alice", Value::Null).await.err().unwrap();

    match &err {
        Error::ErrUnsupportedCodecs { codecs } => {
            assert_eq!(codecs.len(), 1);
            assert_eq!(codecs[0].mime_type, "audio/PCMU");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_unsupported());
    assert_eq!(t.room.state(), RoomState::New, "failed join reverts to new");
    assert_eq!(sent_methods(&t.messages), vec!["queryRoom"]);

    Ok(())
}

#[tokio::test]
async fn test_room_join_failures_revert_state() -> Result<()> {
    let join_rejected: Responder = Arc::new(|request: &Request| {
        let response = if request.method == RequestMethod::Join {
            Response::error(request.id, 403, "room full")
        } else {
            default_response(request)
        };
        Some((response, Duration::ZERO))
    });
    let tests: Vec<(&str, Responder, Error)> = vec![
        (
            "mandatory codec not advertised",
            responder_with(
                RequestMethod::QueryRoom,
                json!({ "rtpCapabilities": room_capabilities(), "mandatoryCodecPayloadTypes": [77] }),
            ),
            Error::ErrMandatoryCodecNotFound(77),
        ),
        (
            "join rejected",
            join_rejected,
            Error::ErrRequestFailed("room full".to_owned()),
        ),
    ];

    for (name, responder, expected) in tests {
        let t = new_room(SettingEngine::default(), responder);
        assert_eq!(
            t.room.join("alice", Value::Null).await.err(),
            Some(expected),
            "testCase: {name}"
        );
        assert_eq!(t.room.state(), RoomState::New, "testCase: {name}");
    }

    Ok(())
}

#[tokio::test]
async fn test_room_join_timeout() -> Result<()> {
    let mut s = SettingEngine::default();
    s.set_request_timeout(Duration::from_millis(50));
    let silent: Responder = Arc::new(|_: &Request| -> Option<(Response, Duration)> { None });
    let t = new_room(s, silent);

    let err = t.room.join("alice", Value::Null).await.err().unwrap();
    assert!(err.is_timeout());
    assert_eq!(t.room.state(), RoomState::New);

    Ok(())
}

#[tokio::test]
async fn test_room_requires_join() -> Result<()> {
    let t = new_room(SettingEngine::default(), default_responder());

    assert_eq!(
        t.room
            .create_transport(TransportDirection::Send, Value::Null)
            .await
            .err(),
        Some(Error::ErrRoomNotJoined)
    );
    let track = Arc::new(TrackSimple::new(MediaKind::Audio, "mic"));
    assert_eq!(
        t.room
            .create_producer(track, ProducerOptions::default(), Value::Null)
            .await
            .err(),
        Some(Error::ErrRoomNotJoined)
    );
    assert_eq!(t.room.restart_ice().await, Err(Error::ErrRoomNotJoined));

    Ok(())
}

#[tokio::test]
async fn test_room_create_producer_checks() -> Result<()> {
    let t = joined_room().await?;

    let ended = Arc::new(TrackSimple::new(MediaKind::Audio, "ended"));
    ended.stop();
    assert_eq!(
        t.room
            .create_producer(ended, ProducerOptions::default(), Value::Null)
            .await
            .err(),
        Some(Error::ErrTrackEnded)
    );

    let producer = t
        .room
        .create_producer(
            Arc::new(TrackSimple::new(MediaKind::Video, "cam")),
            ProducerOptions::default(),
            json!({ "source": "webcam" }),
        )
        .await?;
    assert_eq!(t.room.producers().await.len(), 1);
    assert!(t.room.get_producer_by_id(producer.id()).await.is_some());

    producer.close(Value::Null).await;
    assert!(t.room.producers().await.is_empty(), "closed producers leave the room");

    let mut s = SettingEngine::default();
    s.set_spy(true);
    let spy = new_room(s, default_responder());
    spy.room.join("eve", Value::Null).await?;
    assert_eq!(
        spy.room
            .create_producer(
                Arc::new(TrackSimple::new(MediaKind::Audio, "mic")),
                ProducerOptions::default(),
                Value::Null,
            )
            .await
            .err(),
        Some(Error::ErrSpyCannotProduce)
    );
    assert_eq!(sent(&spy.messages)[1].1["spy"], json!(true));

    Ok(())
}

#[tokio::test]
async fn test_room_cannot_send_kind() -> Result<()> {
    let mut audio_only = room_capabilities();
    audio_only.codecs.retain(|c| c.kind == MediaKind::Audio);
    let responder = responder_with(
        RequestMethod::QueryRoom,
        json!({ "rtpCapabilities": audio_only }),
    );
    let t = new_room(SettingEngine::default(), responder);
    t.room.join("alice", Value::Null).await?;

    assert!(!t.room.can_send(MediaKind::Video));
    let err = t
        .room
        .create_producer(
            Arc::new(TrackSimple::new(MediaKind::Video, "cam")),
            ProducerOptions::default(),
            Value::Null,
        )
        .await
        .err();
    assert_eq!(err, Some(Error::ErrCannotSend(MediaKind::Video)));

    Ok(())
}

#[tokio::test]
async fn test_room_transports() -> Result<()> {
    let t = joined_room().await?;

    let send = t
        .room
        .create_transport(TransportDirection::Send, Value::Null)
        .await?;
    let recv = t
        .room
        .create_transport(TransportDirection::Recv, Value::Null)
        .await?;
    assert_eq!(t.room.transports().await.len(), 2);
    assert_eq!(t.device.handlers.lock().unwrap().len(), 2);

    send.close(Value::Null).await;
    assert!(t.room.get_transport_by_id(send.id()).await.is_none());

    notify(&t.room, "transportClosed", json!({ "id": recv.id() })).await?;
    assert!(recv.closed());
    assert!(t.room.transports().await.is_empty());
    assert_eq!(t.device.calls(), vec!["close", "remoteClosed"]);

    Ok(())
}

#[tokio::test]
async fn test_room_peer_notifications() -> Result<()> {
    let mut t = joined_room().await?;

    notify(
        &t.room,
        "newPeer",
        json!({ "name": "bob", "appData": {}, "consumers": [ consumer_data(1, "bob", 100) ] }),
    )
    .await?;
    assert_eq!(drain(&mut t.events_rx), vec!["newpeer:bob"]);
    let bob = t.room.get_peer_by_name("bob").await.unwrap();

    notify(&t.room, "newConsumer", consumer_data(2, "bob", 100)).await?;
    assert_eq!(bob.consumers().await.len(), 2);

    notify(&t.room, "consumerPaused", json!({ "id": 2, "peerName": "bob" })).await?;
    let consumer = bob.get_consumer_by_id(2).await.unwrap();
    assert!(consumer.remotely_paused());

    notify(&t.room, "consumerResumed", json!({ "id": 2, "peerName": "bob" })).await?;
    assert!(!consumer.paused());

    notify(
        &t.room,
        "consumerPreferredProfileSet",
        json!({ "id": 2, "peerName": "bob", "profile": "low" }),
    )
    .await?;
    assert_eq!(consumer.preferred_profile().await, ConsumerProfile::Low);

    notify(
        &t.room,
        "consumerEffectiveProfileChanged",
        json!({ "id": 2, "peerName": "bob", "profile": "high" }),
    )
    .await?;
    assert_eq!(consumer.effective_profile().await, Some(ConsumerProfile::High));

    notify(&t.room, "consumerClosed", json!({ "id": 2, "peerName": "bob" })).await?;
    assert!(consumer.closed());
    assert!(bob.get_consumer_by_id(2).await.is_none());

    notify(&t.room, "peerClosed", json!({ "name": "bob" })).await?;
    assert!(bob.closed());
    assert!(t.room.peers().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_room_notification_errors_are_contained() -> Result<()> {
    let t = joined_room().await?;

    let tests = vec![
        ("unknownMethod", json!({})),
        ("producerPaused", json!({ "id": 1 })),
        ("peerClosed", json!({ "name": "nobody" })),
        ("consumerClosed", json!({ "peerName": "nobody" })),
        ("newConsumer", consumer_data(3, "nobody", 100)),
    ];

    for (method, data) in tests {
        assert_eq!(notify(&t.room, method, data).await, Ok(()), "testCase: {method}");
    }
    assert!(t.room.joined());

    let mut not_a_notification = Notification::new("closed", Value::Null);
    not_a_notification.notification = false;
    assert_eq!(
        t.room.receive_notification(not_a_notification).await,
        Err(Error::ErrNotANotification)
    );

    Ok(())
}

#[tokio::test]
async fn test_room_producer_notifications() -> Result<()> {
    let t = joined_room().await?;
    let track = Arc::new(TrackSimple::new(MediaKind::Audio, "mic"));
    let producer = t
        .room
        .create_producer(
            Arc::clone(&track) as Arc<dyn MediaStreamTrack>,
            ProducerOptions::default(),
            Value::Null,
        )
        .await?;
    let id = producer.id();

    notify(&t.room, "producerPaused", json!({ "id": id })).await?;
    assert!(producer.remotely_paused());
    assert!(!track.enabled());

    notify(&t.room, "producerResumed", json!({ "id": id })).await?;
    assert!(track.enabled());

    notify(&t.room, "producerClosed", json!({ "id": id, "appData": { "why": "admin" } })).await?;
    assert!(producer.closed());
    assert!(t.room.producers().await.is_empty());

    let closes: Vec<String> = sent_methods(&t.messages)
        .into_iter()
        .filter(|m| m == "closeProducer")
        .collect();
    assert!(closes.is_empty(), "remote close is not echoed back");

    Ok(())
}

#[tokio::test]
async fn test_room_remote_closed() -> Result<()> {
    let mut t = joined_room().await?;
    let transport = t
        .room
        .create_transport(TransportDirection::Recv, Value::Null)
        .await?;
    notify(&t.room, "newPeer", json!({ "name": "bob" })).await?;
    drain(&mut t.events_rx);

    notify(&t.room, "closed", json!({ "appData": { "reason": "shutdown" } })).await?;

    assert!(t.room.closed());
    assert!(transport.closed());
    assert!(t.room.peers().await.is_empty());
    assert_eq!(drain(&mut t.events_rx), vec!["close:remote"]);

    assert_eq!(
        notify(&t.room, "newPeer", json!({ "name": "carol" })).await,
        Err(Error::ErrRoomClosed)
    );
    assert_eq!(
        t.room.join("alice", Value::Null).await.err(),
        Some(Error::ErrRoomClosed)
    );

    Ok(())
}

#[tokio::test]
async fn test_room_leave() -> Result<()> {
    let mut t = joined_room().await?;
    let transport = t
        .room
        .create_transport(TransportDirection::Send, Value::Null)
        .await?;
    let producer = t
        .room
        .create_producer(
            Arc::new(TrackSimple::new(MediaKind::Audio, "mic")),
            ProducerOptions::default(),
            Value::Null,
        )
        .await?;
    producer.send(&transport).await?;
    notify(&t.room, "newPeer", json!({ "name": "bob" })).await?;
    drain(&mut t.events_rx);

    t.room.leave(json!({ "reason": "bye" })).await;
    t.room.leave(Value::Null).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(t.room.state(), RoomState::Closed);
    assert!(transport.closed());
    assert!(producer.closed());
    assert!(t.room.transports().await.is_empty());
    assert!(t.room.producers().await.is_empty());
    assert!(t.room.peers().await.is_empty());
    assert_eq!(drain(&mut t.events_rx), vec!["close:local"]);

    let leaves: Vec<(String, Value)> = sent(&t.messages)
        .into_iter()
        .filter(|(m, _)| m == "leave")
        .collect();
    assert_eq!(leaves, vec![("leave".to_owned(), json!({ "appData": { "reason": "bye" } }))]);

    Ok(())
}

#[tokio::test]
async fn test_room_restart_ice() -> Result<()> {
    let t = joined_room().await?;
    let transport = t
        .room
        .create_transport(TransportDirection::Send, Value::Null)
        .await?;
    let producer = t
        .room
        .create_producer(
            Arc::new(TrackSimple::new(MediaKind::Audio, "mic")),
            ProducerOptions::default(),
            Value::Null,
        )
        .await?;
    producer.send(&transport).await?;

    t.room.restart_ice().await?;

    assert_eq!(
        t.device.calls().last().map(String::as_str),
        Some("restartIce:restarted")
    );

    Ok(())
}
