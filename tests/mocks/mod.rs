#![allow(dead_code)]

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Duration;

use room_client::api::setting_engine::SettingEngine;
use room_client::api::RoomBuilder;
use room_client::consumer::Consumer;
use room_client::error::{Error, Result};
use room_client::handler::{Device, Handler, HandlerListener};
use room_client::ortc;
use room_client::producer::Producer;
use room_client::room::Room;
use room_client::rtp_parameters::{ExtendedRtpCapabilities, RtpCapabilities, RtpParameters};
use room_client::signaling::{Message, Request, RequestMethod, Response};
use room_client::track::{MediaStreamTrack, TrackSimple};
use room_client::transport::transport_parameters::{
    DtlsParameters, DtlsRole, IceParameters, LocalTransportParameters,
};
use room_client::transport::TransportDirection;

/// Log is shared by the device, its handlers and the router so tests can
/// check how their calls interleave.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn entries(log: &Log, prefixes: &[&str]) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|entry| prefixes.iter().any(|p| entry.starts_with(p)))
        .cloned()
        .collect()
}

pub fn local_capabilities() -> RtpCapabilities {
    serde_json::from_value(json!({
        "codecs": [
            { "name": "opus", "mimeType": "audio/opus", "kind": "audio", "clockRate": 48000, "channels": 2, "preferredPayloadType": 111 },
            { "name": "VP8", "mimeType": "video/VP8", "kind": "video", "clockRate": 90000, "preferredPayloadType": 96 }
        ],
        "headerExtensions": [
            { "uri": "urn:ietf:params:rtp-hdrext:sdes:mid", "preferredId": 3 }
        ]
    }))
    .unwrap()
}

pub fn router_capabilities() -> Value {
    json!({
        "codecs": [
            { "name": "opus", "mimeType": "audio/opus", "kind": "audio", "clockRate": 48000, "channels": 2, "preferredPayloadType": 100 },
            { "name": "VP8", "mimeType": "video/VP8", "kind": "video", "clockRate": 90000, "preferredPayloadType": 101 }
        ],
        "headerExtensions": [
            { "uri": "urn:ietf:params:rtp-hdrext:sdes:mid", "preferredId": 1 }
        ]
    })
}

pub struct LoopbackDevice {
    log: Log,
}

impl LoopbackDevice {
    pub fn new(log: Log) -> Self {
        LoopbackDevice { log }
    }
}

#[async_trait]
impl Device for LoopbackDevice {
    fn name(&self) -> &str {
        "loopback"
    }

    async fn get_native_rtp_capabilities(&self) -> Result<RtpCapabilities> {
        Ok(local_capabilities())
    }

    fn create_handler(
        &self,
        direction: TransportDirection,
        extended_rtp_capabilities: &ExtendedRtpCapabilities,
        _settings: &SettingEngine,
        listener: Weak<dyn HandlerListener>,
    ) -> Result<Arc<dyn Handler>> {
        self.log.lock().unwrap().push(format!("createHandler:{direction}"));
        Ok(Arc::new(LoopbackHandler {
            extended_rtp_capabilities: extended_rtp_capabilities.clone(),
            listener,
            log: Arc::clone(&self.log),
            connected: tokio::sync::Mutex::new(false),
        }))
    }
}

pub struct LoopbackHandler {
    extended_rtp_capabilities: ExtendedRtpCapabilities,
    listener: Weak<dyn HandlerListener>,
    log: Log,
    connected: tokio::sync::Mutex<bool>,
}

impl LoopbackHandler {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    async fn connect(&self) -> Result<()> {
        let mut connected = self.connected.lock().await;
        if *connected {
            return Ok(());
        }

        let listener = self.listener.upgrade().ok_or(Error::ErrTransportClosed)?;
        listener
            .on_need_create_transport(Some(LocalTransportParameters {
                dtls_parameters: Some(DtlsParameters {
                    role: DtlsRole::Auto,
                    fingerprints: vec![],
                }),
            }))
            .await?;
        *connected = true;

        Ok(())
    }
}

#[async_trait]
impl Handler for LoopbackHandler {
    async fn add_producer(&self, producer: &Producer) -> Result<RtpParameters> {
        self.record(format!("addProducer:{}", producer.id()));
        self.connect().await?;
        Ok(ortc::get_sending_rtp_parameters(
            producer.kind(),
            &self.extended_rtp_capabilities,
        ))
    }

    async fn remove_producer(&self, producer: &Producer) -> Result<()> {
        self.record(format!("removeProducer:{}", producer.id()));
        Ok(())
    }

    async fn replace_producer_track(
        &self,
        producer: &Producer,
        track: Arc<dyn MediaStreamTrack>,
    ) -> Result<()> {
        self.record(format!("replaceProducerTrack:{}:{}", producer.id(), track.id()));
        Ok(())
    }

    async fn add_consumer(&self, consumer: &Consumer) -> Result<Arc<dyn MediaStreamTrack>> {
        self.record(format!("addConsumer:{}", consumer.id()));
        self.connect().await?;
        Ok(Arc::new(TrackSimple::new(
            consumer.kind(),
            format!("remote-{}", consumer.id()),
        )))
    }

    async fn remove_consumer(&self, consumer: &Consumer) -> Result<()> {
        self.record(format!("removeConsumer:{}", consumer.id()));
        Ok(())
    }

    async fn restart_ice(&self, remote_ice_parameters: IceParameters) -> Result<()> {
        self.record(format!("restartIce:{}", remote_ice_parameters.username_fragment));
        Ok(())
    }

    async fn close(&self) {
        self.record("close".to_owned());
    }

    async fn remote_closed(&self) {
        self.record("remoteClosed".to_owned());
    }
}

/// Router answers requests the way a real one would. `delay` lets a test
/// hold back single answers.
pub type Delay = Arc<dyn Fn(&Request) -> Duration + Send + Sync>;

pub fn no_delay() -> Delay {
    Arc::new(|_: &Request| Duration::ZERO)
}

pub fn answer(request: &Request, join_peers: &Value) -> Response {
    let data = match request.method {
        RequestMethod::QueryRoom => json!({
            "rtpCapabilities": router_capabilities(),
            "mandatoryCodecPayloadTypes": [],
        }),
        RequestMethod::Join => json!({ "peers": join_peers }),
        RequestMethod::CreateTransport => json!({
            "iceParameters": { "usernameFragment": "router", "password": "secret" },
            "iceCandidates": [
                { "foundation": "1", "priority": 1, "ip": "10.0.0.1", "protocol": "udp", "port": 40000, "type": "host" }
            ],
            "dtlsParameters": { "role": "server", "fingerprints": [] },
        }),
        RequestMethod::RestartTransport => json!({
            "iceParameters": { "usernameFragment": "router-2", "password": "secret-2" },
        }),
        RequestMethod::EnableConsumer => json!({ "paused": false }),
        RequestMethod::CreateProducer => Value::Null,
    };
    Response::success(request.id, data)
}

pub struct TestRoom {
    pub room: Arc<Room>,
    pub log: Log,
    pub messages: Arc<Mutex<Vec<Message>>>,
}

impl TestRoom {
    /// sent lists the outbound messages as `(method, data)` pairs.
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|message| match message {
                Message::Request(request) => (
                    request.method.to_string(),
                    Value::Object(request.data.clone()),
                ),
                Message::Notification(notification) => {
                    (notification.method.clone(), notification.data_value())
                }
            })
            .collect()
    }
}

/// new_room builds a room whose outbound messages are answered by a router
/// task through [`Room::receive_response`].
pub fn new_room(join_peers: Value, delay: Delay) -> Result<TestRoom> {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut s = SettingEngine::default();
    s.set_request_timeout(Duration::from_secs(2));

    let room = Arc::new(
        RoomBuilder::new()
            .with_setting_engine(s)
            .with_device(Arc::new(LoopbackDevice::new(Arc::clone(&log))))
            .with_message_sender(Arc::new(tx))
            .build()?,
    );

    let messages = Arc::new(Mutex::new(vec![]));
    let recorded = Arc::clone(&messages);
    let router_log = Arc::clone(&log);
    let weak_room = Arc::downgrade(&room);
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            recorded.lock().unwrap().push(message.clone());

            let Message::Request(request) = message else {
                continue;
            };
            let id = request.data.get("id").cloned().unwrap_or(Value::Null);
            router_log
                .lock()
                .unwrap()
                .push(format!("request:{}:{id}", request.method));

            let response = answer(&request, &join_peers);
            let wait = delay(&request);
            let weak_room = weak_room.clone();
            let router_log = Arc::clone(&router_log);
            tokio::spawn(async move {
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                router_log
                    .lock()
                    .unwrap()
                    .push(format!("response:{}:{id}", request.method));
                if let Some(room) = weak_room.upgrade() {
                    room.receive_response(response).await;
                }
            });
        }
    });

    Ok(TestRoom {
        room,
        log,
        messages,
    })
}
