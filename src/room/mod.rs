#[cfg(test)]
mod room_test;

pub mod room_state;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use portable_atomic::{AtomicBool, AtomicU8};
use room_state::RoomState;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::api::setting_engine::SettingEngine;
use crate::consumer::consumer_profile::ConsumerProfile;
use crate::consumer::Consumer;
use crate::error::{Error, Result};
use crate::handler::Device;
use crate::ortc;
use crate::originator::Originator;
use crate::peer::Peer;
use crate::producer::{Producer, ProducerOptions};
use crate::rtp_parameters::{
    ExtendedRtpCapabilities, MediaKind, PayloadType, RtpCapabilities, RtpParameters,
};
use crate::signaling::{MessageSender, Notification, NotifyMethod, RequestMethod, Response, Signaler};
use crate::track::MediaStreamTrack;
use crate::transport::{Transport, TransportDirection};

/// Trait for handling room events asynchronously. All methods have default
/// no-op implementations.
#[async_trait]
pub trait RoomEventHandler: Send + Sync + 'static {
    /// Called when the router announces a peer joining after us
    async fn on_new_peer(&self, _peer: Arc<Peer>) {}

    /// Called once when the room is left or closed by the router
    async fn on_close(&self, _originator: Originator, _app_data: Value) {}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRoomResponse {
    rtp_capabilities: RtpCapabilities,
    #[serde(default)]
    mandatory_codec_payload_types: Vec<PayloadType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinResponse {
    #[serde(default)]
    peers: Vec<PeerData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerData {
    name: String,
    #[serde(default)]
    app_data: Value,
    #[serde(default)]
    consumers: Vec<ConsumerData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumerData {
    id: u32,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    #[serde(default)]
    peer_name: Option<String>,
    #[serde(default)]
    paused: bool,
    #[serde(default)]
    preferred_profile: Option<ConsumerProfile>,
    #[serde(default)]
    effective_profile: Option<ConsumerProfile>,
    #[serde(default)]
    app_data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClosedData {
    #[serde(default)]
    app_data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityData {
    id: u32,
    #[serde(default)]
    app_data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsData {
    id: u32,
    #[serde(default)]
    peer_name: Option<String>,
    #[serde(default)]
    stats: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerClosedData {
    name: String,
    #[serde(default)]
    app_data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumerEntityData {
    id: u32,
    peer_name: String,
    #[serde(default)]
    app_data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumerProfileData {
    id: u32,
    peer_name: String,
    profile: ConsumerProfile,
}

fn parse<T: DeserializeOwned>(data: Value) -> Result<T> {
    Ok(serde_json::from_value(data)?)
}

/// Room is the entry point of a session: it joins the router, negotiates
/// capabilities and keeps track of transports, producers and remote peers.
pub struct Room {
    setting_engine: Arc<SettingEngine>,
    device: Arc<dyn Device>,
    signaler: Arc<Signaler>,

    state: AtomicU8,
    can_send_audio: AtomicBool,
    can_send_video: AtomicBool,
    peer_name: Mutex<Option<String>>,
    extended_rtp_capabilities: Mutex<Option<Arc<ExtendedRtpCapabilities>>>,
    rtp_capabilities: Mutex<Option<RtpCapabilities>>,

    transports: Arc<Mutex<HashMap<u32, Arc<Transport>>>>,
    producers: Arc<Mutex<HashMap<u32, Arc<Producer>>>>,
    peers: Arc<Mutex<HashMap<String, Arc<Peer>>>>,

    event_handler: ArcSwapOption<Box<dyn RoomEventHandler>>,
}

impl Room {
    pub(crate) fn new(
        setting_engine: Arc<SettingEngine>,
        device: Arc<dyn Device>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let signaler = Arc::new(Signaler::new(sender, setting_engine.request_timeout()));

        Room {
            setting_engine,
            device,
            signaler,
            state: AtomicU8::new(RoomState::New as u8),
            can_send_audio: AtomicBool::new(false),
            can_send_video: AtomicBool::new(false),
            peer_name: Mutex::new(None),
            extended_rtp_capabilities: Mutex::new(None),
            rtp_capabilities: Mutex::new(None),
            transports: Arc::new(Mutex::new(HashMap::new())),
            producers: Arc::new(Mutex::new(HashMap::new())),
            peers: Arc::new(Mutex::new(HashMap::new())),
            event_handler: ArcSwapOption::empty(),
        }
    }

    pub fn state(&self) -> RoomState {
        self.state.load(Ordering::SeqCst).into()
    }

    fn set_state(&self, state: RoomState) {
        log::debug!("room state changed to {state}");
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn joined(&self) -> bool {
        self.state() == RoomState::Joined
    }

    pub fn closed(&self) -> bool {
        self.state() == RoomState::Closed
    }

    pub fn setting_engine(&self) -> &SettingEngine {
        &self.setting_engine
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub async fn peer_name(&self) -> Option<String> {
        self.peer_name.lock().await.clone()
    }

    /// rtp_capabilities returns what this endpoint can receive in the room,
    /// known once joined.
    pub async fn rtp_capabilities(&self) -> Option<RtpCapabilities> {
        self.rtp_capabilities.lock().await.clone()
    }

    pub async fn extended_rtp_capabilities(&self) -> Option<Arc<ExtendedRtpCapabilities>> {
        self.extended_rtp_capabilities.lock().await.clone()
    }

    /// can_send reports whether media of `kind` can be produced. Always
    /// false before join.
    pub fn can_send(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.can_send_audio.load(Ordering::SeqCst),
            MediaKind::Video => self.can_send_video.load(Ordering::SeqCst),
        }
    }

    pub async fn transports(&self) -> Vec<Arc<Transport>> {
        let transports = self.transports.lock().await;
        transports.values().cloned().collect()
    }

    pub async fn get_transport_by_id(&self, id: u32) -> Option<Arc<Transport>> {
        let transports = self.transports.lock().await;
        transports.get(&id).cloned()
    }

    pub async fn producers(&self) -> Vec<Arc<Producer>> {
        let producers = self.producers.lock().await;
        producers.values().cloned().collect()
    }

    pub async fn get_producer_by_id(&self, id: u32) -> Option<Arc<Producer>> {
        let producers = self.producers.lock().await;
        producers.get(&id).cloned()
    }

    pub async fn peers(&self) -> Vec<Arc<Peer>> {
        let peers = self.peers.lock().await;
        peers.values().cloned().collect()
    }

    pub async fn get_peer_by_name(&self, name: &str) -> Option<Arc<Peer>> {
        let peers = self.peers.lock().await;
        peers.get(name).cloned()
    }

    pub fn set_event_handler(&self, handler: Box<dyn RoomEventHandler>) {
        self.event_handler.store(Some(Arc::new(handler)));
    }

    fn ensure_joined(&self) -> Result<()> {
        match self.state() {
            RoomState::Joined => Ok(()),
            RoomState::Closed => Err(Error::ErrRoomClosed),
            _ => Err(Error::ErrRoomNotJoined),
        }
    }

    async fn extended(&self) -> Result<Arc<ExtendedRtpCapabilities>> {
        self.extended_rtp_capabilities
            .lock()
            .await
            .clone()
            .ok_or(Error::ErrRoomNotJoined)
    }

    /// join negotiates capabilities with the router and enters the room as
    /// `peer_name`. It returns the peers already in the room. On failure
    /// the room goes back to `new` and join may be retried.
    pub async fn join(&self, peer_name: &str, app_data: Value) -> Result<Vec<Arc<Peer>>> {
        match self.state.compare_exchange(
            RoomState::New as u8,
            RoomState::Joining as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => log::debug!("join() [peer:{peer_name}]"),
            Err(current) => {
                return Err(if RoomState::from(current) == RoomState::Closed {
                    Error::ErrRoomClosed
                } else {
                    Error::ErrRoomAlreadyJoined
                });
            }
        }

        {
            let mut current = self.peer_name.lock().await;
            *current = Some(peer_name.to_owned());
        }

        match self.do_join(peer_name, app_data).await {
            Ok(peers) => {
                if self
                    .state
                    .compare_exchange(
                        RoomState::Joining as u8,
                        RoomState::Joined as u8,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_err()
                {
                    return Err(Error::ErrRoomClosed);
                }
                log::debug!("room state changed to {}", RoomState::Joined);
                Ok(peers)
            }
            Err(err) => {
                log::error!("join() failed: {err}");
                if !self.closed() {
                    self.set_state(RoomState::New);
                }
                Err(err)
            }
        }
    }

    async fn do_join(&self, peer_name: &str, app_data: Value) -> Result<Vec<Arc<Peer>>> {
        let response = self
            .signaler
            .request(RequestMethod::QueryRoom, json!({}))
            .await?;
        let query: QueryRoomResponse = parse(response)?;

        let native_rtp_capabilities = self.device.get_native_rtp_capabilities().await?;
        let extended = ortc::get_extended_rtp_capabilities(
            &native_rtp_capabilities,
            &query.rtp_capabilities,
        );

        let unsupported = ortc::get_unsupported_codecs(
            &query.rtp_capabilities,
            &query.mandatory_codec_payload_types,
            &extended,
        )?;
        if !unsupported.is_empty() {
            return Err(Error::ErrUnsupportedCodecs {
                codecs: unsupported,
            });
        }

        self.can_send_audio
            .store(ortc::can_send(MediaKind::Audio, &extended), Ordering::SeqCst);
        self.can_send_video
            .store(ortc::can_send(MediaKind::Video, &extended), Ordering::SeqCst);

        let rtp_capabilities = ortc::get_rtp_capabilities(&extended);
        {
            let mut current = self.rtp_capabilities.lock().await;
            *current = Some(rtp_capabilities.clone());
        }
        {
            let mut current = self.extended_rtp_capabilities.lock().await;
            *current = Some(Arc::new(extended));
        }

        let response = self
            .signaler
            .request(
                RequestMethod::Join,
                json!({
                    "peerName": peer_name,
                    "rtpCapabilities": rtp_capabilities,
                    "spy": self.setting_engine.spy(),
                    "appData": app_data,
                }),
            )
            .await?;
        let join: JoinResponse = if response.is_null() {
            JoinResponse::default()
        } else {
            parse(response)?
        };

        let mut peers = vec![];
        for peer_data in join.peers {
            match self.handle_peer_data(peer_data).await {
                Ok(peer) => peers.push(peer),
                Err(err) => log::error!("join() | error handling peer: {err}"),
            }
        }

        Ok(peers)
    }

    /// leave tells the router we leave and closes everything locally.
    pub async fn leave(&self, app_data: Value) {
        if self.closed() {
            return;
        }

        log::debug!("leave()");

        if let Err(err) = self
            .signaler
            .notify(NotifyMethod::Leave, json!({ "appData": app_data }))
            .await
        {
            log::warn!("leave() | notify failed: {err}");
        }

        self.shutdown(Originator::Local, app_data).await;
    }

    /// remote_close closes the room because the router closed it.
    pub async fn remote_close(&self, app_data: Value) {
        if self.closed() {
            return;
        }

        log::debug!("remote_close()");

        self.shutdown(Originator::Remote, app_data).await;
    }

    async fn shutdown(&self, originator: Originator, app_data: Value) {
        if RoomState::from(self.state.swap(RoomState::Closed as u8, Ordering::SeqCst))
            == RoomState::Closed
        {
            return;
        }

        self.signaler.close().await;

        let transports: Vec<Arc<Transport>> = {
            let mut transports = self.transports.lock().await;
            transports.drain().map(|(_, t)| t).collect()
        };
        for transport in transports {
            transport.remote_close(Value::Null, true).await;
        }

        let producers: Vec<Arc<Producer>> = {
            let mut producers = self.producers.lock().await;
            producers.drain().map(|(_, p)| p).collect()
        };
        for producer in producers {
            producer.remote_close(Value::Null).await;
        }

        let peers: Vec<Arc<Peer>> = {
            let mut peers = self.peers.lock().await;
            peers.drain().map(|(_, p)| p).collect()
        };
        for peer in peers {
            peer.remote_close(Value::Null).await;
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_close(originator, app_data).await;
        }
    }

    /// create_transport creates a transport in the given direction. The
    /// router side is only created once the transport is first used.
    pub async fn create_transport(
        &self,
        direction: TransportDirection,
        app_data: Value,
    ) -> Result<Arc<Transport>> {
        self.ensure_joined()?;
        let extended = self.extended().await?;

        let transport = Transport::new(
            direction,
            &extended,
            Arc::clone(&self.setting_engine),
            Arc::clone(&self.signaler),
            &self.device,
            app_data,
        )?;

        let id = transport.id();
        {
            let mut transports = self.transports.lock().await;
            transports.insert(id, Arc::clone(&transport));
        }

        let transports = Arc::clone(&self.transports);
        transport
            .on_close_hook(Box::new(move || {
                Box::pin(async move {
                    let mut transports = transports.lock().await;
                    transports.remove(&id);
                })
            }))
            .await;

        Ok(transport)
    }

    /// create_producer wraps `track` in a producer. The producer starts
    /// sending once [`Producer::send`] is called.
    pub async fn create_producer(
        &self,
        track: Arc<dyn MediaStreamTrack>,
        options: ProducerOptions,
        app_data: Value,
    ) -> Result<Arc<Producer>> {
        self.ensure_joined()?;
        if self.setting_engine.spy() {
            return Err(Error::ErrSpyCannotProduce);
        }
        if !self.can_send(track.kind()) {
            return Err(Error::ErrCannotSend(track.kind()));
        }
        if track.is_ended() {
            return Err(Error::ErrTrackEnded);
        }

        let producer = Arc::new(Producer::new(track, options, app_data));

        let id = producer.id();
        {
            let mut producers = self.producers.lock().await;
            producers.insert(id, Arc::clone(&producer));
        }

        let producers = Arc::clone(&self.producers);
        producer
            .on_close_hook(Box::new(move || {
                Box::pin(async move {
                    let mut producers = producers.lock().await;
                    producers.remove(&id);
                })
            }))
            .await;

        Ok(producer)
    }

    /// restart_ice restarts ICE on every transport of the room.
    pub async fn restart_ice(&self) -> Result<()> {
        self.ensure_joined()?;

        for transport in self.transports().await {
            transport.restart_ice().await;
        }

        Ok(())
    }

    /// receive_response hands a router response to the request waiting for
    /// it.
    pub async fn receive_response(&self, response: Response) {
        self.signaler.receive_response(response).await;
    }

    /// receive_notification applies a router notification. Failures while
    /// handling it are logged, only a closed room or a message which is not
    /// a notification is reported.
    pub async fn receive_notification(&self, notification: Notification) -> Result<()> {
        if self.closed() {
            return Err(Error::ErrRoomClosed);
        }
        if !notification.notification {
            return Err(Error::ErrNotANotification);
        }

        log::trace!("receive_notification() [method:{}]", notification.method);

        let data = notification.data_value();
        if let Err(err) = self.handle_notification(&notification.method, data).await {
            log::error!(
                "error handling notification [method:{}]: {err}",
                notification.method
            );
        }

        Ok(())
    }

    async fn handle_notification(&self, method: &str, data: Value) -> Result<()> {
        match method {
            "closed" => {
                let data: ClosedData = parse(data)?;
                self.remote_close(data.app_data).await;
            }
            "transportClosed" => {
                let data: EntityData = parse(data)?;
                let transport = self.transport(data.id).await?;
                transport.remote_close(data.app_data, false).await;
            }
            "transportStats" => {
                let data: StatsData = parse(data)?;
                let transport = self.transport(data.id).await?;
                transport.remote_stats(data.stats).await;
            }
            "newPeer" => {
                let data: PeerData = parse(data)?;
                let peer = self.handle_peer_data(data).await?;
                if let Some(handler) = self.event_handler.load_full() {
                    handler.on_new_peer(peer).await;
                }
            }
            "peerClosed" => {
                let data: PeerClosedData = parse(data)?;
                let peer = self.peer(&data.name).await?;
                peer.remote_close(data.app_data).await;
            }
            "producerPaused" => {
                let data: EntityData = parse(data)?;
                let producer = self.producer(data.id).await?;
                producer.remote_pause(data.app_data).await;
            }
            "producerResumed" => {
                let data: EntityData = parse(data)?;
                let producer = self.producer(data.id).await?;
                producer.remote_resume(data.app_data).await;
            }
            "producerClosed" => {
                let data: EntityData = parse(data)?;
                let producer = self.producer(data.id).await?;
                producer.remote_close(data.app_data).await;
            }
            "producerStats" => {
                let data: StatsData = parse(data)?;
                let producer = self.producer(data.id).await?;
                producer.remote_stats(data.stats).await;
            }
            "newConsumer" => {
                let data: ConsumerData = parse(data)?;
                let peer_name = data
                    .peer_name
                    .clone()
                    .ok_or_else(|| Error::ErrPeerNotFound(String::new()))?;
                let peer = self.peer(&peer_name).await?;
                self.handle_consumer_data(data, &peer).await?;
            }
            "consumerClosed" => {
                let data: ConsumerEntityData = parse(data)?;
                let consumer = self.consumer(&data.peer_name, data.id).await?;
                consumer.remote_close(data.app_data).await;
            }
            "consumerPaused" => {
                let data: ConsumerEntityData = parse(data)?;
                let consumer = self.consumer(&data.peer_name, data.id).await?;
                consumer.remote_pause(data.app_data).await;
            }
            "consumerResumed" => {
                let data: ConsumerEntityData = parse(data)?;
                let consumer = self.consumer(&data.peer_name, data.id).await?;
                consumer.remote_resume(data.app_data).await;
            }
            "consumerPreferredProfileSet" => {
                let data: ConsumerProfileData = parse(data)?;
                let consumer = self.consumer(&data.peer_name, data.id).await?;
                consumer.remote_set_preferred_profile(data.profile).await;
            }
            "consumerEffectiveProfileChanged" => {
                let data: ConsumerProfileData = parse(data)?;
                let consumer = self.consumer(&data.peer_name, data.id).await?;
                consumer.remote_effective_profile_changed(data.profile).await;
            }
            "consumerStats" => {
                let data: StatsData = parse(data)?;
                let peer_name = data.peer_name.unwrap_or_default();
                let consumer = self.consumer(&peer_name, data.id).await?;
                consumer.remote_stats(data.stats).await;
            }
            _ => return Err(Error::ErrUnknownNotification(method.to_owned())),
        }

        Ok(())
    }

    async fn transport(&self, id: u32) -> Result<Arc<Transport>> {
        self.get_transport_by_id(id)
            .await
            .ok_or_else(|| Error::ErrTransportNotFound(id.to_string()))
    }

    async fn producer(&self, id: u32) -> Result<Arc<Producer>> {
        self.get_producer_by_id(id)
            .await
            .ok_or_else(|| Error::ErrProducerNotFound(id.to_string()))
    }

    async fn peer(&self, name: &str) -> Result<Arc<Peer>> {
        self.get_peer_by_name(name)
            .await
            .ok_or_else(|| Error::ErrPeerNotFound(name.to_owned()))
    }

    async fn consumer(&self, peer_name: &str, id: u32) -> Result<Arc<Consumer>> {
        let peer = self.peer(peer_name).await?;
        peer.get_consumer_by_id(id)
            .await
            .ok_or_else(|| Error::ErrConsumerNotFound(id.to_string()))
    }

    async fn handle_peer_data(&self, data: PeerData) -> Result<Arc<Peer>> {
        let peer = {
            let mut peers = self.peers.lock().await;
            if peers.contains_key(&data.name) {
                return Err(Error::ErrPeerAlreadyExists(data.name));
            }
            let peer = Arc::new(Peer::new(data.name.clone(), data.app_data));
            peers.insert(data.name.clone(), Arc::clone(&peer));
            peer
        };

        let name = data.name;
        let peers = Arc::clone(&self.peers);
        peer.on_close_hook(Box::new(move || {
            Box::pin(async move {
                let mut peers = peers.lock().await;
                peers.remove(&name);
            })
        }))
        .await;

        for consumer_data in data.consumers {
            if let Err(err) = self.handle_consumer_data(consumer_data, &peer).await {
                log::error!("error handling consumer [peer:{}]: {err}", peer.name());
            }
        }

        Ok(peer)
    }

    async fn handle_consumer_data(&self, data: ConsumerData, peer: &Arc<Peer>) -> Result<()> {
        let extended = self.extended().await?;

        let consumer = Arc::new(Consumer::new(
            data.id,
            data.kind,
            data.rtp_parameters,
            peer.name().to_owned(),
            data.app_data,
        ));
        consumer.set_supported(ortc::can_receive(consumer.rtp_parameters(), &extended));

        if data.paused {
            consumer.remote_pause(Value::Null).await;
        }
        if let Some(profile) = data.preferred_profile {
            consumer.remote_set_preferred_profile(profile).await;
        }
        if let Some(profile) = data.effective_profile {
            consumer.remote_effective_profile_changed(profile).await;
        }

        peer.add_consumer(consumer).await
    }
}
