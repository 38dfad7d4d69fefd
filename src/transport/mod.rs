
pub mod connection_state;
pub mod transport_parameters;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use connection_state::ConnectionState;
use portable_atomic::{AtomicBool, AtomicU8};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Duration;
use transport_parameters::*;

use crate::api::setting_engine::SettingEngine;
use crate::command_queue::{CommandExecutor, CommandQueue};
use crate::consumer::consumer_profile::ConsumerProfile;
use crate::consumer::Consumer;
use crate::error::{Error, Result};
use crate::handler::{Device, Handler, HandlerListener};
use crate::originator::Originator;
use crate::producer::Producer;
use crate::rtp_parameters::{ExtendedRtpCapabilities, RtpParameters};
use crate::signaling::{NotifyMethod, RequestMethod, Signaler};
use crate::track::MediaStreamTrack;
use crate::OnCloseHookFn;

/// Stats intervals below this value fall back to it.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_millis(1000);

pub(crate) fn normalize_stats_interval(interval: Duration) -> Duration {
    if interval < DEFAULT_STATS_INTERVAL {
        DEFAULT_STATS_INTERVAL
    } else {
        interval
    }
}

/// TransportDirection is fixed at creation: a transport either only sends
/// (producers) or only receives (consumers).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

const TRANSPORT_DIRECTION_SEND_STR: &str = "send";
const TRANSPORT_DIRECTION_RECV_STR: &str = "recv";

impl FromStr for TransportDirection {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            TRANSPORT_DIRECTION_SEND_STR => Ok(TransportDirection::Send),
            TRANSPORT_DIRECTION_RECV_STR => Ok(TransportDirection::Recv),
            _ => Err(Error::ErrInvalidDirection(raw.to_owned())),
        }
    }
}

impl fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TransportDirection::Send => write!(f, "{TRANSPORT_DIRECTION_SEND_STR}"),
            TransportDirection::Recv => write!(f, "{TRANSPORT_DIRECTION_RECV_STR}"),
        }
    }
}

/// Trait for handling transport events asynchronously. All methods have
/// default no-op implementations.
#[async_trait]
pub trait TransportEventHandler: Send + Sync + 'static {
    /// Called once when the transport is closed, locally or by the router.
    async fn on_close(&self, _originator: Originator, _app_data: Value) {}

    /// Called when the handler reports a new connection state
    async fn on_connection_state_change(&self, _state: ConnectionState) {}

    /// Called with the stats the router periodically pushes
    async fn on_stats(&self, _stats: Value) {}
}

/// Commands serialized through the transport command queue.
pub(crate) enum TransportCommand {
    AddProducer(Arc<Producer>),
    RemoveProducer(Arc<Producer>),
    ReplaceProducerTrack(Arc<Producer>, Arc<dyn MediaStreamTrack>),
    AddConsumer(Arc<Consumer>),
    RemoveConsumer(Arc<Consumer>),
    RestartIce(IceParameters),
}

impl fmt::Display for TransportCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportCommand::AddProducer(_) => "addProducer",
            TransportCommand::RemoveProducer(_) => "removeProducer",
            TransportCommand::ReplaceProducerTrack(_, _) => "replaceProducerTrack",
            TransportCommand::AddConsumer(_) => "addConsumer",
            TransportCommand::RemoveConsumer(_) => "removeConsumer",
            TransportCommand::RestartIce(_) => "restartIce",
        };
        write!(f, "{s}")
    }
}

pub(crate) enum CommandOutput {
    Done,
    Track(Arc<dyn MediaStreamTrack>),
}

#[derive(Default, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnableConsumerResponse {
    #[serde(default)]
    paused: bool,
    #[serde(default)]
    preferred_profile: Option<ConsumerProfile>,
    #[serde(default)]
    effective_profile: Option<ConsumerProfile>,
}

/// A producer the router knows about, with the pause state it was last told.
struct SentProducer {
    producer: Weak<Producer>,
    paused: bool,
}

/// A consumer the router enabled, with the state it was last told.
struct EnabledConsumer {
    consumer: Weak<Consumer>,
    paused: bool,
    preferred_profile: ConsumerProfile,
}

/// Transport is the negotiated channel producers are sent over or consumers
/// are received from. Every handler-touching operation goes through its
/// command queue, so the handler never sees two of them at once.
pub struct Transport {
    id: u32,
    direction: TransportDirection,
    app_data: Value,
    setting_engine: Arc<SettingEngine>,
    signaler: Arc<Signaler>,
    handler: OnceLock<Arc<dyn Handler>>,
    command_queue: CommandQueue<TransportCommand, CommandOutput>,

    closed: AtomicBool,
    connection_state: AtomicU8,
    stats_enabled: AtomicBool,

    producers: Mutex<HashMap<u32, SentProducer>>,
    consumers: Mutex<HashMap<u32, EnabledConsumer>>,
    // ids currently held by the handler
    handler_producers: Mutex<HashSet<u32>>,
    handler_consumers: Mutex<HashSet<u32>>,

    event_handler: ArcSwapOption<Box<dyn TransportEventHandler>>,
    close_hooks: Mutex<Vec<OnCloseHookFn>>,
}

impl Transport {
    pub(crate) fn new(
        direction: TransportDirection,
        extended_rtp_capabilities: &ExtendedRtpCapabilities,
        setting_engine: Arc<SettingEngine>,
        signaler: Arc<Signaler>,
        device: &Arc<dyn Device>,
        app_data: Value,
    ) -> Result<Arc<Self>> {
        let transport = Arc::new_cyclic(|weak: &Weak<Transport>| {
            let executor: Weak<dyn CommandExecutor<TransportCommand, CommandOutput>> =
                weak.clone();

            Transport {
                id: crate::random_id(),
                direction,
                app_data,
                setting_engine,
                signaler,
                handler: OnceLock::new(),
                command_queue: CommandQueue::new(executor),
                closed: AtomicBool::new(false),
                connection_state: AtomicU8::new(ConnectionState::New as u8),
                stats_enabled: AtomicBool::new(false),
                producers: Mutex::new(HashMap::new()),
                consumers: Mutex::new(HashMap::new()),
                handler_producers: Mutex::new(HashSet::new()),
                handler_consumers: Mutex::new(HashSet::new()),
                event_handler: ArcSwapOption::empty(),
                close_hooks: Mutex::new(vec![]),
            }
        });

        let weak: Weak<Transport> = Arc::downgrade(&transport);
        let listener: Weak<dyn HandlerListener> = weak;
        let handler = device.create_handler(
            direction,
            extended_rtp_capabilities,
            &transport.setting_engine,
            listener,
        )?;
        let _ = transport.handler.set(handler);

        log::debug!(
            "transport created [id:{}, direction:{}]",
            transport.id,
            direction
        );

        Ok(transport)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn direction(&self) -> TransportDirection {
        self.direction
    }

    pub fn app_data(&self) -> &Value {
        &self.app_data
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state.load(Ordering::SeqCst).into()
    }

    pub fn stats_enabled(&self) -> bool {
        self.stats_enabled.load(Ordering::SeqCst)
    }

    /// set_event_handler sets the sink for this transport's events,
    /// replacing any previous one.
    pub fn set_event_handler(&self, handler: Box<dyn TransportEventHandler>) {
        self.event_handler.store(Some(Arc::new(handler)));
    }

    pub(crate) async fn on_close_hook(&self, f: OnCloseHookFn) {
        let mut close_hooks = self.close_hooks.lock().await;
        close_hooks.push(f);
    }

    fn handler(&self) -> Result<Arc<dyn Handler>> {
        self.handler.get().cloned().ok_or(Error::ErrTransportClosed)
    }

    /// close closes the transport locally and tells the router. Producers
    /// and consumers it was carrying are not closed, they become unhandled.
    pub async fn close(&self, app_data: Value) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::debug!("close() [id:{}]", self.id);

        if self.stats_enabled.swap(false, Ordering::SeqCst) {
            self.notify(NotifyMethod::DisableTransportStats, json!({ "id": self.id }))
                .await;
        }

        self.notify(
            NotifyMethod::CloseTransport,
            json!({ "id": self.id, "appData": app_data }),
        )
        .await;

        self.command_queue.close();
        if let Ok(handler) = self.handler() {
            handler.close().await;
        }

        self.finish_close(Originator::Local, app_data).await;
    }

    /// remote_close closes the transport because the router did. With
    /// `destroy` the handler is torn down, otherwise it is only told.
    pub async fn remote_close(&self, app_data: Value, destroy: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::debug!("remote_close() [id:{}, destroy:{}]", self.id, destroy);

        self.stats_enabled.store(false, Ordering::SeqCst);
        self.command_queue.close();
        if let Ok(handler) = self.handler() {
            if destroy {
                handler.close().await;
            } else {
                handler.remote_closed().await;
            }
        }

        self.finish_close(Originator::Remote, app_data).await;
    }

    async fn finish_close(&self, originator: Originator, app_data: Value) {
        let producers: Vec<Arc<Producer>> = {
            let mut producers = self.producers.lock().await;
            producers
                .drain()
                .filter_map(|(_, sent)| sent.producer.upgrade())
                .collect()
        };
        for producer in producers {
            producer.transport_closed(self.id).await;
        }

        let consumers: Vec<Arc<Consumer>> = {
            let mut consumers = self.consumers.lock().await;
            consumers
                .drain()
                .filter_map(|(_, enabled)| enabled.consumer.upgrade())
                .collect()
        };
        for consumer in consumers {
            consumer.transport_closed(self.id).await;
        }

        let close_hooks: Vec<OnCloseHookFn> = {
            let mut close_hooks = self.close_hooks.lock().await;
            close_hooks.drain(..).collect()
        };
        for f in close_hooks {
            f().await;
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_close(originator, app_data).await;
        }
    }

    /// restart_ice asks the router for new ICE parameters and hands them to
    /// the handler. Failures are logged.
    pub async fn restart_ice(&self) {
        if self.closed() {
            log::warn!("restart_ice() | transport closed [id:{}]", self.id);
            return;
        }
        if self.connection_state() == ConnectionState::New {
            log::debug!("restart_ice() | ignored, connection state is new");
            return;
        }

        let response = match self
            .signaler
            .request(RequestMethod::RestartTransport, json!({ "id": self.id }))
            .await
        {
            Ok(response) => response,
            Err(err) => {
                log::error!("restart_ice() | restartTransport failed: {err}");
                return;
            }
        };

        let remote_ice_parameters: IceParameters =
            match serde_json::from_value(response["iceParameters"].clone()) {
                Ok(ice_parameters) => ice_parameters,
                Err(err) => {
                    log::error!("restart_ice() | invalid iceParameters: {err}");
                    return;
                }
            };

        if let Err(err) = self
            .command_queue
            .push(TransportCommand::RestartIce(remote_ice_parameters))
            .await
        {
            log::error!("restart_ice() | handler failed: {err}");
        }
    }

    pub async fn enable_stats(&self, interval: Duration) {
        if self.closed() {
            log::error!("enable_stats() | transport closed [id:{}]", self.id);
            return;
        }

        let interval = normalize_stats_interval(interval);
        self.stats_enabled.store(true, Ordering::SeqCst);
        self.notify(
            NotifyMethod::EnableTransportStats,
            json!({ "id": self.id, "interval": interval.as_millis() as u64 }),
        )
        .await;
    }

    pub async fn disable_stats(&self) {
        if self.closed() {
            log::error!("disable_stats() | transport closed [id:{}]", self.id);
            return;
        }

        self.stats_enabled.store(false, Ordering::SeqCst);
        self.notify(NotifyMethod::DisableTransportStats, json!({ "id": self.id }))
            .await;
    }

    pub(crate) async fn remote_stats(&self, stats: Value) {
        if let Some(handler) = self.event_handler.load_full() {
            handler.on_stats(stats).await;
        }
    }

    pub(crate) async fn add_producer(&self, producer: Arc<Producer>) -> Result<()> {
        if self.closed() {
            return Err(Error::ErrTransportClosed);
        }
        if self.direction != TransportDirection::Send {
            return Err(Error::ErrNotASendingTransport);
        }

        self.command_queue
            .push(TransportCommand::AddProducer(producer))
            .await?;

        if self.closed() {
            return Err(Error::ErrTransportClosed);
        }

        Ok(())
    }

    /// remove_producer tells the router (for local closes of producers it
    /// knows about) and queues the handler removal without waiting for it.
    pub(crate) async fn remove_producer(
        &self,
        producer: &Arc<Producer>,
        originator: Originator,
        app_data: Value,
    ) {
        log::debug!("remove_producer() [id:{}]", producer.id());

        let registered = {
            let mut producers = self.producers.lock().await;
            producers.remove(&producer.id()).is_some()
        };

        if registered && originator == Originator::Local {
            self.notify(
                NotifyMethod::CloseProducer,
                json!({ "id": producer.id(), "appData": app_data }),
            )
            .await;
        }

        if !self.closed() {
            let removal = self
                .command_queue
                .push(TransportCommand::RemoveProducer(Arc::clone(producer)));
            tokio::spawn(async move {
                if let Err(err) = removal.await {
                    log::debug!("removeProducer command failed: {err}");
                }
            });
        }
    }

    pub(crate) async fn replace_producer_track(
        &self,
        producer: Arc<Producer>,
        track: Arc<dyn MediaStreamTrack>,
    ) -> Result<()> {
        if self.closed() {
            return Err(Error::ErrTransportClosed);
        }

        self.command_queue
            .push(TransportCommand::ReplaceProducerTrack(producer, track))
            .await?;

        Ok(())
    }

    /// sync_producer_paused tells the router about a local pause or resume
    /// it has not heard yet. Producers the router does not know about are
    /// skipped, createProducer carries their state.
    pub(crate) async fn sync_producer_paused(&self, producer: &Producer, app_data: Value) {
        let mut producers = self.producers.lock().await;
        let Some(sent) = producers.get_mut(&producer.id()) else {
            return;
        };

        let paused = producer.locally_paused();
        if sent.paused == paused {
            return;
        }
        sent.paused = paused;

        let method = if paused {
            NotifyMethod::PauseProducer
        } else {
            NotifyMethod::ResumeProducer
        };
        self.notify(method, json!({ "id": producer.id(), "appData": app_data }))
            .await;
    }

    async fn producer_registered(&self, producer: &Producer) -> bool {
        self.producers.lock().await.contains_key(&producer.id())
    }

    pub(crate) async fn enable_producer_stats(&self, producer: &Producer, interval: Duration) {
        if !self.producer_registered(producer).await {
            return;
        }
        self.notify(
            NotifyMethod::EnableProducerStats,
            json!({ "id": producer.id(), "interval": interval.as_millis() as u64 }),
        )
        .await;
    }

    pub(crate) async fn disable_producer_stats(&self, producer: &Producer) {
        if !self.producer_registered(producer).await {
            return;
        }
        self.notify(
            NotifyMethod::DisableProducerStats,
            json!({ "id": producer.id() }),
        )
        .await;
    }

    pub(crate) async fn add_consumer(
        &self,
        consumer: Arc<Consumer>,
    ) -> Result<Arc<dyn MediaStreamTrack>> {
        if self.closed() {
            return Err(Error::ErrTransportClosed);
        }
        if self.direction != TransportDirection::Recv {
            return Err(Error::ErrNotAReceivingTransport);
        }
        if !consumer.supported() {
            return Err(Error::ErrConsumerNotSupported);
        }

        let track = match self
            .command_queue
            .push(TransportCommand::AddConsumer(consumer))
            .await?
        {
            CommandOutput::Track(track) => track,
            CommandOutput::Done => return Err(Error::ErrUnknownType),
        };

        if self.closed() {
            return Err(Error::ErrTransportClosed);
        }

        Ok(track)
    }

    /// remove_consumer queues the handler removal without waiting for it.
    /// Consumers belong to the router, so nothing is notified.
    pub(crate) async fn remove_consumer(&self, consumer: &Arc<Consumer>) {
        log::debug!("remove_consumer() [id:{}]", consumer.id());

        {
            let mut consumers = self.consumers.lock().await;
            consumers.remove(&consumer.id());
        }

        if !self.closed() {
            let removal = self
                .command_queue
                .push(TransportCommand::RemoveConsumer(Arc::clone(consumer)));
            tokio::spawn(async move {
                if let Err(err) = removal.await {
                    log::debug!("removeConsumer command failed: {err}");
                }
            });
        }
    }

    /// sync_consumer_paused is the consumer side of
    /// [`Transport::sync_producer_paused`].
    pub(crate) async fn sync_consumer_paused(&self, consumer: &Consumer, app_data: Value) {
        let mut consumers = self.consumers.lock().await;
        let Some(enabled) = consumers.get_mut(&consumer.id()) else {
            return;
        };

        let paused = consumer.locally_paused();
        if enabled.paused == paused {
            return;
        }
        enabled.paused = paused;

        let method = if paused {
            NotifyMethod::PauseConsumer
        } else {
            NotifyMethod::ResumeConsumer
        };
        self.notify(method, json!({ "id": consumer.id(), "appData": app_data }))
            .await;
    }

    pub(crate) async fn sync_consumer_preferred_profile(&self, consumer: &Consumer) {
        let mut consumers = self.consumers.lock().await;
        let Some(enabled) = consumers.get_mut(&consumer.id()) else {
            return;
        };

        let profile = consumer.preferred_profile().await;
        if enabled.preferred_profile == profile {
            return;
        }
        enabled.preferred_profile = profile;

        self.notify(
            NotifyMethod::SetConsumerPreferredProfile,
            json!({ "id": consumer.id(), "profile": profile }),
        )
        .await;
    }

    /// consumer_preferred_profile_set records a profile the router chose on
    /// its own, so it is not echoed back.
    pub(crate) async fn consumer_preferred_profile_set(
        &self,
        consumer: &Consumer,
        profile: ConsumerProfile,
    ) {
        let mut consumers = self.consumers.lock().await;
        if let Some(enabled) = consumers.get_mut(&consumer.id()) {
            enabled.preferred_profile = profile;
        }
    }

    async fn consumer_registered(&self, consumer: &Consumer) -> bool {
        self.consumers.lock().await.contains_key(&consumer.id())
    }

    pub(crate) async fn enable_consumer_stats(&self, consumer: &Consumer, interval: Duration) {
        if !self.consumer_registered(consumer).await {
            return;
        }
        self.notify(
            NotifyMethod::EnableConsumerStats,
            json!({ "id": consumer.id(), "interval": interval.as_millis() as u64 }),
        )
        .await;
    }

    pub(crate) async fn disable_consumer_stats(&self, consumer: &Consumer) {
        if !self.consumer_registered(consumer).await {
            return;
        }
        self.notify(
            NotifyMethod::DisableConsumerStats,
            json!({ "id": consumer.id() }),
        )
        .await;
    }

    async fn notify(&self, method: NotifyMethod, data: Value) {
        if let Err(err) = self.signaler.notify(method, data).await {
            log::warn!("notify {method} failed [transport:{}]: {err}", self.id);
        }
    }

    async fn rollback_producer(&self, handler: &Arc<dyn Handler>, producer: &Producer) {
        if !self.handler_producers.lock().await.remove(&producer.id()) {
            return;
        }
        if let Err(err) = handler.remove_producer(producer).await {
            log::warn!("addProducer rollback failed: {err}");
        }
    }

    async fn rollback_consumer(&self, handler: &Arc<dyn Handler>, consumer: &Consumer) {
        if !self.handler_consumers.lock().await.remove(&consumer.id()) {
            return;
        }
        if let Err(err) = handler.remove_consumer(consumer).await {
            log::warn!("addConsumer rollback failed: {err}");
        }
    }

    async fn exec_add_producer(&self, producer: &Arc<Producer>) -> Result<()> {
        let handler = self.handler()?;
        let rtp_parameters = handler.add_producer(producer).await?;
        self.handler_producers.lock().await.insert(producer.id());

        if producer.closed() {
            self.rollback_producer(&handler, producer).await;
            return Err(Error::ErrProducerClosed);
        }

        // Pause state is taken now, not when the command was queued.
        let paused = producer.locally_paused();
        let data = json!({
            "id": producer.id(),
            "kind": producer.kind(),
            "transportId": self.id,
            "rtpParameters": rtp_parameters,
            "paused": paused,
            "appData": producer.app_data(),
        });

        if let Err(err) = self
            .signaler
            .request(RequestMethod::CreateProducer, data)
            .await
        {
            self.rollback_producer(&handler, producer).await;
            return Err(err);
        }

        if self.closed() {
            return Err(Error::ErrTransportClosed);
        }

        producer.set_rtp_parameters(rtp_parameters).await;
        {
            let mut producers = self.producers.lock().await;
            producers.insert(
                producer.id(),
                SentProducer {
                    producer: Arc::downgrade(producer),
                    paused,
                },
            );
        }

        // Closed while createProducer was in flight: the router has it now.
        if producer.closed() {
            let registered = {
                let mut producers = self.producers.lock().await;
                producers.remove(&producer.id()).is_some()
            };
            if registered {
                self.notify(
                    NotifyMethod::CloseProducer,
                    json!({ "id": producer.id(), "appData": Value::Null }),
                )
                .await;
            }
            self.rollback_producer(&handler, producer).await;
            return Err(Error::ErrProducerClosed);
        }

        self.sync_producer_paused(producer, Value::Null).await;

        Ok(())
    }

    async fn exec_add_consumer(
        &self,
        consumer: &Arc<Consumer>,
    ) -> Result<Arc<dyn MediaStreamTrack>> {
        let handler = self.handler()?;
        let track = handler.add_consumer(consumer).await?;
        self.handler_consumers.lock().await.insert(consumer.id());

        if consumer.closed() {
            self.rollback_consumer(&handler, consumer).await;
            return Err(Error::ErrConsumerClosed);
        }

        let paused = consumer.locally_paused();
        let preferred_profile = consumer.preferred_profile().await;
        let data = json!({
            "id": consumer.id(),
            "transportId": self.id,
            "paused": paused,
            "preferredProfile": preferred_profile,
        });

        let response = match self
            .signaler
            .request(RequestMethod::EnableConsumer, data)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.rollback_consumer(&handler, consumer).await;
                return Err(err);
            }
        };

        let response: EnableConsumerResponse = if response.is_null() {
            EnableConsumerResponse::default()
        } else {
            match serde_json::from_value(response) {
                Ok(response) => response,
                Err(err) => {
                    self.rollback_consumer(&handler, consumer).await;
                    return Err(err.into());
                }
            }
        };

        if self.closed() {
            return Err(Error::ErrTransportClosed);
        }
        if consumer.closed() {
            self.rollback_consumer(&handler, consumer).await;
            return Err(Error::ErrConsumerClosed);
        }

        if response.paused {
            consumer.remote_pause(Value::Null).await;
        }
        if let Some(profile) = response.preferred_profile {
            consumer.remote_set_preferred_profile(profile).await;
        }
        if let Some(profile) = response.effective_profile {
            consumer.remote_effective_profile_changed(profile).await;
        }

        {
            let mut consumers = self.consumers.lock().await;
            consumers.insert(
                consumer.id(),
                EnabledConsumer {
                    consumer: Arc::downgrade(consumer),
                    paused,
                    preferred_profile: response.preferred_profile.unwrap_or(preferred_profile),
                },
            );
        }

        self.sync_consumer_paused(consumer, Value::Null).await;
        self.sync_consumer_preferred_profile(consumer).await;

        Ok(track)
    }
}

#[async_trait]
impl CommandExecutor<TransportCommand, CommandOutput> for Transport {
    async fn execute(&self, command: TransportCommand) -> Result<CommandOutput> {
        log::trace!("execute() [transport:{}, command:{}]", self.id, command);

        match command {
            TransportCommand::AddProducer(producer) => {
                self.exec_add_producer(&producer).await?;
                Ok(CommandOutput::Done)
            }
            TransportCommand::RemoveProducer(producer) => {
                if self.handler_producers.lock().await.remove(&producer.id()) {
                    self.handler()?.remove_producer(&producer).await?;
                }
                Ok(CommandOutput::Done)
            }
            TransportCommand::ReplaceProducerTrack(producer, track) => {
                self.handler()?
                    .replace_producer_track(&producer, track)
                    .await?;
                Ok(CommandOutput::Done)
            }
            TransportCommand::AddConsumer(consumer) => {
                let track = self.exec_add_consumer(&consumer).await?;
                Ok(CommandOutput::Track(track))
            }
            TransportCommand::RemoveConsumer(consumer) => {
                if self.handler_consumers.lock().await.remove(&consumer.id()) {
                    self.handler()?.remove_consumer(&consumer).await?;
                }
                Ok(CommandOutput::Done)
            }
            TransportCommand::RestartIce(remote_ice_parameters) => {
                self.handler()?.restart_ice(remote_ice_parameters).await?;
                Ok(CommandOutput::Done)
            }
        }
    }
}

#[async_trait]
impl HandlerListener for Transport {
    async fn on_connection_state_change(&self, state: ConnectionState) {
        let current = self.connection_state();
        if current == state || current == ConnectionState::Closed {
            return;
        }

        self.connection_state.store(state as u8, Ordering::SeqCst);
        log::debug!("connection state changed to {state} [transport:{}]", self.id);

        if self.closed() {
            return;
        }
        if let Some(handler) = self.event_handler.load_full() {
            handler.on_connection_state_change(state).await;
        }
    }

    async fn on_need_create_transport(
        &self,
        local_parameters: Option<LocalTransportParameters>,
    ) -> Result<RemoteTransportParameters> {
        let mut data = json!({
            "id": self.id,
            "direction": self.direction,
            "options": self.setting_engine.transport_options(),
            "appData": self.app_data,
        });
        if let Some(dtls_parameters) = local_parameters.and_then(|p| p.dtls_parameters) {
            data["dtlsParameters"] = serde_json::to_value(dtls_parameters)?;
        }
        if self.stats_enabled() {
            data["stats"] = Value::Bool(true);
        }

        let response = self
            .signaler
            .request(RequestMethod::CreateTransport, data)
            .await?;

        Ok(serde_json::from_value(response)?)
    }

    async fn on_need_update_transport(&self, local_parameters: LocalTransportParameters) {
        self.notify(
            NotifyMethod::UpdateTransport,
            json!({ "id": self.id, "dtlsParameters": local_parameters.dtls_parameters }),
        )
        .await;
    }

    async fn on_need_update_producer(&self, producer: &Producer, rtp_parameters: RtpParameters) {
        producer.set_rtp_parameters(rtp_parameters.clone()).await;
        self.notify(
            NotifyMethod::UpdateProducer,
            json!({ "id": producer.id(), "rtpParameters": rtp_parameters }),
        )
        .await;
    }
}
