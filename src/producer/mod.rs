
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use portable_atomic::{AtomicBool, AtomicU64};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use tokio::sync::Mutex;
use tokio::time::Duration;

use crate::error::{Error, Result};
use crate::originator::Originator;
use crate::rtp_parameters::{MediaKind, RtpParameters};
use crate::track::MediaStreamTrack;
use crate::transport::{normalize_stats_interval, Transport, DEFAULT_STATS_INTERVAL};
use crate::OnCloseHookFn;

/// SimulcastOptions carries the max bitrate of each simulcast layer. Layers
/// left unset are up to the handler.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulcastOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<u32>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulcast: Option<SimulcastOptions>,
}

/// Trait for handling producer events asynchronously. All methods have
/// default no-op implementations.
#[async_trait]
pub trait ProducerEventHandler: Send + Sync + 'static {
    async fn on_close(&self, _originator: Originator, _app_data: Value) {}

    async fn on_pause(&self, _originator: Originator, _app_data: Value) {}

    async fn on_resume(&self, _originator: Originator, _app_data: Value) {}

    /// Called once a transport started sending this producer
    async fn on_handled(&self) {}

    /// Called when the sending transport was closed under this producer.
    /// The producer stays open and may be sent again.
    async fn on_unhandled(&self) {}

    async fn on_stats(&self, _stats: Value) {}
}

/// Producer is a local track sent to the room.
pub struct Producer {
    id: u32,
    kind: MediaKind,
    original_track_id: SmolStr,
    options: ProducerOptions,
    app_data: Value,

    closed: AtomicBool,
    locally_paused: AtomicBool,
    remotely_paused: AtomicBool,
    stats_enabled: AtomicBool,
    stats_interval: AtomicU64,

    track: Mutex<Arc<dyn MediaStreamTrack>>,
    rtp_parameters: Mutex<Option<RtpParameters>>,
    transport: Mutex<Option<Arc<Transport>>>,

    event_handler: ArcSwapOption<Box<dyn ProducerEventHandler>>,
    close_hooks: Mutex<Vec<OnCloseHookFn>>,
}

impl Producer {
    pub(crate) fn new(
        track: Arc<dyn MediaStreamTrack>,
        options: ProducerOptions,
        app_data: Value,
    ) -> Self {
        track.set_enabled(true);

        Producer {
            id: crate::random_id(),
            kind: track.kind(),
            original_track_id: SmolStr::new(track.id()),
            options,
            app_data,
            closed: AtomicBool::new(false),
            locally_paused: AtomicBool::new(false),
            remotely_paused: AtomicBool::new(false),
            stats_enabled: AtomicBool::new(false),
            stats_interval: AtomicU64::new(DEFAULT_STATS_INTERVAL.as_millis() as u64),
            track: Mutex::new(track),
            rtp_parameters: Mutex::new(None),
            transport: Mutex::new(None),
            event_handler: ArcSwapOption::empty(),
            close_hooks: Mutex::new(vec![]),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// original_track_id is the id of the track the producer was created
    /// with, kept across track replacements.
    pub fn original_track_id(&self) -> &str {
        self.original_track_id.as_str()
    }

    pub fn options(&self) -> &ProducerOptions {
        &self.options
    }

    pub fn app_data(&self) -> &Value {
        &self.app_data
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn locally_paused(&self) -> bool {
        self.locally_paused.load(Ordering::SeqCst)
    }

    pub fn remotely_paused(&self) -> bool {
        self.remotely_paused.load(Ordering::SeqCst)
    }

    pub fn paused(&self) -> bool {
        self.locally_paused() || self.remotely_paused()
    }

    pub fn stats_enabled(&self) -> bool {
        self.stats_enabled.load(Ordering::SeqCst)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval.load(Ordering::SeqCst))
    }

    pub async fn track(&self) -> Arc<dyn MediaStreamTrack> {
        Arc::clone(&*self.track.lock().await)
    }

    /// rtp_parameters returns the parameters in use once a transport has
    /// sent the producer.
    pub async fn rtp_parameters(&self) -> Option<RtpParameters> {
        self.rtp_parameters.lock().await.clone()
    }

    pub(crate) async fn set_rtp_parameters(&self, rtp_parameters: RtpParameters) {
        let mut current = self.rtp_parameters.lock().await;
        *current = Some(rtp_parameters);
    }

    pub async fn transport(&self) -> Option<Arc<Transport>> {
        self.transport.lock().await.clone()
    }

    pub fn set_event_handler(&self, handler: Box<dyn ProducerEventHandler>) {
        self.event_handler.store(Some(Arc::new(handler)));
    }

    pub(crate) async fn on_close_hook(&self, f: OnCloseHookFn) {
        let mut close_hooks = self.close_hooks.lock().await;
        close_hooks.push(f);
    }

    /// send starts sending the producer over `transport`. On failure the
    /// producer is left unhandled and can be sent again.
    pub async fn send(self: &Arc<Self>, transport: &Arc<Transport>) -> Result<()> {
        if self.closed() {
            return Err(Error::ErrProducerClosed);
        }

        {
            let mut current = self.transport.lock().await;
            if current.is_some() {
                return Err(Error::ErrProducerAlreadyHandled);
            }
            *current = Some(Arc::clone(transport));
        }

        if let Err(err) = transport.add_producer(Arc::clone(self)).await {
            self.detach(transport.id()).await;
            return Err(err);
        }

        if self.closed() {
            return Err(Error::ErrProducerClosed);
        }

        if self.stats_enabled() {
            transport
                .enable_producer_stats(self, self.stats_interval())
                .await;
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_handled().await;
        }

        Ok(())
    }

    /// close closes the producer and, if it was being sent, tells the
    /// router.
    pub async fn close(self: &Arc<Self>, app_data: Value) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::debug!("close() [producer:{}]", self.id);

        if let Some(transport) = self.transport().await {
            if self.stats_enabled.swap(false, Ordering::SeqCst) {
                transport.disable_producer_stats(self).await;
            }
        }

        self.destroy(Originator::Local, app_data).await;
    }

    pub async fn remote_close(self: &Arc<Self>, app_data: Value) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::debug!("remote_close() [producer:{}]", self.id);

        self.destroy(Originator::Remote, app_data).await;
    }

    async fn destroy(self: &Arc<Self>, originator: Originator, app_data: Value) {
        self.stats_enabled.store(false, Ordering::SeqCst);

        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport
                .remove_producer(self, originator, app_data.clone())
                .await;
        }

        self.track().await.stop();

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

    /// pause stops sending media and tells the router. It returns whether
    /// the producer ends up locally paused, `false` if closed.
    pub async fn pause(&self, app_data: Value) -> bool {
        if self.closed() {
            log::error!("pause() | producer closed [id:{}]", self.id);
            return false;
        }
        if self.locally_paused.swap(true, Ordering::SeqCst) {
            return true;
        }

        self.track().await.set_enabled(false);
        if let Some(transport) = self.transport().await {
            transport.sync_producer_paused(self, app_data.clone()).await;
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_pause(Originator::Local, app_data).await;
        }

        self.locally_paused()
    }

    /// resume is the counterpart of pause. It returns whether the producer
    /// ends up not locally paused, `false` if closed.
    pub async fn resume(&self, app_data: Value) -> bool {
        if self.closed() {
            log::error!("resume() | producer closed [id:{}]", self.id);
            return false;
        }
        if !self.locally_paused.swap(false, Ordering::SeqCst) {
            return true;
        }

        self.track().await.set_enabled(!self.remotely_paused());
        if let Some(transport) = self.transport().await {
            transport.sync_producer_paused(self, app_data.clone()).await;
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_resume(Originator::Local, app_data).await;
        }

        !self.locally_paused()
    }

    pub async fn remote_pause(&self, app_data: Value) {
        if self.closed() || self.remotely_paused.swap(true, Ordering::SeqCst) {
            return;
        }

        self.track().await.set_enabled(false);

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_pause(Originator::Remote, app_data).await;
        }
    }

    pub async fn remote_resume(&self, app_data: Value) {
        if self.closed() || !self.remotely_paused.swap(false, Ordering::SeqCst) {
            return;
        }

        self.track().await.set_enabled(!self.locally_paused());

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_resume(Originator::Remote, app_data).await;
        }
    }

    /// replace_track swaps the media source. The new track must be live and
    /// of the same kind; the previous one is stopped.
    pub async fn replace_track(self: &Arc<Self>, track: Arc<dyn MediaStreamTrack>) -> Result<()> {
        if self.closed() {
            return Err(Error::ErrProducerClosed);
        }
        if track.is_ended() {
            return Err(Error::ErrTrackEnded);
        }
        if track.kind() != self.kind {
            return Err(Error::ErrTrackKindMismatch);
        }

        let current = self.track().await;
        if Arc::ptr_eq(&current, &track) {
            return Ok(());
        }

        if let Some(transport) = self.transport().await {
            transport
                .replace_producer_track(Arc::clone(self), Arc::clone(&track))
                .await?;
        }

        if self.closed() {
            track.stop();
            return Err(Error::ErrProducerClosed);
        }

        track.set_enabled(!self.paused());
        let previous = {
            let mut current = self.track.lock().await;
            std::mem::replace(&mut *current, track)
        };
        previous.stop();

        Ok(())
    }

    pub async fn enable_stats(&self, interval: Duration) {
        if self.closed() {
            log::error!("enable_stats() | producer closed [id:{}]", self.id);
            return;
        }

        let interval = normalize_stats_interval(interval);
        self.stats_enabled.store(true, Ordering::SeqCst);
        self.stats_interval
            .store(interval.as_millis() as u64, Ordering::SeqCst);

        if let Some(transport) = self.transport().await {
            transport.enable_producer_stats(self, interval).await;
        }
    }

    pub async fn disable_stats(&self) {
        if self.closed() {
            log::error!("disable_stats() | producer closed [id:{}]", self.id);
            return;
        }

        self.stats_enabled.store(false, Ordering::SeqCst);

        if let Some(transport) = self.transport().await {
            transport.disable_producer_stats(self).await;
        }
    }

    pub(crate) async fn remote_stats(&self, stats: Value) {
        if let Some(handler) = self.event_handler.load_full() {
            handler.on_stats(stats).await;
        }
    }

    /// transport_closed detaches the producer from a transport that went
    /// away. The producer itself stays open.
    pub(crate) async fn transport_closed(&self, transport_id: u32) {
        if !self.detach(transport_id).await {
            return;
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_unhandled().await;
        }
    }

    async fn detach(&self, transport_id: u32) -> bool {
        let mut current = self.transport.lock().await;
        match &*current {
            Some(transport) if transport.id() == transport_id => {
                *current = None;
                true
            }
            _ => false,
        }
    }
}
