
pub mod consumer_profile;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use consumer_profile::ConsumerProfile;
use portable_atomic::{AtomicBool, AtomicU64};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Duration;

use crate::error::{Error, Result};
use crate::originator::Originator;
use crate::rtp_parameters::{MediaKind, RtpParameters};
use crate::track::MediaStreamTrack;
use crate::transport::{normalize_stats_interval, Transport, DEFAULT_STATS_INTERVAL};
use crate::OnCloseHookFn;

/// Trait for handling consumer events asynchronously. All methods have
/// default no-op implementations.
#[async_trait]
pub trait ConsumerEventHandler: Send + Sync + 'static {
    async fn on_close(&self, _originator: Originator, _app_data: Value) {}

    async fn on_pause(&self, _originator: Originator, _app_data: Value) {}

    async fn on_resume(&self, _originator: Originator, _app_data: Value) {}

    /// Called once a transport started receiving this consumer
    async fn on_handled(&self) {}

    /// Called when the receiving transport was closed under this consumer.
    /// The consumer stays open and may be received again.
    async fn on_unhandled(&self) {}

    async fn on_effective_profile_change(&self, _profile: ConsumerProfile) {}

    async fn on_stats(&self, _stats: Value) {}
}

/// Consumer is the local side of a remote peer's producer. It is created by
/// the room from router data and owned by its [`crate::peer::Peer`].
pub struct Consumer {
    id: u32,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    peer_name: String,
    app_data: Value,

    supported: AtomicBool,
    closed: AtomicBool,
    locally_paused: AtomicBool,
    remotely_paused: AtomicBool,
    stats_enabled: AtomicBool,
    stats_interval: AtomicU64,

    preferred_profile: Mutex<ConsumerProfile>,
    effective_profile: Mutex<Option<ConsumerProfile>>,

    transport: Mutex<Option<Arc<Transport>>>,
    track: Mutex<Option<Arc<dyn MediaStreamTrack>>>,

    event_handler: ArcSwapOption<Box<dyn ConsumerEventHandler>>,
    close_hooks: Mutex<Vec<OnCloseHookFn>>,
}

impl Consumer {
    pub(crate) fn new(
        id: u32,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        peer_name: String,
        app_data: Value,
    ) -> Self {
        Consumer {
            id,
            kind,
            rtp_parameters,
            peer_name,
            app_data,
            supported: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            locally_paused: AtomicBool::new(false),
            remotely_paused: AtomicBool::new(false),
            stats_enabled: AtomicBool::new(false),
            stats_interval: AtomicU64::new(DEFAULT_STATS_INTERVAL.as_millis() as u64),
            preferred_profile: Mutex::new(ConsumerProfile::Default),
            effective_profile: Mutex::new(None),
            transport: Mutex::new(None),
            track: Mutex::new(None),
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

    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.rtp_parameters
    }

    pub fn peer_name(&self) -> &str {
        self.peer_name.as_str()
    }

    pub fn app_data(&self) -> &Value {
        &self.app_data
    }

    /// supported reports whether the local device can decode this consumer.
    pub fn supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    pub(crate) fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
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

    pub async fn preferred_profile(&self) -> ConsumerProfile {
        *self.preferred_profile.lock().await
    }

    pub async fn effective_profile(&self) -> Option<ConsumerProfile> {
        *self.effective_profile.lock().await
    }

    /// transport returns the transport receiving this consumer, if any.
    pub async fn transport(&self) -> Option<Arc<Transport>> {
        self.transport.lock().await.clone()
    }

    pub async fn track(&self) -> Option<Arc<dyn MediaStreamTrack>> {
        self.track.lock().await.clone()
    }

    pub fn set_event_handler(&self, handler: Box<dyn ConsumerEventHandler>) {
        self.event_handler.store(Some(Arc::new(handler)));
    }

    pub(crate) async fn on_close_hook(&self, f: OnCloseHookFn) {
        let mut close_hooks = self.close_hooks.lock().await;
        close_hooks.push(f);
    }

    /// receive starts receiving this consumer over `transport` and returns
    /// the receiving track.
    pub async fn receive(
        self: &Arc<Self>,
        transport: &Arc<Transport>,
    ) -> Result<Arc<dyn MediaStreamTrack>> {
        if self.closed() {
            return Err(Error::ErrConsumerClosed);
        }

        {
            let mut current = self.transport.lock().await;
            if current.is_some() {
                return Err(Error::ErrConsumerAlreadyHandled);
            }
            if !self.supported() {
                return Err(Error::ErrConsumerNotSupported);
            }
            *current = Some(Arc::clone(transport));
        }

        let track = match transport.add_consumer(Arc::clone(self)).await {
            Ok(track) => track,
            Err(err) => {
                self.detach(transport.id()).await;
                return Err(err);
            }
        };

        if self.closed() {
            track.stop();
            return Err(Error::ErrConsumerClosed);
        }

        track.set_enabled(!self.paused());
        {
            let mut current = self.track.lock().await;
            *current = Some(Arc::clone(&track));
        }

        if self.stats_enabled() {
            transport
                .enable_consumer_stats(self, self.stats_interval())
                .await;
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_handled().await;
        }

        Ok(track)
    }

    /// close closes the consumer locally. The router owns consumers, so this
    /// only stops local reception.
    pub async fn close(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::debug!("close() [consumer:{}]", self.id);

        if let Some(transport) = self.transport().await {
            if self.stats_enabled.swap(false, Ordering::SeqCst) {
                transport.disable_consumer_stats(self).await;
            }
        }

        self.destroy(Originator::Local, Value::Null).await;
    }

    pub async fn remote_close(self: &Arc<Self>, app_data: Value) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::debug!("remote_close() [consumer:{}]", self.id);

        self.destroy(Originator::Remote, app_data).await;
    }

    async fn destroy(self: &Arc<Self>, originator: Originator, app_data: Value) {
        self.stats_enabled.store(false, Ordering::SeqCst);

        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.remove_consumer(self).await;
        }

        let track = self.track.lock().await.take();
        if let Some(track) = track {
            track.stop();
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

    /// pause pauses reception locally and tells the router. It returns
    /// whether the consumer ends up locally paused, `false` if closed.
    pub async fn pause(&self, app_data: Value) -> bool {
        if self.closed() {
            log::error!("pause() | consumer closed [id:{}]", self.id);
            return false;
        }
        if self.locally_paused.swap(true, Ordering::SeqCst) {
            return true;
        }

        if let Some(track) = self.track().await {
            track.set_enabled(false);
        }
        if let Some(transport) = self.transport().await {
            transport.sync_consumer_paused(self, app_data.clone()).await;
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_pause(Originator::Local, app_data).await;
        }

        self.locally_paused()
    }

    /// resume is the counterpart of pause. It returns whether the consumer
    /// ends up not locally paused, `false` if closed.
    pub async fn resume(&self, app_data: Value) -> bool {
        if self.closed() {
            log::error!("resume() | consumer closed [id:{}]", self.id);
            return false;
        }
        if !self.locally_paused.swap(false, Ordering::SeqCst) {
            return true;
        }

        if let Some(track) = self.track().await {
            track.set_enabled(!self.remotely_paused());
        }
        if let Some(transport) = self.transport().await {
            transport.sync_consumer_paused(self, app_data.clone()).await;
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

        if let Some(track) = self.track().await {
            track.set_enabled(false);
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_pause(Originator::Remote, app_data).await;
        }
    }

    pub async fn remote_resume(&self, app_data: Value) {
        if self.closed() || !self.remotely_paused.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(track) = self.track().await {
            track.set_enabled(!self.locally_paused());
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_resume(Originator::Remote, app_data).await;
        }
    }

    /// set_preferred_profile asks the router for a receive quality tier.
    pub async fn set_preferred_profile(&self, profile: ConsumerProfile) -> Result<()> {
        if self.closed() {
            return Err(Error::ErrConsumerClosed);
        }

        {
            let mut preferred_profile = self.preferred_profile.lock().await;
            if *preferred_profile == profile {
                return Ok(());
            }
            *preferred_profile = profile;
        }

        if let Some(transport) = self.transport().await {
            transport.sync_consumer_preferred_profile(self).await;
        }

        Ok(())
    }

    pub async fn remote_set_preferred_profile(&self, profile: ConsumerProfile) {
        if self.closed() {
            return;
        }

        {
            let mut preferred_profile = self.preferred_profile.lock().await;
            *preferred_profile = profile;
        }

        if let Some(transport) = self.transport().await {
            transport.consumer_preferred_profile_set(self, profile).await;
        }
    }

    pub async fn remote_effective_profile_changed(&self, profile: ConsumerProfile) {
        if self.closed() {
            return;
        }

        {
            let mut effective_profile = self.effective_profile.lock().await;
            if *effective_profile == Some(profile) {
                return;
            }
            *effective_profile = Some(profile);
        }

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_effective_profile_change(profile).await;
        }
    }

    pub async fn enable_stats(&self, interval: Duration) {
        if self.closed() {
            log::error!("enable_stats() | consumer closed [id:{}]", self.id);
            return;
        }

        let interval = normalize_stats_interval(interval);
        self.stats_enabled.store(true, Ordering::SeqCst);
        self.stats_interval
            .store(interval.as_millis() as u64, Ordering::SeqCst);

        if let Some(transport) = self.transport().await {
            transport.enable_consumer_stats(self, interval).await;
        }
    }

    pub async fn disable_stats(&self) {
        if self.closed() {
            log::error!("disable_stats() | consumer closed [id:{}]", self.id);
            return;
        }

        self.stats_enabled.store(false, Ordering::SeqCst);

        if let Some(transport) = self.transport().await {
            transport.disable_consumer_stats(self).await;
        }
    }

    pub(crate) async fn remote_stats(&self, stats: Value) {
        if let Some(handler) = self.event_handler.load_full() {
            handler.on_stats(stats).await;
        }
    }

    /// transport_closed detaches the consumer from a transport that went
    /// away. The consumer itself stays open.
    pub(crate) async fn transport_closed(&self, transport_id: u32) {
        if !self.detach(transport_id).await {
            return;
        }

        let track = self.track.lock().await.take();
        if let Some(track) = track {
            track.stop();
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
