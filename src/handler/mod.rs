//! Contracts for the media engine sitting under each transport.
//!
//! A [`Device`] creates one [`Handler`] per transport. The handler talks
//! back to its transport through the [`HandlerListener`] it was given.


use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::api::setting_engine::SettingEngine;
use crate::consumer::Consumer;
use crate::error::Result;
use crate::producer::Producer;
use crate::rtp_parameters::{ExtendedRtpCapabilities, RtpCapabilities, RtpParameters};
use crate::track::MediaStreamTrack;
use crate::transport::connection_state::ConnectionState;
use crate::transport::transport_parameters::{
    IceParameters, LocalTransportParameters, RemoteTransportParameters,
};
use crate::transport::TransportDirection;

/// Handler drives the local media engine of a single transport. Calls into
/// a handler are serialized by the transport's command queue, except for
/// `close` and `remote_closed`.
#[async_trait]
pub trait Handler: Send + Sync {
    /// add_producer starts sending the producer's track and returns the
    /// RTP parameters actually used.
    async fn add_producer(&self, producer: &Producer) -> Result<RtpParameters>;

    async fn remove_producer(&self, producer: &Producer) -> Result<()>;

    async fn replace_producer_track(
        &self,
        producer: &Producer,
        track: Arc<dyn MediaStreamTrack>,
    ) -> Result<()>;

    /// add_consumer sets up reception and returns the receiving track.
    async fn add_consumer(&self, consumer: &Consumer) -> Result<Arc<dyn MediaStreamTrack>>;

    async fn remove_consumer(&self, consumer: &Consumer) -> Result<()>;

    async fn restart_ice(&self, remote_ice_parameters: IceParameters) -> Result<()>;

    async fn close(&self);

    /// remote_closed is called when the router closed the transport. The
    /// handler may keep its media engine around until `close`.
    async fn remote_closed(&self);
}

/// HandlerListener receives the events a handler raises towards its
/// transport.
#[async_trait]
pub trait HandlerListener: Send + Sync {
    async fn on_connection_state_change(&self, state: ConnectionState);

    /// on_need_create_transport is raised the first time the handler needs
    /// the router side of the transport.
    async fn on_need_create_transport(
        &self,
        local_parameters: Option<LocalTransportParameters>,
    ) -> Result<RemoteTransportParameters>;

    async fn on_need_update_transport(&self, local_parameters: LocalTransportParameters);

    async fn on_need_update_producer(&self, producer: &Producer, rtp_parameters: RtpParameters);
}

/// Device is the capability source and handler factory of the local
/// endpoint. It is resolved once per room.
#[async_trait]
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    async fn get_native_rtp_capabilities(&self) -> Result<RtpCapabilities>;

    fn create_handler(
        &self,
        direction: TransportDirection,
        extended_rtp_capabilities: &ExtendedRtpCapabilities,
        settings: &SettingEngine,
        listener: Weak<dyn HandlerListener>,
    ) -> Result<Arc<dyn Handler>>;
}
