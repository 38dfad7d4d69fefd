#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! Client side of a multi-party media room: capability negotiation with the
//! router, transports with serialized handler commands, and the producer /
//! consumer / peer lifecycle driven by local calls and router notifications.

pub mod api;
pub mod command_queue;
pub mod consumer;
pub mod error;
pub mod handler;
pub mod ortc;
pub mod originator;
pub mod peer;
pub mod producer;
pub mod room;
pub mod rtp_parameters;
pub mod signaling;
pub mod track;
pub mod transport;

use std::future::Future;
use std::pin::Pin;

use rand::Rng;

pub use error::Error;

pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";

/// Hooks run once when an entity closes, used to keep owner maps in sync.
pub(crate) type OnCloseHookFn =
    Box<dyn (FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// random_id generates an entity id in the range the router expects.
pub(crate) fn random_id() -> u32 {
    rand::rng().random_range(10_000_000..100_000_000)
}
