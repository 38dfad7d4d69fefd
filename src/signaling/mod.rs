//! Request/notify protocol spoken with the remote router.
//!
//! Outbound messages go through an injected [`MessageSender`]. Responses and
//! notifications from the router are handed back to the room, which routes
//! responses into the [`Signaler`] pending map.

#[cfg(test)]
mod signaling_test;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use portable_atomic::AtomicU32;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Duration;

use crate::error::{Error, Result};

/// Default bound on every outstanding request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30000);

/// Target of a message on the router side.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Room,
    #[default]
    Peer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestMethod {
    QueryRoom,
    Join,
    CreateTransport,
    RestartTransport,
    CreateProducer,
    EnableConsumer,
}

impl RequestMethod {
    pub fn target(&self) -> Target {
        match self {
            RequestMethod::QueryRoom | RequestMethod::Join => Target::Room,
            _ => Target::Peer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::QueryRoom => "queryRoom",
            RequestMethod::Join => "join",
            RequestMethod::CreateTransport => "createTransport",
            RequestMethod::RestartTransport => "restartTransport",
            RequestMethod::CreateProducer => "createProducer",
            RequestMethod::EnableConsumer => "enableConsumer",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NotifyMethod {
    Leave,
    CloseTransport,
    UpdateTransport,
    UpdateProducer,
    PauseProducer,
    ResumeProducer,
    CloseProducer,
    PauseConsumer,
    ResumeConsumer,
    SetConsumerPreferredProfile,
    EnableTransportStats,
    DisableTransportStats,
    EnableProducerStats,
    DisableProducerStats,
    EnableConsumerStats,
    DisableConsumerStats,
}

impl NotifyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyMethod::Leave => "leave",
            NotifyMethod::CloseTransport => "closeTransport",
            NotifyMethod::UpdateTransport => "updateTransport",
            NotifyMethod::UpdateProducer => "updateProducer",
            NotifyMethod::PauseProducer => "pauseProducer",
            NotifyMethod::ResumeProducer => "resumeProducer",
            NotifyMethod::CloseProducer => "closeProducer",
            NotifyMethod::PauseConsumer => "pauseConsumer",
            NotifyMethod::ResumeConsumer => "resumeConsumer",
            NotifyMethod::SetConsumerPreferredProfile => "setConsumerPreferredProfile",
            NotifyMethod::EnableTransportStats => "enableTransportStats",
            NotifyMethod::DisableTransportStats => "disableTransportStats",
            NotifyMethod::EnableProducerStats => "enableProducerStats",
            NotifyMethod::DisableProducerStats => "disableProducerStats",
            NotifyMethod::EnableConsumerStats => "enableConsumerStats",
            NotifyMethod::DisableConsumerStats => "disableConsumerStats",
        }
    }
}

impl fmt::Display for NotifyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request expects exactly one [`Response`] with the same id. The payload
/// is nested since it usually carries an entity `id` of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request: bool,
    pub id: u32,
    pub method: RequestMethod,
    pub target: Target,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Notification is fire-and-forget, in both directions. Inbound methods are
/// kept as plain strings so unknown ones can be reported by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default = "default_true")]
    pub notification: bool,
    pub method: String,
    #[serde(default)]
    pub target: Target,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl Notification {
    pub fn new(method: impl Into<String>, data: Value) -> Self {
        Notification {
            notification: true,
            method: method.into(),
            target: Target::Peer,
            data: into_map(data),
        }
    }

    /// data_value returns the flattened payload as a JSON object.
    pub fn data_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Notification(Notification),
}

/// Response answers a [`Request`].
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default = "default_true")]
    pub response: bool,
    pub id: u32,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl Response {
    pub fn success(id: u32, data: Value) -> Self {
        Response {
            response: true,
            id,
            ok: true,
            data,
            ..Default::default()
        }
    }

    pub fn error(id: u32, error_code: u32, error_reason: impl Into<String>) -> Self {
        Response {
            response: true,
            id,
            ok: false,
            error_code: Some(error_code),
            error_reason: Some(error_reason.into()),
            ..Default::default()
        }
    }
}

/// MessageSender carries outbound messages to the router.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: Message) -> Result<()>;
}

#[async_trait]
impl MessageSender for mpsc::UnboundedSender<Message> {
    async fn send(&self, message: Message) -> Result<()> {
        mpsc::UnboundedSender::send(self, message)?;
        Ok(())
    }
}

pub(crate) fn into_map(data: Value) -> Map<String, Value> {
    match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_owned(), other);
            map
        }
    }
}

/// Signaler matches responses to outstanding requests. An entry leaves the
/// pending map exactly once, which is what settles its request.
pub(crate) struct Signaler {
    sender: Arc<dyn MessageSender>,
    request_timeout: Duration,
    next_id: AtomicU32,
    pending: Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>,
}

impl Signaler {
    pub(crate) fn new(sender: Arc<dyn MessageSender>, request_timeout: Duration) -> Self {
        Signaler {
            sender,
            request_timeout,
            next_id: AtomicU32::new(rand::random::<u16>() as u32 + 1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn request(&self, method: RequestMethod, data: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (settle_tx, settle_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, settle_tx);
        }

        log::debug!("request [method:{method}, id:{id}]");

        let request = Message::Request(Request {
            request: true,
            id,
            method,
            target: method.target(),
            data: into_map(data),
        });
        if let Err(err) = self.sender.send(request).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(self.request_timeout, settle_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ErrRoomClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                log::warn!("request timeout [method:{method}, id:{id}]");
                Err(Error::ErrRequestTimeout)
            }
        }
    }

    pub(crate) async fn notify(&self, method: NotifyMethod, data: Value) -> Result<()> {
        log::debug!("notify [method:{method}]");

        self.sender
            .send(Message::Notification(Notification::new(method.as_str(), data)))
            .await
    }

    pub(crate) async fn receive_response(&self, response: Response) {
        let settle = {
            let mut pending = self.pending.lock().await;
            pending.remove(&response.id)
        };

        let settle = match settle {
            Some(settle) => settle,
            None => {
                log::warn!(
                    "received response does not match any sent request [id:{}]",
                    response.id
                );
                return;
            }
        };

        let result = if response.ok {
            Ok(response.data)
        } else {
            Err(Error::ErrRequestFailed(
                response
                    .error_reason
                    .unwrap_or_else(|| "unknown error".to_owned()),
            ))
        };

        if settle.send(result).is_err() {
            log::debug!("response arrived after request was abandoned [id:{}]", response.id);
        }
    }

    /// close rejects every outstanding request.
    pub(crate) async fn close(&self) {
        let mut pending = self.pending.lock().await;
        for (_, settle) in pending.drain() {
            let _ = settle.send(Err(Error::ErrRoomClosed));
        }
    }

    pub(crate) async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}
