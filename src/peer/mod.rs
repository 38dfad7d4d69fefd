
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use portable_atomic::AtomicBool;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::consumer::Consumer;
use crate::error::{Error, Result};
use crate::originator::Originator;
use crate::OnCloseHookFn;

/// Trait for handling peer events asynchronously. All methods have default
/// no-op implementations.
#[async_trait]
pub trait PeerEventHandler: Send + Sync + 'static {
    async fn on_close(&self, _originator: Originator, _app_data: Value) {}

    /// Called when the router announces a new consumer for this peer
    async fn on_new_consumer(&self, _consumer: Arc<Consumer>) {}
}

/// Peer is a remote participant of the room, holding the consumers of the
/// media it produces.
pub struct Peer {
    name: String,
    app_data: Value,
    closed: AtomicBool,
    consumers: Arc<Mutex<HashMap<u32, Arc<Consumer>>>>,

    event_handler: ArcSwapOption<Box<dyn PeerEventHandler>>,
    close_hooks: Mutex<Vec<OnCloseHookFn>>,
}

impl Peer {
    pub(crate) fn new(name: String, app_data: Value) -> Self {
        Peer {
            name,
            app_data,
            closed: AtomicBool::new(false),
            consumers: Arc::new(Mutex::new(HashMap::new())),
            event_handler: ArcSwapOption::empty(),
            close_hooks: Mutex::new(vec![]),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn app_data(&self) -> &Value {
        &self.app_data
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// consumers returns a snapshot of the peer's open consumers.
    pub async fn consumers(&self) -> Vec<Arc<Consumer>> {
        let consumers = self.consumers.lock().await;
        consumers.values().cloned().collect()
    }

    pub async fn get_consumer_by_id(&self, id: u32) -> Option<Arc<Consumer>> {
        let consumers = self.consumers.lock().await;
        consumers.get(&id).cloned()
    }

    pub fn set_event_handler(&self, handler: Box<dyn PeerEventHandler>) {
        self.event_handler.store(Some(Arc::new(handler)));
    }

    pub(crate) async fn on_close_hook(&self, f: OnCloseHookFn) {
        let mut close_hooks = self.close_hooks.lock().await;
        close_hooks.push(f);
    }

    /// add_consumer registers a consumer announced by the router. The
    /// consumer leaves the peer once it is closed.
    pub(crate) async fn add_consumer(&self, consumer: Arc<Consumer>) -> Result<()> {
        if self.closed() {
            return Err(Error::ErrPeerClosed);
        }

        let id = consumer.id();
        {
            let mut consumers = self.consumers.lock().await;
            if consumers.contains_key(&id) {
                return Err(Error::ErrConsumerAlreadyExists(id.to_string()));
            }
            consumers.insert(id, Arc::clone(&consumer));
        }

        let consumers = Arc::clone(&self.consumers);
        consumer
            .on_close_hook(Box::new(move || {
                Box::pin(async move {
                    let mut consumers = consumers.lock().await;
                    consumers.remove(&id);
                })
            }))
            .await;

        if let Some(handler) = self.event_handler.load_full() {
            handler.on_new_consumer(consumer).await;
        }

        Ok(())
    }

    /// close drops the peer and its consumers locally. The router is not
    /// told, the room just stops tracking the peer.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::debug!("close() [peer:{}]", self.name);

        for consumer in self.take_consumers().await {
            consumer.close().await;
        }

        self.finish_close(Originator::Local, Value::Null).await;
    }

    /// remote_close closes the peer because it left the room.
    pub(crate) async fn remote_close(&self, app_data: Value) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::debug!("remote_close() [peer:{}]", self.name);

        for consumer in self.take_consumers().await {
            consumer.remote_close(Value::Null).await;
        }

        self.finish_close(Originator::Remote, app_data).await;
    }

    async fn take_consumers(&self) -> Vec<Arc<Consumer>> {
        let mut consumers = self.consumers.lock().await;
        consumers.drain().map(|(_, c)| c).collect()
    }

    async fn finish_close(&self, originator: Originator, app_data: Value) {
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
}
