
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::time::Duration;

use crate::signaling::DEFAULT_REQUEST_TIMEOUT;

/// IceServer describes a STUN or TURN server handed to the router when
/// transports are created.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credential: String,
}

/// IceTransportPolicy defines the ICE candidate policy of transports.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    /// any type of candidate
    #[default]
    All,
    /// relay candidates only
    Relay,
}

const ICE_TRANSPORT_POLICY_ALL_STR: &str = "all";
const ICE_TRANSPORT_POLICY_RELAY_STR: &str = "relay";

impl From<&str> for IceTransportPolicy {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_TRANSPORT_POLICY_RELAY_STR => IceTransportPolicy::Relay,
            _ => IceTransportPolicy::All,
        }
    }
}

impl fmt::Display for IceTransportPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            IceTransportPolicy::All => ICE_TRANSPORT_POLICY_ALL_STR,
            IceTransportPolicy::Relay => ICE_TRANSPORT_POLICY_RELAY_STR,
        };
        write!(f, "{s}")
    }
}

/// SettingEngine allows influencing behavior of the room and its
/// transports beyond what the room API exposes.
#[derive(Debug, Clone)]
pub struct SettingEngine {
    pub(crate) request_timeout: Duration,
    pub(crate) transport_options: Map<String, Value>,
    pub(crate) turn_servers: Vec<IceServer>,
    pub(crate) ice_transport_policy: IceTransportPolicy,
    pub(crate) spy: bool,
}

impl Default for SettingEngine {
    fn default() -> Self {
        SettingEngine {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transport_options: Map::new(),
            turn_servers: vec![],
            ice_transport_policy: IceTransportPolicy::default(),
            spy: false,
        }
    }
}

impl SettingEngine {
    /// set_request_timeout bounds every request sent to the router. A zero
    /// duration restores the default of 30 seconds.
    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = if timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            timeout
        };
    }

    /// set_transport_options sets router specific options sent along with
    /// every `createTransport` request. Non-object values are ignored.
    pub fn set_transport_options(&mut self, options: Value) {
        match options {
            Value::Object(map) => self.transport_options = map,
            Value::Null => self.transport_options.clear(),
            other => log::warn!("set_transport_options() | ignoring non-object options: {other}"),
        }
    }

    pub fn set_turn_servers(&mut self, turn_servers: Vec<IceServer>) {
        self.turn_servers = turn_servers;
    }

    pub fn set_ice_transport_policy(&mut self, policy: IceTransportPolicy) {
        self.ice_transport_policy = policy;
    }

    /// set_spy joins the room as a spy: the peer is hidden from others and
    /// cannot produce.
    pub fn set_spy(&mut self, spy: bool) {
        self.spy = spy;
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn turn_servers(&self) -> &[IceServer] {
        &self.turn_servers
    }

    pub fn ice_transport_policy(&self) -> IceTransportPolicy {
        self.ice_transport_policy
    }

    pub fn spy(&self) -> bool {
        self.spy
    }

    /// transport_options returns the `options` object of a `createTransport`
    /// request: the user options, plus TURN servers and a relay-only policy
    /// when configured.
    pub fn transport_options(&self) -> Value {
        let mut options = self.transport_options.clone();
        if !self.turn_servers.is_empty() {
            options.insert("turnServers".to_owned(), json!(self.turn_servers));
        }
        if self.ice_transport_policy != IceTransportPolicy::All {
            options.insert(
                "iceTransportPolicy".to_owned(),
                json!(self.ice_transport_policy),
            );
        }
        Value::Object(options)
    }
}
