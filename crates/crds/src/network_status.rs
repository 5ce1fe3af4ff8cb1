//! Persisted network readiness status
//!
//! Attached to each replica pod as a JSON annotation. The controller's
//! in-memory allocator state is a derived cache; this is the durable fact
//! clients of the replica observe.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Network readiness of one replica.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum NetworkState {
    /// No status recorded yet
    #[default]
    #[serde(alias = "waiting")]
    Waiting,

    /// Network object not yet materialized or load balancer not reporting
    #[serde(alias = "notReady")]
    NotReady,

    /// External address visible on every declared port
    #[serde(alias = "ready")]
    Ready,
}

/// Transport protocol of a declared port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// TCP
    #[default]
    Tcp,
    /// UDP
    Udp,
}

impl Protocol {
    /// The Kubernetes Service protocol string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

/// One port on an internal or external address.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPort {
    /// Port name, stable across the internal/external pair
    pub name: String,

    /// Port number
    pub port: i32,

    /// Transport protocol
    pub protocol: Protocol,
}

/// An address/port list pair, either pod-local or load-balancer-facing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAddress {
    /// IP address (pod IP for internal, ingress IP for external)
    pub ip: String,

    /// Ports reachable on this address
    pub ports: Vec<NetworkPort>,
}

/// The durable per-replica network status, persisted as the
/// `gamenet.io/network-status` annotation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Current readiness
    pub current_state: NetworkState,

    /// Whether the network object is held cluster-internal only
    #[serde(default)]
    pub disabled: bool,

    /// Pod-local address/port pairs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal_addresses: Vec<NetworkAddress>,

    /// Load-balancer-facing address/port pairs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_addresses: Vec<NetworkAddress>,

    /// When the state last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<chrono::DateTime<chrono::Utc>>,
}
