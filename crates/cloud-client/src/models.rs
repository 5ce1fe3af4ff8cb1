//! Vendor-neutral shapes of externally-stored network objects

use crds::Protocol;
use serde::{Deserialize, Serialize};

/// Label Kubernetes uses to select a single pod by its stable name.
pub const POD_NAME_SELECTOR_LABEL: &str = "statefulset.kubernetes.io/pod-name";

/// One port binding on a network object: the externally booked port and the
/// pod-local port traffic forwards to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortBinding {
    /// Stable port name (shared by the internal/external status pair)
    pub name: String,

    /// Externally booked port on the load balancer
    pub port: i32,

    /// Pod-local target port
    pub target_port: i32,

    /// Transport protocol
    pub protocol: Protocol,
}

/// Desired shape of one network object. The kube-backed client renders this
/// as a `v1/Service`; another vendor adapter may render it differently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkObjectSpec {
    /// Namespace the object lives in
    pub namespace: String,

    /// Object name (the replica name for per-replica objects)
    pub name: String,

    /// Allocation owner key (`namespace/podName` or `namespace/workloadSetName`)
    pub owner_key: String,

    /// Owning workload set name
    pub workload_set: String,

    /// Load balancer the ports are booked on
    pub load_balancer_id: String,

    /// Hash of the configuration this object was materialized from
    pub config_hash: String,

    /// Whether the object is externally reachable (load-balancer-backed) or
    /// held cluster-internal only
    pub external_enabled: bool,

    /// Pod the object routes to; `None` for prewarmed objects awaiting linkage
    pub pod_link: Option<String>,

    /// Port bindings
    pub ports: Vec<PortBinding>,
}

/// An ingress address the external load balancer reports.
///
/// `ports` is empty when the vendor does not report per-port visibility; an
/// empty list means every declared port is assumed reachable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IngressAddress {
    /// Externally reachable IP (or resolved hostname)
    pub ip: String,

    /// Ports confirmed visible on this address
    pub ports: Vec<i32>,
}

/// Observed state of one network object: its declared spec plus what the
/// vendor has reported back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkObject {
    /// Declared shape
    pub spec: NetworkObjectSpec,

    /// Cluster-internal virtual IP, if assigned
    pub cluster_ip: Option<String>,

    /// Externally reported ingress addresses; empty until the vendor
    /// finishes provisioning
    pub ingress: Vec<IngressAddress>,
}

impl NetworkObject {
    /// Whether every declared port is visible on at least one ingress address.
    #[must_use]
    pub fn all_ports_visible(&self) -> bool {
        if self.ingress.is_empty() {
            return false;
        }
        self.spec.ports.iter().all(|binding| {
            self.ingress.iter().any(|ingress| {
                ingress.ports.is_empty() || ingress.ports.contains(&binding.port)
            })
        })
    }
}
