//! DedicatedLoadBalancer CRD
//!
//! One prewarmed external load balancer, provisioned by the vendor controller
//! and tracked here by `(workloadSet, ispType, poolIndex)`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gamenet.io",
    version = "v1alpha1",
    kind = "DedicatedLoadBalancer",
    namespaced,
    status = "DedicatedLoadBalancerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DedicatedLoadBalancerSpec {
    /// Owning workload set name
    pub workload_set: String,

    /// Network line type this load balancer serves (e.g. "bgp", "static")
    pub isp_type: String,

    /// Index of this entry within the prewarmed pool
    pub pool_index: i32,

    /// Allocation ids of the elastic IPs backing this load balancer,
    /// one per declared zone. All must be ready before creation.
    pub eip_allocation_ids: Vec<String>,

    /// Zone/subnet placement
    pub zones: Vec<ZoneSubnet>,
}

/// One availability zone and the subnet the load balancer attaches in it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSubnet {
    /// Availability zone identifier
    pub zone: String,

    /// Subnet identifier within the zone
    pub subnet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DedicatedLoadBalancerStatus {
    /// Vendor-assigned load balancer identifier, set once provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_id: Option<String>,

    /// Provisioning state reported by the vendor controller
    pub state: ProvisioningState,

    /// Error message if provisioning failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Vendor-side provisioning state of a pool resource.
///
/// Serializes as PascalCase ("Pending", "Ready", "Failed") but deserializes
/// lowercase too for backward compatibility with existing CRs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ProvisioningState {
    /// Resource requested, vendor identifier not yet reported
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Vendor identifier reported, resource usable
    #[serde(alias = "ready")]
    Ready,

    /// Vendor provisioning failed
    #[serde(alias = "failed")]
    Failed,
}
