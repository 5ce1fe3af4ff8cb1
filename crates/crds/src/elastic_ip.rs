//! ElasticIP CRD
//!
//! One prewarmed elastic IP, provisioned by the vendor controller per
//! availability zone and consumed by a DedicatedLoadBalancer.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dedicated_load_balancer::ProvisioningState;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gamenet.io",
    version = "v1alpha1",
    kind = "ElasticIP",
    namespaced,
    status = "ElasticIPStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ElasticIPSpec {
    /// Owning workload set name
    pub workload_set: String,

    /// Network line type (e.g. "bgp", "static")
    pub isp_type: String,

    /// Index of the pool entry this elastic IP backs
    pub pool_index: i32,

    /// Availability zone this elastic IP is homed in
    pub zone: String,

    /// Subnet the address attaches to
    pub subnet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElasticIPStatus {
    /// Vendor allocation id, set once the address is provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_id: Option<String>,

    /// The public address itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Provisioning state reported by the vendor controller
    pub state: ProvisioningState,

    /// Error message if provisioning failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
