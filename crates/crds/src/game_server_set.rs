//! GameServerSet CRD
//!
//! The workload set owning game-server replicas. Replica identity
//! (`<set-name>-<index>`) survives pod recreation.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gamenet.io",
    version = "v1alpha1",
    kind = "GameServerSet",
    namespaced,
    status = "GameServerSetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct GameServerSetSpec {
    /// Desired replica count
    pub replicas: i32,

    /// Free-form network configuration applied to every replica.
    /// Copied onto pods as the network-conf annotation by the set controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct GameServerSetStatus {
    /// Observed replica count
    pub replicas: i32,

    /// Replicas whose network readiness is `Ready`
    pub network_ready_replicas: i32,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}
