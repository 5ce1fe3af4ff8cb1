//! Test utilities for unit testing reconcilers
//!
//! Builders for pods, workload sets, and network objects, plus a reconciler
//! wired to the mock cloud client.

#[cfg(test)]
use std::collections::{BTreeMap, BTreeSet};
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use crate::allocator::PortAllocator;
#[cfg(test)]
use crate::config::AllocatorConfig;
#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use cloud_client::{MockCloudClient, NetworkObject, NetworkObjectSpec, PortBinding};
#[cfg(test)]
use crds::{GameServerSet, GameServerSetSpec, Protocol, NETWORK_CONF_ANNOTATION};
#[cfg(test)]
use k8s_openapi::api::core::v1::{Pod, PodStatus};
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// Helper to build a pre-existing network object for cold-start tests.
#[cfg(test)]
pub fn make_network_object(
    namespace: &str,
    name: &str,
    owner_key: &str,
    load_balancer_id: &str,
    ports: &[i32],
) -> NetworkObject {
    let workload_set = name
        .rsplit_once('-')
        .map(|(prefix, _)| prefix)
        .unwrap_or(name)
        .to_string();
    NetworkObject {
        spec: NetworkObjectSpec {
            namespace: namespace.to_string(),
            name: name.to_string(),
            owner_key: owner_key.to_string(),
            workload_set,
            load_balancer_id: load_balancer_id.to_string(),
            config_hash: String::new(),
            external_enabled: true,
            pod_link: Some(name.to_string()),
            ports: ports
                .iter()
                .map(|p| PortBinding {
                    name: format!("tcp-{p}"),
                    port: *p,
                    target_port: *p,
                    protocol: Protocol::Tcp,
                })
                .collect(),
        },
        cluster_ip: Some("10.96.0.1".to_string()),
        ingress: Vec::new(),
    }
}

/// Helper to build a conf map from key/value pairs.
#[cfg(test)]
pub fn conf_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Helper to build a managed pod carrying the network-conf annotation and a
/// GameServerSet owner reference derived from its name.
#[cfg(test)]
pub fn make_pod(namespace: &str, name: &str, conf: &[(&str, &str)]) -> Pod {
    let set_name = name
        .rsplit_once('-')
        .map(|(prefix, _)| prefix)
        .unwrap_or(name)
        .to_string();
    let mut annotations = BTreeMap::new();
    annotations.insert(
        NETWORK_CONF_ANNOTATION.to_string(),
        serde_json::to_string(&conf_map(conf)).unwrap(),
    );
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(annotations),
            owner_references: Some(vec![OwnerReference {
                api_version: "gamenet.io/v1alpha1".to_string(),
                kind: "GameServerSet".to_string(),
                name: set_name,
                uid: "00000000-0000-0000-0000-000000000000".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            pod_ip: Some("10.0.0.5".to_string()),
            ..Default::default()
        }),
    }
}

/// Helper to build a workload set with the given network conf.
#[cfg(test)]
pub fn make_workload_set(
    namespace: &str,
    name: &str,
    replicas: i32,
    conf: &[(&str, &str)],
) -> GameServerSet {
    GameServerSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: GameServerSetSpec {
            replicas,
            network: (!conf.is_empty()).then(|| conf_map(conf)),
        },
        status: None,
    }
}

/// Helper to build a reconciler over a fresh mock cloud client with the
/// given port range. The mock handle shares state with the reconciler.
#[cfg(test)]
pub fn make_reconciler(min_port: i32, max_port: i32) -> (Reconciler, MockCloudClient) {
    let mock = MockCloudClient::new();
    let config = AllocatorConfig::new(min_port, max_port, BTreeSet::new()).unwrap();
    let allocator = Arc::new(PortAllocator::new(config.clone()));
    let reconciler = Reconciler::new(Box::new(mock.clone()), allocator, config);
    (reconciler, mock)
}
