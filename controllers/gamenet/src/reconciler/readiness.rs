//! Per-replica network readiness state machine
//!
//! Waiting -> NotReady -> Ready, with an orthogonal disabled flag that flips
//! the network object between externally reachable and cluster-internal
//! without touching the allocation. The durable state lives in the pod's
//! status annotation; everything in-process is derived.

use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

use super::Reconciler;
use crate::config::NetworkConf;
use crate::error::ControllerError;
use crate::reconciler::prewarm::{dedicated_bindings, pods_per_resource};
use cloud_client::{NetworkObject, NetworkObjectSpec, PortBinding};
use crds::{
    NetworkAddress, NetworkPort, NetworkState, NetworkStatus, NETWORK_DISABLED_ANNOTATION,
    NETWORK_STATUS_ANNOTATION, REPLICA_FINALIZER,
};

impl Reconciler {
    /// Lifecycle hook: replica created. Attaches the protective finalizer so
    /// deletion waits for network cleanup. Never allocates.
    pub async fn on_replica_added(&self, pod: &Pod) -> Result<Pod, ControllerError> {
        let mut updated = pod.clone();
        if NetworkConf::from_annotations(&pod.metadata)?.is_none() {
            return Ok(updated);
        }
        let finalizers = updated.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == REPLICA_FINALIZER) {
            finalizers.push(REPLICA_FINALIZER.to_string());
        }
        Ok(updated)
    }

    /// Lifecycle hook: replica changed. Drives one readiness transition and
    /// returns the pod with its refreshed status annotation.
    pub async fn on_replica_updated(
        &self,
        pod: &Pod,
    ) -> Result<(Pod, NetworkState), ControllerError> {
        let Some(conf) = NetworkConf::from_annotations(&pod.metadata)? else {
            return Ok((pod.clone(), NetworkState::Waiting));
        };
        let (namespace, name) = Self::pod_key(pod)?;
        let set_name = Self::set_name_for(pod)?;
        let set_key = format!("{namespace}/{set_name}");
        if let Some(index) = Self::replica_index(&name) {
            self.observe_replica_index(&set_key, index);
        }

        let disabled = disabled_requested(pod);
        let previous = parse_status(pod);

        // First pass only records NotReady; materialization starts next pass.
        let Some(previous) = previous else {
            let mut updated = pod.clone();
            let status = NetworkStatus {
                current_state: NetworkState::NotReady,
                disabled,
                ..NetworkStatus::default()
            };
            write_status(&mut updated, status, None);
            return Ok((updated, NetworkState::NotReady));
        };

        let owner_key = Self::owner_key(&namespace, &name, &set_name, &conf);
        let existing = self.cloud.get_network_object(&namespace, &name).await?;

        let (object, rematerialized) = match existing {
            None => {
                let (lb_id, bindings) = self
                    .resolve_binding(&namespace, &name, &set_name, &owner_key, &conf)
                    .await?;
                let desired = desired_object(
                    &namespace, &name, &owner_key, &set_name, &lb_id, &conf, !disabled,
                    Some(name.clone()), bindings,
                );
                (self.cloud.apply_network_object(&desired).await?, true)
            }
            Some(object) => {
                let hash_drift = object.spec.config_hash != conf.hash();
                let unlinked = object.spec.pod_link.as_deref() != Some(name.as_str());
                let reachability_drift = object.spec.external_enabled == disabled;

                if hash_drift || unlinked {
                    // Re-materialize with the current configuration, reusing
                    // the allocation the owner already holds.
                    let (lb_id, bindings) = self
                        .resolve_binding(&namespace, &name, &set_name, &owner_key, &conf)
                        .await?;
                    let desired = desired_object(
                        &namespace, &name, &owner_key, &set_name, &lb_id, &conf, !disabled,
                        Some(name.clone()), bindings,
                    );
                    debug!(
                        "Re-materializing network object {namespace}/{name} (hash drift: {hash_drift}, unlinked: {unlinked})"
                    );
                    (self.cloud.apply_network_object(&desired).await?, true)
                } else if reachability_drift {
                    // Flip reachability in place; the allocation stays, and
                    // the flip itself does not force NotReady: the state
                    // below is whatever the flipped object's reachability
                    // implies.
                    let mut desired = object.spec.clone();
                    desired.external_enabled = !disabled;
                    info!(
                        "Toggling network object {namespace}/{name} to {}",
                        if disabled { "internal-only" } else { "externally reachable" }
                    );
                    (self.cloud.apply_network_object(&desired).await?, false)
                } else {
                    (object, false)
                }
            }
        };

        // A freshly (re-)materialized object starts over as NotReady; any
        // ingress still visible on it belongs to the previous configuration.
        let state = if rematerialized {
            NetworkState::NotReady
        } else {
            evaluate(&object)
        };
        let status = build_status(&object, pod, &conf, state.clone(), disabled);
        let mut updated = pod.clone();
        write_status(&mut updated, status, Some(&previous));
        Ok((updated, state))
    }

    /// Lifecycle hook: replica deleted. Applies the fixed-binding carryover
    /// rule, confirms network-object deletion before releasing ports, and
    /// clears the protective finalizer once cleanup is done.
    ///
    /// Returns the pod with its finalizer removed, or an error when cleanup
    /// must be retried (the finalizer then keeps the pod pending).
    pub async fn on_replica_deleted(&self, pod: &Pod) -> Result<Pod, ControllerError> {
        let Some(conf) = NetworkConf::from_annotations(&pod.metadata)? else {
            return Ok(clear_finalizer(pod));
        };
        let (namespace, name) = Self::pod_key(pod)?;
        let set_name = Self::set_name_for(pod)?;
        let owner_key = Self::owner_key(&namespace, &name, &set_name, &conf);

        if conf.fixed {
            let set = self.cloud.get_workload_set(&namespace, &set_name).await?;
            if let Some(set) = set {
                if set.metadata.deletion_timestamp.is_none() {
                    // The set lives on: keep the allocation and the network
                    // object so a recreated replica with the same identity
                    // recovers the same external address.
                    info!(
                        "Retaining fixed binding {owner_key} across recreation of {namespace}/{name}"
                    );
                    return Ok(clear_finalizer(pod));
                }
            }
        }

        self.cloud.delete_network_object(&namespace, &name).await?;
        if self.cloud.get_network_object(&namespace, &name).await?.is_some() {
            return Err(ControllerError::DependencyNotReady(format!(
                "network object {namespace}/{name} still terminating"
            )));
        }
        self.allocator.deallocate(&owner_key)?;

        if conf.dedicated() && !conf.retain_resources {
            let set = self.cloud.get_workload_set(&namespace, &set_name).await?;
            let set_gone = set
                .map(|s| s.metadata.deletion_timestamp.is_some())
                .unwrap_or(true);
            if set_gone {
                self.release_pool_if_drained(&namespace, &set_name, &conf).await?;
            }
        }

        Ok(clear_finalizer(pod))
    }

    /// Chooses the load balancer and port bindings for a replica.
    ///
    /// Shared mode books ports through the allocator (idempotent per owner).
    /// Dedicated mode maps the replica index onto its prewarmed pool entry
    /// deterministically; the entry must already report its vendor id.
    async fn resolve_binding(
        &self,
        namespace: &str,
        name: &str,
        set_name: &str,
        owner_key: &str,
        conf: &NetworkConf,
    ) -> Result<(String, Vec<PortBinding>), ControllerError> {
        if conf.dedicated() {
            let index = Self::replica_index(name).ok_or_else(|| {
                ControllerError::InvalidConfig(format!(
                    "replica {name} has no ordinal; dedicated pools need indexed replicas"
                ))
            })?;
            let per_resource = pods_per_resource(&self.allocator_config, conf);
            let pool_index = index / per_resource;
            let isp_type = &conf.isp_types[0];

            let entries = self
                .cloud
                .list_load_balancers(namespace, set_name, isp_type)
                .await?;
            let lb_id = entries
                .iter()
                .find(|lb| lb.spec.pool_index == pool_index)
                .and_then(|lb| lb.status.as_ref())
                .and_then(|status| status.load_balancer_id.clone())
                .ok_or_else(|| {
                    ControllerError::DependencyNotReady(format!(
                        "pool entry {pool_index} for {namespace}/{set_name} ({isp_type}) not provisioned"
                    ))
                })?;

            let bindings = dedicated_bindings(&self.allocator_config, conf, index);
            return Ok((lb_id, bindings));
        }

        let record = match self.allocator.lookup(owner_key)? {
            Some(record) if record.ports.len() == conf.ports.len() => record,
            Some(_) => {
                // The declared port count changed; the old booking cannot be
                // paired up, so release and book afresh.
                self.allocator.deallocate(owner_key)?;
                self.allocator
                    .allocate(owner_key, &conf.lb_ids, conf.ports.len(), conf.policy)?
            }
            None => self
                .allocator
                .allocate(owner_key, &conf.lb_ids, conf.ports.len(), conf.policy)?,
        };

        let bindings = record
            .ports
            .iter()
            .zip(conf.ports.iter())
            .map(|(external, declared)| PortBinding {
                name: declared.name.clone(),
                port: *external,
                target_port: declared.port,
                protocol: declared.protocol,
            })
            .collect();
        Ok((record.load_balancer_id, bindings))
    }
}

/// Builds the desired network object shape.
#[allow(clippy::too_many_arguments)]
fn desired_object(
    namespace: &str,
    name: &str,
    owner_key: &str,
    workload_set: &str,
    load_balancer_id: &str,
    conf: &NetworkConf,
    external_enabled: bool,
    pod_link: Option<String>,
    ports: Vec<PortBinding>,
) -> NetworkObjectSpec {
    NetworkObjectSpec {
        namespace: namespace.to_string(),
        name: name.to_string(),
        owner_key: owner_key.to_string(),
        workload_set: workload_set.to_string(),
        load_balancer_id: load_balancer_id.to_string(),
        config_hash: conf.hash(),
        external_enabled,
        pod_link,
        ports,
    }
}

/// Readiness implied by the object's reachability: an externally enabled
/// object with every declared port visible on an ingress address is Ready.
fn evaluate(object: &NetworkObject) -> NetworkState {
    if object.spec.external_enabled && object.all_ports_visible() {
        NetworkState::Ready
    } else {
        NetworkState::NotReady
    }
}

fn build_status(
    object: &NetworkObject,
    pod: &Pod,
    conf: &NetworkConf,
    state: NetworkState,
    disabled: bool,
) -> NetworkStatus {
    let mut status = NetworkStatus {
        current_state: state.clone(),
        disabled,
        ..NetworkStatus::default()
    };
    if state != NetworkState::Ready {
        return status;
    }

    // Internal and external lists pair up per declared port.
    let internal_ports: Vec<NetworkPort> = conf
        .ports
        .iter()
        .map(|p| NetworkPort {
            name: p.name.clone(),
            port: p.port,
            protocol: p.protocol,
        })
        .collect();
    let external_ports: Vec<NetworkPort> = object
        .spec
        .ports
        .iter()
        .map(|b| NetworkPort {
            name: b.name.clone(),
            port: b.port,
            protocol: b.protocol,
        })
        .collect();

    if let Some(pod_ip) = pod.status.as_ref().and_then(|s| s.pod_ip.clone()) {
        status.internal_addresses = vec![NetworkAddress {
            ip: pod_ip,
            ports: internal_ports,
        }];
    }
    status.external_addresses = object
        .ingress
        .iter()
        .map(|ingress| NetworkAddress {
            ip: ingress.ip.clone(),
            ports: external_ports.clone(),
        })
        .collect();
    status
}

fn disabled_requested(pod: &Pod) -> bool {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(NETWORK_DISABLED_ANNOTATION))
        .map(|v| v == "true")
        .unwrap_or(false)
}

fn parse_status(pod: &Pod) -> Option<NetworkStatus> {
    let raw = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(NETWORK_STATUS_ANNOTATION))?;
    // A corrupt annotation is rewritten from scratch rather than failing the
    // replica forever.
    serde_json::from_str(raw).ok()
}

fn write_status(pod: &mut Pod, mut status: NetworkStatus, previous: Option<&NetworkStatus>) {
    status.last_transition = match previous {
        Some(prev) if prev.current_state == status.current_state => prev.last_transition,
        _ => Some(Utc::now()),
    };
    if let Ok(raw) = serde_json::to_string(&status) {
        pod.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(NETWORK_STATUS_ANNOTATION.to_string(), raw);
    }
}

fn clear_finalizer(pod: &Pod) -> Pod {
    let mut updated = pod.clone();
    if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != REPLICA_FINALIZER);
    }
    updated
}
