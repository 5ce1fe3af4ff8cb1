//! Prewarmed pool controller
//!
//! Keeps a standing pool of dedicated load balancers and elastic IPs sized
//! to the high-water mark of replica indices, so replica startup never waits
//! on vendor provisioning. The pool only grows; entries disappear solely
//! through finalizer-gated cascading deletion of the owning workload set.

use tracing::{debug, info};

use super::Reconciler;
use crate::config::{AllocatorConfig, NetworkConf};
use crate::error::ControllerError;
use cloud_client::{NetworkObjectSpec, PortBinding};
use crds::{
    DedicatedLoadBalancer, DedicatedLoadBalancerSpec, ElasticIPSpec, GameServerSet, POOL_FINALIZER,
};

/// Replicas one pool entry can serve: the port range divided by the ports
/// each replica declares.
pub(crate) fn pods_per_resource(config: &AllocatorConfig, conf: &NetworkConf) -> i32 {
    let per = config.range_size() / conf.ports.len().max(1);
    (per as i32).max(1)
}

/// Pool entries required for a high-water replica index.
pub(crate) fn expected_count(max_index: i32, per_resource: i32, reserve: usize) -> i32 {
    max_index / per_resource + reserve as i32 + 1
}

/// Deterministic port bindings of a replica slot on its dedicated pool entry.
pub(crate) fn dedicated_bindings(
    config: &AllocatorConfig,
    conf: &NetworkConf,
    replica_index: i32,
) -> Vec<PortBinding> {
    let per_resource = pods_per_resource(config, conf);
    let slot = replica_index % per_resource;
    let base = config.min_port + slot * conf.ports.len() as i32;
    conf.ports
        .iter()
        .enumerate()
        .map(|(k, port)| PortBinding {
            name: port.name.clone(),
            port: base + k as i32,
            target_port: port.port,
            protocol: port.protocol,
        })
        .collect()
}

impl Reconciler {
    /// One prewarming pass for a workload set: grow the pool to the expected
    /// count and pre-create per-replica network objects for ready entries.
    pub async fn reconcile_workload_set(&self, set: &GameServerSet) -> Result<(), ControllerError> {
        let name = set
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("workload set missing name".to_string()))?;
        let namespace = set.metadata.namespace.as_deref().unwrap_or("default");

        let Some(network) = set.spec.network.as_ref() else {
            return Ok(());
        };
        let conf = NetworkConf::parse(network)?;

        if set.metadata.deletion_timestamp.is_some() {
            if conf.dedicated() && !conf.retain_resources {
                return self.release_pool_if_drained(namespace, name, &conf).await;
            }
            return Ok(());
        }
        if !conf.dedicated() {
            return Ok(());
        }

        let set_key = format!("{namespace}/{name}");
        if set.spec.replicas > 0 {
            self.observe_replica_index(&set_key, set.spec.replicas - 1);
        }

        let per_resource = pods_per_resource(&self.allocator_config, &conf);
        let expected = expected_count(self.max_replica_index(&set_key), per_resource, conf.reserve);

        for (isp_pos, isp_type) in conf.isp_types.iter().enumerate() {
            let existing = self
                .cloud
                .list_load_balancers(namespace, name, isp_type)
                .await?;
            // The pool never shrinks: surplus entries stay until cascade.
            let target = expected.max(existing.len() as i32);

            for index in 0..target {
                if existing.iter().any(|lb| lb.spec.pool_index == index) {
                    continue;
                }
                match self
                    .ensure_pool_entry(namespace, name, isp_type, index, &conf)
                    .await
                {
                    Ok(()) => {}
                    Err(ControllerError::DependencyNotReady(reason)) => {
                        // Dependencies catch up on their own; retry next pass.
                        debug!("Pool entry {index} for {set_key} ({isp_type}) deferred: {reason}");
                    }
                    Err(e) => return Err(e),
                }
            }

            // Per-replica objects route through the primary line type.
            if isp_pos == 0 {
                for lb in &existing {
                    self.precreate_replica_objects(namespace, name, lb, &conf, per_resource)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Creates the elastic IPs of one pool entry, then the load balancer
    /// referencing their allocation ids once every one of them is ready.
    async fn ensure_pool_entry(
        &self,
        namespace: &str,
        set_name: &str,
        isp_type: &str,
        index: i32,
        conf: &NetworkConf,
    ) -> Result<(), ControllerError> {
        let finalizer = !conf.retain_resources;
        let eips = self
            .cloud
            .list_elastic_ips(namespace, set_name, isp_type)
            .await?;

        let mut allocation_ids = Vec::with_capacity(conf.zones.len());
        let mut pending = Vec::new();
        for zone in &conf.zones {
            let eip_name = format!("{set_name}-{isp_type}-{index}-{}", zone.zone);
            let existing = eips
                .iter()
                .find(|e| e.spec.pool_index == index && e.spec.zone == zone.zone)
                .cloned();
            let eip = match existing {
                Some(eip) => eip,
                None => {
                    info!("Creating elastic IP {namespace}/{eip_name}");
                    self.cloud
                        .create_elastic_ip(
                            namespace,
                            &eip_name,
                            &ElasticIPSpec {
                                workload_set: set_name.to_string(),
                                isp_type: isp_type.to_string(),
                                pool_index: index,
                                zone: zone.zone.clone(),
                                subnet: zone.subnet.clone(),
                            },
                            finalizer,
                        )
                        .await?
                }
            };
            match eip.status.as_ref().and_then(|s| s.allocation_id.clone()) {
                Some(id) => allocation_ids.push(id),
                None => pending.push(eip_name),
            }
        }

        if !pending.is_empty() {
            // Never create the load balancer with partial bindings.
            return Err(ControllerError::DependencyNotReady(format!(
                "elastic IPs not provisioned yet: {pending:?}"
            )));
        }

        let lb_name = format!("{set_name}-{isp_type}-{index}");
        info!("Creating dedicated load balancer {namespace}/{lb_name}");
        self.cloud
            .create_load_balancer(
                namespace,
                &lb_name,
                &DedicatedLoadBalancerSpec {
                    workload_set: set_name.to_string(),
                    isp_type: isp_type.to_string(),
                    pool_index: index,
                    eip_allocation_ids: allocation_ids,
                    zones: conf.zones.clone(),
                },
                finalizer,
            )
            .await?;
        Ok(())
    }

    /// Pre-creates the per-replica network objects one ready pool entry can
    /// serve, without pod linkage; readiness links them when replicas appear.
    async fn precreate_replica_objects(
        &self,
        namespace: &str,
        set_name: &str,
        entry: &DedicatedLoadBalancer,
        conf: &NetworkConf,
        per_resource: i32,
    ) -> Result<(), ControllerError> {
        let Some(lb_id) = entry
            .status
            .as_ref()
            .and_then(|s| s.load_balancer_id.clone())
        else {
            return Ok(());
        };

        let first = entry.spec.pool_index * per_resource;
        for replica_index in first..first + per_resource {
            let object_name = format!("{set_name}-{replica_index}");
            if self
                .cloud
                .get_network_object(namespace, &object_name)
                .await?
                .is_some()
            {
                continue;
            }
            let owner_key = Self::owner_key(namespace, &object_name, set_name, conf);
            let desired = NetworkObjectSpec {
                namespace: namespace.to_string(),
                name: object_name.clone(),
                owner_key,
                workload_set: set_name.to_string(),
                load_balancer_id: lb_id.clone(),
                config_hash: conf.hash(),
                external_enabled: true,
                pod_link: None,
                ports: dedicated_bindings(&self.allocator_config, conf, replica_index),
            };
            debug!("Pre-creating network object {namespace}/{object_name} on {lb_id}");
            self.cloud.apply_network_object(&desired).await?;
        }
        Ok(())
    }

    /// Deletes leftover unlinked objects of a set, then reports whether the
    /// dependents query shows zero remaining network objects.
    async fn drain_set_objects(
        &self,
        namespace: &str,
        set_name: &str,
    ) -> Result<bool, ControllerError> {
        let objects = self
            .cloud
            .list_network_objects_for_set(namespace, set_name)
            .await?;
        for object in &objects {
            if object.spec.pod_link.is_none() {
                // Prewarmed placeholders have no pod whose deletion would
                // clean them up.
                self.cloud
                    .delete_network_object(namespace, &object.spec.name)
                    .await?;
                self.allocator.deallocate(&object.spec.owner_key)?;
            }
        }
        let remaining = self
            .cloud
            .list_network_objects_for_set(namespace, set_name)
            .await?;
        Ok(remaining.is_empty())
    }

    /// Phase two of cascading deletion: once no per-replica network object
    /// of the set remains, release the pool markers so the orchestrator's
    /// garbage collection can take the resources.
    pub(crate) async fn release_pool_if_drained(
        &self,
        namespace: &str,
        set_name: &str,
        conf: &NetworkConf,
    ) -> Result<(), ControllerError> {
        if !self.drain_set_objects(namespace, set_name).await? {
            return Err(ControllerError::DependencyNotReady(format!(
                "network objects of {namespace}/{set_name} still present"
            )));
        }

        for isp_type in &conf.isp_types {
            for lb in self
                .cloud
                .list_load_balancers(namespace, set_name, isp_type)
                .await?
            {
                if let Some(name) = lb.metadata.name.as_deref() {
                    info!("Releasing pool marker on load balancer {namespace}/{name}");
                    self.cloud.clear_load_balancer_finalizer(namespace, name).await?;
                }
            }
            for eip in self
                .cloud
                .list_elastic_ips(namespace, set_name, isp_type)
                .await?
            {
                if let Some(name) = eip.metadata.name.as_deref() {
                    self.cloud.clear_elastic_ip_finalizer(namespace, name).await?;
                }
            }
        }

        // Any fixed binding of the drained set is released with the pool.
        self.allocator.deallocate(&format!("{namespace}/{set_name}"))?;
        Ok(())
    }

    /// Reconciles one pool entry. Only deletion needs work here: vendor
    /// controllers own provisioning, this controller owns the release gate.
    pub async fn reconcile_pool_entry(
        &self,
        entry: &DedicatedLoadBalancer,
    ) -> Result<(), ControllerError> {
        if entry.metadata.deletion_timestamp.is_none() {
            return Ok(());
        }
        let has_marker = entry
            .metadata
            .finalizers
            .as_ref()
            .map(|f| f.iter().any(|f| f == POOL_FINALIZER))
            .unwrap_or(false);
        if !has_marker {
            return Ok(());
        }

        let name = entry
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("pool entry missing name".to_string()))?;
        let namespace = entry.metadata.namespace.as_deref().unwrap_or("default");
        let set_name = &entry.spec.workload_set;

        if !self.drain_set_objects(namespace, set_name).await? {
            return Err(ControllerError::DependencyNotReady(format!(
                "pool entry {namespace}/{name} still has dependent network objects"
            )));
        }

        info!("Releasing pool markers for {namespace}/{name}");
        self.cloud.clear_load_balancer_finalizer(namespace, name).await?;
        for eip in self
            .cloud
            .list_elastic_ips(namespace, set_name, &entry.spec.isp_type)
            .await?
        {
            if eip.spec.pool_index == entry.spec.pool_index {
                if let Some(eip_name) = eip.metadata.name.as_deref() {
                    self.cloud.clear_elastic_ip_finalizer(namespace, eip_name).await?;
                }
            }
        }
        Ok(())
    }
}
