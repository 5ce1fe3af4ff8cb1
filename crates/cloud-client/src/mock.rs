//! Mock cloud client for unit testing
//!
//! Stores every object in in-memory maps and lets tests simulate the
//! vendor side: reporting ingress on a network object, marking elastic IPs
//! and load balancers ready, and deferring deletions to exercise the
//! confirm-then-release path.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::cloud_trait::CloudClientTrait;
use crate::error::CloudError;
use crate::models::{IngressAddress, NetworkObject, NetworkObjectSpec};
use crds::{
    DedicatedLoadBalancer, DedicatedLoadBalancerSpec, DedicatedLoadBalancerStatus, ElasticIP,
    ElasticIPSpec, ElasticIPStatus, GameServerSet, ProvisioningState, POOL_FINALIZER,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

type Key = (String, String);

/// In-memory stand-in for the cluster-backed cloud client.
#[derive(Clone, Default)]
pub struct MockCloudClient {
    network_objects: Arc<Mutex<HashMap<Key, NetworkObject>>>,
    workload_sets: Arc<Mutex<HashMap<Key, GameServerSet>>>,
    load_balancers: Arc<Mutex<HashMap<Key, DedicatedLoadBalancer>>>,
    elastic_ips: Arc<Mutex<HashMap<Key, ElasticIP>>>,
    hold_deletes: Arc<Mutex<bool>>,
    pending_deletes: Arc<Mutex<HashSet<Key>>>,
    next_ip_octet: Arc<Mutex<u8>>,
}

impl std::fmt::Debug for MockCloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCloudClient").finish_non_exhaustive()
    }
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

impl MockCloudClient {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workload set to the mock store (for test setup).
    pub fn add_workload_set(&self, set: GameServerSet) {
        let ns = set.metadata.namespace.clone().unwrap_or_default();
        let name = set.metadata.name.clone().unwrap_or_default();
        self.workload_sets.lock().unwrap().insert((ns, name), set);
    }

    /// Remove a workload set (simulates set deletion).
    pub fn remove_workload_set(&self, namespace: &str, name: &str) {
        self.workload_sets.lock().unwrap().remove(&key(namespace, name));
    }

    /// Mark a workload set as deleting by stamping a deletion timestamp.
    pub fn mark_workload_set_deleting(&self, namespace: &str, name: &str) {
        if let Some(set) = self
            .workload_sets
            .lock()
            .unwrap()
            .get_mut(&key(namespace, name))
        {
            set.metadata.deletion_timestamp = Some(
                k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
            );
        }
    }

    /// Seed a pre-existing network object (for cold-start tests).
    pub fn add_network_object(&self, object: NetworkObject) {
        let k = key(&object.spec.namespace, &object.spec.name);
        self.network_objects.lock().unwrap().insert(k, object);
    }

    /// Simulate the vendor reporting an ingress address on a network object.
    pub fn set_ingress(&self, namespace: &str, name: &str, ip: &str, ports: Vec<i32>) {
        if let Some(obj) = self
            .network_objects
            .lock()
            .unwrap()
            .get_mut(&key(namespace, name))
        {
            obj.ingress = vec![IngressAddress {
                ip: ip.to_string(),
                ports,
            }];
        }
    }

    /// Simulate the vendor finishing elastic-IP provisioning.
    pub fn make_elastic_ip_ready(&self, namespace: &str, name: &str, allocation_id: &str) {
        if let Some(eip) = self
            .elastic_ips
            .lock()
            .unwrap()
            .get_mut(&key(namespace, name))
        {
            eip.status = Some(ElasticIPStatus {
                allocation_id: Some(allocation_id.to_string()),
                address: Some(format!("203.0.113.{}", eip.spec.pool_index + 1)),
                state: ProvisioningState::Ready,
                message: None,
            });
        }
    }

    /// Simulate the vendor finishing load-balancer provisioning.
    pub fn make_load_balancer_ready(&self, namespace: &str, name: &str, lb_id: &str) {
        if let Some(lb) = self
            .load_balancers
            .lock()
            .unwrap()
            .get_mut(&key(namespace, name))
        {
            lb.status = Some(DedicatedLoadBalancerStatus {
                load_balancer_id: Some(lb_id.to_string()),
                state: ProvisioningState::Ready,
                message: None,
            });
        }
    }

    /// When held, deletions stay visible until [`Self::flush_deletions`].
    pub fn hold_deletions(&self, hold: bool) {
        *self.hold_deletes.lock().unwrap() = hold;
    }

    /// Apply every deletion deferred while deletions were held.
    pub fn flush_deletions(&self) {
        let pending: Vec<Key> = self.pending_deletes.lock().unwrap().drain().collect();
        let mut objects = self.network_objects.lock().unwrap();
        for k in pending {
            objects.remove(&k);
        }
    }

    /// Number of stored network objects (for assertions).
    #[must_use]
    pub fn network_object_count(&self) -> usize {
        self.network_objects.lock().unwrap().len()
    }

    /// Fetch a stored load balancer (for assertions).
    #[must_use]
    pub fn load_balancer(&self, namespace: &str, name: &str) -> Option<DedicatedLoadBalancer> {
        self.load_balancers.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Fetch a stored elastic IP (for assertions).
    #[must_use]
    pub fn elastic_ip(&self, namespace: &str, name: &str) -> Option<ElasticIP> {
        self.elastic_ips.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Names of stored elastic IPs (for assertions).
    #[must_use]
    pub fn elastic_ip_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .elastic_ips
            .lock()
            .unwrap()
            .keys()
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn next_cluster_ip(&self) -> String {
        let mut octet = self.next_ip_octet.lock().unwrap();
        *octet = octet.wrapping_add(1);
        format!("10.96.0.{}", *octet)
    }
}

#[async_trait::async_trait]
impl CloudClientTrait for MockCloudClient {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn list_network_objects(&self) -> Result<Vec<NetworkObject>, CloudError> {
        Ok(self.network_objects.lock().unwrap().values().cloned().collect())
    }

    async fn list_network_objects_for_set(
        &self,
        namespace: &str,
        workload_set: &str,
    ) -> Result<Vec<NetworkObject>, CloudError> {
        Ok(self
            .network_objects
            .lock()
            .unwrap()
            .values()
            .filter(|obj| obj.spec.namespace == namespace && obj.spec.workload_set == workload_set)
            .cloned()
            .collect())
    }

    async fn get_network_object(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NetworkObject>, CloudError> {
        Ok(self
            .network_objects
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned())
    }

    async fn apply_network_object(
        &self,
        desired: &NetworkObjectSpec,
    ) -> Result<NetworkObject, CloudError> {
        let k = key(&desired.namespace, &desired.name);
        let mut objects = self.network_objects.lock().unwrap();
        let applied = match objects.get(&k) {
            // Vendor-side observations survive a spec update.
            Some(existing) => NetworkObject {
                spec: desired.clone(),
                cluster_ip: existing.cluster_ip.clone(),
                ingress: existing.ingress.clone(),
            },
            None => NetworkObject {
                spec: desired.clone(),
                cluster_ip: Some(self.next_cluster_ip()),
                ingress: Vec::new(),
            },
        };
        objects.insert(k, applied.clone());
        Ok(applied)
    }

    async fn delete_network_object(&self, namespace: &str, name: &str) -> Result<(), CloudError> {
        let k = key(namespace, name);
        if *self.hold_deletes.lock().unwrap() {
            self.pending_deletes.lock().unwrap().insert(k);
        } else {
            self.network_objects.lock().unwrap().remove(&k);
        }
        Ok(())
    }

    async fn get_workload_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GameServerSet>, CloudError> {
        Ok(self
            .workload_sets
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned())
    }

    async fn list_workload_sets(&self) -> Result<Vec<GameServerSet>, CloudError> {
        Ok(self.workload_sets.lock().unwrap().values().cloned().collect())
    }

    async fn list_load_balancers(
        &self,
        namespace: &str,
        workload_set: &str,
        isp_type: &str,
    ) -> Result<Vec<DedicatedLoadBalancer>, CloudError> {
        Ok(self
            .load_balancers
            .lock()
            .unwrap()
            .values()
            .filter(|lb| {
                lb.metadata.namespace.as_deref() == Some(namespace)
                    && lb.spec.workload_set == workload_set
                    && lb.spec.isp_type == isp_type
            })
            .cloned()
            .collect())
    }

    async fn create_load_balancer(
        &self,
        namespace: &str,
        name: &str,
        spec: &DedicatedLoadBalancerSpec,
        finalizer: bool,
    ) -> Result<DedicatedLoadBalancer, CloudError> {
        let k = key(namespace, name);
        let mut lbs = self.load_balancers.lock().unwrap();
        if let Some(existing) = lbs.get(&k) {
            return Ok(existing.clone());
        }
        let lb = DedicatedLoadBalancer {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                finalizers: finalizer.then(|| vec![POOL_FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: spec.clone(),
            status: None,
        };
        lbs.insert(k, lb.clone());
        Ok(lb)
    }

    async fn clear_load_balancer_finalizer(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        if let Some(lb) = self
            .load_balancers
            .lock()
            .unwrap()
            .get_mut(&key(namespace, name))
        {
            if let Some(finalizers) = lb.metadata.finalizers.as_mut() {
                finalizers.retain(|f| f != POOL_FINALIZER);
            }
        }
        Ok(())
    }

    async fn list_elastic_ips(
        &self,
        namespace: &str,
        workload_set: &str,
        isp_type: &str,
    ) -> Result<Vec<ElasticIP>, CloudError> {
        Ok(self
            .elastic_ips
            .lock()
            .unwrap()
            .values()
            .filter(|eip| {
                eip.metadata.namespace.as_deref() == Some(namespace)
                    && eip.spec.workload_set == workload_set
                    && eip.spec.isp_type == isp_type
            })
            .cloned()
            .collect())
    }

    async fn create_elastic_ip(
        &self,
        namespace: &str,
        name: &str,
        spec: &ElasticIPSpec,
        finalizer: bool,
    ) -> Result<ElasticIP, CloudError> {
        let k = key(namespace, name);
        let mut eips = self.elastic_ips.lock().unwrap();
        if let Some(existing) = eips.get(&k) {
            return Ok(existing.clone());
        }
        let eip = ElasticIP {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                finalizers: finalizer.then(|| vec![POOL_FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: spec.clone(),
            status: None,
        };
        eips.insert(k, eip.clone());
        Ok(eip)
    }

    async fn clear_elastic_ip_finalizer(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        if let Some(eip) = self
            .elastic_ips
            .lock()
            .unwrap()
            .get_mut(&key(namespace, name))
        {
            if let Some(finalizers) = eip.metadata.finalizers.as_mut() {
                finalizers.retain(|f| f != POOL_FINALIZER);
            }
        }
        Ok(())
    }
}
