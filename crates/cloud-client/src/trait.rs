//! CloudClientTrait for mocking
//!
//! This trait abstracts every read/write of externally-stored network state
//! so the reconcilers can be unit-tested against an in-memory mock. The
//! kube-backed client implements it for real clusters.

use crate::error::CloudError;
use crate::models::{NetworkObject, NetworkObjectSpec};
use crds::{
    DedicatedLoadBalancer, DedicatedLoadBalancerSpec, ElasticIP, ElasticIPSpec, GameServerSet,
};

/// Vendor adapter over network objects, pool resources, and workload sets.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait CloudClientTrait: Send + Sync {
    /// Human-readable provider name, for logs.
    fn provider(&self) -> &str;

    // Network objects (load-balancer-backed Services)

    /// List every network object this system materialized, across namespaces.
    async fn list_network_objects(&self) -> Result<Vec<NetworkObject>, CloudError>;

    /// List the per-replica network objects belonging to one workload set.
    async fn list_network_objects_for_set(
        &self,
        namespace: &str,
        workload_set: &str,
    ) -> Result<Vec<NetworkObject>, CloudError>;

    /// Fetch one network object, `None` if absent.
    async fn get_network_object(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NetworkObject>, CloudError>;

    /// Create or update a network object to match the desired spec.
    async fn apply_network_object(
        &self,
        desired: &NetworkObjectSpec,
    ) -> Result<NetworkObject, CloudError>;

    /// Delete a network object. Deleting an absent object is not an error.
    async fn delete_network_object(&self, namespace: &str, name: &str) -> Result<(), CloudError>;

    // Workload sets

    /// Fetch one workload set, `None` if absent.
    async fn get_workload_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GameServerSet>, CloudError>;

    /// List every workload set, across namespaces.
    async fn list_workload_sets(&self) -> Result<Vec<GameServerSet>, CloudError>;

    // Prewarmed pool resources

    /// List the dedicated load balancers of one (workload set, isp type).
    async fn list_load_balancers(
        &self,
        namespace: &str,
        workload_set: &str,
        isp_type: &str,
    ) -> Result<Vec<DedicatedLoadBalancer>, CloudError>;

    /// Create a dedicated load balancer, optionally carrying the pool
    /// finalizer. Creating an already-existing one is not an error.
    async fn create_load_balancer(
        &self,
        namespace: &str,
        name: &str,
        spec: &DedicatedLoadBalancerSpec,
        finalizer: bool,
    ) -> Result<DedicatedLoadBalancer, CloudError>;

    /// Remove the pool finalizer from a dedicated load balancer.
    async fn clear_load_balancer_finalizer(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), CloudError>;

    /// List the elastic IPs of one (workload set, isp type).
    async fn list_elastic_ips(
        &self,
        namespace: &str,
        workload_set: &str,
        isp_type: &str,
    ) -> Result<Vec<ElasticIP>, CloudError>;

    /// Create an elastic IP, optionally carrying the pool finalizer.
    /// Creating an already-existing one is not an error.
    async fn create_elastic_ip(
        &self,
        namespace: &str,
        name: &str,
        spec: &ElasticIPSpec,
        finalizer: bool,
    ) -> Result<ElasticIP, CloudError>;

    /// Remove the pool finalizer from an elastic IP.
    async fn clear_elastic_ip_finalizer(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), CloudError>;
}
