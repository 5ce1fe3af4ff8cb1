//! Kube-backed cloud client
//!
//! Renders network objects as `v1/Service` resources and pool resources as
//! gamenet CRs. The labels and annotations written here are the ones the
//! cold-start reconstruction reads back, so the mapping must stay symmetric.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::{debug, warn};

use crate::cloud_trait::CloudClientTrait;
use crate::error::CloudError;
use crate::models::{
    IngressAddress, NetworkObject, NetworkObjectSpec, PortBinding, POD_NAME_SELECTOR_LABEL,
};
use crds::{
    DedicatedLoadBalancer, DedicatedLoadBalancerSpec, ElasticIP, ElasticIPSpec, GameServerSet,
    CONFIG_HASH_ANNOTATION, ISP_TYPE_LABEL, LOAD_BALANCER_ID_LABEL, OWNER_KEY_ANNOTATION,
    POOL_FINALIZER, POOL_INDEX_LABEL, WORKLOAD_SET_LABEL,
};

/// Cloud client backed by the Kubernetes API server.
pub struct KubeCloudClient {
    client: Client,
    /// Restrict list operations to one namespace; `None` watches the cluster.
    namespace: Option<String>,
}

impl std::fmt::Debug for KubeCloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCloudClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeCloudClient {
    /// Creates a client scoped to `namespace`, or cluster-wide when `None`.
    #[must_use]
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn services_scope(&self) -> Api<Service> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn sets_scope(&self) -> Api<GameServerSet> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn services_in(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Renders a desired network object as a Service.
    fn to_service(desired: &NetworkObjectSpec) -> Service {
        let mut labels = BTreeMap::new();
        labels.insert(
            LOAD_BALANCER_ID_LABEL.to_string(),
            desired.load_balancer_id.clone(),
        );
        labels.insert(WORKLOAD_SET_LABEL.to_string(), desired.workload_set.clone());

        let mut annotations = BTreeMap::new();
        annotations.insert(OWNER_KEY_ANNOTATION.to_string(), desired.owner_key.clone());
        annotations.insert(CONFIG_HASH_ANNOTATION.to_string(), desired.config_hash.clone());

        let selector = desired.pod_link.as_ref().map(|pod| {
            let mut sel = BTreeMap::new();
            sel.insert(POD_NAME_SELECTOR_LABEL.to_string(), pod.clone());
            sel
        });

        let ports = desired
            .ports
            .iter()
            .map(|binding| ServicePort {
                name: Some(binding.name.clone()),
                port: binding.port,
                target_port: Some(IntOrString::Int(binding.target_port)),
                protocol: Some(binding.protocol.as_str().to_string()),
                ..Default::default()
            })
            .collect();

        let type_ = if desired.external_enabled {
            "LoadBalancer"
        } else {
            "ClusterIP"
        };

        Service {
            metadata: ObjectMeta {
                name: Some(desired.name.clone()),
                namespace: Some(desired.namespace.clone()),
                labels: Some(labels),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(type_.to_string()),
                selector,
                ports: Some(ports),
                ..Default::default()
            }),
            status: None,
        }
    }

    /// Reads a Service back into the engine's view. Returns `None` when the
    /// object is missing the markers this system writes (defensive skip).
    fn from_service(svc: &Service) -> Option<NetworkObject> {
        let name = svc.metadata.name.clone()?;
        let namespace = svc.metadata.namespace.clone()?;
        let labels = svc.metadata.labels.as_ref()?;
        let annotations = svc.metadata.annotations.as_ref()?;

        let load_balancer_id = labels.get(LOAD_BALANCER_ID_LABEL)?.clone();
        let owner_key = annotations.get(OWNER_KEY_ANNOTATION)?.clone();
        let workload_set = labels.get(WORKLOAD_SET_LABEL).cloned().unwrap_or_default();
        let config_hash = annotations
            .get(CONFIG_HASH_ANNOTATION)
            .cloned()
            .unwrap_or_default();

        let spec = svc.spec.as_ref()?;
        let external_enabled = spec.type_.as_deref() == Some("LoadBalancer");
        let pod_link = spec
            .selector
            .as_ref()
            .and_then(|sel| sel.get(POD_NAME_SELECTOR_LABEL))
            .cloned();

        let ports = spec
            .ports
            .as_ref()
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| PortBinding {
                        name: p.name.clone().unwrap_or_default(),
                        port: p.port,
                        target_port: match &p.target_port {
                            Some(IntOrString::Int(n)) => *n,
                            _ => p.port,
                        },
                        protocol: p
                            .protocol
                            .as_deref()
                            .and_then(|s| s.parse().ok())
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let cluster_ip = spec
            .cluster_ip
            .clone()
            .filter(|ip| !ip.is_empty() && ip != "None");

        let ingress = svc
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let ip = entry.ip.clone().or_else(|| entry.hostname.clone())?;
                        let ports = entry
                            .ports
                            .as_ref()
                            .map(|ps| ps.iter().map(|p| p.port).collect())
                            .unwrap_or_default();
                        Some(IngressAddress { ip, ports })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(NetworkObject {
            spec: NetworkObjectSpec {
                namespace,
                name,
                owner_key,
                workload_set,
                load_balancer_id,
                config_hash,
                external_enabled,
                pod_link,
                ports,
            },
            cluster_ip,
            ingress,
        })
    }

    async fn clear_finalizer_on<K>(api: Api<K>, name: &str) -> Result<(), CloudError>
    where
        K: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + serde::Serialize,
        K::DynamicType: Default,
    {
        let current = match api.get_opt(name).await? {
            Some(obj) => obj,
            None => return Ok(()),
        };
        let remaining: Vec<String> = current
            .meta()
            .finalizers
            .clone()
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != POOL_FINALIZER)
            .collect();
        let patch = serde_json::json!({ "metadata": { "finalizers": remaining } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    fn pool_labels(workload_set: &str, isp_type: &str, pool_index: i32) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(WORKLOAD_SET_LABEL.to_string(), workload_set.to_string());
        labels.insert(ISP_TYPE_LABEL.to_string(), isp_type.to_string());
        labels.insert(POOL_INDEX_LABEL.to_string(), pool_index.to_string());
        labels
    }

    fn pool_selector(workload_set: &str, isp_type: &str) -> ListParams {
        ListParams::default().labels(&format!(
            "{WORKLOAD_SET_LABEL}={workload_set},{ISP_TYPE_LABEL}={isp_type}"
        ))
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

#[async_trait::async_trait]
impl CloudClientTrait for KubeCloudClient {
    fn provider(&self) -> &str {
        "kubernetes"
    }

    async fn list_network_objects(&self) -> Result<Vec<NetworkObject>, CloudError> {
        let lp = ListParams::default().labels(LOAD_BALANCER_ID_LABEL);
        let services = self.services_scope().list(&lp).await?;
        let mut objects = Vec::new();
        for svc in services.items {
            match Self::from_service(&svc) {
                Some(obj) => objects.push(obj),
                None => {
                    warn!(
                        "Skipping service {:?}/{:?}: missing gamenet markers",
                        svc.metadata.namespace, svc.metadata.name
                    );
                }
            }
        }
        Ok(objects)
    }

    async fn list_network_objects_for_set(
        &self,
        namespace: &str,
        workload_set: &str,
    ) -> Result<Vec<NetworkObject>, CloudError> {
        let lp = ListParams::default().labels(&format!("{WORKLOAD_SET_LABEL}={workload_set}"));
        let services = self.services_in(namespace).list(&lp).await?;
        Ok(services.items.iter().filter_map(Self::from_service).collect())
    }

    async fn get_network_object(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NetworkObject>, CloudError> {
        let svc = self.services_in(namespace).get_opt(name).await?;
        Ok(svc.as_ref().and_then(Self::from_service))
    }

    async fn apply_network_object(
        &self,
        desired: &NetworkObjectSpec,
    ) -> Result<NetworkObject, CloudError> {
        let api = self.services_in(&desired.namespace);
        let mut svc = Self::to_service(desired);

        let applied = match api.get_opt(&desired.name).await? {
            Some(existing) => {
                // Replace against the observed version so a stale write is
                // rejected by the API server and retried by the caller.
                svc.metadata.resource_version = existing.metadata.resource_version.clone();
                // clusterIP is immutable; carry assigned nodePorts so the
                // apiserver does not re-randomize them on every update.
                if let (Some(new_spec), Some(old_spec)) = (svc.spec.as_mut(), existing.spec.as_ref())
                {
                    new_spec.cluster_ip = old_spec.cluster_ip.clone();
                    if let (Some(new_ports), Some(old_ports)) =
                        (new_spec.ports.as_mut(), old_spec.ports.as_ref())
                    {
                        for port in new_ports.iter_mut() {
                            if let Some(old) = old_ports.iter().find(|p| p.name == port.name) {
                                port.node_port = old.node_port;
                            }
                        }
                    }
                }
                debug!(
                    "Updating network object {}/{}",
                    desired.namespace, desired.name
                );
                api.replace(&desired.name, &PostParams::default(), &svc)
                    .await?
            }
            None => {
                debug!(
                    "Creating network object {}/{} on {}",
                    desired.namespace, desired.name, desired.load_balancer_id
                );
                api.create(&PostParams::default(), &svc).await?
            }
        };

        Self::from_service(&applied).ok_or_else(|| {
            CloudError::InvalidObject(format!(
                "applied service {}/{} lost its gamenet markers",
                desired.namespace, desired.name
            ))
        })
    }

    async fn delete_network_object(&self, namespace: &str, name: &str) -> Result<(), CloudError> {
        match self
            .services_in(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_workload_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GameServerSet>, CloudError> {
        let api: Api<GameServerSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_workload_sets(&self) -> Result<Vec<GameServerSet>, CloudError> {
        let sets = self.sets_scope().list(&ListParams::default()).await?;
        Ok(sets.items)
    }

    async fn list_load_balancers(
        &self,
        namespace: &str,
        workload_set: &str,
        isp_type: &str,
    ) -> Result<Vec<DedicatedLoadBalancer>, CloudError> {
        let api: Api<DedicatedLoadBalancer> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&Self::pool_selector(workload_set, isp_type)).await?;
        Ok(list.items)
    }

    async fn create_load_balancer(
        &self,
        namespace: &str,
        name: &str,
        spec: &DedicatedLoadBalancerSpec,
        finalizer: bool,
    ) -> Result<DedicatedLoadBalancer, CloudError> {
        let api: Api<DedicatedLoadBalancer> = Api::namespaced(self.client.clone(), namespace);
        let lb = DedicatedLoadBalancer {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(Self::pool_labels(
                    &spec.workload_set,
                    &spec.isp_type,
                    spec.pool_index,
                )),
                finalizers: finalizer.then(|| vec![POOL_FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: spec.clone(),
            status: None,
        };
        match api.create(&PostParams::default(), &lb).await {
            Ok(created) => Ok(created),
            Err(e) if is_already_exists(&e) => Ok(api.get(name).await?),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_load_balancer_finalizer(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        let api: Api<DedicatedLoadBalancer> = Api::namespaced(self.client.clone(), namespace);
        Self::clear_finalizer_on(api, name).await
    }

    async fn list_elastic_ips(
        &self,
        namespace: &str,
        workload_set: &str,
        isp_type: &str,
    ) -> Result<Vec<ElasticIP>, CloudError> {
        let api: Api<ElasticIP> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&Self::pool_selector(workload_set, isp_type)).await?;
        Ok(list.items)
    }

    async fn create_elastic_ip(
        &self,
        namespace: &str,
        name: &str,
        spec: &ElasticIPSpec,
        finalizer: bool,
    ) -> Result<ElasticIP, CloudError> {
        let api: Api<ElasticIP> = Api::namespaced(self.client.clone(), namespace);
        let eip = ElasticIP {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(Self::pool_labels(
                    &spec.workload_set,
                    &spec.isp_type,
                    spec.pool_index,
                )),
                finalizers: finalizer.then(|| vec![POOL_FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: spec.clone(),
            status: None,
        };
        match api.create(&PostParams::default(), &eip).await {
            Ok(created) => Ok(created),
            Err(e) if is_already_exists(&e) => Ok(api.get(name).await?),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_elastic_ip_finalizer(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        let api: Api<ElasticIP> = Api::namespaced(self.client.clone(), namespace);
        Self::clear_finalizer_on(api, name).await
    }
}
