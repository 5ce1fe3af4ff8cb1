//! Shared labels, annotations, and finalizers
//!
//! Every marker the controllers write onto cluster objects lives here so the
//! reconcilers and the cloud client agree on the exact strings.

/// Label selecting pods managed by the gamenet controllers.
pub const ENABLED_LABEL: &str = "gamenet.io/enabled";

/// Annotation carrying the free-form network configuration (JSON object of
/// string keys to string values) on pods and in `GameServerSetSpec.network`.
pub const NETWORK_CONF_ANNOTATION: &str = "gamenet.io/network-conf";

/// Annotation on pods holding the persisted `NetworkStatus` as JSON.
pub const NETWORK_STATUS_ANNOTATION: &str = "gamenet.io/network-status";

/// Annotation on pods requesting the network object be made cluster-internal
/// only ("true") without releasing the allocation.
pub const NETWORK_DISABLED_ANNOTATION: &str = "gamenet.io/network-disabled";

/// Annotation on network objects recording the hash of the configuration they
/// were materialized from.
pub const CONFIG_HASH_ANNOTATION: &str = "gamenet.io/config-hash";

/// Annotation on network objects naming the allocation owner
/// (`namespace/podName` or `namespace/workloadSetName`).
pub const OWNER_KEY_ANNOTATION: &str = "gamenet.io/owner";

/// Label on network objects naming the load balancer the ports were booked on.
pub const LOAD_BALANCER_ID_LABEL: &str = "gamenet.io/load-balancer-id";

/// Label tying network objects and pool resources to their workload set.
pub const WORKLOAD_SET_LABEL: &str = "gamenet.io/workload-set";

/// Label on pool resources naming the network line type they serve.
pub const ISP_TYPE_LABEL: &str = "gamenet.io/isp-type";

/// Label on pool resources carrying their index within the pool.
pub const POOL_INDEX_LABEL: &str = "gamenet.io/pool-index";

/// Finalizer on pods gating their removal until the per-replica network
/// object is confirmed deleted.
pub const REPLICA_FINALIZER: &str = "gamenet.io/network-cleanup";

/// Finalizer on pool resources gating their removal until every per-replica
/// network object of the owning workload set is gone.
pub const POOL_FINALIZER: &str = "gamenet.io/pool-protection";
