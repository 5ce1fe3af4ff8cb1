//! Reconciliation logic for gamenet resources.
//!
//! One `Reconciler` owns the allocator, the vendor adapter, and the
//! prewarming high-water marks. The per-replica readiness state machine
//! lives in `readiness`, the pool controller in `prewarm`.

pub mod prewarm;
pub mod readiness;
#[cfg(test)]
mod readiness_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tracing::{info, warn};

use crate::allocator::coldstart::rebuild_records;
use crate::allocator::PortAllocator;
use crate::backoff::FibonacciBackoff;
use crate::config::{AllocatorConfig, NetworkConf};
use crate::error::ControllerError;
use cloud_client::CloudClientTrait;

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(5, 300), // 5 seconds min, 5 minutes max
            error_count: 0,
        }
    }
}

/// Reconciles replica network readiness and prewarmed pools.
pub struct Reconciler {
    pub(crate) cloud: Box<dyn CloudClientTrait>,
    pub(crate) allocator: Arc<PortAllocator>,
    pub(crate) allocator_config: AllocatorConfig,
    /// Highest replica index ever observed per workload set
    /// (`namespace/name`). Monotonic so the prewarmed pool never thrashes
    /// on scale-down.
    max_replica_index: Mutex<HashMap<String, i32>>,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("provider", &self.cloud.provider())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler. The allocator stays closed until
    /// [`Self::initialize`] installs reconstructed state.
    pub fn new(
        cloud: Box<dyn CloudClientTrait>,
        allocator: Arc<PortAllocator>,
        allocator_config: AllocatorConfig,
    ) -> Self {
        Self {
            cloud,
            allocator,
            allocator_config,
            max_replica_index: Mutex::new(HashMap::new()),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cold start: rebuild the allocator from the network objects that
    /// already exist, then run one prewarming pass per workload set.
    ///
    /// Must complete before any watcher starts; the allocator rejects
    /// allocate/deallocate until the rebuilt state is installed.
    pub async fn initialize(&self) -> Result<(), ControllerError> {
        let objects = self.cloud.list_network_objects().await?;
        let records = rebuild_records(&objects, &self.allocator_config);
        info!(
            "Cold start: rebuilt {} allocation records from {} network objects",
            records.len(),
            objects.len()
        );
        self.allocator.install(records)?;

        let sets = self.cloud.list_workload_sets().await?;
        for set in &sets {
            if let Err(e) = self.reconcile_workload_set(set).await {
                // Prewarming failures are recovered by later passes; they
                // must not hold up the watchers.
                warn!(
                    "Initial prewarming pass failed for {:?}/{:?}: {}",
                    set.metadata.namespace, set.metadata.name, e
                );
            }
        }
        Ok(())
    }

    /// Records an observed replica index, keeping the high-water mark.
    pub(crate) fn observe_replica_index(&self, set_key: &str, index: i32) {
        let mut marks = match self.max_replica_index.lock() {
            Ok(marks) => marks,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = marks.entry(set_key.to_string()).or_insert(index);
        if index > *entry {
            *entry = index;
        }
    }

    /// The highest replica index ever seen for a workload set.
    pub(crate) fn max_replica_index(&self, set_key: &str) -> i32 {
        match self.max_replica_index.lock() {
            Ok(marks) => marks.get(set_key).copied().unwrap_or(0),
            Err(poisoned) => poisoned.into_inner().get(set_key).copied().unwrap_or(0),
        }
    }

    /// Increment error count for a resource and return the next requeue delay.
    pub(crate) fn error_backoff(&self, resource_key: &str) -> Duration {
        let mut states = match self.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        let state = states
            .entry(resource_key.to_string())
            .or_insert_with(BackoffState::new);
        state.error_count += 1;
        let delay = state.backoff.next_backoff();
        tracing::debug!(
            "{resource_key}: error #{}, requeueing in {delay:?}",
            state.error_count
        );
        delay
    }

    /// Reset error tracking after a successful pass.
    pub(crate) fn reset_errors(&self, resource_key: &str) {
        let mut states = match self.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(state) = states.get_mut(resource_key) {
            state.error_count = 0;
            state.backoff.reset();
        }
    }

    /// `namespace/name` of a pod; errors mirror a pod the API server should
    /// never hand us.
    pub(crate) fn pod_key(pod: &Pod) -> Result<(String, String), ControllerError> {
        let name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig("pod missing name".to_string()))?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig("pod missing namespace".to_string()))?;
        Ok((namespace, name))
    }

    /// The workload set owning a pod: its GameServerSet owner reference, or
    /// the pod name with its trailing ordinal stripped.
    pub(crate) fn set_name_for(pod: &Pod) -> Result<String, ControllerError> {
        if let Some(owner) = pod
            .metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.iter().find(|r| r.kind == "GameServerSet"))
        {
            return Ok(owner.name.clone());
        }
        let name = pod
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("pod missing name".to_string()))?;
        match name.rsplit_once('-') {
            Some((prefix, ordinal)) if ordinal.chars().all(|c| c.is_ascii_digit()) => {
                Ok(prefix.to_string())
            }
            _ => Err(ControllerError::InvalidConfig(format!(
                "cannot determine workload set for pod {name}"
            ))),
        }
    }

    /// The ordinal in a `<set>-<index>` replica name, if present.
    pub(crate) fn replica_index(name: &str) -> Option<i32> {
        name.rsplit_once('-')
            .and_then(|(_, ordinal)| ordinal.parse().ok())
    }

    /// The allocation owner key: fixed bindings are keyed by the workload
    /// set so they survive replica recreation, ephemeral ones by the pod.
    pub(crate) fn owner_key(
        namespace: &str,
        pod_name: &str,
        set_name: &str,
        conf: &NetworkConf,
    ) -> String {
        if conf.fixed {
            format!("{namespace}/{set_name}")
        } else {
            format!("{namespace}/{pod_name}")
        }
    }
}
