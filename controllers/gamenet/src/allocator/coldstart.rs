//! Cold-start reconstruction
//!
//! The allocator keeps no private persistent store: on startup its state is
//! derived entirely from the network objects that already exist in the
//! cluster. Reconstruction is order-independent and idempotent so the same
//! listing always produces the same state.

use std::collections::{BTreeMap, BTreeSet};

use cloud_client::NetworkObject;
use tracing::{debug, warn};

use super::AllocationRecord;
use crate::config::AllocatorConfig;

/// Derives allocation records from listed network objects.
///
/// Objects missing the load-balancer label or owner annotation, and ports
/// outside `[min_port, max_port)`, are skipped defensively rather than
/// treated as errors. Multiple objects of one owner merge into a single
/// record with sorted, deduplicated ports.
pub fn rebuild_records(
    objects: &[NetworkObject],
    config: &AllocatorConfig,
) -> Vec<AllocationRecord> {
    let mut by_owner: BTreeMap<String, (String, BTreeSet<i32>)> = BTreeMap::new();

    for object in objects {
        let spec = &object.spec;
        if spec.owner_key.is_empty() || spec.load_balancer_id.is_empty() {
            warn!(
                "Skipping network object {}/{} during reconstruction: missing owner or load balancer",
                spec.namespace, spec.name
            );
            continue;
        }

        let in_range: BTreeSet<i32> = spec
            .ports
            .iter()
            .map(|binding| binding.port)
            .filter(|p| (config.min_port..config.max_port).contains(p))
            .collect();
        if in_range.is_empty() {
            debug!(
                "Skipping network object {}/{}: no ports within [{}, {})",
                spec.namespace, spec.name, config.min_port, config.max_port
            );
            continue;
        }

        match by_owner.get_mut(&spec.owner_key) {
            Some((lb, ports)) => {
                if *lb != spec.load_balancer_id {
                    // Two objects disagree on the owner's load balancer; keep
                    // the lexicographically smaller id so the result does not
                    // depend on listing order.
                    warn!(
                        "Owner {} has objects on both {} and {}, keeping {}",
                        spec.owner_key,
                        lb,
                        spec.load_balancer_id,
                        std::cmp::min(lb.as_str(), spec.load_balancer_id.as_str())
                    );
                    if spec.load_balancer_id.as_str() < lb.as_str() {
                        *lb = spec.load_balancer_id.clone();
                        *ports = in_range;
                    }
                } else {
                    ports.extend(in_range);
                }
            }
            None => {
                by_owner.insert(
                    spec.owner_key.clone(),
                    (spec.load_balancer_id.clone(), in_range),
                );
            }
        }
    }

    by_owner
        .into_iter()
        .map(|(owner_key, (load_balancer_id, ports))| AllocationRecord {
            owner_key,
            load_balancer_id,
            ports: ports.into_iter().collect(),
        })
        .collect()
}
