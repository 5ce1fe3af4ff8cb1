//! Port allocation engine
//!
//! The only in-process shared mutable state of the controller: per-load-
//! balancer port bitmaps plus the owner-keyed allocation registry, guarded
//! by one allocator-wide lock. Port ranges are small and allocation is
//! infrequent, so a single lock wins on clarity over fine-grained schemes.
//!
//! The bitmap and the registry must never diverge: the set of booked,
//! non-blocked ports of a load balancer always equals the union of ports
//! across that load balancer's records.

pub mod bitmap;
pub mod coldstart;
pub mod selection;
#[cfg(test)]
mod coldstart_test;
#[cfg(test)]
mod selection_test;

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};

use crate::config::AllocatorConfig;
use crate::error::ControllerError;
use bitmap::PortBitmap;
use selection::{select_candidate, SelectionPolicy};

/// One live allocation: an owner's ports on one load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    /// `namespace/podName` (ephemeral) or `namespace/workloadSetName` (fixed)
    pub owner_key: String,
    /// Load balancer the ports are booked on
    pub load_balancer_id: String,
    /// Booked ports, ascending
    pub ports: Vec<i32>,
}

#[derive(Debug)]
struct AllocatorState {
    bitmaps: HashMap<String, PortBitmap>,
    registry: HashMap<String, AllocationRecord>,
    scatter_cursor: usize,
    reconstructed: bool,
}

/// The allocator. Mutation takes the exclusive lock; monitoring reads take
/// the shared lock.
#[derive(Debug)]
pub struct PortAllocator {
    config: AllocatorConfig,
    state: RwLock<AllocatorState>,
}

impl PortAllocator {
    /// Creates an allocator that rejects calls until [`Self::install`] runs.
    #[must_use]
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            config,
            state: RwLock::new(AllocatorState {
                bitmaps: HashMap::new(),
                registry: HashMap::new(),
                scatter_cursor: 0,
                reconstructed: false,
            }),
        }
    }

    /// Installs cold-start reconstruction output, replacing all prior state,
    /// and opens the allocator for allocate/deallocate calls.
    pub fn install(&self, records: Vec<AllocationRecord>) -> Result<(), ControllerError> {
        let mut state = self.write_state()?;
        state.bitmaps.clear();
        state.registry.clear();
        for record in records {
            let bitmap = state
                .bitmaps
                .entry(record.load_balancer_id.clone())
                .or_insert_with(|| PortBitmap::new(&self.config));
            for port in &record.ports {
                bitmap.book(*port);
            }
            state.registry.insert(record.owner_key.clone(), record);
        }
        state.reconstructed = true;
        info!(
            "Allocator state installed: {} owners across {} load balancers",
            state.registry.len(),
            state.bitmaps.len()
        );
        Ok(())
    }

    /// Books `count` ports for `owner_key` on a candidate chosen by `policy`.
    ///
    /// Idempotent: an owner that already holds a record gets it back
    /// unchanged. Fails atomically with `Exhausted` when no candidate has
    /// enough free ports.
    pub fn allocate(
        &self,
        owner_key: &str,
        candidates: &[String],
        count: usize,
        policy: SelectionPolicy,
    ) -> Result<AllocationRecord, ControllerError> {
        let mut state = self.write_state()?;
        if !state.reconstructed {
            return Err(ControllerError::DependencyNotReady(
                "allocator state not reconstructed yet".to_string(),
            ));
        }

        if let Some(existing) = state.registry.get(owner_key) {
            debug!(
                "Reusing allocation for {}: {:?} on {}",
                owner_key, existing.ports, existing.load_balancer_id
            );
            return Ok(existing.clone());
        }

        let full_range = self.config.range_size() - self.config.blocked_in_range();
        let free_counts: Vec<usize> = candidates
            .iter()
            .map(|id| state.bitmaps.get(id).map_or(full_range, PortBitmap::free_count))
            .collect();
        let chosen = select_candidate(policy, &free_counts, count, &mut state.scatter_cursor);
        let Some(idx) = chosen else {
            return Err(ControllerError::Exhausted(format!(
                "no candidate of {candidates:?} has {count} free ports for {owner_key}"
            )));
        };

        let lb_id = candidates[idx].clone();
        let bitmap = state
            .bitmaps
            .entry(lb_id.clone())
            .or_insert_with(|| PortBitmap::new(&self.config));
        let ports = bitmap.try_allocate(count).ok_or_else(|| {
            ControllerError::Exhausted(format!("{lb_id} exhausted while booking for {owner_key}"))
        })?;

        let record = AllocationRecord {
            owner_key: owner_key.to_string(),
            load_balancer_id: lb_id,
            ports,
        };
        info!(
            "Allocated {:?} on {} for {}",
            record.ports, record.load_balancer_id, owner_key
        );
        state.registry.insert(owner_key.to_string(), record.clone());
        Ok(record)
    }

    /// Releases the owner's record, freeing exactly its ports. Blocked ports
    /// stay booked. Returns the released record, `None` for unknown owners.
    pub fn deallocate(&self, owner_key: &str) -> Result<Option<AllocationRecord>, ControllerError> {
        let mut state = self.write_state()?;
        if !state.reconstructed {
            return Err(ControllerError::DependencyNotReady(
                "allocator state not reconstructed yet".to_string(),
            ));
        }
        let Some(record) = state.registry.remove(owner_key) else {
            return Ok(None);
        };
        if let Some(bitmap) = state.bitmaps.get_mut(&record.load_balancer_id) {
            bitmap.release(&record.ports);
        }
        info!(
            "Released {:?} on {} for {}",
            record.ports, record.load_balancer_id, owner_key
        );
        Ok(Some(record))
    }

    /// Fetches the owner's current record without allocating.
    pub fn lookup(&self, owner_key: &str) -> Result<Option<AllocationRecord>, ControllerError> {
        let state = self.read_state()?;
        Ok(state.registry.get(owner_key).cloned())
    }

    /// Free, non-blocked ports on one load balancer (monitoring read).
    pub fn free_ports(&self, load_balancer_id: &str) -> Result<usize, ControllerError> {
        let state = self.read_state()?;
        Ok(state
            .bitmaps
            .get(load_balancer_id)
            .map_or(self.config.range_size() - self.config.blocked_in_range(), PortBitmap::free_count))
    }

    /// Checks the bitmap/registry invariant. A violation means a bug; the
    /// caller should prefer a cold-start rebuild over proceeding.
    pub fn verify_consistency(&self) -> Result<(), ControllerError> {
        let state = self.read_state()?;
        for (lb_id, bitmap) in &state.bitmaps {
            let mut from_records: Vec<i32> = state
                .registry
                .values()
                .filter(|r| &r.load_balancer_id == lb_id)
                .flat_map(|r| r.ports.iter().copied())
                .collect();
            from_records.sort_unstable();
            let booked = bitmap.booked_ports();
            if booked != from_records {
                return Err(ControllerError::ConsistencyViolation(format!(
                    "{lb_id}: bitmap has {booked:?} but registry has {from_records:?}"
                )));
            }
        }
        Ok(())
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, AllocatorState>, ControllerError> {
        self.state.write().map_err(|_| {
            ControllerError::ConsistencyViolation("allocator lock poisoned".to_string())
        })
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, AllocatorState>, ControllerError> {
        self.state.read().map_err(|_| {
            ControllerError::ConsistencyViolation("allocator lock poisoned".to_string())
        })
    }
}
