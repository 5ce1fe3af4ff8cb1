//! Unit tests for cold-start reconstruction

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::allocator::coldstart::rebuild_records;
    use crate::allocator::selection::SelectionPolicy;
    use crate::allocator::PortAllocator;
    use crate::config::AllocatorConfig;
    use crate::test_utils::make_network_object;

    fn config() -> AllocatorConfig {
        AllocatorConfig::new(500, 520, BTreeSet::new()).unwrap()
    }

    #[test]
    fn test_rebuild_matches_direct_allocation() {
        let objects = vec![
            make_network_object("default", "game-0", "default/game-0", "L1", &[500, 501]),
            make_network_object("default", "game-1", "default/game-1", "L1", &[502]),
            make_network_object("other", "game-0", "other/game-0", "L2", &[500]),
        ];

        let records = rebuild_records(&objects, &config());
        let rebuilt = PortAllocator::new(config());
        rebuilt.install(records).unwrap();

        // Direct allocation of the same shapes yields the same booking state.
        let direct = PortAllocator::new(config());
        direct.install(Vec::new()).unwrap();
        let l1 = vec!["L1".to_string()];
        let l2 = vec!["L2".to_string()];
        direct
            .allocate("default/game-0", &l1, 2, SelectionPolicy::FirstFit)
            .unwrap();
        direct
            .allocate("default/game-1", &l1, 1, SelectionPolicy::FirstFit)
            .unwrap();
        direct
            .allocate("other/game-0", &l2, 1, SelectionPolicy::FirstFit)
            .unwrap();

        for lb in ["L1", "L2"] {
            assert_eq!(
                rebuilt.free_ports(lb).unwrap(),
                direct.free_ports(lb).unwrap()
            );
        }
        for owner in ["default/game-0", "default/game-1", "other/game-0"] {
            assert_eq!(
                rebuilt.lookup(owner).unwrap(),
                direct.lookup(owner).unwrap()
            );
        }
        rebuilt.verify_consistency().unwrap();
    }

    #[test]
    fn test_rebuild_is_order_independent() {
        let mut objects = vec![
            make_network_object("default", "game-0", "default/game-0", "L1", &[500, 501]),
            make_network_object("default", "game-1", "default/game-1", "L2", &[503]),
            make_network_object("default", "game-2", "default/game-2", "L1", &[505]),
        ];

        let forward = rebuild_records(&objects, &config());
        objects.reverse();
        let backward = rebuild_records(&objects, &config());

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let objects = vec![
            make_network_object("default", "game-0", "default/game-0", "L1", &[500]),
            make_network_object("default", "game-1", "default/game-1", "L1", &[501]),
        ];

        let once = rebuild_records(&objects, &config());
        let twice = rebuild_records(&objects, &config());
        assert_eq!(once, twice);

        // Re-installing the same records leaves the allocator unchanged.
        let allocator = PortAllocator::new(config());
        allocator.install(once.clone()).unwrap();
        let free_before = allocator.free_ports("L1").unwrap();
        allocator.install(twice).unwrap();
        assert_eq!(allocator.free_ports("L1").unwrap(), free_before);
    }

    #[test]
    fn test_rebuild_skips_unlabeled_and_out_of_range() {
        let objects = vec![
            // No owner recorded
            make_network_object("default", "stray", "", "L1", &[500]),
            // No load balancer recorded
            make_network_object("default", "manual", "default/manual", "", &[501]),
            // Entirely outside the managed range
            make_network_object("default", "game-9", "default/game-9", "L1", &[9999]),
            // Partially in range: only the in-range port is booked
            make_network_object("default", "game-0", "default/game-0", "L1", &[519, 9999]),
        ];

        let records = rebuild_records(&objects, &config());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].owner_key, "default/game-0");
        assert_eq!(records[0].ports, vec![519]);
    }

    #[test]
    fn test_rebuild_merges_objects_of_one_owner() {
        // A fixed binding can own several per-replica objects on one LB.
        let objects = vec![
            make_network_object("default", "game-a", "default/set", "L1", &[501]),
            make_network_object("default", "game-b", "default/set", "L1", &[500]),
        ];

        let records = rebuild_records(&objects, &config());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ports, vec![500, 501]);
    }
}
