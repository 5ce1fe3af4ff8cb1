//! Unit tests for load-balancer selection

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::allocator::selection::{select_candidate, SelectionPolicy};
    use crate::allocator::PortAllocator;
    use crate::config::AllocatorConfig;
    use crate::error::ControllerError;

    fn lbs(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "first-fit".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::FirstFit
        );
        assert_eq!(
            "scatter".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::Scatter
        );
        assert!("round-robin".parse::<SelectionPolicy>().is_err());
    }

    #[test]
    fn test_first_fit_concentrates_on_first_candidate() {
        let mut cursor = 0;
        for _ in 0..3 {
            let idx =
                select_candidate(SelectionPolicy::FirstFit, &[10, 10], 1, &mut cursor).unwrap();
            assert_eq!(idx, 0);
        }
    }

    #[test]
    fn test_first_fit_skips_undercapacity_candidate() {
        let mut cursor = 0;
        let idx = select_candidate(SelectionPolicy::FirstFit, &[3, 8], 5, &mut cursor).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_no_candidate_qualifies() {
        let mut cursor = 0;
        assert!(select_candidate(SelectionPolicy::FirstFit, &[2, 2], 5, &mut cursor).is_none());
        assert!(select_candidate(SelectionPolicy::Scatter, &[2, 2], 5, &mut cursor).is_none());
        assert!(select_candidate(SelectionPolicy::FirstFit, &[], 1, &mut cursor).is_none());
    }

    #[test]
    fn test_scatter_alternates_between_two_candidates() {
        // Four sequential single-port allocations for distinct owners
        // alternate L1, L2, L1, L2.
        let config = AllocatorConfig::new(500, 520, BTreeSet::new()).unwrap();
        let allocator = PortAllocator::new(config);
        allocator.install(Vec::new()).unwrap();
        let candidates = lbs(&["L1", "L2"]);

        let mut chosen = Vec::new();
        for owner in ["ns/a", "ns/b", "ns/c", "ns/d"] {
            let record = allocator
                .allocate(owner, &candidates, 1, SelectionPolicy::Scatter)
                .unwrap();
            chosen.push(record.load_balancer_id);
        }
        assert_eq!(chosen, vec!["L1", "L2", "L1", "L2"]);
    }

    #[test]
    fn test_scatter_skips_exhausted_candidate() {
        let config = AllocatorConfig::new(500, 502, BTreeSet::new()).unwrap();
        let allocator = PortAllocator::new(config);
        allocator.install(Vec::new()).unwrap();
        let candidates = lbs(&["L1", "L2"]);

        // Fill L1 completely.
        allocator
            .allocate("ns/fill", &lbs(&["L1"]), 2, SelectionPolicy::FirstFit)
            .unwrap();

        // Scatter wraps past the exhausted candidate on both passes.
        for owner in ["ns/a", "ns/b"] {
            let record = allocator
                .allocate(owner, &candidates, 1, SelectionPolicy::Scatter)
                .unwrap();
            assert_eq!(record.load_balancer_id, "L2");
        }
        let err = allocator
            .allocate("ns/c", &candidates, 1, SelectionPolicy::Scatter)
            .unwrap_err();
        assert!(matches!(err, ControllerError::Exhausted(_)));
    }
}
