//! Unit tests for workload network configuration parsing

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use crate::allocator::selection::SelectionPolicy;
    use crate::config::{AllocatorConfig, NetworkConf};
    use crate::error::ControllerError;
    use crds::Protocol;

    fn conf(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_shared_lb_conf() {
        let map = conf(&[
            ("load-balancer-ids", "lb-1, lb-2"),
            ("ports", "7777/UDP,7778/TCP"),
            ("policy", "scatter"),
            ("fixed", "true"),
        ]);

        let parsed = NetworkConf::parse(&map).unwrap();
        assert_eq!(parsed.lb_ids, vec!["lb-1", "lb-2"]);
        assert_eq!(parsed.ports.len(), 2);
        assert_eq!(parsed.ports[0].port, 7777);
        assert_eq!(parsed.ports[0].protocol, Protocol::Udp);
        assert_eq!(parsed.ports[0].name, "udp-7777");
        assert_eq!(parsed.ports[1].protocol, Protocol::Tcp);
        assert_eq!(parsed.policy, SelectionPolicy::Scatter);
        assert!(parsed.fixed);
        assert!(!parsed.dedicated());
    }

    #[test]
    fn test_parse_defaults() {
        let map = conf(&[("load-balancer-ids", "lb-1"), ("ports", "7777")]);

        let parsed = NetworkConf::parse(&map).unwrap();
        // Bare port defaults to TCP, policy defaults to first-fit
        assert_eq!(parsed.ports[0].protocol, Protocol::Tcp);
        assert_eq!(parsed.policy, SelectionPolicy::FirstFit);
        assert!(!parsed.fixed);
        assert!(!parsed.retain_resources);
        assert_eq!(parsed.reserve, 0);
    }

    #[test]
    fn test_parse_dedicated_conf() {
        let map = conf(&[
            ("ports", "7777/UDP"),
            ("isp-types", "bgp,static"),
            ("zones", "zone-a:subnet-1, zone-b:subnet-2"),
            ("reserve", "2"),
            ("retain-resources", "true"),
        ]);

        let parsed = NetworkConf::parse(&map).unwrap();
        assert!(parsed.dedicated());
        assert_eq!(parsed.isp_types, vec!["bgp", "static"]);
        assert_eq!(parsed.zones.len(), 2);
        assert_eq!(parsed.zones[0].zone, "zone-a");
        assert_eq!(parsed.zones[1].subnet, "subnet-2");
        assert_eq!(parsed.reserve, 2);
        assert!(parsed.retain_resources);
    }

    #[test]
    fn test_parse_rejects_missing_ports() {
        let map = conf(&[("load-balancer-ids", "lb-1")]);
        assert!(matches!(
            NetworkConf::parse(&map),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_port() {
        let map = conf(&[("load-balancer-ids", "lb-1"), ("ports", "seven/UDP")]);
        assert!(matches!(
            NetworkConf::parse(&map),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_protocol() {
        let map = conf(&[("load-balancer-ids", "lb-1"), ("ports", "7777/SCTP")]);
        assert!(matches!(
            NetworkConf::parse(&map),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_rejects_zone_without_subnet() {
        let map = conf(&[
            ("ports", "7777"),
            ("isp-types", "bgp"),
            ("zones", "zone-a"),
        ]);
        assert!(matches!(
            NetworkConf::parse(&map),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_rejects_no_target() {
        // Neither shared candidates nor a dedicated pool requested
        let map = conf(&[("ports", "7777")]);
        assert!(matches!(
            NetworkConf::parse(&map),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_hash_changes_with_ports_only() {
        let base = NetworkConf::parse(&conf(&[
            ("load-balancer-ids", "lb-1"),
            ("ports", "7777/UDP"),
        ]))
        .unwrap();
        let same = NetworkConf::parse(&conf(&[
            ("load-balancer-ids", "lb-1"),
            ("ports", "7777/UDP"),
            ("reserve", "3"),
        ]))
        .unwrap();
        let different = NetworkConf::parse(&conf(&[
            ("load-balancer-ids", "lb-1"),
            ("ports", "7778/UDP"),
        ]))
        .unwrap();

        // Reserve sizing does not reshape the network object
        assert_eq!(base.hash(), same.hash());
        assert_ne!(base.hash(), different.hash());
    }

    #[test]
    fn test_allocator_config_rejects_inverted_range() {
        assert!(AllocatorConfig::new(900, 500, BTreeSet::new()).is_err());
        assert!(AllocatorConfig::new(0, 500, BTreeSet::new()).is_err());
        let ok = AllocatorConfig::new(500, 520, BTreeSet::new()).unwrap();
        assert_eq!(ok.range_size(), 20);
    }
}
