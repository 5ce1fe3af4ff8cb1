//! Unit tests for the network readiness state machine

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::test_utils::{make_network_object, make_pod, make_reconciler, make_workload_set};
    use cloud_client::CloudClientTrait;
    use crds::{
        NetworkState, NetworkStatus, NETWORK_DISABLED_ANNOTATION, NETWORK_STATUS_ANNOTATION,
        REPLICA_FINALIZER,
    };
    use k8s_openapi::api::core::v1::Pod;

    const SHARED_CONF: &[(&str, &str)] = &[
        ("load-balancer-ids", "lb-1,lb-2"),
        ("ports", "7777/UDP"),
    ];

    fn status_of(pod: &Pod) -> NetworkStatus {
        let raw = pod
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(NETWORK_STATUS_ANNOTATION))
            .expect("status annotation missing");
        serde_json::from_str(raw).expect("status annotation unparseable")
    }

    fn set_annotation(pod: &mut Pod, key: &str, value: &str) {
        pod.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
    }

    #[tokio::test]
    async fn test_first_pass_records_not_ready_and_nothing_else() {
        let (reconciler, mock) = make_reconciler(8000, 8100);
        reconciler.initialize().await.unwrap();

        let pod = make_pod("default", "game-0", SHARED_CONF);
        let (updated, state) = reconciler.on_replica_updated(&pod).await.unwrap();

        assert_eq!(state, NetworkState::NotReady);
        assert_eq!(status_of(&updated).current_state, NetworkState::NotReady);
        // No network object was materialized on the first pass
        assert_eq!(mock.network_object_count(), 0);
        // No ports were booked either
        assert!(reconciler.allocator.lookup("default/game-0").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_materializes_then_becomes_ready() {
        let (reconciler, mock) = make_reconciler(8000, 8100);
        reconciler.initialize().await.unwrap();

        let pod = make_pod("default", "game-0", SHARED_CONF);
        let (pod, _) = reconciler.on_replica_updated(&pod).await.unwrap();
        let (pod, state) = reconciler.on_replica_updated(&pod).await.unwrap();

        // Second pass materialized the object but the vendor has not
        // reported an ingress address yet.
        assert_eq!(state, NetworkState::NotReady);
        let object = mock
            .get_network_object("default", "game-0")
            .await
            .unwrap()
            .expect("object not materialized");
        assert_eq!(object.spec.load_balancer_id, "lb-1");
        assert_eq!(object.spec.ports.len(), 1);
        assert_eq!(object.spec.ports[0].port, 8000);
        assert_eq!(object.spec.ports[0].target_port, 7777);
        assert_eq!(object.spec.pod_link.as_deref(), Some("game-0"));
        assert!(object.spec.external_enabled);

        mock.set_ingress("default", "game-0", "198.51.100.1", vec![]);
        let (pod, state) = reconciler.on_replica_updated(&pod).await.unwrap();
        assert_eq!(state, NetworkState::Ready);

        let status = status_of(&pod);
        assert_eq!(status.current_state, NetworkState::Ready);
        assert_eq!(status.external_addresses.len(), 1);
        assert_eq!(status.external_addresses[0].ip, "198.51.100.1");
        assert_eq!(status.external_addresses[0].ports[0].port, 8000);
        assert_eq!(status.internal_addresses[0].ip, "10.0.0.5");
        assert_eq!(status.internal_addresses[0].ports[0].port, 7777);
        // Internal and external lists pair up per declared port
        assert_eq!(
            status.internal_addresses[0].ports[0].name,
            status.external_addresses[0].ports[0].name
        );
    }

    #[tokio::test]
    async fn test_config_drift_rematerializes_reusing_allocation() {
        let (reconciler, mock) = make_reconciler(8000, 8100);
        reconciler.initialize().await.unwrap();

        let pod = make_pod("default", "game-0", SHARED_CONF);
        let (pod, _) = reconciler.on_replica_updated(&pod).await.unwrap();
        let (pod, _) = reconciler.on_replica_updated(&pod).await.unwrap();
        mock.set_ingress("default", "game-0", "198.51.100.1", vec![]);
        let (pod, state) = reconciler.on_replica_updated(&pod).await.unwrap();
        assert_eq!(state, NetworkState::Ready);

        // Same port count, different target port: hash drifts.
        let mut pod = pod;
        let drifted = make_pod(
            "default",
            "game-0",
            &[("load-balancer-ids", "lb-1,lb-2"), ("ports", "7788/UDP")],
        );
        set_annotation(
            &mut pod,
            crds::NETWORK_CONF_ANNOTATION,
            drifted
                .metadata
                .annotations
                .as_ref()
                .unwrap()
                .get(crds::NETWORK_CONF_ANNOTATION)
                .unwrap(),
        );

        let (_, state) = reconciler.on_replica_updated(&pod).await.unwrap();
        // The re-materialization pass reports NotReady even though stale
        // ingress is still visible on the object.
        assert_eq!(state, NetworkState::NotReady);

        let object = mock
            .get_network_object("default", "game-0")
            .await
            .unwrap()
            .unwrap();
        // External port was reused from the existing allocation
        assert_eq!(object.spec.ports[0].port, 8000);
        assert_eq!(object.spec.ports[0].target_port, 7788);
    }

    #[tokio::test]
    async fn test_disabled_flips_reachability_without_releasing_ports() {
        let (reconciler, mock) = make_reconciler(8000, 8100);
        reconciler.initialize().await.unwrap();

        let pod = make_pod("default", "game-0", SHARED_CONF);
        let (pod, _) = reconciler.on_replica_updated(&pod).await.unwrap();
        let (pod, _) = reconciler.on_replica_updated(&pod).await.unwrap();
        mock.set_ingress("default", "game-0", "198.51.100.1", vec![]);
        let (mut pod, state) = reconciler.on_replica_updated(&pod).await.unwrap();
        assert_eq!(state, NetworkState::Ready);

        set_annotation(&mut pod, NETWORK_DISABLED_ANNOTATION, "true");
        let (mut pod, state) = reconciler.on_replica_updated(&pod).await.unwrap();
        // Internal-only reachability implies NotReady, but the allocation
        // is untouched.
        assert_eq!(state, NetworkState::NotReady);
        let object = mock
            .get_network_object("default", "game-0")
            .await
            .unwrap()
            .unwrap();
        assert!(!object.spec.external_enabled);
        assert!(reconciler.allocator.lookup("default/game-0").unwrap().is_some());
        assert!(status_of(&pod).disabled);

        // Clearing the flag flips the object back; with ingress already
        // reported it is Ready on the same pass (the flip itself does not
        // force NotReady).
        set_annotation(&mut pod, NETWORK_DISABLED_ANNOTATION, "false");
        let (pod, state) = reconciler.on_replica_updated(&pod).await.unwrap();
        assert_eq!(state, NetworkState::Ready);
        assert!(!status_of(&pod).disabled);
    }

    #[tokio::test]
    async fn test_exhaustion_is_retryable_and_leaves_others_intact() {
        let (reconciler, _mock) = make_reconciler(8000, 8001);
        reconciler.initialize().await.unwrap();

        let conf = &[("load-balancer-ids", "lb-1"), ("ports", "7777/UDP")];
        let pod_a = make_pod("default", "game-0", conf);
        let (pod_a, _) = reconciler.on_replica_updated(&pod_a).await.unwrap();
        let (_, _) = reconciler.on_replica_updated(&pod_a).await.unwrap();

        let pod_b = make_pod("default", "game-1", conf);
        let (pod_b, _) = reconciler.on_replica_updated(&pod_b).await.unwrap();
        let err = reconciler.on_replica_updated(&pod_b).await.unwrap_err();

        assert!(matches!(err, ControllerError::Exhausted(_)));
        assert!(err.is_retryable());
        assert!(reconciler.allocator.lookup("default/game-0").unwrap().is_some());
        reconciler.allocator.verify_consistency().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_configuration_is_not_retryable() {
        let (reconciler, _mock) = make_reconciler(8000, 8100);
        reconciler.initialize().await.unwrap();

        let pod = make_pod(
            "default",
            "game-0",
            &[("load-balancer-ids", "lb-1"), ("ports", "seven")],
        );
        let err = reconciler.on_replica_updated(&pod).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_added_hook_attaches_finalizer_and_never_allocates() {
        let (reconciler, mock) = make_reconciler(8000, 8100);
        reconciler.initialize().await.unwrap();

        let pod = make_pod("default", "game-0", SHARED_CONF);
        let updated = reconciler.on_replica_added(&pod).await.unwrap();
        assert!(updated
            .metadata
            .finalizers
            .as_ref()
            .unwrap()
            .iter()
            .any(|f| f == REPLICA_FINALIZER));
        assert_eq!(mock.network_object_count(), 0);
        assert!(reconciler.allocator.lookup("default/game-0").unwrap().is_none());

        // Unmanaged pods are left alone entirely.
        let plain = Pod {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("plain-0".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let untouched = reconciler.on_replica_added(&plain).await.unwrap();
        assert!(untouched.metadata.finalizers.is_none());
        let (_, state) = reconciler.on_replica_updated(&plain).await.unwrap();
        assert_eq!(state, NetworkState::Waiting);
    }

    #[tokio::test]
    async fn test_fixed_binding_survives_replica_recreation() {
        let (reconciler, mock) = make_reconciler(8000, 8100);
        let fixed_conf = &[
            ("load-balancer-ids", "lb-1"),
            ("ports", "7777/UDP"),
            ("fixed", "true"),
        ];
        mock.add_workload_set(make_workload_set("default", "game", 1, fixed_conf));
        reconciler.initialize().await.unwrap();

        let pod = make_pod("default", "game-0", fixed_conf);
        let pod = reconciler.on_replica_added(&pod).await.unwrap();
        let (pod, _) = reconciler.on_replica_updated(&pod).await.unwrap();
        let (pod, _) = reconciler.on_replica_updated(&pod).await.unwrap();
        let record = reconciler
            .allocator
            .lookup("default/game")
            .unwrap()
            .expect("fixed binding not recorded");

        // Replica deleted while the set lives on: allocation and network
        // object are retained, only the finalizer clears.
        let cleared = reconciler.on_replica_deleted(&pod).await.unwrap();
        assert!(cleared
            .metadata
            .finalizers
            .as_ref()
            .map(|f| !f.iter().any(|x| x == REPLICA_FINALIZER))
            .unwrap_or(true));
        assert_eq!(
            reconciler.allocator.lookup("default/game").unwrap(),
            Some(record.clone())
        );
        assert!(mock
            .get_network_object("default", "game-0")
            .await
            .unwrap()
            .is_some());

        // A recreated replica with the same identity recovers the same
        // allocation.
        let recreated = make_pod("default", "game-0", fixed_conf);
        let (recreated, _) = reconciler.on_replica_updated(&recreated).await.unwrap();
        let (_, _) = reconciler.on_replica_updated(&recreated).await.unwrap();
        assert_eq!(
            reconciler.allocator.lookup("default/game").unwrap(),
            Some(record)
        );

        // Once the set itself is deleting, deletion releases everything.
        mock.mark_workload_set_deleting("default", "game");
        reconciler.on_replica_deleted(&recreated).await.unwrap();
        assert!(reconciler.allocator.lookup("default/game").unwrap().is_none());
        assert!(mock
            .get_network_object("default", "game-0")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_deletion_waits_for_confirmed_object_removal() {
        let (reconciler, mock) = make_reconciler(8000, 8100);
        reconciler.initialize().await.unwrap();

        let pod = make_pod("default", "game-0", SHARED_CONF);
        let pod = reconciler.on_replica_added(&pod).await.unwrap();
        let (pod, _) = reconciler.on_replica_updated(&pod).await.unwrap();
        let (pod, _) = reconciler.on_replica_updated(&pod).await.unwrap();

        mock.hold_deletions(true);
        let err = reconciler.on_replica_deleted(&pod).await.unwrap_err();
        assert!(matches!(err, ControllerError::DependencyNotReady(_)));
        // Ports are not released before the removal is confirmed
        assert!(reconciler.allocator.lookup("default/game-0").unwrap().is_some());

        mock.hold_deletions(false);
        mock.flush_deletions();
        let cleared = reconciler.on_replica_deleted(&pod).await.unwrap();
        assert!(cleared
            .metadata
            .finalizers
            .as_ref()
            .map(|f| !f.iter().any(|x| x == REPLICA_FINALIZER))
            .unwrap_or(true));
        assert!(reconciler.allocator.lookup("default/game-0").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialize_rebuilds_from_existing_objects() {
        let (reconciler, mock) = make_reconciler(8000, 8100);
        mock.add_network_object(make_network_object(
            "default",
            "game-0",
            "default/game-0",
            "lb-1",
            &[8000, 8001],
        ));
        reconciler.initialize().await.unwrap();

        let record = reconciler
            .allocator
            .lookup("default/game-0")
            .unwrap()
            .expect("record not reconstructed");
        assert_eq!(record.ports, vec![8000, 8001]);

        // A fresh allocation books around the reconstructed ports.
        let fresh = reconciler
            .allocator
            .allocate(
                "default/game-1",
                &["lb-1".to_string()],
                1,
                crate::allocator::selection::SelectionPolicy::FirstFit,
            )
            .unwrap();
        assert_eq!(fresh.ports, vec![8002]);
        reconciler.allocator.verify_consistency().unwrap();
    }
}
