//! Stories about the Kubernetes-backed resource client
//!
//! Claims are mounted by a pod before waiting for Bound so that classes with
//! `WaitForFirstConsumer` binding (like kind's local-path) bind too.

use std::time::Duration;

use storage_perf::claim::{PodRequest, DEFAULT_ACCESS_MODE};
use storage_perf::cleanup::TrackedResource;
use storage_perf::{ClaimPhase, ClaimSpec, CleanupRegistrar, InterfaceKind, ResourceClient};

use super::helpers::{resource_client, run_id, test_client, test_config};

/// Story: a claim is created, bound through a consuming pod, then deleted
#[tokio::test]
#[ignore = "requires a Kubernetes cluster"]
async fn story_claim_binds_and_deletes() {
    let config = test_config();
    let client = resource_client(test_client().await, &config);
    let registrar = CleanupRegistrar::waiting(config.delete_timeout());
    let interface = InterfaceKind::Block;

    let name = format!("it-claim-{}", run_id());
    let spec = ClaimSpec::new(
        &name,
        &config.namespace,
        "1Gi",
        interface,
        config.storage_class(interface),
    )
    .with_access_mode(DEFAULT_ACCESS_MODE);
    let mut claim = client.create_claim(&spec).await.expect("claim created");
    registrar.register(TrackedResource::Claim(claim.clone()));

    let pod = client
        .create_pod(
            &PodRequest {
                name: format!("{}-consumer", name),
                namespace: config.namespace.clone(),
                claim_name: name.clone(),
                image: config.many_files.image.clone(),
                mount_path: "/data".to_string(),
                node_name: None,
            },
            interface,
        )
        .await
        .expect("pod created");
    registrar.register(TrackedResource::Pod(pod.clone()));

    client
        .wait_for_claim_phase(&claim, ClaimPhase::Bound, config.bind_timeout())
        .await
        .expect("claim bound");
    client.reload_claim(&mut claim).await.expect("reloaded");
    assert_eq!(claim.phase, ClaimPhase::Bound);
    let volume = claim.bound_volume.clone().expect("bound volume name");
    assert!(client.volume_exists(&volume).await.expect("volume lookup"));

    let outcomes = registrar.run_all(&client).await;
    assert!(outcomes.iter().all(|o| o.is_ok()), "cleanup: {outcomes:?}");

    client
        .wait_for_claim_delete(&claim, Duration::from_secs(60))
        .await
        .expect("claim gone");
}

/// Story: deleting something already gone is not an error
#[tokio::test]
#[ignore = "requires a Kubernetes cluster"]
async fn story_deleting_missing_resources_is_quiet() {
    let config = test_config();
    let client = resource_client(test_client().await, &config);

    let claim = storage_perf::VolumeClaim::pending(ClaimSpec::new(
        format!("it-missing-{}", run_id()),
        &config.namespace,
        "1Gi",
        InterfaceKind::Block,
        config.storage_class(InterfaceKind::Block),
    ));
    client.delete_claim(&claim).await.expect("missing claim ok");
    client
        .delete_volume("pvc-does-not-exist")
        .await
        .expect("missing volume ok");
    assert!(!client
        .volume_exists("pvc-does-not-exist")
        .await
        .expect("lookup"));
}

/// Story: waiting on a claim that cannot bind times out with its name
#[tokio::test]
#[ignore = "requires a Kubernetes cluster"]
async fn story_unbindable_claim_times_out() {
    let config = test_config();
    let client = resource_client(test_client().await, &config);
    let registrar = CleanupRegistrar::new();

    let spec = ClaimSpec::new(
        format!("it-unbindable-{}", run_id()),
        &config.namespace,
        "1Gi",
        InterfaceKind::Block,
        "storage-perf-no-such-class",
    );
    let claim = client.create_claim(&spec).await.expect("claim created");
    registrar.register(TrackedResource::Claim(claim.clone()));

    let err = client
        .wait_for_claim_phase(&claim, ClaimPhase::Bound, Duration::from_secs(5))
        .await
        .expect_err("no provisioner for the class");
    assert_eq!(err.kind(), "state_timeout");
    assert!(err.to_string().contains(&claim.qualified_name()));

    registrar.run_all(&client).await;
}
