//! Stories about deletion timing on a Ceph CSI backed cluster

use storage_perf::scenario::{BulkDeletionScenario, SingleDeletionScenario};
use storage_perf::InterfaceKind;

use super::helpers::{scenario_context, test_client, test_config};

/// Story: a 1Gi claim on each interface deletes within its limit
#[tokio::test]
#[ignore = "requires a Ceph CSI cluster"]
async fn story_single_deletion_within_limit() {
    let config = test_config();
    let ctx = scenario_context(test_client().await, config);

    for interface in InterfaceKind::ALL {
        let report = SingleDeletionScenario::new(interface, "1Gi").run(&ctx).await;
        let failures: Vec<_> = report.cleanup_failures().collect();
        assert!(failures.is_empty(), "cleanup failures: {failures:?}");
        let measurement = report.outcome.expect("deletion within limit");
        println!("{measurement}");
    }
}

/// Story: the configured number of claims bind through the pool and
/// delete within the bulk limit
#[tokio::test]
#[ignore = "requires a Ceph CSI cluster"]
async fn story_bulk_deletion_within_limit() {
    let config = test_config();
    let scenario = BulkDeletionScenario::new(
        InterfaceKind::Block,
        config.default_size.clone(),
        config.bulk_count,
        config.pool_width,
    );
    let ctx = scenario_context(test_client().await, config);

    let report = scenario.run(&ctx).await;
    assert!(report.cleanup.iter().all(|o| o.is_ok()), "{:?}", report.cleanup);
    let measurement = report.outcome.expect("bulk deletion within limit");
    assert_eq!(measurement.resource_count(), scenario.count);
    println!("{measurement}");
}
