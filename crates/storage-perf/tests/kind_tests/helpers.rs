//! Shared setup for cluster tests

use std::sync::Arc;

use kube::Client;

use storage_perf::reporter::LogReporter;
use storage_perf::scenario::ScenarioContext;
use storage_perf::{
    BulkLifecycleDriver, CleanupRegistrar, KubeResourceClient, PerfConfig, ProvisionerLogProbe,
};

/// Connect with the default kubeconfig, failing loudly if none is usable
pub async fn test_client() -> Client {
    Client::try_default()
        .await
        .expect("a reachable cluster is required for these tests")
}

/// Configuration from `STORAGE_PERF_CONFIG`, or defaults
pub fn test_config() -> PerfConfig {
    PerfConfig::resolve(None).expect("valid test configuration")
}

/// Resource client polling at the configured interval
pub fn resource_client(client: Client, config: &PerfConfig) -> KubeResourceClient {
    KubeResourceClient::new(client, config.poll_interval())
}

/// Full cluster-backed scenario context logging its results
pub fn scenario_context(client: Client, config: PerfConfig) -> ScenarioContext {
    let resources = Arc::new(resource_client(client.clone(), &config));
    let probe = Arc::new(ProvisionerLogProbe::new(client, config.provisioner.clone()));
    let registrar = CleanupRegistrar::waiting(config.delete_timeout());
    let driver = BulkLifecycleDriver::new(resources, probe, config, registrar);
    ScenarioContext::new(driver, Arc::new(LogReporter))
}

/// Unique-enough suffix so reruns do not collide with leftovers
pub fn run_id() -> String {
    format!("{}", chrono::Utc::now().timestamp() % 100_000)
}
