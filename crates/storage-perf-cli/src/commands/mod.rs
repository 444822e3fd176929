//! CLI command implementations

pub mod deletion;
pub mod many_files;

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::info;

use storage_perf::reporter::FanoutReporter;
use storage_perf::scenario::{ScenarioContext, ScenarioReport};
use storage_perf::{
    BulkLifecycleDriver, CleanupRegistrar, KubeResourceClient, PerfConfig, ProvisionerLogProbe,
};

use crate::{Error, Result};

/// Flags shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Explicit configuration file
    pub config: Option<PathBuf>,
    /// Explicit kubeconfig
    pub kubeconfig: Option<PathBuf>,
}

/// Resolve configuration: `--config`, then `STORAGE_PERF_CONFIG`, then defaults
pub fn load_config(global: &GlobalArgs) -> Result<PerfConfig> {
    Ok(PerfConfig::resolve(global.config.as_deref())?)
}

/// Build a kube [`Client`] from an explicit kubeconfig or the kube defaults
pub async fn kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .map_err(|e| Error::kubeconfig(format!("failed to create client: {}", e)));
    };
    let kc = Kubeconfig::read_from(path).map_err(|e| {
        Error::kubeconfig(format!("failed to read kubeconfig {}: {}", path.display(), e))
    })?;
    let config = Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::kubeconfig(format!("failed to build config: {}", e)))?;
    Client::try_from(config).map_err(|e| Error::kubeconfig(format!("failed to create client: {}", e)))
}

/// Wire the cluster-backed driver, probe and reporters together
pub fn scenario_context(client: Client, config: PerfConfig) -> ScenarioContext {
    let resources = Arc::new(KubeResourceClient::new(
        client.clone(),
        config.poll_interval(),
    ));
    let probe = Arc::new(ProvisionerLogProbe::new(client, config.provisioner.clone()));
    let registrar = CleanupRegistrar::waiting(config.delete_timeout());
    let reporter = Arc::new(FanoutReporter::from_config(&config));
    let driver = BulkLifecycleDriver::new(resources, probe, config, registrar);
    ScenarioContext::new(driver, reporter)
}

/// Print a scenario's result and cleanup failures; fail on a failed body
///
/// Cleanup failures are printed but do not change the exit status.
pub fn finish<T: Display>(scenario: &str, report: ScenarioReport<T>) -> Result<()> {
    for failure in report.cleanup_failures() {
        println!("cleanup failed: {}", failure);
    }
    match report.outcome {
        Ok(value) => {
            println!("{}: {}", scenario, value);
            Ok(())
        }
        Err(e) => Err(Error::scenario_failed(scenario, &e)),
    }
}

/// Print the resolved configuration as YAML
pub fn show_config(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    info!(namespace = %config.namespace, "resolved configuration");
    print!("{}", config.to_yaml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "namespace: perf\nbulk_count: 40").expect("write");

        let config = load_config(&GlobalArgs {
            config: Some(file.path().to_path_buf()),
            kubeconfig: None,
        })
        .expect("config");
        assert_eq!(config.namespace, "perf");
        assert_eq!(config.bulk_count, 40);
        assert_eq!(config.pool_width, 5);
    }

    #[test]
    fn test_invalid_config_is_a_harness_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "bulk_count: 0").expect("write");

        let err = load_config(&GlobalArgs {
            config: Some(file.path().to_path_buf()),
            kubeconfig: None,
        })
        .expect_err("zero claims");
        assert!(matches!(err, Error::Harness(_)));
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_file() {
        let Err(err) = kube_client(Some(Path::new("/nonexistent/kubeconfig"))).await else {
            panic!("a missing kubeconfig must not yield a client");
        };
        assert!(err.to_string().contains("/nonexistent/kubeconfig"));
    }

    #[test]
    fn test_finish_maps_failure_class() {
        let report: ScenarioReport<String> = ScenarioReport {
            outcome: Err(storage_perf::Error::performance(
                std::time::Duration::from_secs(200),
                std::time::Duration::from_secs(180),
                "block bulk_deletion",
            )),
            cleanup: Vec::new(),
        };
        match finish("bulk-deletion", report).expect_err("failed") {
            Error::ScenarioFailed { kind, .. } => assert_eq!(kind, "performance"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
