//! End-to-end scenarios
//!
//! Each scenario runs its body under [`guarded`], so everything it created is
//! torn down whether the body passed, failed, or panicked. The body's result
//! and the cleanup outcomes come back side by side in a [`ScenarioReport`].

use std::slice;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::claim::{ClaimSpec, InterfaceKind, PodRequest};
use crate::cleanup::{guarded, CleanupFailure, CleanupOutcome, TrackedResource};
use crate::driver::{probe_name, BulkLifecycleDriver};
use crate::measurement::{Measurement, OperationKind};
use crate::populate::{DiskUsage, LoadGenerator};
use crate::reporter::{report_measurement, ResultReporter};
use crate::threshold::ThresholdEvaluator;
use crate::Error;

/// Result of one scenario run
#[derive(Debug)]
pub struct ScenarioReport<T> {
    /// What the scenario body produced
    pub outcome: Result<T, Error>,
    /// Per-resource teardown results
    pub cleanup: Vec<CleanupOutcome>,
}

impl<T> ScenarioReport<T> {
    /// Cleanups that failed
    pub fn cleanup_failures(&self) -> impl Iterator<Item = &CleanupFailure> {
        self.cleanup.iter().filter_map(|o| o.failure.as_ref())
    }

    /// True if the body succeeded and everything was torn down
    pub fn is_clean_pass(&self) -> bool {
        self.outcome.is_ok() && self.cleanup.iter().all(CleanupOutcome::is_ok)
    }
}

/// Shared collaborators for running scenarios
#[derive(Clone)]
pub struct ScenarioContext {
    driver: BulkLifecycleDriver,
    evaluator: ThresholdEvaluator,
    reporter: Arc<dyn ResultReporter>,
}

impl ScenarioContext {
    /// Limits come from the driver's configuration
    pub fn new(driver: BulkLifecycleDriver, reporter: Arc<dyn ResultReporter>) -> Self {
        let evaluator = ThresholdEvaluator::new(driver.config().thresholds.clone());
        Self {
            driver,
            evaluator,
            reporter,
        }
    }

    /// The driver
    pub fn driver(&self) -> &BulkLifecycleDriver {
        &self.driver
    }

    async fn guard<T>(
        &self,
        body: impl std::future::Future<Output = Result<T, Error>>,
    ) -> ScenarioReport<T> {
        let (outcome, cleanup) =
            guarded(self.driver.registrar(), self.driver.client(), body).await;
        if let Err(e) = &outcome {
            warn!(kind = e.kind(), error = %e, "scenario failed");
        }
        ScenarioReport { outcome, cleanup }
    }

    // Report first so regressions reach the dashboard too
    async fn report_and_check(&self, measurement: &Measurement) -> Result<(), Error> {
        report_measurement(self.reporter.as_ref(), measurement).await;
        self.evaluator.check_configured(measurement)
    }
}

/// Time the deletion of one claim
#[derive(Clone, Debug)]
pub struct SingleDeletionScenario {
    /// Storage interface
    pub interface: InterfaceKind,
    /// Claim size, e.g. `1Gi`
    pub size: String,
}

impl SingleDeletionScenario {
    /// Sizes the deletion timing is exercised with
    pub const SIZES: [&'static str; 5] = ["1Gi", "10Gi", "100Gi", "1Ti", "2Ti"];

    /// Create the scenario
    pub fn new(interface: InterfaceKind, size: impl Into<String>) -> Self {
        Self {
            interface,
            size: size.into(),
        }
    }

    /// Create, bind, delete and time one claim
    pub async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport<Measurement> {
        info!(interface = %self.interface, size = %self.size, "single deletion scenario");
        ctx.guard(self.body(ctx)).await
    }

    async fn body(&self, ctx: &ScenarioContext) -> Result<Measurement, Error> {
        let driver = &ctx.driver;
        let config = driver.config();

        let mut claims = driver
            .create_many(
                1,
                &self.size,
                &config.name_prefix,
                &config.namespace,
                self.interface,
            )
            .await?;
        driver.await_bound(&mut claims, 1).await?;

        let claim = claims
            .first()
            .ok_or_else(|| Error::internal("single deletion created no claim"))?;
        if !driver.delete_many(slice::from_ref(claim), true).await {
            return Err(Error::deletion(
                1,
                format!("{} was not deleted", claim.qualified_name()),
            ));
        }
        driver.validate_volume_reclaimed(claim).await?;

        let name = probe_name(claim);
        let measurement = driver
            .measure_interval(
                self.interface,
                name,
                name,
                OperationKind::SingleDeletion,
                1,
            )
            .await?;
        ctx.report_and_check(&measurement).await?;
        Ok(measurement)
    }
}

/// Time the deletion of many claims at once
#[derive(Clone, Debug)]
pub struct BulkDeletionScenario {
    /// Storage interface
    pub interface: InterfaceKind,
    /// Claim size
    pub size: String,
    /// Number of claims
    pub count: usize,
    /// Width of the bind-wait pool
    pub concurrency: usize,
}

impl BulkDeletionScenario {
    /// Create the scenario
    pub fn new(interface: InterfaceKind, size: impl Into<String>, count: usize, concurrency: usize) -> Self {
        Self {
            interface,
            size: size.into(),
            count,
            concurrency,
        }
    }

    /// Create `count` claims, bind them, delete them all and time it
    pub async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport<Measurement> {
        info!(
            interface = %self.interface,
            size = %self.size,
            count = self.count,
            concurrency = self.concurrency,
            "bulk deletion scenario"
        );
        ctx.guard(self.body(ctx)).await
    }

    async fn body(&self, ctx: &ScenarioContext) -> Result<Measurement, Error> {
        let driver = &ctx.driver;
        let config = driver.config();

        let mut claims = driver
            .create_many(
                self.count,
                &self.size,
                &config.name_prefix,
                &config.namespace,
                self.interface,
            )
            .await?;
        driver.await_bound(&mut claims, self.concurrency).await?;

        let (Some(first), Some(last)) = (claims.first(), claims.last()) else {
            return Err(Error::internal("bulk deletion needs at least one claim"));
        };

        if !driver.delete_many(&claims, true).await {
            let failed = driver
                .registrar()
                .pending()
                .iter()
                .filter(|r| matches!(r, TrackedResource::Claim(_)))
                .count();
            return Err(Error::deletion(
                failed,
                format!("{} of {} claims not deleted", failed, claims.len()),
            ));
        }

        let measurement = driver
            .measure_interval(
                self.interface,
                probe_name(first),
                probe_name(last),
                OperationKind::BulkDeletion,
                claims.len(),
            )
            .await?;
        ctx.report_and_check(&measurement).await?;
        Ok(measurement)
    }
}

/// Fill a shared-filesystem volume with many files and read its usage
pub struct ManyFilesScenario {
    load: Arc<dyn LoadGenerator>,
    populate: bool,
}

impl ManyFilesScenario {
    /// Create the scenario; with `populate` false only usage is read
    pub fn new(load: Arc<dyn LoadGenerator>, populate: bool) -> Self {
        Self { load, populate }
    }

    /// Create claim and pod, populate, then report `df` for the mount
    pub async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport<DiskUsage> {
        info!(populate = self.populate, "many files scenario");
        ctx.guard(self.body(ctx)).await
    }

    async fn body(&self, ctx: &ScenarioContext) -> Result<DiskUsage, Error> {
        let driver = &ctx.driver;
        let config = driver.config();
        let settings = &config.many_files;
        let interface = InterfaceKind::SharedFilesystem;

        let spec = ClaimSpec::new(
            &settings.claim_name,
            &config.namespace,
            &settings.size,
            interface,
            config.storage_class(interface),
        );
        let claim = driver.client().create_claim(&spec).await?;
        driver
            .registrar()
            .register(TrackedResource::Claim(claim.clone()));
        let mut claims = vec![claim];
        driver.await_bound(&mut claims, 1).await?;

        let request = PodRequest {
            name: settings.pod_name.clone(),
            namespace: config.namespace.clone(),
            claim_name: settings.claim_name.clone(),
            image: settings.image.clone(),
            mount_path: settings.mount_path.clone(),
            node_name: settings.node_name.clone(),
        };
        let pod = driver.client().create_pod(&request, interface).await?;
        driver.registrar().register(TrackedResource::Pod(pod.clone()));
        driver
            .client()
            .wait_for_pod_running(&pod, Duration::from_secs(settings.pod_timeout_secs))
            .await?;
        info!(pod = %pod, "pod running with claim mounted");

        if self.populate {
            self.load
                .populate(&pod, &settings.mount_path, settings.file_count)
                .await?;
        }

        let usage = self.load.disk_usage(&pod, &settings.mount_path).await?;
        info!(%usage, "disk usage after population");
        Ok(usage)
    }
}
