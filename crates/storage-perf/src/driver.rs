//! Bulk lifecycle driver
//!
//! Creates claims, waits for them to bind, deletes them, and turns the
//! backend's deletion records into measurements. Creation and deletion are
//! issued sequentially; only the bind wait fans out, over a fixed-width pool
//! where each task owns exactly one claim.

use std::sync::Arc;

use futures::stream::{self, TryStreamExt};
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

use crate::claim::{ClaimPhase, ClaimSpec, InterfaceKind, ReclaimPolicy, VolumeClaim};
use crate::cleanup::{CleanupRegistrar, TrackedResource};
use crate::client::ResourceClient;
use crate::config::PerfConfig;
use crate::measurement::{Measurement, OperationKind};
use crate::probe::{LifecycleEvent, LifecycleEventKind, TimingProbe};
use crate::Error;

/// `create_many` could not create every claim
///
/// The claims that were created are handed back and are already registered
/// for cleanup.
#[derive(Debug, ThisError)]
#[error("{source} ({count} of {requested} claims created)", count = .created.len())]
pub struct ProvisioningFailure {
    /// Claims that were created
    pub created: Vec<VolumeClaim>,
    /// Number of claims requested
    pub requested: usize,
    /// `Error::Provisioning` referencing the first failed claim
    #[source]
    pub source: Error,
}

impl From<ProvisioningFailure> for Error {
    fn from(failure: ProvisioningFailure) -> Self {
        failure.source
    }
}

/// Orchestrates create / bind / delete / measure over many claims
#[derive(Clone)]
pub struct BulkLifecycleDriver {
    client: Arc<dyn ResourceClient>,
    probe: Arc<dyn TimingProbe>,
    config: PerfConfig,
    registrar: CleanupRegistrar,
}

impl BulkLifecycleDriver {
    /// Create a driver; everything it creates goes into `registrar`
    pub fn new(
        client: Arc<dyn ResourceClient>,
        probe: Arc<dyn TimingProbe>,
        config: PerfConfig,
        registrar: CleanupRegistrar,
    ) -> Self {
        Self {
            client,
            probe,
            config,
            registrar,
        }
    }

    /// The resource client
    pub fn client(&self) -> &dyn ResourceClient {
        self.client.as_ref()
    }

    /// The configuration
    pub fn config(&self) -> &PerfConfig {
        &self.config
    }

    /// The cleanup registrar
    pub fn registrar(&self) -> &CleanupRegistrar {
        &self.registrar
    }

    /// Issue `count` create requests named `<name_prefix>-<index>`
    ///
    /// Every request is issued even if an earlier one fails. Each created
    /// claim is registered for cleanup as soon as it exists.
    pub async fn create_many(
        &self,
        count: usize,
        size: &str,
        name_prefix: &str,
        namespace: &str,
        interface: InterfaceKind,
    ) -> Result<Vec<VolumeClaim>, ProvisioningFailure> {
        let storage_class = self.config.storage_class(interface);
        info!(count, size, namespace, %interface, storage_class, "creating claims");

        let mut created = Vec::with_capacity(count);
        let mut failures: Vec<(String, Error)> = Vec::new();

        for index in 0..count {
            let spec = ClaimSpec::new(
                format!("{}-{}", name_prefix, index),
                namespace,
                size,
                interface,
                storage_class,
            );
            match self.client.create_claim(&spec).await {
                Ok(claim) => {
                    self.registrar
                        .register(TrackedResource::Claim(claim.clone()));
                    created.push(claim);
                }
                Err(e) => {
                    warn!(claim = %spec.name, error = %e, "create request rejected");
                    failures.push((spec.name, e));
                }
            }
        }

        let Some((first_name, first_error)) = failures.first() else {
            return Ok(created);
        };
        let reason = match first_error {
            Error::Provisioning { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let source = Error::provisioning(
            first_name,
            namespace,
            format!(
                "{} ({} of {} create requests failed)",
                reason,
                failures.len(),
                count
            ),
        );
        Err(ProvisioningFailure {
            created,
            requested: count,
            source,
        })
    }

    /// Wait for every claim to be Bound, then refresh each claim
    ///
    /// At most `concurrency` waits run at once (0 is treated as 1). The first
    /// failure aborts the remaining waits and propagates.
    pub async fn await_bound(
        &self,
        claims: &mut [VolumeClaim],
        concurrency: usize,
    ) -> Result<(), Error> {
        let width = concurrency.max(1);
        let timeout = self.config.bind_timeout();
        let client = self.client.as_ref();
        debug!(claims = claims.len(), width, "waiting for claims to bind");

        stream::iter(claims.iter_mut().map(Ok::<_, Error>))
            .try_for_each_concurrent(width, move |claim| async move {
                client
                    .wait_for_claim_phase(claim, ClaimPhase::Bound, timeout)
                    .await?;
                client.reload_claim(claim).await?;
                debug!(
                    claim = %claim.qualified_name(),
                    volume = ?claim.bound_volume,
                    "claim bound"
                );
                Ok(())
            })
            .await
    }

    /// Request deletion of every claim, optionally waiting for each to vanish
    ///
    /// Returns `false` if any deletion failed; never returns an error so the
    /// caller decides whether a partial bulk deletion is fatal. Claims
    /// confirmed gone are marked removed in the registrar.
    pub async fn delete_many(&self, claims: &[VolumeClaim], wait: bool) -> bool {
        let mut failed = 0usize;
        let mut submitted = Vec::with_capacity(claims.len());

        for claim in claims {
            match self.client.delete_claim(claim).await {
                Ok(()) => submitted.push(claim),
                Err(e) => {
                    warn!(claim = %claim.qualified_name(), error = %e, "delete request failed");
                    failed += 1;
                }
            }
        }

        if wait {
            let timeout = self.config.delete_timeout();
            for claim in submitted {
                match self.client.wait_for_claim_delete(claim, timeout).await {
                    Ok(()) => self
                        .registrar
                        .mark_removed(&TrackedResource::Claim(claim.clone())),
                    Err(e) => {
                        warn!(claim = %claim.qualified_name(), error = %e, "claim not removed");
                        failed += 1;
                    }
                }
            }
        }

        info!(total = claims.len(), failed, wait, "bulk deletion finished");
        failed == 0
    }

    /// Elapsed time from `first`'s deletion start to `last`'s completion
    ///
    /// Assumes the backend processes deletions in submission order; under
    /// concurrent processing the result is an upper-bound estimate.
    pub async fn measure_interval(
        &self,
        interface: InterfaceKind,
        first: &str,
        last: &str,
        operation: OperationKind,
        resource_count: usize,
    ) -> Result<Measurement, Error> {
        let start = self
            .event(interface, first, LifecycleEventKind::DeletionStarted)
            .await?;
        let end = self
            .event(interface, last, LifecycleEventKind::DeletionCompleted)
            .await?;
        let measurement = Measurement::between(interface, operation, &start, &end, resource_count)?;
        info!(%measurement, first, last, "measured interval");
        Ok(measurement)
    }

    async fn event(
        &self,
        interface: InterfaceKind,
        resource: &str,
        kind: LifecycleEventKind,
    ) -> Result<LifecycleEvent, Error> {
        let timestamp = self.probe.event_timestamp(interface, resource, kind).await?;
        Ok(LifecycleEvent {
            resource: resource.to_string(),
            kind,
            timestamp,
        })
    }

    /// Check the backing volume followed the claim's reclaim policy
    ///
    /// `Delete` volumes must disappear. `Retain` volumes are expected to
    /// survive and are registered for cleanup.
    pub async fn validate_volume_reclaimed(&self, claim: &VolumeClaim) -> Result<(), Error> {
        let Some(volume) = claim.bound_volume.as_deref() else {
            return Err(Error::internal_with_context(
                "validate_volume_reclaimed",
                format!("{} was never bound", claim.qualified_name()),
            ));
        };

        match claim.reclaim_policy {
            Some(ReclaimPolicy::Delete) => {
                self.client
                    .wait_for_volume_delete(volume, self.config.delete_timeout())
                    .await?;
                debug!(volume, "volume deleted with its claim");
            }
            Some(ReclaimPolicy::Retain) => {
                if self.client.volume_exists(volume).await? {
                    info!(volume, "volume retained, registering for cleanup");
                    self.registrar
                        .register(TrackedResource::Volume(volume.to_string()));
                } else {
                    warn!(volume, "retained volume is already gone");
                }
            }
            None => {
                warn!(volume, "reclaim policy unknown, skipping volume validation");
            }
        }
        Ok(())
    }
}

/// Name the timing probe knows a claim's deletion by
///
/// Provisioners log the backing volume name; before binding only the claim
/// name exists.
pub fn probe_name(claim: &VolumeClaim) -> &str {
    claim.bound_volume.as_deref().unwrap_or(claim.name())
}
