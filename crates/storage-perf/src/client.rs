//! Resource client: the cluster operations the harness drives
//!
//! The harness never talks to the API server directly. Everything goes
//! through `ResourceClient` so the driver and scenarios can be exercised
//! against mocks and the in-memory cluster in tests, and against kube-rs in
//! production.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::claim::{
    phase_of, ClaimPhase, ClaimSpec, InterfaceKind, PodRef, PodRequest, VolumeClaim,
};
use crate::poll::poll_until;
use crate::Error;

/// Trait abstracting claim, volume and pod operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Submit a claim; fails with `Error::Provisioning` if rejected
    async fn create_claim(&self, spec: &ClaimSpec) -> Result<VolumeClaim, Error>;

    /// Request deletion of a claim; a claim that is already gone is success
    async fn delete_claim(&self, claim: &VolumeClaim) -> Result<(), Error>;

    /// Refresh phase, bound volume and reclaim policy in place
    async fn reload_claim(&self, claim: &mut VolumeClaim) -> Result<(), Error>;

    /// Wait until a claim reports the given phase
    async fn wait_for_claim_phase(
        &self,
        claim: &VolumeClaim,
        phase: ClaimPhase,
        timeout: Duration,
    ) -> Result<(), Error>;

    /// Wait until a claim no longer exists
    async fn wait_for_claim_delete(
        &self,
        claim: &VolumeClaim,
        timeout: Duration,
    ) -> Result<(), Error>;

    /// Check whether a backing volume exists
    async fn volume_exists(&self, name: &str) -> Result<bool, Error>;

    /// Delete a backing volume; a volume that is already gone is success
    async fn delete_volume(&self, name: &str) -> Result<(), Error>;

    /// Wait until a backing volume no longer exists
    async fn wait_for_volume_delete(&self, name: &str, timeout: Duration) -> Result<(), Error>;

    /// Create a pod mounting a claim
    async fn create_pod(
        &self,
        request: &PodRequest,
        interface: InterfaceKind,
    ) -> Result<PodRef, Error>;

    /// Wait until a pod is Running
    async fn wait_for_pod_running(&self, pod: &PodRef, timeout: Duration) -> Result<(), Error>;

    /// Delete a pod; a pod that is already gone is success
    async fn delete_pod(&self, pod: &PodRef) -> Result<(), Error>;
}

/// Production implementation backed by kube-rs
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    poll_interval: Duration,
}

impl KubeResourceClient {
    /// Create a client polling the API server at `poll_interval`
    pub fn new(client: Client, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    fn claims(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn volumes(&self) -> Api<PersistentVolume> {
        Api::all(self.client.clone())
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Treat a 404 on delete as success
fn ignore_not_found<T>(result: Result<T, kube::Error>) -> Result<(), Error> {
    match result {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn create_claim(&self, spec: &ClaimSpec) -> Result<VolumeClaim, Error> {
        let created = self
            .claims(&spec.namespace)
            .create(&PostParams::default(), &spec.to_pvc())
            .await
            .map_err(|e| {
                let message = match &e {
                    kube::Error::Api(ae) => format!("{} ({})", ae.message, ae.code),
                    other => other.to_string(),
                };
                Error::provisioning(&spec.name, &spec.namespace, message)
            })?;

        debug!(claim = %spec.name, namespace = %spec.namespace, size = %spec.size, "claim created");
        let mut claim = VolumeClaim::pending(spec.clone());
        claim.apply_status(&created);
        Ok(claim)
    }

    async fn delete_claim(&self, claim: &VolumeClaim) -> Result<(), Error> {
        ignore_not_found(
            self.claims(claim.namespace())
                .delete(claim.name(), &DeleteParams::default())
                .await,
        )
    }

    async fn reload_claim(&self, claim: &mut VolumeClaim) -> Result<(), Error> {
        let pvc = self.claims(claim.namespace()).get(claim.name()).await?;
        claim.apply_status(&pvc);

        if let Some(volume) = claim.bound_volume.clone() {
            if let Some(pv) = self.volumes().get_opt(&volume).await? {
                claim.apply_volume(&pv);
            }
        }
        Ok(())
    }

    async fn wait_for_claim_phase(
        &self,
        claim: &VolumeClaim,
        phase: ClaimPhase,
        timeout: Duration,
    ) -> Result<(), Error> {
        let api = self.claims(claim.namespace());
        let name = claim.name().to_string();

        poll_until(
            &claim.qualified_name(),
            phase.as_str(),
            timeout,
            self.poll_interval,
            || {
                let api = api.clone();
                let name = name.clone();
                async move {
                    match api.get_opt(&name).await? {
                        Some(pvc) => Ok(phase_of(&pvc) == phase),
                        None => Ok(false),
                    }
                }
            },
        )
        .await
    }

    async fn wait_for_claim_delete(
        &self,
        claim: &VolumeClaim,
        timeout: Duration,
    ) -> Result<(), Error> {
        let api = self.claims(claim.namespace());
        let name = claim.name().to_string();

        poll_until(
            &claim.qualified_name(),
            "deleted",
            timeout,
            self.poll_interval,
            || {
                let api = api.clone();
                let name = name.clone();
                async move { Ok(api.get_opt(&name).await?.is_none()) }
            },
        )
        .await
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, Error> {
        Ok(self.volumes().get_opt(name).await?.is_some())
    }

    async fn delete_volume(&self, name: &str) -> Result<(), Error> {
        ignore_not_found(self.volumes().delete(name, &DeleteParams::default()).await)
    }

    async fn wait_for_volume_delete(&self, name: &str, timeout: Duration) -> Result<(), Error> {
        let api = self.volumes();
        let name_owned = name.to_string();

        poll_until(name, "deleted", timeout, self.poll_interval, || {
            let api = api.clone();
            let name = name_owned.clone();
            async move { Ok(api.get_opt(&name).await?.is_none()) }
        })
        .await
    }

    async fn create_pod(
        &self,
        request: &PodRequest,
        interface: InterfaceKind,
    ) -> Result<PodRef, Error> {
        self.pods(&request.namespace)
            .create(&PostParams::default(), &request.to_pod(interface))
            .await?;
        debug!(pod = %request.name, claim = %request.claim_name, "pod created");
        Ok(PodRef {
            name: request.name.clone(),
            namespace: request.namespace.clone(),
        })
    }

    async fn wait_for_pod_running(&self, pod: &PodRef, timeout: Duration) -> Result<(), Error> {
        let api = self.pods(&pod.namespace);
        let name = pod.name.clone();

        poll_until(
            &pod.to_string(),
            "Running",
            timeout,
            self.poll_interval,
            || {
                let api = api.clone();
                let name = name.clone();
                async move {
                    let phase = api
                        .get_opt(&name)
                        .await?
                        .and_then(|p| p.status)
                        .and_then(|s| s.phase);
                    Ok(phase.as_deref() == Some("Running"))
                }
            },
        )
        .await
    }

    async fn delete_pod(&self, pod: &PodRef) -> Result<(), Error> {
        ignore_not_found(
            self.pods(&pod.namespace)
                .delete(&pod.name, &DeleteParams::default())
                .await,
        )
    }
}
