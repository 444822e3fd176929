//! Cleanup registrar
//!
//! Everything a scenario creates is registered here the moment it exists.
//! Teardown then deletes whatever the scenario body did not already remove,
//! on every exit path. Cleanup failures are collected and returned next to
//! the body's result; they never replace it.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::claim::{PodRef, VolumeClaim};
use crate::client::ResourceClient;
use crate::Error as HarnessError;

/// A resource the harness is responsible for removing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackedResource {
    /// A volume claim
    Claim(VolumeClaim),
    /// A retained backing volume
    Volume(String),
    /// A pod mounting a claim
    Pod(PodRef),
}

impl TrackedResource {
    /// Identity used to deduplicate registrations
    pub fn key(&self) -> String {
        match self {
            TrackedResource::Claim(c) => format!("pvc/{}", c.qualified_name()),
            TrackedResource::Volume(name) => format!("pv/{}", name),
            TrackedResource::Pod(p) => format!("pod/{}", p),
        }
    }

    // Pods release their claims, claims release their volumes
    fn teardown_rank(&self) -> u8 {
        match self {
            TrackedResource::Pod(_) => 0,
            TrackedResource::Claim(_) => 1,
            TrackedResource::Volume(_) => 2,
        }
    }
}

impl fmt::Display for TrackedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A cleanup that did not succeed
#[derive(Debug, Error)]
#[error("cleanup of {resource} failed: {source}")]
pub struct CleanupFailure {
    /// Key of the resource that could not be removed
    pub resource: String,
    /// Why
    #[source]
    pub source: HarnessError,
}

/// Result of tearing down one resource
#[derive(Debug)]
pub struct CleanupOutcome {
    /// The resource
    pub resource: TrackedResource,
    /// `None` if it was removed
    pub failure: Option<CleanupFailure>,
}

impl CleanupOutcome {
    /// True if the resource was removed
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
struct Entry {
    resource: TrackedResource,
    removed: bool,
}

/// Records created resources for guaranteed teardown
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Debug, Default)]
pub struct CleanupRegistrar {
    entries: Arc<Mutex<Vec<Entry>>>,
    delete_timeout: Option<Duration>,
}

impl CleanupRegistrar {
    /// A registrar that issues deletions without waiting for them
    pub fn new() -> Self {
        Self::default()
    }

    /// A registrar that waits up to `timeout` for each claim to disappear
    pub fn waiting(timeout: Duration) -> Self {
        Self {
            entries: Arc::default(),
            delete_timeout: Some(timeout),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        // Entries stay consistent even if a holder panicked
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a resource for teardown
    ///
    /// Registering a pending resource twice is a no-op. Registering one that
    /// was already removed means it was created again under the same name,
    /// so it becomes pending again.
    pub fn register(&self, resource: TrackedResource) {
        let key = resource.key();
        let mut entries = self.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.resource.key() == key) {
            if entry.removed {
                debug!(resource = %key, "re-registered for cleanup");
                entry.resource = resource;
                entry.removed = false;
            }
            return;
        }
        debug!(resource = %key, "registered for cleanup");
        entries.push(Entry {
            resource,
            removed: false,
        });
    }

    /// Record that the test body already removed a resource
    pub fn mark_removed(&self, resource: &TrackedResource) {
        let key = resource.key();
        if let Some(entry) = self.lock().iter_mut().find(|e| e.resource.key() == key) {
            entry.removed = true;
        }
    }

    /// Number of registered resources
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing was registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registered resources not yet removed
    pub fn pending(&self) -> Vec<TrackedResource> {
        self.lock()
            .iter()
            .filter(|e| !e.removed)
            .map(|e| e.resource.clone())
            .collect()
    }

    /// Delete every pending resource once, continuing past failures
    ///
    /// Removed resources are never touched again. Failed ones stay pending
    /// and are retried by the next call.
    pub async fn run_all(&self, client: &dyn ResourceClient) -> Vec<CleanupOutcome> {
        let mut pending = self.pending();
        pending.sort_by_key(TrackedResource::teardown_rank);

        let mut outcomes = Vec::with_capacity(pending.len());
        for resource in pending {
            let result = self.delete(client, &resource).await;
            let failure = match result {
                Ok(()) => {
                    self.mark_removed(&resource);
                    None
                }
                Err(source) => {
                    warn!(resource = %resource, error = %source, "cleanup failed");
                    Some(CleanupFailure {
                        resource: resource.key(),
                        source,
                    })
                }
            };
            outcomes.push(CleanupOutcome { resource, failure });
        }

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        info!(total = outcomes.len(), failed, "cleanup finished");
        outcomes
    }

    async fn delete(
        &self,
        client: &dyn ResourceClient,
        resource: &TrackedResource,
    ) -> Result<(), HarnessError> {
        match resource {
            TrackedResource::Pod(pod) => client.delete_pod(pod).await,
            TrackedResource::Claim(claim) => {
                client.delete_claim(claim).await?;
                if let Some(timeout) = self.delete_timeout {
                    client.wait_for_claim_delete(claim, timeout).await?;
                }
                Ok(())
            }
            TrackedResource::Volume(name) => client.delete_volume(name).await,
        }
    }
}

/// Run `body`, then tear down everything registered, whatever happened
///
/// Returns the body's result untouched together with the cleanup outcomes.
/// A panic in the body is resumed after teardown.
pub async fn guarded<T, F>(
    registrar: &CleanupRegistrar,
    client: &dyn ResourceClient,
    body: F,
) -> (Result<T, HarnessError>, Vec<CleanupOutcome>)
where
    F: Future<Output = Result<T, HarnessError>>,
{
    let result = AssertUnwindSafe(body).catch_unwind().await;
    let cleanup = registrar.run_all(client).await;

    match result {
        Ok(result) => (result, cleanup),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
