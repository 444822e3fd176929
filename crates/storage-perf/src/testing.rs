//! In-memory cluster for driver and scenario tests
//!
//! Binding happens when a claim is waited on, deletion is instant, and each
//! deletion records start/completion events on a virtual clock that advances
//! by a fixed cost per volume, so measured intervals are deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::claim::{
    ClaimPhase, ClaimSpec, InterfaceKind, PodRef, PodRequest, ReclaimPolicy, VolumeClaim,
};
use crate::client::ResourceClient;
use crate::probe::{LifecycleEventKind, TimingProbe};
use crate::Error;

#[derive(Debug)]
struct FakeClaim {
    spec: ClaimSpec,
    phase: ClaimPhase,
    volume: Option<String>,
}

#[derive(Debug)]
struct State {
    claims: BTreeMap<String, FakeClaim>,
    volumes: BTreeMap<String, ReclaimPolicy>,
    pods: BTreeSet<String>,
    reject_create: HashSet<String>,
    reject_delete: HashSet<String>,
    never_bind: HashSet<String>,
    reclaim_policy: ReclaimPolicy,
    bind_delay: Duration,
    deletion_cost: Duration,
    clock: DateTime<Utc>,
    events: HashMap<(String, LifecycleEventKind), DateTime<Utc>>,
    deleted_claims: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            claims: BTreeMap::new(),
            volumes: BTreeMap::new(),
            pods: BTreeSet::new(),
            reject_create: HashSet::new(),
            reject_delete: HashSet::new(),
            never_bind: HashSet::new(),
            reclaim_policy: ReclaimPolicy::Delete,
            bind_delay: Duration::ZERO,
            deletion_cost: Duration::from_millis(500),
            clock: Utc.with_ymd_and_hms(2024, 4, 9, 10, 0, 0).unwrap(),
            events: HashMap::new(),
            deleted_claims: Vec::new(),
        }
    }
}

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

#[derive(Clone, Default)]
pub(crate) struct InMemoryCluster {
    state: Arc<Mutex<State>>,
    active_waits: Arc<AtomicUsize>,
    max_waits: Arc<AtomicUsize>,
}

impl InMemoryCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn reject_create(&self, name: &str) {
        self.state().reject_create.insert(name.to_string());
    }

    pub(crate) fn reject_delete(&self, name: &str) {
        self.state().reject_delete.insert(name.to_string());
    }

    pub(crate) fn never_bind(&self, name: &str) {
        self.state().never_bind.insert(name.to_string());
    }

    pub(crate) fn set_reclaim_policy(&self, policy: ReclaimPolicy) {
        self.state().reclaim_policy = policy;
    }

    pub(crate) fn set_bind_delay(&self, delay: Duration) {
        self.state().bind_delay = delay;
    }

    pub(crate) fn set_deletion_cost(&self, cost: Duration) {
        self.state().deletion_cost = cost;
    }

    pub(crate) fn max_concurrent_waits(&self) -> usize {
        self.max_waits.load(Ordering::SeqCst)
    }

    pub(crate) fn claim_count(&self) -> usize {
        self.state().claims.len()
    }

    pub(crate) fn volume_count(&self) -> usize {
        self.state().volumes.len()
    }

    pub(crate) fn pod_count(&self) -> usize {
        self.state().pods.len()
    }

    pub(crate) fn deleted_claims(&self) -> Vec<String> {
        self.state().deleted_claims.clone()
    }
}

#[async_trait]
impl ResourceClient for InMemoryCluster {
    async fn create_claim(&self, spec: &ClaimSpec) -> Result<VolumeClaim, Error> {
        let mut state = self.state();
        if state.reject_create.contains(&spec.name) {
            return Err(Error::provisioning(
                &spec.name,
                &spec.namespace,
                "exceeded quota",
            ));
        }
        state.claims.insert(
            key(&spec.namespace, &spec.name),
            FakeClaim {
                spec: spec.clone(),
                phase: ClaimPhase::Pending,
                volume: None,
            },
        );
        Ok(VolumeClaim::pending(spec.clone()))
    }

    async fn delete_claim(&self, claim: &VolumeClaim) -> Result<(), Error> {
        let mut state = self.state();
        if state.reject_delete.contains(claim.name()) {
            return Err(Error::internal_with_context("fake", "delete rejected"));
        }
        let Some(removed) = state.claims.remove(&claim.qualified_name()) else {
            return Ok(());
        };
        state.deleted_claims.push(claim.qualified_name());

        let event_name = removed.volume.clone().unwrap_or(removed.spec.name);
        let started = state.clock;
        let completed = started
            + chrono::Duration::from_std(state.deletion_cost).unwrap_or(chrono::Duration::zero());
        state.clock = completed;
        state
            .events
            .insert((event_name.clone(), LifecycleEventKind::DeletionStarted), started);
        state
            .events
            .insert((event_name, LifecycleEventKind::DeletionCompleted), completed);

        if let Some(volume) = removed.volume {
            if state.volumes.get(&volume) == Some(&ReclaimPolicy::Delete) {
                state.volumes.remove(&volume);
            }
        }
        Ok(())
    }

    async fn reload_claim(&self, claim: &mut VolumeClaim) -> Result<(), Error> {
        let state = self.state();
        let fake = state
            .claims
            .get(&claim.qualified_name())
            .ok_or_else(|| Error::internal_with_context("fake", "claim not found"))?;
        claim.phase = fake.phase;
        claim.bound_volume = fake.volume.clone();
        claim.reclaim_policy = fake
            .volume
            .as_ref()
            .and_then(|v| state.volumes.get(v).copied());
        Ok(())
    }

    async fn wait_for_claim_phase(
        &self,
        claim: &VolumeClaim,
        phase: ClaimPhase,
        timeout: Duration,
    ) -> Result<(), Error> {
        let active = self.active_waits.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_waits.fetch_max(active, Ordering::SeqCst);

        let delay = self.state().bind_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut guard = self.state();
            let state = &mut *guard;
            let policy = state.reclaim_policy;
            let stuck = state.never_bind.contains(claim.name());
            let volume = format!("pvc-{}-{}", claim.namespace(), claim.name());
            match state.claims.get_mut(&claim.qualified_name()) {
                Some(_) if stuck => Err(Error::state_timeout(
                    claim.qualified_name(),
                    phase.as_str(),
                    timeout,
                )),
                Some(fake) => {
                    if fake.phase == ClaimPhase::Pending && phase == ClaimPhase::Bound {
                        fake.phase = ClaimPhase::Bound;
                        fake.volume = Some(volume.clone());
                        state.volumes.insert(volume, policy);
                    }
                    Ok(())
                }
                None => Err(Error::state_timeout(
                    claim.qualified_name(),
                    phase.as_str(),
                    timeout,
                )),
            }
        };

        self.active_waits.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn wait_for_claim_delete(
        &self,
        claim: &VolumeClaim,
        timeout: Duration,
    ) -> Result<(), Error> {
        if self.state().claims.contains_key(&claim.qualified_name()) {
            return Err(Error::state_timeout(
                claim.qualified_name(),
                "deleted",
                timeout,
            ));
        }
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, Error> {
        Ok(self.state().volumes.contains_key(name))
    }

    async fn delete_volume(&self, name: &str) -> Result<(), Error> {
        self.state().volumes.remove(name);
        Ok(())
    }

    async fn wait_for_volume_delete(&self, name: &str, timeout: Duration) -> Result<(), Error> {
        if self.state().volumes.contains_key(name) {
            return Err(Error::state_timeout(name, "deleted", timeout));
        }
        Ok(())
    }

    async fn create_pod(
        &self,
        request: &PodRequest,
        _interface: InterfaceKind,
    ) -> Result<PodRef, Error> {
        self.state()
            .pods
            .insert(key(&request.namespace, &request.name));
        Ok(PodRef {
            name: request.name.clone(),
            namespace: request.namespace.clone(),
        })
    }

    async fn wait_for_pod_running(&self, pod: &PodRef, timeout: Duration) -> Result<(), Error> {
        if !self.state().pods.contains(&key(&pod.namespace, &pod.name)) {
            return Err(Error::state_timeout(pod.to_string(), "Running", timeout));
        }
        Ok(())
    }

    async fn delete_pod(&self, pod: &PodRef) -> Result<(), Error> {
        self.state().pods.remove(&key(&pod.namespace, &pod.name));
        Ok(())
    }
}

#[async_trait]
impl TimingProbe for InMemoryCluster {
    async fn event_timestamp(
        &self,
        _interface: InterfaceKind,
        resource: &str,
        kind: LifecycleEventKind,
    ) -> Result<DateTime<Utc>, Error> {
        self.state()
            .events
            .get(&(resource.to_string(), kind))
            .copied()
            .ok_or_else(|| Error::event_not_found(resource, kind.as_str(), "not recorded"))
    }
}
