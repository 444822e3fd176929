//! Volume claim and pod models
//!
//! `ClaimSpec` is what the harness asks for; `VolumeClaim` is the harness's
//! view of what the cluster made of it. The view is refreshed explicitly
//! through `ResourceClient::reload_claim` and never updates on its own.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::{
    Container, PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::{Error, LABEL_MANAGED_BY, LABEL_MANAGED_BY_VALUE};

/// Storage access mode of a claim; drives thresholds and provisioner lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceKind {
    /// Block device (Ceph RBD)
    Block,
    /// Shared filesystem (CephFS)
    SharedFilesystem,
}

impl InterfaceKind {
    /// All interfaces, in the order scenarios iterate them
    pub const ALL: [InterfaceKind; 2] = [InterfaceKind::Block, InterfaceKind::SharedFilesystem];

    /// Stable name used in logs, metrics and dashboards
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Block => "block",
            InterfaceKind::SharedFilesystem => "shared-filesystem",
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" | "rbd" | "cephblockpool" => Ok(InterfaceKind::Block),
            "shared-filesystem" | "filesystem" | "cephfs" | "cephfilesystem" => {
                Ok(InterfaceKind::SharedFilesystem)
            }
            other => Err(Error::config_for_field(
                "interface",
                format!("unknown interface '{}'", other),
            )),
        }
    }
}

/// What happens to the backing volume when its claim is deleted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReclaimPolicy {
    /// Volume is destroyed with the claim
    Delete,
    /// Volume is intentionally orphaned
    Retain,
}

impl ReclaimPolicy {
    /// Parse the `persistentVolumeReclaimPolicy` field of a PersistentVolume
    pub fn from_k8s(value: &str) -> Option<Self> {
        match value {
            "Delete" => Some(ReclaimPolicy::Delete),
            // Recycle is deprecated upstream; the volume outlives the claim either way
            "Retain" | "Recycle" => Some(ReclaimPolicy::Retain),
            _ => None,
        }
    }
}

/// Lifecycle phase of a claim as seen by the harness
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimPhase {
    /// Waiting for a volume
    Pending,
    /// Matched to a backing volume and usable
    Bound,
    /// Backing volume went missing
    Lost,
    /// Deletion requested, finalizers still running
    Deleting,
}

impl ClaimPhase {
    /// Phase name as Kubernetes reports it
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimPhase::Pending => "Pending",
            ClaimPhase::Bound => "Bound",
            ClaimPhase::Lost => "Lost",
            ClaimPhase::Deleting => "Deleting",
        }
    }
}

impl fmt::Display for ClaimPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request for provisioned storage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSpec {
    /// Claim name, unique within the namespace
    pub name: String,
    /// Namespace to create the claim in
    pub namespace: String,
    /// Requested size as a Kubernetes quantity (e.g. "1Gi")
    pub size: String,
    /// Storage interface
    pub interface: InterfaceKind,
    /// StorageClass to provision from
    pub storage_class: String,
    /// Access mode (e.g. "ReadWriteOnce")
    pub access_mode: String,
}

impl ClaimSpec {
    /// Create a ReadWriteOnce claim spec
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        size: impl Into<String>,
        interface: InterfaceKind,
        storage_class: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            size: size.into(),
            interface,
            storage_class: storage_class.into(),
            access_mode: DEFAULT_ACCESS_MODE.to_string(),
        }
    }

    /// Override the access mode
    pub fn with_access_mode(mut self, mode: impl Into<String>) -> Self {
        self.access_mode = mode.into();
        self
    }

    /// Render the PersistentVolumeClaim object to submit
    pub fn to_pvc(&self) -> PersistentVolumeClaim {
        let mut requests = BTreeMap::new();
        requests.insert("storage".to_string(), Quantity(self.size.clone()));

        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(managed_labels(self.interface)),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec![self.access_mode.clone()]),
                storage_class_name: Some(self.storage_class.clone()),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Default claim access mode
pub const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";

/// Label carrying the interface on every object the harness creates
pub const LABEL_INTERFACE: &str = "storage-perf.io/interface";

fn managed_labels(interface: InterfaceKind) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        LABEL_MANAGED_BY.to_string(),
        LABEL_MANAGED_BY_VALUE.to_string(),
    );
    labels.insert(LABEL_INTERFACE.to_string(), interface.as_str().to_string());
    labels
}

/// The harness's view of a created claim
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeClaim {
    /// What was requested
    pub spec: ClaimSpec,
    /// Last observed phase
    pub phase: ClaimPhase,
    /// Backing volume name, set only once the claim is Bound
    pub bound_volume: Option<String>,
    /// Reclaim policy of the backing volume, known once it is bound
    pub reclaim_policy: Option<ReclaimPolicy>,
}

impl VolumeClaim {
    /// A freshly submitted claim
    pub fn pending(spec: ClaimSpec) -> Self {
        Self {
            spec,
            phase: ClaimPhase::Pending,
            bound_volume: None,
            reclaim_policy: None,
        }
    }

    /// Claim name
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Claim namespace
    pub fn namespace(&self) -> &str {
        &self.spec.namespace
    }

    /// `namespace/name`, used in logs and errors
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.spec.namespace, self.spec.name)
    }

    /// Storage interface of the claim
    pub fn interface(&self) -> InterfaceKind {
        self.spec.interface
    }

    /// Refresh phase and bound volume from the API object
    pub fn apply_status(&mut self, pvc: &PersistentVolumeClaim) {
        self.phase = phase_of(pvc);
        self.bound_volume = match self.phase {
            ClaimPhase::Bound | ClaimPhase::Deleting => pvc
                .spec
                .as_ref()
                .and_then(|s| s.volume_name.clone())
                .filter(|v| !v.is_empty()),
            _ => None,
        };
    }

    /// Refresh the reclaim policy from the bound PersistentVolume
    pub fn apply_volume(&mut self, pv: &PersistentVolume) {
        self.reclaim_policy = pv
            .spec
            .as_ref()
            .and_then(|s| s.persistent_volume_reclaim_policy.as_deref())
            .and_then(ReclaimPolicy::from_k8s);
    }
}

/// Derive the harness phase of a PersistentVolumeClaim
pub fn phase_of(pvc: &PersistentVolumeClaim) -> ClaimPhase {
    if pvc.metadata.deletion_timestamp.is_some() {
        return ClaimPhase::Deleting;
    }
    match pvc.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Bound") => ClaimPhase::Bound,
        Some("Lost") => ClaimPhase::Lost,
        _ => ClaimPhase::Pending,
    }
}

/// Pod that mounts a claim, used by the many-files scenario
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodRequest {
    /// Pod name
    pub name: String,
    /// Pod namespace (must match the claim's)
    pub namespace: String,
    /// Claim to mount
    pub claim_name: String,
    /// Container image
    pub image: String,
    /// Mount path inside the container
    pub mount_path: String,
    /// Pin to a node, if set
    pub node_name: Option<String>,
}

impl PodRequest {
    /// Render the Pod object to submit
    pub fn to_pod(&self, interface: InterfaceKind) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(managed_labels(interface)),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: self.node_name.clone(),
                containers: vec![Container {
                    name: "web-server".to_string(),
                    image: Some(self.image.clone()),
                    volume_mounts: Some(vec![VolumeMount {
                        name: "data".to_string(),
                        mount_path: self.mount_path.clone(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                volumes: Some(vec![Volume {
                    name: "data".to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: self.claim_name.clone(),
                        read_only: Some(false),
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Handle to a created pod
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PodRef {
    /// Pod name
    pub name: String,
    /// Pod namespace
    pub namespace: String,
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
