//! Integration tests for the storage harness
//!
//! # Test Organization
//!
//! - `claim_lifecycle`: the Kubernetes-backed resource client creating,
//!   binding and deleting claims and pods on any cluster with a default
//!   dynamic provisioner (kind's `standard` class works)
//!
//! - `ceph_scenarios`: full deletion timing scenarios, which read CSI
//!   provisioner logs and so need a Ceph CSI deployment
//!
//! # Running These Tests
//!
//! ```bash
//! # Client behaviour on kind
//! STORAGE_PERF_CONFIG=kind.yaml cargo test --test kind claim_lifecycle -- --ignored
//!
//! # Timing scenarios on a Ceph-backed cluster (slow, creates 120 claims)
//! cargo test --test kind ceph_scenarios -- --ignored --nocapture
//! ```

mod ceph_scenarios;
mod claim_lifecycle;
mod helpers;
