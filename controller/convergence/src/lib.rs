//! Gateway convergence checks.
//!
//! After a new configuration snapshot is published, every gateway replica is
//! asked which snapshot it currently serves. The fleet has converged only when
//! all replicas answer with the expected snapshot before the deadline.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod checker;
pub mod fanout;
mod probe;
mod replicas;

pub use self::{
    checker::ConvergenceChecker,
    probe::{
        HttpProbe, ProbeError, SnapshotProbe, PROBE_PORT, SNAPSHOT_HEADER, SNAPSHOT_HOST,
        SNAPSHOT_PATH,
    },
    replicas::{pod_ips, DiscoverReplicas, PodReplicas, GATEWAY_LABEL_SELECTOR},
};
