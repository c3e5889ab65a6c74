#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use kourier_controller_convergence as convergence;
pub use kourier_controller_core as core;
pub use kourier_controller_generator as generator;
pub use kourier_controller_k8s_api as k8s;
pub use kourier_controller_k8s_index as index;

mod args;
mod reconcile;

pub use self::{
    args::{Args, ConfigError},
    reconcile::{Distribute, LogOnly, Reconciler, Reconciliation, Status},
};
