//! Kourier controller index
//!
//! Watches the cluster objects that routing plans are built from and keeps
//! them in memory:
//!
//! - Each `Ingress` becomes a routing intent.
//! - `Service` and `Endpoints` objects resolve an intent's backend splits.
//! - `Secret`s hold the TLS credentials referenced by an intent.
//!
//! ```text
//! [ Ingress ] -> [ Service ] + [ Endpoints ]
//!             -> [ Secret ]
//! ```
//!
//! Plan building records which endpoints each intent uses. Any change to an
//! intent, service or secret wakes the reconciler, while endpoints changes
//! only do so for endpoints that some intent depends on.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod convert;
mod index;
mod lookup;

#[cfg(test)]
mod tests;

pub use self::{
    index::{Index, SharedIndex},
    lookup::Lookup,
};
