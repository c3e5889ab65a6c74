//! Collaborators consulted while building a routing plan.
//!
//! Lookups return `Ok(None)` when the object does not exist, so callers can
//! tell an object that has not been created yet apart from a failed lookup.

use crate::{PortSpec, ResourceRef};
use anyhow::Result;
use std::net::IpAddr;

/// Resolves a split's target into its service and endpoints.
pub trait ResolveBackends {
    fn endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>>;

    fn service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;
}

/// Records that `owner` depends on the `endpoints` object so that changes to
/// it trigger another translation of the owner.
pub trait TrackEndpoints {
    fn track(&self, endpoints: &ResourceRef, owner: &ResourceRef) -> Result<()>;
}

pub trait FetchTlsCredentials {
    /// Returns the certificate chain and private key held by a TLS secret.
    /// Missing and malformed secrets are both errors.
    fn tls_credentials(&self, namespace: &str, name: &str) -> Result<TlsCredentials>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Service {
    pub ports: Vec<ServicePort>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: u16,

    /// `None` when the target port is named and cannot be resolved from the
    /// service alone.
    pub target_port: Option<u16>,
}

/// Backing addresses of a service, flattened across endpoint subsets in
/// declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub addresses: Vec<IpAddr>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TlsCredentials {
    pub cert_chain: Vec<u8>,
    pub private_key: Vec<u8>,
}

// === impl Service ===

impl Service {
    /// Returns the first declared port matching `spec` by number or by name.
    pub fn find_port(&self, spec: &PortSpec) -> Option<&ServicePort> {
        self.ports.iter().find(|p| match spec {
            PortSpec::Number(n) => p.port == *n,
            PortSpec::Name(name) => p.name.as_deref() == Some(name.as_str()),
        })
    }
}

impl std::fmt::Debug for TlsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsCredentials")
            .field("cert_chain", &format_args!("<{} bytes>", self.cert_chain.len()))
            .field("private_key", &format_args!("<redacted>"))
            .finish()
    }
}
