use crate::Headers;
use std::{net::IpAddr, time::Duration};

/// The proxy configuration generated for a single routing intent.
///
/// Built fresh on every translation; the distribution layer replaces the
/// previous plan for the intent wholesale.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingPlan {
    pub intent_name: String,
    pub intent_namespace: String,
    pub clusters: Vec<WeightedClusterDefinition>,
    pub routes: Vec<RouteDefinition>,
    pub external_virtual_hosts: Vec<VirtualHost>,

    /// Every externally reachable domain is also reachable internally.
    pub internal_virtual_hosts: Vec<VirtualHost>,
    pub sni_matches: Vec<SniMatch>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedClusterDefinition {
    pub name: String,
    pub connect_timeout: Duration,
    pub endpoints: Vec<LbEndpoint>,
    pub protocol: Protocol,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LbEndpoint {
    pub addr: IpAddr,
    pub port: u16,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[default]
    Http1,
    Http2,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedClusterRef {
    pub cluster_name: String,
    pub weight: u32,
    pub append_headers: Headers,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDefinition {
    pub name: String,
    pub prefix: String,
    pub clusters: Vec<WeightedClusterRef>,

    /// `Duration::ZERO` defers to the proxy default.
    pub timeout: Duration,
    pub retry: crate::RetryPolicy,
    pub append_headers: Headers,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualHost {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<RouteDefinition>,

    /// Context passed to the external authorization service, when enabled.
    pub ext_authz_context: Option<Headers>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SniMatch {
    pub hosts: Vec<String>,
    pub cert_chain: Vec<u8>,
    pub private_key: Vec<u8>,
}

// === impl RoutingPlan ===

impl RoutingPlan {
    pub fn new(intent_name: impl Into<String>, intent_namespace: impl Into<String>) -> Self {
        Self {
            intent_name: intent_name.into(),
            intent_namespace: intent_namespace.into(),
            ..Default::default()
        }
    }

    pub fn cluster(&self, name: &str) -> Option<&WeightedClusterDefinition> {
        self.clusters.iter().find(|c| c.name == name)
    }
}

// === impl Protocol ===

impl Protocol {
    /// Service ports named `http2` or `h2c` are served over HTTP/2.
    pub fn from_port_name(name: Option<&str>) -> Self {
        match name {
            Some("http2" | "h2c") => Self::Http2,
            _ => Self::Http1,
        }
    }
}

// Key material stays out of logs.
impl std::fmt::Debug for SniMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SniMatch")
            .field("hosts", &self.hosts)
            .field("cert_chain", &format_args!("<{} bytes>", self.cert_chain.len()))
            .field("private_key", &format_args!("<redacted>"))
            .finish()
    }
}
