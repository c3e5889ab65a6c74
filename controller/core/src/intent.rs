use crate::Headers;
use std::{fmt, time::Duration};

/// Identifies a namespaced cluster object.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceRef {
    pub namespace: String,
    pub name: String,
}

/// A declarative description of host-to-backend routing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingIntent {
    pub name: String,
    pub namespace: String,
    pub labels: Headers,
    pub visibility: Option<Visibility>,
    pub tls: Vec<IngressTls>,
    pub rules: Vec<Rule>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Visibility {
    ExternalIp,
    #[default]
    ClusterLocal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngressTls {
    pub hosts: Vec<String>,
    pub secret: ResourceRef,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rule {
    pub hosts: Vec<String>,

    /// Overrides the intent's visibility for this rule only.
    pub visibility: Option<Visibility>,
    pub paths: Vec<HttpPath>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpPath {
    /// Match prefix. An empty path is treated as `/`.
    pub path: String,
    pub splits: Vec<Split>,

    /// `None` leaves the timeout to the proxy.
    pub timeout: Option<Duration>,
    pub retries: Option<RetryPolicy>,
    pub append_headers: Headers,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    pub service_name: String,
    pub service_namespace: String,
    pub service_port: PortSpec,
    pub percent: u32,
    pub append_headers: Headers,
}

/// References a service port by number or by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PortSpec {
    Number(u16),
    Name(String),
}

/// Zero attempts means no retries; a zero per-try timeout leaves the
/// per-attempt timeout to the proxy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub per_try_timeout: Duration,
}

// === impl ResourceRef ===

impl ResourceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl RoutingIntent ===

impl RoutingIntent {
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(&self.namespace, &self.name)
    }

    /// The visibility that applies to `rule`, falling back to the intent's
    /// visibility and then to cluster-local.
    pub fn effective_visibility(&self, rule: &Rule) -> Visibility {
        rule.visibility.or(self.visibility).unwrap_or_default()
    }
}

// === impl Visibility ===

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExternalIp => "ExternalIP",
            Self::ClusterLocal => "ClusterLocal",
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::ExternalIp)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl HttpPath ===

impl HttpPath {
    pub fn prefix(&self) -> &str {
        if self.path.is_empty() {
            "/"
        } else {
            &self.path
        }
    }
}

// === impl Split ===

impl Split {
    pub fn service_ref(&self) -> ResourceRef {
        ResourceRef::new(&self.service_namespace, &self.service_name)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => fmt::Display::fmt(n, f),
            Self::Name(n) => fmt::Display::fmt(n, f),
        }
    }
}
