#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod domains;
pub mod intent;
pub mod plan;
pub mod resolve;

pub use self::{
    intent::{
        HttpPath, IngressTls, PortSpec, ResourceRef, RetryPolicy, RoutingIntent, Rule, Split,
        Visibility,
    },
    plan::{
        LbEndpoint, Protocol, RouteDefinition, RoutingPlan, SniMatch, VirtualHost,
        WeightedClusterDefinition, WeightedClusterRef,
    },
    resolve::{
        Endpoints, FetchTlsCredentials, ResolveBackends, Service, ServicePort, TlsCredentials,
        TrackEndpoints,
    },
};

/// Header map injected into requests. Ordered so that generated plans are
/// reproducible.
pub type Headers = std::collections::BTreeMap<String, String>;

pub const CONTROLLER_NAME: &str = "kourier";
