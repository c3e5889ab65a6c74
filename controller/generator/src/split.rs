use crate::translate::CLUSTER_CONNECT_TIMEOUT;
use kourier_controller_core::{
    LbEndpoint, PortSpec, Protocol, ResolveBackends, ResourceRef, Split, TrackEndpoints,
    WeightedClusterDefinition, WeightedClusterRef,
};
use std::str::FromStr;

/// Determines what happens to a rule when one of its splits cannot be
/// resolved.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SplitFailurePolicy {
    /// The split is dropped. A path left without splits emits no route; the
    /// rule fails only if none of its paths emit a route.
    #[default]
    SkipAndContinue,

    /// The first unresolvable split fails the whole intent.
    AbortRule,
}

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("failed to track endpoints: {0}")]
    Track(#[source] anyhow::Error),

    #[error("endpoints not yet created")]
    EndpointsNotFound,

    #[error("failed to fetch endpoints: {0}")]
    Endpoints(#[source] anyhow::Error),

    #[error("service not yet created")]
    ServiceNotFound,

    #[error("failed to fetch service: {0}")]
    Service(#[source] anyhow::Error),

    #[error("service has no port matching {0}")]
    NoMatchingPort(PortSpec),

    #[error("service port {0} has a named target port")]
    NamedTargetPort(u16),
}

/// A split resolved into the cluster it defines and the weighted reference
/// to it.
pub(crate) struct ResolvedSplit {
    pub cluster: WeightedClusterDefinition,
    pub weighted: WeightedClusterRef,
}

// === impl SplitFailurePolicy ===

impl FromStr for SplitFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::SkipAndContinue),
            "abort-rule" => Ok(Self::AbortRule),
            s => anyhow::bail!("invalid split failure policy: {s}"),
        }
    }
}

// === impl SplitError ===

impl SplitError {
    /// Objects that do not exist yet are expected while a revision rolls out.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EndpointsNotFound | Self::ServiceNotFound)
    }
}

/// The cluster name is the service name followed by the path prefix. It is
/// not namespace-qualified.
pub(crate) fn cluster_name(split: &Split, prefix: &str) -> String {
    format!("{}{}", split.service_name, prefix)
}

pub(crate) fn resolve<C>(
    cluster: &C,
    owner: &ResourceRef,
    split: &Split,
    prefix: &str,
) -> Result<ResolvedSplit, SplitError>
where
    C: ResolveBackends + TrackEndpoints,
{
    cluster
        .track(&split.service_ref(), owner)
        .map_err(SplitError::Track)?;

    let endpoints = cluster
        .endpoints(&split.service_namespace, &split.service_name)
        .map_err(SplitError::Endpoints)?
        .ok_or(SplitError::EndpointsNotFound)?;

    let service = cluster
        .service(&split.service_namespace, &split.service_name)
        .map_err(SplitError::Service)?
        .ok_or(SplitError::ServiceNotFound)?;

    let port = service
        .find_port(&split.service_port)
        .ok_or_else(|| SplitError::NoMatchingPort(split.service_port.clone()))?;
    let target_port = port
        .target_port
        .ok_or(SplitError::NamedTargetPort(port.port))?;

    let name = cluster_name(split, prefix);
    let cluster = WeightedClusterDefinition {
        name: name.clone(),
        connect_timeout: CLUSTER_CONNECT_TIMEOUT,
        endpoints: endpoints
            .addresses
            .iter()
            .map(|&addr| LbEndpoint {
                addr,
                port: target_port,
            })
            .collect(),
        protocol: Protocol::from_port_name(port.name.as_deref()),
    };
    let weighted = WeightedClusterRef {
        cluster_name: name,
        weight: split.percent,
        append_headers: split.append_headers.clone(),
    };
    Ok(ResolvedSplit { cluster, weighted })
}
