//! Conversions from Kubernetes objects into the controller's core types.

use anyhow::{anyhow, Result};
use kourier_controller_core::{
    self as core, HttpPath, IngressTls, PortSpec, ResourceRef, RetryPolicy, RoutingIntent, Rule,
    Split, TlsCredentials, Visibility,
};
use kourier_controller_k8s_api::{
    self as k8s,
    ingress::{self, Port},
    ByteString, IntOrString, ResourceExt,
};
use std::{collections::BTreeMap, net::IpAddr, time::Duration};

const TLS_CERT_KEY: &str = "tls.crt";
const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

pub(crate) fn intent(ingress: k8s::Ingress) -> Result<RoutingIntent> {
    let name = ingress.name_unchecked();
    let namespace = ingress
        .namespace()
        .ok_or_else(|| anyhow!("ingress {name} has no namespace"))?;
    let labels = ingress.labels().clone();
    let k8s::IngressSpec {
        tls,
        rules,
        visibility,
    } = ingress.spec;

    Ok(RoutingIntent {
        name,
        namespace,
        labels,
        visibility: visibility.map(self::visibility),
        tls: tls
            .into_iter()
            .map(|tls| IngressTls {
                hosts: tls.hosts,
                secret: ResourceRef::new(tls.secret_namespace, tls.secret_name),
            })
            .collect(),
        rules: rules.into_iter().map(rule).collect(),
    })
}

fn rule(rule: ingress::IngressRule) -> Rule {
    Rule {
        hosts: rule.hosts,
        visibility: rule.visibility.map(visibility),
        paths: rule
            .http
            .map(|http| http.paths.into_iter().map(path).collect())
            .unwrap_or_default(),
    }
}

fn path(path: ingress::HttpIngressPath) -> HttpPath {
    HttpPath {
        path: path.path.unwrap_or_default(),
        splits: path.splits.into_iter().map(split).collect(),
        timeout: path.timeout.map(Duration::from),
        retries: path.retries.map(|r| RetryPolicy {
            attempts: r.attempts,
            per_try_timeout: r.per_try_timeout.map(Duration::from).unwrap_or_default(),
        }),
        append_headers: path.append_headers,
    }
}

fn split(split: ingress::IngressBackendSplit) -> Split {
    Split {
        service_name: split.service_name,
        service_namespace: split.service_namespace,
        service_port: match split.service_port {
            Port::Number(n) => PortSpec::Number(n),
            Port::Name(name) => PortSpec::Name(name),
        },
        percent: split.percent,
        append_headers: split.append_headers,
    }
}

fn visibility(v: ingress::Visibility) -> Visibility {
    match v {
        ingress::Visibility::ExternalIp => Visibility::ExternalIp,
        ingress::Visibility::ClusterLocal => Visibility::ClusterLocal,
    }
}

/// Keeps ports with a valid number. A target port defaults to the service
/// port when unset; a named target port is left unresolved.
pub(crate) fn service(svc: &k8s::Service) -> core::Service {
    let ports = svc
        .spec
        .iter()
        .flat_map(|spec| spec.ports.iter().flatten())
        .filter_map(|p| {
            let port = match u16::try_from(p.port) {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(service = %svc.name_unchecked(), port = p.port, "ignoring invalid service port");
                    return None;
                }
            };
            let target_port = match &p.target_port {
                None => Some(port),
                Some(IntOrString::Int(n)) => u16::try_from(*n).ok(),
                Some(IntOrString::String(_)) => None,
            };
            Some(core::ServicePort {
                name: p.name.clone().filter(|n| !n.is_empty()),
                port,
                target_port,
            })
        })
        .collect();
    core::Service { ports }
}

/// Flattens the ready addresses of every subset. Addresses that aren't
/// ready yet are not routed to.
pub(crate) fn endpoints(ep: &k8s::Endpoints) -> core::Endpoints {
    let addresses = ep
        .subsets
        .iter()
        .flatten()
        .flat_map(|subset| subset.addresses.iter().flatten())
        .filter_map(|addr| match addr.ip.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(error) => {
                tracing::warn!(%error, endpoints = %ep.name_unchecked(), ip = %addr.ip, "ignoring invalid endpoint address");
                None
            }
        })
        .collect();
    core::Endpoints { addresses }
}

pub(crate) fn tls_credentials(data: &BTreeMap<String, ByteString>) -> Result<TlsCredentials> {
    let get = |key: &str| match data.get(key) {
        Some(ByteString(bytes)) if !bytes.is_empty() => Ok(bytes.clone()),
        _ => Err(anyhow!("secret has no {key} entry")),
    };
    let cert_chain = get(TLS_CERT_KEY)?;
    let private_key = get(TLS_PRIVATE_KEY_KEY)?;
    Ok(TlsCredentials {
        cert_chain,
        private_key,
    })
}
