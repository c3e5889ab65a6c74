//! Expands a rule's hosts into the domains a virtual host answers for.
//!
//! Every host is matched both bare and with any port (`host:*`).

use crate::Rule;
use std::collections::HashSet;

/// Domains for the externally exposed virtual host of `rule`.
pub fn external(rule: &Rule) -> Vec<String> {
    let mut domains = Domains::default();
    for host in &rule.hosts {
        domains.push_host(host);
    }
    domains.into_vec()
}

/// Domains for the internally exposed virtual host of `rule`.
///
/// Hosts of the form `name.namespace.svc.<cluster_domain>` are also reachable
/// by their short in-cluster names. The result always contains every external
/// domain.
pub fn internal(rule: &Rule, cluster_domain: &str) -> Vec<String> {
    let mut domains = Domains::default();
    for host in &rule.hosts {
        if let Some((name, namespace)) = split_service_host(host, cluster_domain) {
            domains.push_host(&format!("{name}.{namespace}.svc"));
            domains.push_host(&format!("{name}.{namespace}"));
        }
    }
    for domain in external(rule) {
        domains.push(domain);
    }
    domains.into_vec()
}

fn split_service_host<'h>(host: &'h str, cluster_domain: &str) -> Option<(&'h str, &'h str)> {
    let svc = host
        .strip_suffix(cluster_domain)?
        .strip_suffix('.')?
        .strip_suffix(".svc")?;
    let (name, namespace) = svc.split_once('.')?;
    if name.is_empty() || namespace.is_empty() || namespace.contains('.') {
        return None;
    }
    Some((name, namespace))
}

#[derive(Default)]
struct Domains {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl Domains {
    fn push_host(&mut self, host: &str) {
        self.push(host.to_string());
        self.push(format!("{host}:*"));
    }

    fn push(&mut self, domain: String) {
        if self.seen.insert(domain.clone()) {
            self.ordered.push(domain);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}
