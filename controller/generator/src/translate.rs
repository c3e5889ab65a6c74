use crate::split::{self, SplitError, SplitFailurePolicy};
use kourier_controller_core::{
    domains, FetchTlsCredentials, Headers, HttpPath, IngressTls, ResolveBackends, ResourceRef,
    RouteDefinition, RoutingIntent, RoutingPlan, Rule, SniMatch, TrackEndpoints, VirtualHost,
    Visibility, WeightedClusterRef, CONTROLLER_NAME,
};
use std::time::Duration;

pub const CLUSTER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Translates routing intents into routing plans.
///
/// The translator holds no state between calls. It may be shared across
/// tasks as long as the cluster collaborators allow concurrent use.
#[derive(Clone, Debug)]
pub struct IngressTranslator<C> {
    cluster: C,
    cluster_domain: String,
    split_failure_policy: SplitFailurePolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("failed to read TLS secret {secret} for {intent}: {source}")]
    TlsSecret {
        intent: ResourceRef,
        secret: ResourceRef,
        #[source]
        source: anyhow::Error,
    },

    #[error("ingress {intent} has no routes for rule {rule}")]
    NoRoutes { intent: ResourceRef, rule: usize },

    #[error("ingress {intent} failed to resolve split to {service}: {source}")]
    Split {
        intent: ResourceRef,
        service: ResourceRef,
        #[source]
        source: SplitError,
    },
}

// === impl IngressTranslator ===

impl<C> IngressTranslator<C>
where
    C: ResolveBackends + TrackEndpoints + FetchTlsCredentials,
{
    pub fn new(cluster: C, cluster_domain: impl Into<String>) -> Self {
        Self {
            cluster,
            cluster_domain: cluster_domain.into(),
            split_failure_policy: SplitFailurePolicy::default(),
        }
    }

    pub fn with_split_failure_policy(mut self, policy: SplitFailurePolicy) -> Self {
        self.split_failure_policy = policy;
        self
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Builds the routing plan for `intent`.
    ///
    /// Routes of the intent's `n`th rule are named `<intent>_<offset + n>`.
    pub fn translate(
        &self,
        intent: &RoutingIntent,
        rule_index_offset: usize,
        ext_authz: bool,
    ) -> Result<RoutingPlan, TranslateError> {
        let intent_ref = intent.resource_ref();
        let mut plan = RoutingPlan::new(&intent.name, &intent.namespace);

        for tls in &intent.tls {
            let sni = self.sni_match(tls).map_err(|source| {
                tracing::error!(intent = %intent_ref, secret = %tls.secret, error = %source, "failed to read TLS secret");
                TranslateError::TlsSecret {
                    intent: intent_ref.clone(),
                    secret: tls.secret.clone(),
                    source,
                }
            })?;
            plan.sni_matches.push(sni);
        }

        for (i, rule) in intent.rules.iter().enumerate() {
            let route_name = format!("{}_{}", intent.name, rule_index_offset + i);

            let mut rule_routes = Vec::new();
            for path in &rule.paths {
                let clusters = self.weighted_clusters(&intent_ref, path, &mut plan)?;
                if clusters.is_empty() {
                    tracing::debug!(intent = %intent_ref, path = path.prefix(), "no backends resolved for path");
                    continue;
                }
                let route = mk_route(&route_name, path, clusters);
                plan.routes.push(route.clone());
                rule_routes.push(route);
            }

            // A virtual host without routes would answer every request with a
            // 404.
            if rule_routes.is_empty() {
                tracing::error!(intent = %intent_ref, rule = i, "ingress without routes");
                return Err(TranslateError::NoRoutes {
                    intent: intent_ref,
                    rule: i,
                });
            }

            self.push_virtual_hosts(intent, rule, rule_routes, ext_authz, &mut plan);
        }

        Ok(plan)
    }

    fn sni_match(&self, tls: &IngressTls) -> anyhow::Result<SniMatch> {
        let creds = self
            .cluster
            .tls_credentials(&tls.secret.namespace, &tls.secret.name)?;
        Ok(SniMatch {
            hosts: tls.hosts.clone(),
            cert_chain: creds.cert_chain,
            private_key: creds.private_key,
        })
    }

    /// Resolves every split of `path`, adding the resulting clusters to
    /// `plan`.
    fn weighted_clusters(
        &self,
        intent: &ResourceRef,
        path: &HttpPath,
        plan: &mut RoutingPlan,
    ) -> Result<Vec<WeightedClusterRef>, TranslateError> {
        let prefix = path.prefix();
        let mut weighted = Vec::with_capacity(path.splits.len());
        for s in &path.splits {
            match split::resolve(&self.cluster, intent, s, prefix) {
                Ok(resolved) => {
                    plan.clusters.push(resolved.cluster);
                    weighted.push(resolved.weighted);
                }
                Err(error) => {
                    let service = s.service_ref();
                    if error.is_not_found() {
                        tracing::info!(%intent, %service, %error, "skipping split");
                    } else {
                        tracing::error!(%intent, %service, %error, "skipping split");
                    }
                    if self.split_failure_policy == SplitFailurePolicy::AbortRule {
                        return Err(TranslateError::Split {
                            intent: intent.clone(),
                            service,
                            source: error,
                        });
                    }
                }
            }
        }
        Ok(weighted)
    }

    fn push_virtual_hosts(
        &self,
        intent: &RoutingIntent,
        rule: &Rule,
        routes: Vec<RouteDefinition>,
        ext_authz: bool,
        plan: &mut RoutingPlan,
    ) {
        let visibility = intent.effective_visibility(rule);
        let ext_authz_context = ext_authz.then(|| ext_authz_context(intent, visibility));

        let internal = VirtualHost {
            name: intent.name.clone(),
            domains: domains::internal(rule, &self.cluster_domain),
            routes: routes.clone(),
            ext_authz_context: ext_authz_context.clone(),
        };

        if visibility.is_external() {
            plan.external_virtual_hosts.push(VirtualHost {
                name: intent.name.clone(),
                domains: domains::external(rule),
                routes,
                ext_authz_context,
            });
        }
        plan.internal_virtual_hosts.push(internal);
    }
}

fn mk_route(name: &str, path: &HttpPath, clusters: Vec<WeightedClusterRef>) -> RouteDefinition {
    RouteDefinition {
        name: name.to_string(),
        prefix: path.prefix().to_string(),
        clusters,
        timeout: path.timeout.unwrap_or_default(),
        retry: path.retries.unwrap_or_default(),
        append_headers: path.append_headers.clone(),
    }
}

/// Labels on the intent take precedence over the fixed keys.
fn ext_authz_context(intent: &RoutingIntent, visibility: Visibility) -> Headers {
    let mut context = Headers::new();
    context.insert("client".to_string(), CONTROLLER_NAME.to_string());
    context.insert("visibility".to_string(), visibility.to_string());
    context.extend(intent.labels.clone());
    context
}
