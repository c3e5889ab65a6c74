use crate::{
    convergence::{ConvergenceChecker, DiscoverReplicas, SnapshotProbe},
    core::{
        FetchTlsCredentials, ResolveBackends, ResourceRef, RoutingIntent, RoutingPlan,
        TrackEndpoints,
    },
    generator::IngressTranslator,
    index::SharedIndex,
};
use anyhow::Result;
use std::{collections::BTreeMap, fmt, future::Future, time::Duration};
use tokio::time;

/// Publishes routing plans to the gateways.
#[async_trait::async_trait]
pub trait Distribute {
    /// Returns the identifier of the published snapshot, which gateways
    /// report once they serve it, or `None` if nothing new was published.
    async fn distribute(&self, plans: &[RoutingPlan]) -> Result<Option<String>>;
}

/// Logs the plans it is handed without publishing them.
#[derive(Clone, Debug, Default)]
pub struct LogOnly(());

/// Chains translation, distribution and convergence checks for all intents.
pub struct Reconciler<C, D, R, P> {
    translator: IngressTranslator<C>,
    distributor: D,
    replicas: R,
    checker: ConvergenceChecker<P>,
    gateway_namespace: String,
    sync_timeout: Duration,
    ext_authz: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// Every gateway serves the intent's plan.
    Ready,

    /// The plan was built but gateways have not been seen serving it.
    Pending,

    /// The intent could not be translated.
    Failed,
}

/// The outcome of a single reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub snapshot: Option<String>,
    pub statuses: BTreeMap<ResourceRef, Status>,
}

// === impl LogOnly ===

#[async_trait::async_trait]
impl Distribute for LogOnly {
    async fn distribute(&self, plans: &[RoutingPlan]) -> Result<Option<String>> {
        for plan in plans {
            tracing::info!(
                namespace = %plan.intent_namespace,
                name = %plan.intent_name,
                clusters = plan.clusters.len(),
                routes = plan.routes.len(),
                external_hosts = plan.external_virtual_hosts.len(),
                internal_hosts = plan.internal_virtual_hosts.len(),
                sni_matches = plan.sni_matches.len(),
                "built routing plan"
            );
        }
        Ok(None)
    }
}

// === impl Reconciler ===

impl<C, D, R, P> Reconciler<C, D, R, P>
where
    C: ResolveBackends + TrackEndpoints + FetchTlsCredentials,
    D: Distribute,
    R: DiscoverReplicas,
    P: SnapshotProbe + Send + Sync + 'static,
{
    pub fn new(
        translator: IngressTranslator<C>,
        distributor: D,
        replicas: R,
        checker: ConvergenceChecker<P>,
        gateway_namespace: impl Into<String>,
        sync_timeout: Duration,
    ) -> Self {
        Self {
            translator,
            distributor,
            replicas,
            checker,
            gateway_namespace: gateway_namespace.into(),
            sync_timeout,
            ext_authz: false,
        }
    }

    pub fn with_ext_authz(mut self, enabled: bool) -> Self {
        self.ext_authz = enabled;
        self
    }

    /// Reconciles whenever the index changes, and again every `requeue`
    /// while some intent isn't ready, until `shutdown` completes.
    pub async fn run(
        self,
        index: SharedIndex,
        requeue: Duration,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut changes = index.read().changes();
        tokio::pin!(shutdown);

        loop {
            changes.borrow_and_update();
            let intents = index.read().intents();
            let reconciliation = self.reconcile(&intents).await;
            reconciliation.report();

            let retry = reconciliation.needs_requeue();
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("reconciler shutting down");
                    return;
                }
                res = changes.changed() => {
                    if res.is_err() {
                        tracing::debug!("index dropped");
                        return;
                    }
                }
                _ = time::sleep(requeue), if retry => {
                    tracing::debug!("requeueing");
                }
            }
        }
    }

    /// Builds plans for `intents`, publishes them and waits for the gateways
    /// to serve them.
    ///
    /// An intent's position in `intents` is its rule index offset.
    pub async fn reconcile(&self, intents: &[RoutingIntent]) -> Reconciliation {
        let mut reconciliation = Reconciliation::default();
        let mut plans = Vec::with_capacity(intents.len());
        for (offset, intent) in intents.iter().enumerate() {
            let id = intent.resource_ref();
            match self.translator.translate(intent, offset, self.ext_authz) {
                Ok(plan) => {
                    plans.push(plan);
                    reconciliation.statuses.insert(id, Status::Pending);
                }
                Err(error) => {
                    tracing::warn!(ingress = %id, %error, "failed to translate ingress");
                    reconciliation.statuses.insert(id, Status::Failed);
                }
            }
        }

        let snapshot = match self.distributor.distribute(&plans).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                // There is nothing new for the gateways to pick up.
                reconciliation.mark_pending_as(Status::Ready);
                return reconciliation;
            }
            Err(error) => {
                tracing::error!(%error, "failed to publish routing plans");
                return reconciliation;
            }
        };
        reconciliation.snapshot = Some(snapshot.clone());

        let replicas = match self.replicas.replicas(&self.gateway_namespace).await {
            Ok(replicas) => replicas,
            Err(error) => {
                tracing::error!(%error, namespace = %self.gateway_namespace, "failed to list gateway replicas");
                return reconciliation;
            }
        };

        match self
            .checker
            .check_convergence(&replicas, &snapshot, self.sync_timeout)
            .await
        {
            Ok(true) => reconciliation.mark_pending_as(Status::Ready),
            Ok(false) => {
                tracing::info!(%snapshot, replicas = replicas.len(), "gateways have not converged");
            }
            Err(error) => tracing::error!(%error, %snapshot, "failed to check convergence"),
        }
        reconciliation
    }
}

// === impl Reconciliation ===

impl Reconciliation {
    /// Returns true if any intent should be retried.
    pub fn needs_requeue(&self) -> bool {
        self.statuses.values().any(|s| *s != Status::Ready)
    }

    fn mark_pending_as(&mut self, status: Status) {
        for s in self.statuses.values_mut() {
            if *s == Status::Pending {
                *s = status;
            }
        }
    }

    fn report(&self) {
        for (id, status) in &self.statuses {
            match status {
                Status::Ready => tracing::debug!(ingress = %id, %status, "ingress is ready"),
                Status::Pending => tracing::info!(ingress = %id, %status, "ingress is not ready"),
                Status::Failed => tracing::warn!(ingress = %id, %status, "ingress is not ready"),
            }
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("Ready"),
            Self::Pending => f.write_str("Pending"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}
