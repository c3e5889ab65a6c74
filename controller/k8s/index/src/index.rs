use crate::convert;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use anyhow::{ensure, Result};
use kourier_controller_core::{
    Endpoints, ResourceRef, RoutingIntent, Service, TlsCredentials,
};
use kourier_controller_k8s_api::{self as k8s, ByteString, ResourceExt};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;

/// Holds the cluster state that routing plans are built from. Owned by the
/// watch tasks that update it and read by the reconciler.
#[derive(Debug)]
pub struct Index {
    intents: BTreeMap<ResourceRef, RoutingIntent>,
    services: HashMap<ResourceRef, Service>,
    endpoints: HashMap<ResourceRef, Endpoints>,
    secrets: HashMap<ResourceRef, BTreeMap<String, ByteString>>,

    /// Maps each endpoints object to the intents whose plans use it.
    tracked: HashMap<ResourceRef, HashSet<ResourceRef>>,

    /// Bumped whenever a change may affect a routing plan. Services and
    /// secrets only count while an indexed intent references them.
    changes: watch::Sender<u64>,
}

pub type SharedIndex = Arc<RwLock<Index>>;

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self {
            intents: BTreeMap::new(),
            services: HashMap::default(),
            endpoints: HashMap::default(),
            secrets: HashMap::default(),
            tracked: HashMap::default(),
            changes: watch::channel(0).0,
        }))
    }

    /// Returns a receiver that is notified whenever the index changes in a
    /// way that may affect a routing plan.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Returns every indexed intent, ordered by namespace and name.
    pub fn intents(&self) -> Vec<RoutingIntent> {
        self.intents.values().cloned().collect()
    }

    pub fn service(&self, id: &ResourceRef) -> Option<&Service> {
        self.services.get(id)
    }

    pub fn endpoints(&self, id: &ResourceRef) -> Option<&Endpoints> {
        self.endpoints.get(id)
    }

    /// Reads the TLS credentials held by a secret. A missing secret is an
    /// error.
    pub fn tls_credentials(&self, id: &ResourceRef) -> Result<TlsCredentials> {
        let data = self
            .secrets
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("secret {id} not found"))?;
        convert::tls_credentials(data).map_err(|e| e.context(format!("secret {id}")))
    }

    /// Records that `owner` is built from `endpoints`.
    pub fn track(&mut self, endpoints: &ResourceRef, owner: &ResourceRef) -> Result<()> {
        ensure!(
            !endpoints.name.is_empty() && !endpoints.namespace.is_empty(),
            "cannot track endpoints without a namespace and name"
        );
        ensure!(
            !owner.name.is_empty() && !owner.namespace.is_empty(),
            "cannot track endpoints for an owner without a namespace and name"
        );
        self.tracked
            .entry(endpoints.clone())
            .or_default()
            .insert(owner.clone());
        Ok(())
    }

    /// Returns the intents that depend on an endpoints object.
    pub fn tracking(&self, endpoints: &ResourceRef) -> Vec<ResourceRef> {
        let mut owners = self
            .tracked
            .get(endpoints)
            .map(|owners| owners.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        owners.sort();
        owners
    }

    fn untrack(&mut self, owner: &ResourceRef) {
        self.tracked.retain(|_, owners| {
            owners.remove(owner);
            !owners.is_empty()
        });
    }

    fn notify(&self) {
        self.changes.send_modify(|gen| *gen += 1);
    }

    /// Returns true if some indexed intent routes to the service.
    fn references_service(&self, service: &ResourceRef) -> bool {
        self.intents.values().any(|intent| {
            intent
                .rules
                .iter()
                .flat_map(|rule| &rule.paths)
                .flat_map(|path| &path.splits)
                .any(|split| split.service_ref() == *service)
        })
    }

    /// Returns true if some indexed intent terminates TLS with the secret.
    fn references_secret(&self, secret: &ResourceRef) -> bool {
        self.intents
            .values()
            .any(|intent| intent.tls.iter().any(|tls| tls.secret == *secret))
    }

    fn notify_if_tracked(&self, endpoints: &ResourceRef) {
        if let Some(owners) = self.tracked.get(endpoints) {
            tracing::debug!(%endpoints, owners = owners.len(), "tracked endpoints changed");
            self.notify();
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Ingress> for Index {
    fn apply(&mut self, ingress: k8s::Ingress) {
        let intent = match convert::intent(ingress) {
            Ok(intent) => intent,
            Err(error) => {
                tracing::warn!(%error, "ignoring ingress");
                return;
            }
        };
        let id = intent.resource_ref();
        if self.intents.get(&id) == Some(&intent) {
            return;
        }
        tracing::debug!(ingress = %id, "indexing ingress");
        // Dependencies are recorded again when the intent is next translated.
        self.untrack(&id);
        self.intents.insert(id, intent);
        self.notify();
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceRef::new(namespace, name);
        if self.intents.remove(&id).is_some() {
            tracing::debug!(ingress = %id, "removed ingress");
            self.untrack(&id);
            self.notify();
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Service> for Index {
    fn apply(&mut self, svc: k8s::Service) {
        let Some(namespace) = svc.namespace() else {
            return;
        };
        let id = ResourceRef::new(namespace, svc.name_unchecked());
        let service = convert::service(&svc);
        if self.services.get(&id) == Some(&service) {
            return;
        }
        let referenced = self.references_service(&id);
        self.services.insert(id.clone(), service);
        if referenced {
            tracing::debug!(service = %id, "referenced service changed");
            self.notify();
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceRef::new(namespace, name);
        if self.services.remove(&id).is_some() && self.references_service(&id) {
            self.notify();
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Endpoints> for Index {
    fn apply(&mut self, ep: k8s::Endpoints) {
        let Some(namespace) = ep.namespace() else {
            return;
        };
        let id = ResourceRef::new(namespace, ep.name_unchecked());
        let endpoints = convert::endpoints(&ep);
        if self.endpoints.get(&id) == Some(&endpoints) {
            return;
        }
        self.endpoints.insert(id.clone(), endpoints);
        self.notify_if_tracked(&id);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceRef::new(namespace, name);
        if self.endpoints.remove(&id).is_some() {
            self.notify_if_tracked(&id);
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Secret> for Index {
    fn apply(&mut self, secret: k8s::Secret) {
        let Some(namespace) = secret.namespace() else {
            return;
        };
        let id = ResourceRef::new(namespace, secret.name_unchecked());
        let data = secret.data.unwrap_or_default();
        if self.secrets.get(&id) == Some(&data) {
            return;
        }
        let referenced = self.references_secret(&id);
        self.secrets.insert(id.clone(), data);
        if referenced {
            tracing::debug!(secret = %id, "referenced secret changed");
            self.notify();
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceRef::new(namespace, name);
        if self.secrets.remove(&id).is_some() && self.references_secret(&id) {
            self.notify();
        }
    }
}
