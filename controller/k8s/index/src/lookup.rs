use crate::SharedIndex;
use anyhow::Result;
use kourier_controller_core::{
    Endpoints, FetchTlsCredentials, ResolveBackends, ResourceRef, Service, TlsCredentials,
    TrackEndpoints,
};

/// Serves plan-building lookups from the shared index.
#[derive(Clone, Debug)]
pub struct Lookup(SharedIndex);

// === impl Lookup ===

impl Lookup {
    pub fn new(index: SharedIndex) -> Self {
        Self(index)
    }
}

impl ResolveBackends for Lookup {
    fn endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>> {
        let id = ResourceRef::new(namespace, name);
        Ok(self.0.read().endpoints(&id).cloned())
    }

    fn service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        let id = ResourceRef::new(namespace, name);
        Ok(self.0.read().service(&id).cloned())
    }
}

impl TrackEndpoints for Lookup {
    fn track(&self, endpoints: &ResourceRef, owner: &ResourceRef) -> Result<()> {
        self.0.write().track(endpoints, owner)
    }
}

impl FetchTlsCredentials for Lookup {
    fn tls_credentials(&self, namespace: &str, name: &str) -> Result<TlsCredentials> {
        self.0
            .read()
            .tls_credentials(&ResourceRef::new(namespace, name))
    }
}
