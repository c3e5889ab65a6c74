use anyhow::Result;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use std::net::IpAddr;

pub const GATEWAY_LABEL_SELECTOR: &str = "app=3scale-kourier-gateway";

/// Lists the addresses of the gateway replicas that should be probed.
#[async_trait::async_trait]
pub trait DiscoverReplicas {
    async fn replicas(&self, namespace: &str) -> Result<Vec<IpAddr>>;
}

/// Discovers gateway replicas by listing their pods.
///
/// The list is read fresh on every call so that replicas added or removed
/// since the last check are accounted for.
#[derive(Clone)]
pub struct PodReplicas {
    client: kube::Client,
}

// === impl PodReplicas ===

impl PodReplicas {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl DiscoverReplicas for PodReplicas {
    async fn replicas(&self, namespace: &str) -> Result<Vec<IpAddr>> {
        let params = ListParams::default().labels(GATEWAY_LABEL_SELECTOR);
        let pods = Api::<Pod>::namespaced(self.client.clone(), namespace)
            .list(&params)
            .await?;
        Ok(pod_ips(pods.items))
    }
}

/// Returns the IPs of pods that have been assigned one.
pub fn pod_ips(pods: impl IntoIterator<Item = Pod>) -> Vec<IpAddr> {
    pods.into_iter()
        .filter_map(|pod| {
            let ip = pod.status?.pod_ip.filter(|ip| !ip.is_empty())?;
            match ip.parse() {
                Ok(ip) => Some(ip),
                Err(error) => {
                    tracing::warn!(%error, pod = ?pod.metadata.name, %ip, "ignoring invalid pod IP");
                    None
                }
            }
        })
        .collect()
}
