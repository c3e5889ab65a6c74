use bytes::Bytes;
use http::{header, HeaderValue, Request, StatusCode};
use http_body_util::Empty;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};
use tokio::time;

/// Port on which gateways serve their internal listener.
pub const PROBE_PORT: u16 = 8081;

pub const SNAPSHOT_PATH: &str = "/__internalkouriersnapshot";

/// Virtual host that routes probes to the gateway's snapshot handler.
pub const SNAPSHOT_HOST: &str = "internalkourier";

/// Response header carrying the gateway's current snapshot identifier.
pub const SNAPSHOT_HEADER: &str = "kourier-snapshot-id";

/// Asks a single gateway replica which configuration snapshot it serves.
#[async_trait::async_trait]
pub trait SnapshotProbe {
    async fn snapshot_id(&self, replica: IpAddr) -> Result<HeaderValue, ProbeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid probe request: {0}")]
    Request(#[from] http::Error),

    #[error("request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("status code {}", .0.as_u16())]
    Status(StatusCode),

    #[error("response is missing the kourier-snapshot-id header")]
    MissingHeader,
}

/// Probes replicas over plain HTTP/1.
///
/// Connections are never pooled: a replica that is draining may share its
/// address with one that has already been replaced, and a reused connection
/// would report the old replica's snapshot.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    client: Client<HttpConnector, Empty<Bytes>>,
    port: u16,
    timeout: Duration,
}

// === impl HttpProbe ===

impl HttpProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(connector);
        Self {
            client,
            port,
            timeout,
        }
    }

    fn request(&self, replica: IpAddr) -> Result<Request<Empty<Bytes>>, http::Error> {
        let addr = SocketAddr::new(replica, self.port);
        Request::get(format!("http://{addr}{SNAPSHOT_PATH}"))
            .header(header::HOST, SNAPSHOT_HOST)
            .header(header::CONNECTION, "close")
            .body(Empty::new())
    }
}

#[async_trait::async_trait]
impl SnapshotProbe for HttpProbe {
    async fn snapshot_id(&self, replica: IpAddr) -> Result<HeaderValue, ProbeError> {
        let req = self.request(replica)?;
        let rsp = time::timeout(self.timeout, self.client.request(req))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        if rsp.status() != StatusCode::OK {
            return Err(ProbeError::Status(rsp.status()));
        }
        rsp.headers()
            .get(SNAPSHOT_HEADER)
            .cloned()
            .ok_or(ProbeError::MissingHeader)
    }
}
