use crate::GoDuration;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Describes how traffic for a set of hosts is routed to backing services.
///
/// Knative Serving creates one of these per Route; the controller turns each
/// into a routing plan for the gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "networking.internal.knative.dev",
    version = "v1alpha1",
    kind = "Ingress",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<IngressTls>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<IngressRule>,

    /// Applies to every rule that doesn't set its own visibility.
    pub visibility: Option<Visibility>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressTls {
    #[serde(default)]
    pub hosts: Vec<String>,
    pub secret_name: String,
    pub secret_namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    #[serde(default)]
    pub hosts: Vec<String>,
    pub visibility: Option<Visibility>,
    pub http: Option<HttpIngressRuleValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HttpIngressRuleValue {
    #[serde(default)]
    pub paths: Vec<HttpIngressPath>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressPath {
    pub path: Option<String>,

    #[serde(default)]
    pub splits: Vec<IngressBackendSplit>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub append_headers: BTreeMap<String, String>,

    pub timeout: Option<GoDuration>,
    pub retries: Option<HttpRetry>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpRetry {
    #[serde(default)]
    pub attempts: u32,
    pub per_try_timeout: Option<GoDuration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressBackendSplit {
    pub service_name: String,
    pub service_namespace: String,
    pub service_port: Port,

    /// Share of the path's traffic, 0-100.
    #[serde(default)]
    pub percent: u32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub append_headers: BTreeMap<String, String>,
}

/// References a service port by number or name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum Port {
    Number(u16),
    Name(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum Visibility {
    #[serde(rename = "ExternalIP")]
    ExternalIp,
    #[serde(rename = "ClusterLocal")]
    ClusterLocal,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Number(n) => fmt::Display::fmt(n, f),
            Port::Name(n) => fmt::Display::fmt(n, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn parses_knative_ingress() {
        let spec: IngressSpec = serde_json::from_value(serde_json::json!({
            "visibility": "ExternalIP",
            "tls": [{
                "hosts": ["hello.example.com"],
                "secretName": "hello-cert",
                "secretNamespace": "default",
            }],
            "rules": [{
                "hosts": ["hello.default.svc.cluster.local"],
                "visibility": "ClusterLocal",
                "http": {
                    "paths": [{
                        "timeout": "1m30s",
                        "retries": { "attempts": 3, "perTryTimeout": "10s" },
                        "appendHeaders": { "K-Original-Host": "hello" },
                        "splits": [{
                            "serviceName": "hello-00001",
                            "serviceNamespace": "default",
                            "servicePort": 80,
                            "percent": 90,
                        }, {
                            "serviceName": "hello-00002",
                            "serviceNamespace": "default",
                            "servicePort": "http2",
                            "percent": 10,
                        }],
                    }],
                },
            }],
        }))
        .unwrap();

        assert_eq!(spec.visibility, Some(Visibility::ExternalIp));
        assert_eq!(spec.tls[0].secret_name, "hello-cert");

        let rule = &spec.rules[0];
        assert_eq!(rule.visibility, Some(Visibility::ClusterLocal));
        let path = &rule.http.as_ref().unwrap().paths[0];
        assert_eq!(path.path, None);
        assert_eq!(
            path.timeout.map(Duration::from),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            path.retries,
            Some(HttpRetry {
                attempts: 3,
                per_try_timeout: Some(Duration::from_secs(10).into()),
            })
        );
        assert_eq!(path.splits[0].service_port, Port::Number(80));
        assert_eq!(path.splits[1].service_port, Port::Name("http2".to_string()));
        assert_eq!(path.splits[1].percent, 10);
    }

    #[test]
    fn rejects_unknown_visibility() {
        let res = serde_json::from_value::<IngressSpec>(serde_json::json!({
            "visibility": "Everywhere",
        }));
        assert!(res.is_err());
    }
}
