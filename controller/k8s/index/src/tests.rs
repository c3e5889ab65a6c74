use crate::{Index, Lookup, SharedIndex};
use kourier_controller_core::{
    FetchTlsCredentials, HttpPath, IngressTls, PortSpec, ResolveBackends, ResourceRef,
    RetryPolicy, RoutingIntent, Rule, Split, TrackEndpoints, Visibility,
};
use kourier_controller_k8s_api::{
    self as k8s,
    ingress::{
        HttpIngressPath, HttpIngressRuleValue, HttpRetry, IngressBackendSplit, IngressRule,
        IngressTls as K8sIngressTls, Port, Visibility as K8sVisibility,
    },
    ByteString, EndpointAddress, EndpointSubset, ObjectMeta, ServicePort, ServiceSpec,
};
use kubert::index::IndexNamespacedResource;
use maplit::{btreemap, convert_args};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::sync::watch;

fn mk_meta(ns: impl ToString, name: impl ToString) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(ns.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn mk_service(ns: impl ToString, name: impl ToString, port: i32) -> k8s::Service {
    k8s::Service {
        metadata: mk_meta(ns, name),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_endpoints(ns: impl ToString, name: impl ToString, ips: &[&str]) -> k8s::Endpoints {
    k8s::Endpoints {
        metadata: mk_meta(ns, name),
        subsets: Some(vec![EndpointSubset {
            addresses: Some(
                ips.iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }]),
    }
}

fn mk_secret(ns: impl ToString, name: impl ToString) -> k8s::Secret {
    k8s::Secret {
        metadata: mk_meta(ns, name),
        data: Some(btreemap! {
            "tls.crt".to_string() => ByteString(b"cert".to_vec()),
            "tls.key".to_string() => ByteString(b"key".to_vec()),
        }),
        ..Default::default()
    }
}

fn mk_ingress(ns: impl ToString, name: impl ToString) -> k8s::Ingress {
    k8s::Ingress {
        metadata: ObjectMeta {
            labels: Some(convert_args!(btreemap!(
                "serving.knative.dev/route" => "hello",
            ))),
            ..mk_meta(ns, name)
        },
        spec: k8s::IngressSpec {
            visibility: Some(K8sVisibility::ExternalIp),
            tls: vec![K8sIngressTls {
                hosts: vec!["hello.example.com".to_string()],
                secret_name: "hello-cert".to_string(),
                secret_namespace: "default".to_string(),
            }],
            rules: vec![IngressRule {
                hosts: vec!["hello.example.com".to_string()],
                visibility: None,
                http: Some(HttpIngressRuleValue {
                    paths: vec![HttpIngressPath {
                        path: None,
                        splits: vec![IngressBackendSplit {
                            service_name: "hello".to_string(),
                            service_namespace: "default".to_string(),
                            service_port: Port::Number(80),
                            percent: 100,
                            append_headers: Default::default(),
                        }],
                        append_headers: convert_args!(btreemap!("K-Route" => "hello")),
                        timeout: Some(Duration::from_secs(30).into()),
                        retries: Some(HttpRetry {
                            attempts: 2,
                            per_try_timeout: None,
                        }),
                    }],
                }),
            }],
        },
    }
}

/// Marks the current state as seen and reports whether it had changed.
fn changed(rx: &mut watch::Receiver<u64>) -> bool {
    let changed = rx.has_changed().unwrap();
    rx.borrow_and_update();
    changed
}

fn ingress_ref() -> ResourceRef {
    ResourceRef::new("default", "hello")
}

fn index() -> (SharedIndex, watch::Receiver<u64>) {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
    let index = Index::shared();
    let rx = index.read().changes();
    (index, rx)
}

#[test]
fn ingress_becomes_intent() {
    let (index, mut rx) = index();
    index.write().apply(mk_ingress("default", "hello"));
    assert!(changed(&mut rx));

    let intents = index.read().intents();
    assert_eq!(
        intents,
        vec![RoutingIntent {
            name: "hello".to_string(),
            namespace: "default".to_string(),
            labels: convert_args!(btreemap!("serving.knative.dev/route" => "hello")),
            visibility: Some(Visibility::ExternalIp),
            tls: vec![IngressTls {
                hosts: vec!["hello.example.com".to_string()],
                secret: ResourceRef::new("default", "hello-cert"),
            }],
            rules: vec![Rule {
                hosts: vec!["hello.example.com".to_string()],
                visibility: None,
                paths: vec![HttpPath {
                    path: String::new(),
                    splits: vec![Split {
                        service_name: "hello".to_string(),
                        service_namespace: "default".to_string(),
                        service_port: PortSpec::Number(80),
                        percent: 100,
                        append_headers: Default::default(),
                    }],
                    timeout: Some(Duration::from_secs(30)),
                    retries: Some(RetryPolicy {
                        attempts: 2,
                        per_try_timeout: Duration::ZERO,
                    }),
                    append_headers: convert_args!(btreemap!("K-Route" => "hello")),
                }],
            }],
        }]
    );

    // Reapplying an unchanged ingress doesn't wake the reconciler.
    index.write().apply(mk_ingress("default", "hello"));
    assert!(!changed(&mut rx));

    <Index as IndexNamespacedResource<k8s::Ingress>>::delete(
        &mut index.write(),
        "default".to_string(),
        "hello".to_string(),
    );
    assert!(changed(&mut rx));
    assert!(index.read().intents().is_empty());
}

#[test]
fn intents_are_ordered_by_namespace_and_name() {
    let (index, _rx) = index();
    index.write().apply(mk_ingress("ns-b", "a"));
    index.write().apply(mk_ingress("ns-a", "z"));
    index.write().apply(mk_ingress("ns-a", "b"));
    let ids = index
        .read()
        .intents()
        .iter()
        .map(RoutingIntent::resource_ref)
        .collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            ResourceRef::new("ns-a", "b"),
            ResourceRef::new("ns-a", "z"),
            ResourceRef::new("ns-b", "a"),
        ]
    );
}

#[test]
fn only_tracked_endpoints_signal_changes() {
    let (index, mut rx) = index();
    let lookup = Lookup::new(index.clone());

    index
        .write()
        .apply(mk_endpoints("default", "hello", &["10.0.0.1"]));
    assert!(!changed(&mut rx), "untracked endpoints must not signal");

    let endpoints = ResourceRef::new("default", "hello");
    lookup.track(&endpoints, &ingress_ref()).unwrap();
    assert_eq!(index.read().tracking(&endpoints), vec![ingress_ref()]);

    index
        .write()
        .apply(mk_endpoints("default", "hello", &["10.0.0.1", "10.0.0.2"]));
    assert!(changed(&mut rx));

    let resolved = lookup.endpoints("default", "hello").unwrap().unwrap();
    assert_eq!(resolved.addresses.len(), 2);

    <Index as IndexNamespacedResource<k8s::Endpoints>>::delete(
        &mut index.write(),
        "default".to_string(),
        "hello".to_string(),
    );
    assert!(changed(&mut rx));
    assert_eq!(lookup.endpoints("default", "hello").unwrap(), None);
}

#[test]
fn deleting_an_ingress_drops_its_dependencies() {
    let (index, mut rx) = index();
    let lookup = Lookup::new(index.clone());
    index.write().apply(mk_ingress("default", "hello"));
    let endpoints = ResourceRef::new("default", "hello");
    lookup.track(&endpoints, &ingress_ref()).unwrap();
    changed(&mut rx);

    <Index as IndexNamespacedResource<k8s::Ingress>>::delete(
        &mut index.write(),
        "default".to_string(),
        "hello".to_string(),
    );
    assert!(changed(&mut rx));
    assert!(index.read().tracking(&endpoints).is_empty());

    index
        .write()
        .apply(mk_endpoints("default", "hello", &["10.0.0.3"]));
    assert!(!changed(&mut rx));
}

#[test]
fn tracking_requires_a_reference() {
    let (index, _rx) = index();
    let lookup = Lookup::new(index);
    let empty = ResourceRef::new("", "");
    assert!(lookup.track(&empty, &ingress_ref()).is_err());
    assert!(lookup
        .track(&ResourceRef::new("default", ""), &ingress_ref())
        .is_err());
    assert!(lookup
        .track(&ResourceRef::new("default", "hello"), &empty)
        .is_err());
}

#[test]
fn services_resolve_by_reference() {
    let (index, mut rx) = index();
    let lookup = Lookup::new(index.clone());
    assert_eq!(lookup.service("default", "hello").unwrap(), None);

    index.write().apply(mk_service("default", "hello", 80));
    let svc = lookup.service("default", "hello").unwrap().unwrap();
    assert_eq!(svc.ports.len(), 1);
    assert_eq!(svc.ports[0].name.as_deref(), Some("http"));
    assert_eq!(svc.ports[0].target_port, Some(80));
    assert!(!changed(&mut rx), "unreferenced services must not signal");

    index.write().apply(mk_ingress("default", "hello"));
    assert!(changed(&mut rx));

    index.write().apply(mk_service("default", "hello", 80));
    assert!(!changed(&mut rx));

    index.write().apply(mk_service("default", "hello", 8080));
    assert!(changed(&mut rx));

    index.write().apply(mk_service("default", "other", 80));
    assert!(!changed(&mut rx));

    <Index as IndexNamespacedResource<k8s::Service>>::delete(
        &mut index.write(),
        "default".to_string(),
        "hello".to_string(),
    );
    assert!(changed(&mut rx));
    assert_eq!(lookup.service("default", "hello").unwrap(), None);
}

#[test]
fn secrets_provide_tls_credentials() {
    let (index, mut rx) = index();
    let lookup = Lookup::new(index.clone());
    assert!(lookup.tls_credentials("default", "hello-cert").is_err());

    index.write().apply(mk_ingress("default", "hello"));
    assert!(changed(&mut rx));

    index.write().apply(mk_secret("default", "hello-cert"));
    assert!(changed(&mut rx));
    let creds = lookup.tls_credentials("default", "hello-cert").unwrap();
    assert_eq!(creds.cert_chain, b"cert".to_vec());
    assert_eq!(creds.private_key, b"key".to_vec());

    let mut broken = mk_secret("default", "broken");
    broken.data = Some(btreemap! {
        "tls.crt".to_string() => ByteString(b"cert".to_vec()),
    });
    index.write().apply(broken);
    assert!(!changed(&mut rx), "unreferenced secrets must not signal");
    assert!(lookup.tls_credentials("default", "broken").is_err());

    <Index as IndexNamespacedResource<k8s::Secret>>::delete(
        &mut index.write(),
        "default".to_string(),
        "hello-cert".to_string(),
    );
    assert!(changed(&mut rx));
    assert!(lookup.tls_credentials("default", "hello-cert").is_err());
}
