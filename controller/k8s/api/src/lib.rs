#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod duration;
pub mod ingress;

pub use self::{
    duration::GoDuration,
    ingress::{Ingress, IngressSpec},
};
pub use k8s_openapi::{
    api::core::v1::{
        EndpointAddress, EndpointSubset, Endpoints, Secret, Service, ServicePort, ServiceSpec,
    },
    apimachinery::pkg::util::intstr::IntOrString,
    ByteString,
};
pub use kube::api::{ObjectMeta, ResourceExt};
