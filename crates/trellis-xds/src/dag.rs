//! The routing graph consumed by the translation layer.
//!
//! The graph arrives here already built and validated; this module only
//! defines its shape and a single depth-first traversal. Node kinds are a
//! closed sum type ([`Vertex`]), so every visitor handles the full set of
//! variants at compile time instead of downcasting at runtime.
//!
//! Traversal order is deliberately unspecified. Nothing downstream may
//! depend on the order vertices are delivered in - resource identity comes
//! from [`crate::names`], and every multi-valued output is sorted before it
//! leaves a cache.

use std::time::Duration;

use crate::error::{Error, Result};

/// A validated routing graph. Plain and secure virtual hosts are the roots
/// of the ingress traversal; extension clusters hang off the side for
/// control-plane-internal upstreams.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dag {
    pub virtual_hosts: Vec<VirtualHost>,
    pub secure_virtual_hosts: Vec<SecureVirtualHost>,
    pub extension_clusters: Vec<ExtensionCluster>,
}

impl Dag {
    /// Walk every vertex once, depth first, delivering each to `visitor`
    /// before recursing into its children.
    pub fn visit(&self, visitor: &mut dyn Visitor) {
        for vhost in &self.virtual_hosts {
            Vertex::VirtualHost(vhost).accept(visitor);
        }
        for vhost in &self.secure_virtual_hosts {
            Vertex::SecureVirtualHost(vhost).accept(visitor);
        }
        for cluster in &self.extension_clusters {
            Vertex::ExtensionCluster(cluster).accept(visitor);
        }
    }
}

/// One node of the routing graph, borrowed for the duration of a traversal.
#[derive(Debug, Clone, Copy)]
pub enum Vertex<'a> {
    VirtualHost(&'a VirtualHost),
    SecureVirtualHost(&'a SecureVirtualHost),
    Route(&'a Route),
    Cluster(&'a Cluster),
    ExtensionCluster(&'a ExtensionCluster),
    Secret(&'a Secret),
}

impl<'a> Vertex<'a> {
    /// Deliver this vertex to `visitor`, then recurse into children.
    /// Children are always visited, whether or not the visitor cared about
    /// the current vertex.
    pub fn accept(self, visitor: &mut dyn Visitor) {
        visitor.visit(self);
        match self {
            Vertex::VirtualHost(vhost) => {
                for route in &vhost.routes {
                    Vertex::Route(route).accept(visitor);
                }
            }
            Vertex::SecureVirtualHost(vhost) => {
                Vertex::Secret(&vhost.secret).accept(visitor);
                if let Some(fallback) = &vhost.fallback_certificate {
                    Vertex::Secret(fallback).accept(visitor);
                }
                for route in &vhost.virtual_host.routes {
                    Vertex::Route(route).accept(visitor);
                }
            }
            Vertex::Route(route) => {
                for cluster in &route.clusters {
                    Vertex::Cluster(cluster).accept(visitor);
                }
            }
            Vertex::Cluster(_) | Vertex::ExtensionCluster(_) | Vertex::Secret(_) => {}
        }
    }
}

/// A graph traversal callback. One visitor per resource kind derives that
/// kind's full resource map in a single pass.
pub trait Visitor {
    fn visit(&mut self, vertex: Vertex<'_>);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VirtualHost {
    /// The fully qualified hostname this vhost serves.
    pub name: String,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecureVirtualHost {
    pub virtual_host: VirtualHost,
    /// The TLS server certificate for this vhost's SNI name.
    pub secret: Secret,
    /// A certificate served to clients that send no SNI at all.
    pub fallback_certificate: Option<Secret>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    pub clusters: Vec<Cluster>,
}

/// An upstream service a route sends traffic to, plus the policy that is
/// part of the cluster's discovery identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cluster {
    pub upstream: WeightedService,
    /// Raw strategy string from configuration. Validation happened
    /// upstream; unrecognized values degrade to the default strategy here.
    pub load_balancer_strategy: Option<String>,
    pub health_check: Option<HealthCheckPolicy>,
    pub protocol: Option<UpstreamProtocol>,
}

/// An upstream cluster that exists for the control plane's own extensions
/// rather than for user routes. It carries a pre-computed name.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionCluster {
    pub name: String,
    pub upstream: ServiceCluster,
}

/// Active health checking for a cluster. Any unset field is replaced with a
/// fixed default when the Envoy resource is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheckPolicy {
    pub path: String,
    pub host: Option<String>,
    pub timeout: Option<Duration>,
    pub interval: Option<Duration>,
    pub unhealthy_threshold: Option<u32>,
    pub healthy_threshold: Option<u32>,
}

/// The protocol spoken to the upstream. HTTP/1.1 is the unspecified
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamProtocol {
    H2,
    H2c,
    Tls,
}

impl UpstreamProtocol {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            UpstreamProtocol::H2 => "h2",
            UpstreamProtocol::H2c => "h2c",
            UpstreamProtocol::Tls => "tls",
        }
    }
}

/// A TLS keypair, identified by its source object and the data it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub namespace: String,
    pub name: String,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

/// A named group of weighted upstream services. This is the registry entry
/// the endpoints translator computes load assignments for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceCluster {
    /// The load assignment's cluster name. Must be unique across one
    /// registry.
    pub cluster_name: String,
    pub services: Vec<WeightedService>,
}

impl ServiceCluster {
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.is_empty() {
            return Err(Error::UnnamedServiceCluster);
        }
        if self.services.is_empty() {
            return Err(Error::EmptyServiceCluster(self.cluster_name.clone()));
        }
        Ok(())
    }
}

/// One weighted binding from a service cluster to a service port. Weight 0
/// means "unspecified".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedService {
    pub weight: u32,
    pub namespace: String,
    pub name: String,
    pub port: ServicePort,
}

/// A service port binding. An empty `name` refers to the sole unnamed port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePort {
    pub name: String,
    pub number: u16,
}

/// A backend address-set event payload, keyed by `namespace`/`name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub namespace: String,
    pub name: String,
    pub subsets: Vec<EndpointSubset>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSubset {
    /// Addresses currently ready to serve traffic.
    pub addresses: Vec<String>,
    /// Addresses that exist but are not ready. Never routed to.
    pub not_ready_addresses: Vec<String>,
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointPort {
    pub name: String,
    pub port: u16,
}
