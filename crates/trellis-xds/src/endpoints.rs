//! The EDS endpoints translator.
//!
//! Endpoints churn orders of magnitude faster than routing configuration,
//! so this cache is not rebuilt by graph traversal. Instead it holds a
//! registry of service clusters (replaced wholesale after every graph
//! recomputation) and reacts to individual backend address-set events,
//! recomputing only the load assignments the changed service feeds. A
//! service may feed several clusters through distinct named ports, and a
//! cluster may blend several weighted services; the registry index maps
//! each service to exactly the cluster names that need recomputing.
//!
//! Recomputed snapshots are compared against the live one before they are
//! published, so an event that changes nothing wakes nobody.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use xds_api::pb::envoy::config::endpoint::v3 as xds_endpoint;
use xds_api::pb::google::protobuf;

use crate::cache::{Cache, ResourceCache};
use crate::dag::{Endpoints, ServiceCluster};
use crate::envoy;
use crate::error::{Error, Result};
use crate::watch::Changes;

macro_rules! no_poison {
    ($guard:expr) => {
        $guard.expect("EndpointsTranslator was poisoned: this is a bug in trellis")
    };
}

/// A service identity, `(namespace, name)`. Address-set events are keyed
/// by it.
type ServiceKey = (String, String);

fn service_key(namespace: &str, name: &str) -> ServiceKey {
    (namespace.to_string(), name.to_string())
}

/// Translates backend address-set events into EDS load assignments.
///
/// Writers call [`set_clusters`][Self::set_clusters] after each graph
/// recomputation and [`on_add`][Self::on_add] /
/// [`on_update`][Self::on_update] / [`on_delete`][Self::on_delete] on
/// endpoint events; the streaming server reads through [`ResourceCache`].
#[derive(Default)]
pub struct EndpointsTranslator {
    cache: Cache<xds_endpoint::ClusterLoadAssignment>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// The registered service clusters, by cluster name.
    clusters: BTreeMap<String, ServiceCluster>,
    /// Which cluster names each service feeds.
    by_service: HashMap<ServiceKey, BTreeSet<String>>,
    /// The last observed address set per service, registered or not.
    endpoints: HashMap<ServiceKey, Endpoints>,
}

impl EndpointsTranslator {
    /// Atomically replace the service-cluster registry and recompute every
    /// assignment from the currently known address sets.
    ///
    /// Fails without touching the previous registry if any entry is
    /// invalid or two entries share a cluster name.
    pub fn set_clusters(&self, clusters: Vec<ServiceCluster>) -> Result<()> {
        let mut registry = BTreeMap::new();
        for cluster in clusters {
            cluster.validate()?;
            let name = cluster.cluster_name.clone();
            if registry.insert(name.clone(), cluster).is_some() {
                return Err(Error::DuplicateCluster(name));
            }
        }

        let mut inner = no_poison!(self.inner.lock());
        inner.by_service = by_service(&registry);
        inner.clusters = registry;
        tracing::debug!(clusters = inner.clusters.len(), "service clusters replaced");

        let next = inner
            .clusters
            .values()
            .map(|cluster| {
                (
                    cluster.cluster_name.clone(),
                    recompute(cluster, &inner.endpoints),
                )
            })
            .collect();
        self.apply(next);
        Ok(())
    }

    /// Record a new address set and recompute the assignments of every
    /// cluster fed by this service. Events for services no cluster
    /// references are stored but published nowhere.
    pub fn on_add(&self, endpoints: Endpoints) {
        let key = service_key(&endpoints.namespace, &endpoints.name);
        let mut inner = no_poison!(self.inner.lock());
        inner.endpoints.insert(key.clone(), endpoints);
        self.recompute_affected(&inner, &key);
    }

    /// Replace a service's address set. A replacement is an add over the
    /// same key.
    pub fn on_update(&self, endpoints: Endpoints) {
        self.on_add(endpoints);
    }

    /// Drop a service's address set. Clusters fed by it keep a present,
    /// empty assignment so scale-to-zero stays distinct from "never
    /// configured".
    pub fn on_delete(&self, endpoints: &Endpoints) {
        let key = service_key(&endpoints.namespace, &endpoints.name);
        let mut inner = no_poison!(self.inner.lock());
        inner.endpoints.remove(&key);
        self.recompute_affected(&inner, &key);
    }

    /// A handle to the current assignment snapshot.
    pub fn snapshot(&self) -> Arc<BTreeMap<String, xds_endpoint::ClusterLoadAssignment>> {
        self.cache.snapshot()
    }

    fn recompute_affected(&self, inner: &Inner, key: &ServiceKey) {
        let Some(affected) = inner.by_service.get(key) else {
            tracing::trace!(
                namespace = %key.0,
                service = %key.1,
                "endpoints event for an unregistered service",
            );
            return;
        };

        let mut next = (*self.cache.snapshot()).clone();
        for name in affected {
            if let Some(cluster) = inner.clusters.get(name) {
                next.insert(name.clone(), recompute(cluster, &inner.endpoints));
            }
        }
        self.apply(next);
    }

    /// Publish `next` unless it matches the live snapshot. Suppressing
    /// no-op updates keeps a steady stream of no-change endpoint events
    /// from waking every connected proxy.
    fn apply(&self, next: BTreeMap<String, xds_endpoint::ClusterLoadAssignment>) {
        let current = self.cache.snapshot();
        if equal(&current, &next) {
            tracing::trace!("no assignment changed, skipping update");
            return;
        }
        self.cache.update(next);
    }
}

impl ResourceCache for EndpointsTranslator {
    fn type_url(&self) -> &'static str {
        self.cache.type_url()
    }

    fn contents(&self) -> Vec<protobuf::Any> {
        self.cache.contents()
    }

    fn query(&self, names: &[String]) -> Vec<protobuf::Any> {
        self.cache.query(names)
    }

    fn changes(&self) -> Changes {
        self.cache.changes()
    }
}

fn by_service(clusters: &BTreeMap<String, ServiceCluster>) -> HashMap<ServiceKey, BTreeSet<String>> {
    let mut index: HashMap<ServiceKey, BTreeSet<String>> = HashMap::new();
    for cluster in clusters.values() {
        for svc in &cluster.services {
            index
                .entry(service_key(&svc.namespace, &svc.name))
                .or_default()
                .insert(cluster.cluster_name.clone());
        }
    }
    index
}

/// Build one cluster's load assignment from the known address sets.
///
/// Each weighted service binding contributes one endpoint group, in
/// declared order, even when it resolves to no addresses at all. Ready
/// addresses for the bound port are matched by port name (an empty name
/// matches the unnamed port) and sorted, so the result is independent of
/// event and subset ordering.
fn recompute(
    cluster: &ServiceCluster,
    endpoints: &HashMap<ServiceKey, Endpoints>,
) -> xds_endpoint::ClusterLoadAssignment {
    // with every weight left unspecified the services share the load
    // equally; zero would mean "never route here"
    let default_weights = cluster.services.iter().all(|svc| svc.weight == 0);

    let mut groups = Vec::with_capacity(cluster.services.len());
    for svc in &cluster.services {
        let mut addrs: Vec<(&str, u16)> = Vec::new();
        if let Some(ep) = endpoints.get(&service_key(&svc.namespace, &svc.name)) {
            for subset in &ep.subsets {
                for port in &subset.ports {
                    if port.name != svc.port.name {
                        continue;
                    }
                    addrs.extend(subset.addresses.iter().map(|addr| (addr.as_str(), port.port)));
                }
            }
        }
        addrs.sort_unstable();
        addrs.dedup();

        let weight = if default_weights {
            Some(1)
        } else {
            (svc.weight > 0).then_some(svc.weight)
        };
        let lb_endpoints = addrs
            .into_iter()
            .map(|(addr, port)| envoy::lb_endpoint(addr, u32::from(port)))
            .collect();
        groups.push(envoy::locality_endpoints(weight, lb_endpoints));
    }

    envoy::cluster_load_assignment(&cluster.cluster_name, groups)
}

/// Snapshot comparison: the same cluster names mapped to messages that
/// compare equal field by field. Two empty snapshots are equal however
/// they were produced.
fn equal(
    a: &BTreeMap<String, xds_endpoint::ClusterLoadAssignment>,
    b: &BTreeMap<String, xds_endpoint::ClusterLoadAssignment>,
) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((name_a, cla_a), (name_b, cla_b))| name_a == name_b && cla_a == cla_b)
}
