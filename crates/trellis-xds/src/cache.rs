//! Per-kind xDS resource caches.
//!
//! A [`Cache`] holds the latest name-to-resource map for one resource kind
//! as an immutable snapshot behind an atomically swapped pointer. The
//! writer path replaces the whole snapshot in one swap and signals; reader
//! paths grab a snapshot handle and serialize from it without holding any
//! lock, so reader latency is independent of how many proxies are
//! connected.
//!
//! A snapshot is always the product of exactly one full derivation - there
//! is no partial visibility and no in-place mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use xds_api::pb::envoy::config::cluster::v3 as xds_cluster;
use xds_api::pb::envoy::config::endpoint::v3 as xds_endpoint;
use xds_api::pb::envoy::config::listener::v3 as xds_listener;
use xds_api::pb::envoy::extensions::transport_sockets::tls::v3 as xds_tls;
use xds_api::pb::google::protobuf;

use crate::watch::{Changes, Notifier};

/// The closed set of resource kinds this control plane serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Cluster,
    ClusterLoadAssignment,
    Listener,
    Secret,
}

impl ResourceType {
    /// The discovery type URL requests for this kind are routed by.
    pub const fn type_url(&self) -> &'static str {
        match self {
            ResourceType::Cluster => "type.googleapis.com/envoy.config.cluster.v3.Cluster",
            ResourceType::ClusterLoadAssignment => {
                "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment"
            }
            ResourceType::Listener => "type.googleapis.com/envoy.config.listener.v3.Listener",
            ResourceType::Secret => {
                "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret"
            }
        }
    }
}

/// A protobuf message that can live in a [`Cache`].
pub trait XdsResource:
    prost::Message + prost::Name + Clone + Default + PartialEq + Send + Sync + 'static
{
    const TYPE: ResourceType;
}

impl XdsResource for xds_cluster::Cluster {
    const TYPE: ResourceType = ResourceType::Cluster;
}

impl XdsResource for xds_endpoint::ClusterLoadAssignment {
    const TYPE: ResourceType = ResourceType::ClusterLoadAssignment;
}

impl XdsResource for xds_listener::Listener {
    const TYPE: ResourceType = ResourceType::Listener;
}

impl XdsResource for xds_tls::Secret {
    const TYPE: ResourceType = ResourceType::Secret;
}

/// The latest name-to-resource map for one resource kind.
pub struct Cache<T> {
    snapshot: ArcSwap<BTreeMap<String, T>>,
    notifier: Notifier,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(BTreeMap::new()),
            notifier: Notifier::default(),
        }
    }
}

impl<T: XdsResource> Cache<T> {
    /// Atomically replace the entire snapshot and wake every subscriber.
    /// This is the cache's only mutator.
    pub fn update(&self, contents: BTreeMap<String, T>) {
        tracing::debug!(
            type_url = T::TYPE.type_url(),
            resources = contents.len(),
            "cache update",
        );
        self.snapshot.store(Arc::new(contents));
        self.notifier.notify();
    }

    /// A handle to the current snapshot. The map behind it never changes;
    /// readers keep the handle as long as they like without blocking the
    /// writer.
    pub fn snapshot(&self) -> Arc<BTreeMap<String, T>> {
        self.snapshot.load_full()
    }

    pub fn changes(&self) -> Changes {
        self.notifier.changes()
    }
}

/// The read surface the discovery streaming server drives. Each per-kind
/// cache answers wildcard and name-filtered requests and exposes a change
/// subscription to block on between reads.
pub trait ResourceCache: Send + Sync {
    fn type_url(&self) -> &'static str;

    /// Every resource in the snapshot, sorted by name, packed for the wire.
    fn contents(&self) -> Vec<protobuf::Any>;

    /// The name-sorted subset of the snapshot matching `names`. Unknown
    /// names are silently dropped, never synthesized: kinds like Cluster
    /// carry required discriminated fields that cannot be invented from a
    /// name alone. Discovery clients routinely probe for resources ahead of
    /// registration, so a miss is not an error.
    fn query(&self, names: &[String]) -> Vec<protobuf::Any>;

    fn changes(&self) -> Changes;
}

impl<T: XdsResource> ResourceCache for Cache<T> {
    fn type_url(&self) -> &'static str {
        T::TYPE.type_url()
    }

    fn contents(&self) -> Vec<protobuf::Any> {
        let snapshot = self.snapshot();
        snapshot.values().map(any_from_msg).collect()
    }

    fn query(&self, names: &[String]) -> Vec<protobuf::Any> {
        let snapshot = self.snapshot();
        let mut matched = BTreeMap::new();
        for name in names {
            if let Some((name, resource)) = snapshot.get_key_value(name.as_str()) {
                matched.insert(name, resource);
            }
        }
        matched.values().map(|resource| any_from_msg(*resource)).collect()
    }

    fn changes(&self) -> Changes {
        self.notifier.changes()
    }
}

fn any_from_msg<T: prost::Name>(msg: &T) -> protobuf::Any {
    protobuf::Any::from_msg(msg).expect("generated invalid protobuf")
}
