//! The CDS cache and the visitor that fills it.

use std::collections::BTreeMap;

use xds_api::pb::envoy::config::cluster::v3 as xds_cluster;

use crate::cache::Cache;
use crate::dag::{Dag, Vertex, Visitor};
use crate::envoy;

pub type ClusterCache = Cache<xds_cluster::Cluster>;

/// Rebuild the cluster cache from a freshly recomputed routing graph.
pub fn on_change(cache: &ClusterCache, dag: &Dag) {
    let mut visitor = ClusterVisitor::default();
    dag.visit(&mut visitor);
    cache.update(visitor.clusters);
}

#[derive(Default)]
struct ClusterVisitor {
    clusters: BTreeMap<String, xds_cluster::Cluster>,
}

impl ClusterVisitor {
    fn record(&mut self, cluster: xds_cluster::Cluster) {
        match self.clusters.get(&cluster.name) {
            // the name covers every discovery-relevant field, so two nodes
            // deriving the same name must have built the same resource
            Some(existing) => {
                debug_assert_eq!(existing, &cluster, "cluster name collision: {}", cluster.name)
            }
            None => {
                self.clusters.insert(cluster.name.clone(), cluster);
            }
        }
    }
}

impl Visitor for ClusterVisitor {
    fn visit(&mut self, vertex: Vertex<'_>) {
        match vertex {
            Vertex::Cluster(cluster) => self.record(envoy::cluster::cluster(cluster)),
            Vertex::ExtensionCluster(ext) => self.record(envoy::cluster::extension_cluster(ext)),
            _ => {}
        }
    }
}
