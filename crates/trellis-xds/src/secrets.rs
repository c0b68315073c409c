//! The SDS cache and the visitor that fills it.

use std::collections::BTreeMap;

use xds_api::pb::envoy::extensions::transport_sockets::tls::v3 as xds_tls;

use crate::cache::Cache;
use crate::dag::{Dag, Vertex, Visitor};
use crate::envoy;

pub type SecretCache = Cache<xds_tls::Secret>;

/// Rebuild the secret cache from a freshly recomputed routing graph.
pub fn on_change(cache: &SecretCache, dag: &Dag) {
    let mut visitor = SecretVisitor::default();
    dag.visit(&mut visitor);
    cache.update(visitor.secrets);
}

#[derive(Default)]
struct SecretVisitor {
    secrets: BTreeMap<String, xds_tls::Secret>,
}

impl Visitor for SecretVisitor {
    fn visit(&mut self, vertex: Vertex<'_>) {
        let Vertex::Secret(secret) = vertex else {
            return;
        };
        let secret = envoy::secret::secret(secret);
        match self.secrets.get(&secret.name) {
            // the name embeds a digest of the data, so a duplicate name
            // must be the same keypair seen through another vhost
            Some(existing) => debug_assert_eq!(existing, &secret, "secret name collision"),
            None => {
                self.secrets.insert(secret.name.clone(), secret);
            }
        }
    }
}
