//! The LDS cache and the visitor that fills it.
//!
//! There are at most two listeners: `ingress_http` for plaintext traffic
//! and `ingress_https` for TLS. The secure listener carries one filter
//! chain per distinct SNI hostname, sorted by hostname so the chain order
//! never depends on graph traversal order, plus an optional trailing chain
//! for the fallback certificate matched on transport protocol alone.

use std::collections::BTreeMap;

use xds_api::pb::envoy::config::listener::v3 as xds_listener;

use crate::cache::Cache;
use crate::dag::{Dag, Secret, Vertex, Visitor};
use crate::envoy::listener::{
    fallback_filter_chain, http_listener, https_listener, sni_filter_chain, ListenerConfig,
    HTTPS_LISTENER_NAME, HTTP_LISTENER_NAME,
};
use crate::names;

pub type ListenerCache = Cache<xds_listener::Listener>;

/// Rebuild the listener cache from a freshly recomputed routing graph.
pub fn on_change(cache: &ListenerCache, config: &ListenerConfig, dag: &Dag) {
    let mut visitor = ListenerVisitor::default();
    dag.visit(&mut visitor);

    let mut listeners = BTreeMap::new();
    if visitor.http {
        listeners.insert(HTTP_LISTENER_NAME.to_string(), http_listener(config));
    }
    if !visitor.chains.is_empty() {
        let mut chains: Vec<_> = visitor.chains.into_values().collect();
        if let Some(fallback) = visitor.fallback {
            // matched on "this is TLS" alone, so it must sort after every
            // SNI chain or it would shadow them
            chains.push(fallback_filter_chain(&fallback));
        }
        listeners.insert(
            HTTPS_LISTENER_NAME.to_string(),
            https_listener(config, chains),
        );
    }
    cache.update(listeners);
}

#[derive(Default)]
struct ListenerVisitor {
    /// At least one plain vhost has routes, so plaintext traffic has
    /// somewhere to go.
    http: bool,
    /// One chain per SNI hostname, keyed by hostname for ordering.
    chains: BTreeMap<String, xds_listener::FilterChain>,
    fallback: Option<Secret>,
}

impl Visitor for ListenerVisitor {
    fn visit(&mut self, vertex: Vertex<'_>) {
        match vertex {
            Vertex::VirtualHost(vhost) => {
                self.http = self.http || !vhost.routes.is_empty();
            }
            Vertex::SecureVirtualHost(vhost) => {
                let hostname = &vhost.virtual_host.name;
                let chain = sni_filter_chain(hostname, &vhost.secret);
                match self.chains.get(hostname) {
                    Some(existing) => {
                        debug_assert_eq!(existing, &chain, "sni chain collision: {hostname}")
                    }
                    None => {
                        self.chains.insert(hostname.clone(), chain);
                    }
                }
                if let Some(fallback) = &vhost.fallback_certificate {
                    match &self.fallback {
                        Some(existing) => debug_assert_eq!(
                            names::secret_name(existing),
                            names::secret_name(fallback),
                            "fallback certificate collision",
                        ),
                        None => self.fallback = Some(fallback.clone()),
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dag::{Cluster, Route, SecureVirtualHost, VirtualHost};

    fn routed_vhost(hostname: &str) -> VirtualHost {
        VirtualHost {
            name: hostname.to_string(),
            routes: vec![Route {
                clusters: vec![Cluster::default()],
            }],
        }
    }

    fn tls_secret(name: &str) -> Secret {
        Secret {
            namespace: "default".to_string(),
            name: name.to_string(),
            cert: b"cert".to_vec(),
            key: b"key".to_vec(),
        }
    }

    fn secure_vhost(hostname: &str, secret: Secret, fallback: Option<Secret>) -> SecureVirtualHost {
        SecureVirtualHost {
            virtual_host: routed_vhost(hostname),
            secret,
            fallback_certificate: fallback,
        }
    }

    fn chain_server_names(listener: &xds_listener::Listener) -> Vec<Vec<String>> {
        listener
            .filter_chains
            .iter()
            .map(|chain| {
                chain
                    .filter_chain_match
                    .as_ref()
                    .map(|m| m.server_names.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    #[test]
    fn empty_dag_produces_no_listeners() {
        let cache = ListenerCache::default();
        on_change(&cache, &ListenerConfig::default(), &Dag::default());
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn routed_vhost_produces_http_listener() {
        let cache = ListenerCache::default();
        let dag = Dag {
            virtual_hosts: vec![routed_vhost("www.example.com")],
            ..Default::default()
        };
        on_change(&cache, &ListenerConfig::default(), &dag);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(HTTP_LISTENER_NAME));
    }

    #[test]
    fn routeless_vhost_produces_nothing() {
        let cache = ListenerCache::default();
        let dag = Dag {
            virtual_hosts: vec![VirtualHost {
                name: "www.example.com".to_string(),
                routes: vec![],
            }],
            ..Default::default()
        };
        on_change(&cache, &ListenerConfig::default(), &dag);
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn secure_vhost_produces_https_listener_only() {
        let cache = ListenerCache::default();
        let dag = Dag {
            secure_virtual_hosts: vec![secure_vhost(
                "secure.example.com",
                tls_secret("example-tls"),
                None,
            )],
            ..Default::default()
        };
        on_change(&cache, &ListenerConfig::default(), &dag);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        let listener = snapshot.get(HTTPS_LISTENER_NAME).unwrap();
        assert_eq!(
            chain_server_names(listener),
            vec![vec!["secure.example.com".to_string()]],
        );
    }

    #[test]
    fn sni_chains_sorted_by_hostname() {
        let cache = ListenerCache::default();
        // declared out of order on purpose
        let dag = Dag {
            secure_virtual_hosts: vec![
                secure_vhost("z.example.com", tls_secret("z-tls"), None),
                secure_vhost("a.example.com", tls_secret("a-tls"), None),
                secure_vhost("m.example.com", tls_secret("m-tls"), None),
            ],
            ..Default::default()
        };
        on_change(&cache, &ListenerConfig::default(), &dag);

        let snapshot = cache.snapshot();
        let listener = snapshot.get(HTTPS_LISTENER_NAME).unwrap();
        assert_eq!(
            chain_server_names(listener),
            vec![
                vec!["a.example.com".to_string()],
                vec!["m.example.com".to_string()],
                vec!["z.example.com".to_string()],
            ],
        );
    }

    #[test]
    fn fallback_chain_sorts_last() {
        let cache = ListenerCache::default();
        let dag = Dag {
            secure_virtual_hosts: vec![
                secure_vhost(
                    "a.example.com",
                    tls_secret("a-tls"),
                    Some(tls_secret("fallback-tls")),
                ),
                secure_vhost("z.example.com", tls_secret("z-tls"), None),
            ],
            ..Default::default()
        };
        on_change(&cache, &ListenerConfig::default(), &dag);

        let snapshot = cache.snapshot();
        let listener = snapshot.get(HTTPS_LISTENER_NAME).unwrap();
        let chains = &listener.filter_chains;
        assert_eq!(chains.len(), 3);

        let last = chains.last().unwrap();
        let m = last.filter_chain_match.as_ref().unwrap();
        assert!(m.server_names.is_empty());
        assert_eq!(m.transport_protocol, "tls");
    }

    #[test]
    fn duplicate_hostname_produces_one_chain() {
        let cache = ListenerCache::default();
        let dag = Dag {
            secure_virtual_hosts: vec![
                secure_vhost("www.example.com", tls_secret("example-tls"), None),
                secure_vhost("www.example.com", tls_secret("example-tls"), None),
            ],
            ..Default::default()
        };
        on_change(&cache, &ListenerConfig::default(), &dag);

        let snapshot = cache.snapshot();
        let listener = snapshot.get(HTTPS_LISTENER_NAME).unwrap();
        assert_eq!(listener.filter_chains.len(), 1);
    }

    #[test]
    fn mixed_dag_produces_both_listeners() {
        let cache = ListenerCache::default();
        let dag = Dag {
            virtual_hosts: vec![routed_vhost("plain.example.com")],
            secure_virtual_hosts: vec![secure_vhost(
                "secure.example.com",
                tls_secret("example-tls"),
                None,
            )],
            ..Default::default()
        };
        on_change(&cache, &ListenerConfig::default(), &dag);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains_key(HTTP_LISTENER_NAME));
        assert!(snapshot.contains_key(HTTPS_LISTENER_NAME));
    }

    #[test]
    fn listener_binds_come_from_config() {
        let cache = ListenerCache::default();
        let config = ListenerConfig {
            http_address: "127.0.0.1".to_string(),
            http_port: 9000,
            ..Default::default()
        };
        let dag = Dag {
            virtual_hosts: vec![routed_vhost("www.example.com")],
            ..Default::default()
        };
        on_change(&cache, &config, &dag);

        let snapshot = cache.snapshot();
        let listener = snapshot.get(HTTP_LISTENER_NAME).unwrap();
        assert_eq!(
            listener.address,
            Some(crate::envoy::socket_address("127.0.0.1", 9000)),
        );
    }
}
