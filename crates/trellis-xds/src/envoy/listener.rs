//! LDS listener resources and their filter chains.

use xds_api::pb::envoy::config::core::v3 as xds_core;
use xds_api::pb::envoy::config::listener::v3 as xds_listener;
use xds_api::pb::envoy::extensions::filters::http::router::v3::Router;
use xds_api::pb::envoy::extensions::filters::listener::tls_inspector::v3::TlsInspector;
use xds_api::pb::envoy::extensions::filters::network::http_connection_manager::v3 as xds_http;
use xds_api::pb::envoy::extensions::transport_sockets::tls::v3 as xds_tls;

use crate::dag;
use crate::names;

use super::{any_from_msg, config_source, socket_address};

/// The plaintext listener's fixed name. Part of the wire contract.
pub const HTTP_LISTENER_NAME: &str = "ingress_http";

/// The TLS listener's fixed name. Part of the wire contract.
pub const HTTPS_LISTENER_NAME: &str = "ingress_https";

/// The route configuration served to connections that matched the fallback
/// certificate chain rather than an SNI chain.
pub const FALLBACK_ROUTECONFIG: &str = "ingress_fallbackcert";

const FALLBACK_CHAIN_NAME: &str = "fallback-certificate";

const HTTP_CONNECTION_MANAGER: &str = "envoy.filters.network.http_connection_manager";
const HTTP_ROUTER: &str = "envoy.filters.http.router";
const TLS_INSPECTOR: &str = "envoy.filters.listener.tls_inspector";
const TLS_TRANSPORT_SOCKET: &str = "envoy.transport_sockets.tls";

/// Where the two ingress listeners bind. Plain data; callers override
/// fields as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub http_address: String,
    pub http_port: u32,
    pub https_address: String,
    pub https_port: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0".to_string(),
            http_port: 8080,
            https_address: "0.0.0.0".to_string(),
            https_port: 8443,
        }
    }
}

/// The plaintext listener: one filter chain, routes served under the
/// listener's own name.
pub fn http_listener(config: &ListenerConfig) -> xds_listener::Listener {
    xds_listener::Listener {
        name: HTTP_LISTENER_NAME.to_string(),
        address: Some(socket_address(&config.http_address, config.http_port)),
        filter_chains: vec![xds_listener::FilterChain {
            filters: vec![http_connection_manager(
                HTTP_LISTENER_NAME,
                HTTP_LISTENER_NAME,
            )],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// The TLS listener. `filter_chains` must already be in their final order;
/// this builder adds the TLS inspector needed for SNI matching but imposes
/// no ordering of its own.
pub fn https_listener(
    config: &ListenerConfig,
    filter_chains: Vec<xds_listener::FilterChain>,
) -> xds_listener::Listener {
    xds_listener::Listener {
        name: HTTPS_LISTENER_NAME.to_string(),
        address: Some(socket_address(&config.https_address, config.https_port)),
        listener_filters: vec![tls_inspector()],
        filter_chains,
        ..Default::default()
    }
}

/// A filter chain serving one SNI hostname with the given server
/// certificate. Routes for the host live under `https/<hostname>`.
pub fn sni_filter_chain(hostname: &str, secret: &dag::Secret) -> xds_listener::FilterChain {
    xds_listener::FilterChain {
        filter_chain_match: Some(xds_listener::FilterChainMatch {
            server_names: vec![hostname.to_string()],
            ..Default::default()
        }),
        transport_socket: Some(downstream_tls_transport_socket(secret)),
        filters: vec![http_connection_manager(
            HTTPS_LISTENER_NAME,
            &format!("https/{hostname}"),
        )],
        ..Default::default()
    }
}

/// The chain serving the fallback certificate: matched on "this is TLS"
/// alone, so it only catches connections no SNI chain claimed. Callers must
/// sort it after every SNI chain.
pub fn fallback_filter_chain(secret: &dag::Secret) -> xds_listener::FilterChain {
    xds_listener::FilterChain {
        name: FALLBACK_CHAIN_NAME.to_string(),
        filter_chain_match: Some(xds_listener::FilterChainMatch {
            transport_protocol: "tls".to_string(),
            ..Default::default()
        }),
        transport_socket: Some(downstream_tls_transport_socket(secret)),
        filters: vec![http_connection_manager(
            HTTPS_LISTENER_NAME,
            FALLBACK_ROUTECONFIG,
        )],
        ..Default::default()
    }
}

fn http_connection_manager(stat_prefix: &str, route_config_name: &str) -> xds_listener::Filter {
    use xds_http::http_connection_manager::RouteSpecifier;

    let manager = xds_http::HttpConnectionManager {
        stat_prefix: stat_prefix.to_string(),
        route_specifier: Some(RouteSpecifier::Rds(xds_http::Rds {
            config_source: Some(config_source()),
            route_config_name: route_config_name.to_string(),
        })),
        http_filters: vec![xds_http::HttpFilter {
            name: HTTP_ROUTER.to_string(),
            config_type: Some(xds_http::http_filter::ConfigType::TypedConfig(
                any_from_msg(&Router::default()),
            )),
            ..Default::default()
        }],
        ..Default::default()
    };

    xds_listener::Filter {
        name: HTTP_CONNECTION_MANAGER.to_string(),
        config_type: Some(xds_listener::filter::ConfigType::TypedConfig(any_from_msg(
            &manager,
        ))),
    }
}

fn tls_inspector() -> xds_listener::ListenerFilter {
    xds_listener::ListenerFilter {
        name: TLS_INSPECTOR.to_string(),
        config_type: Some(xds_listener::listener_filter::ConfigType::TypedConfig(
            any_from_msg(&TlsInspector::default()),
        )),
        ..Default::default()
    }
}

/// The downstream TLS context for a chain, referring to the certificate by
/// its SDS name so certificate rotation never touches LDS.
fn downstream_tls_transport_socket(secret: &dag::Secret) -> xds_core::TransportSocket {
    let context = xds_tls::DownstreamTlsContext {
        common_tls_context: Some(xds_tls::CommonTlsContext {
            alpn_protocols: vec!["h2".to_string(), "http/1.1".to_string()],
            tls_certificate_sds_secret_configs: vec![xds_tls::SdsSecretConfig {
                name: names::secret_name(secret),
                sds_config: Some(config_source()),
            }],
            ..Default::default()
        }),
        ..Default::default()
    };

    xds_core::TransportSocket {
        name: TLS_TRANSPORT_SOCKET.to_string(),
        config_type: Some(xds_core::transport_socket::ConfigType::TypedConfig(
            any_from_msg(&context),
        )),
    }
}
