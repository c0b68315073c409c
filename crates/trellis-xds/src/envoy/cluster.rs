//! CDS cluster resources.

use std::time::Duration;

use xds_api::pb::envoy::config::cluster::v3 as xds_cluster;
use xds_api::pb::envoy::config::core::v3 as xds_core;
use xds_api::pb::envoy::extensions::transport_sockets::tls::v3 as xds_tls;
use xds_api::pb::envoy::extensions::upstreams::http::v3 as xds_upstream_http;

use crate::dag::{self, UpstreamProtocol};
use crate::names;

use super::{any_from_msg, config_source, duration, u32_value};

/// How long Envoy waits for an upstream connection before giving up. Fixed
/// rather than configurable so every cluster behaves the same.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

// Health check defaults. Envoy's own defaults differ between HTTP and TCP
// checkers, so every field is pinned here instead of being left unset.
const HC_TIMEOUT: Duration = Duration::from_secs(2);
const HC_INTERVAL: Duration = Duration::from_secs(10);
const HC_UNHEALTHY_THRESHOLD: u32 = 3;
const HC_HEALTHY_THRESHOLD: u32 = 2;
const HC_HOST: &str = "trellis-envoy-healthcheck";

const HTTP_PROTOCOL_OPTIONS_KEY: &str = "envoy.extensions.upstreams.http.v3.HttpProtocolOptions";
const TLS_TRANSPORT_SOCKET: &str = "envoy.transport_sockets.tls";

/// Build the CDS resource for a routed cluster.
pub fn cluster(cluster: &dag::Cluster) -> xds_cluster::Cluster {
    let svc = &cluster.upstream;
    let mut out = xds_cluster::Cluster {
        name: names::cluster_name(cluster),
        alt_stat_name: names::stat_name(svc),
        connect_timeout: Some(duration(CONNECT_TIMEOUT)),
        lb_policy: lb_policy(cluster.load_balancer_strategy.as_deref()) as i32,
        cluster_discovery_type: Some(xds_cluster::cluster::ClusterDiscoveryType::Type(
            xds_cluster::cluster::DiscoveryType::Eds as i32,
        )),
        eds_cluster_config: Some(xds_cluster::cluster::EdsClusterConfig {
            eds_config: Some(config_source()),
            service_name: names::service_name(&svc.namespace, &svc.name, &svc.port.name),
        }),
        ..Default::default()
    };

    if let Some(hc) = &cluster.health_check {
        out.health_checks = vec![health_check(hc)];
        // an actively checked host that disappears from the endpoint set
        // must be dropped immediately, not drained on its check schedule
        out.ignore_health_on_host_removal = true;
    }

    match cluster.protocol {
        Some(UpstreamProtocol::H2) => {
            set_http2_protocol_options(&mut out);
            out.transport_socket = Some(upstream_tls_transport_socket());
        }
        Some(UpstreamProtocol::H2c) => set_http2_protocol_options(&mut out),
        Some(UpstreamProtocol::Tls) => {
            out.transport_socket = Some(upstream_tls_transport_socket());
        }
        None => {}
    }

    out
}

/// Build the CDS resource for an extension cluster. Extensions speak gRPC
/// to the control plane's own services, so the upstream is always http/2.
pub fn extension_cluster(ext: &dag::ExtensionCluster) -> xds_cluster::Cluster {
    let mut out = xds_cluster::Cluster {
        name: ext.name.clone(),
        connect_timeout: Some(duration(CONNECT_TIMEOUT)),
        lb_policy: xds_cluster::cluster::LbPolicy::RoundRobin as i32,
        cluster_discovery_type: Some(xds_cluster::cluster::ClusterDiscoveryType::Type(
            xds_cluster::cluster::DiscoveryType::Eds as i32,
        )),
        eds_cluster_config: Some(xds_cluster::cluster::EdsClusterConfig {
            eds_config: Some(config_source()),
            service_name: ext.upstream.cluster_name.clone(),
        }),
        ..Default::default()
    };
    set_http2_protocol_options(&mut out);
    out
}

fn lb_policy(strategy: Option<&str>) -> xds_cluster::cluster::LbPolicy {
    use xds_cluster::cluster::LbPolicy;

    // must stay in sync with the strategies names::lb_strategy recognizes,
    // or a cluster's policy and its name would disagree
    match strategy {
        Some("WeightedLeastRequest") => LbPolicy::LeastRequest,
        Some("Random") => LbPolicy::Random,
        Some("RequestHash") | Some("Cookie") => LbPolicy::RingHash,
        None | Some("RoundRobin") => LbPolicy::RoundRobin,
        Some(other) => {
            // validation of the strategy string is an earlier stage's job;
            // here an unrecognized name degrades instead of failing
            tracing::warn!(
                strategy = other,
                "unrecognized load balancer strategy, using round robin",
            );
            LbPolicy::RoundRobin
        }
    }
}

fn health_check(policy: &dag::HealthCheckPolicy) -> xds_core::HealthCheck {
    let host = policy.host.clone().unwrap_or_else(|| HC_HOST.to_string());
    xds_core::HealthCheck {
        timeout: Some(duration(policy.timeout.unwrap_or(HC_TIMEOUT))),
        interval: Some(duration(policy.interval.unwrap_or(HC_INTERVAL))),
        unhealthy_threshold: Some(u32_value(
            policy.unhealthy_threshold.unwrap_or(HC_UNHEALTHY_THRESHOLD),
        )),
        healthy_threshold: Some(u32_value(
            policy.healthy_threshold.unwrap_or(HC_HEALTHY_THRESHOLD),
        )),
        health_checker: Some(xds_core::health_check::HealthChecker::HttpHealthCheck(
            xds_core::health_check::HttpHealthCheck {
                path: policy.path.clone(),
                host,
                ..Default::default()
            },
        )),
        ..Default::default()
    }
}

fn set_http2_protocol_options(cluster: &mut xds_cluster::Cluster) {
    use xds_upstream_http::http_protocol_options::explicit_http_config::ProtocolConfig;
    use xds_upstream_http::http_protocol_options::{ExplicitHttpConfig, UpstreamProtocolOptions};

    let options = xds_upstream_http::HttpProtocolOptions {
        upstream_protocol_options: Some(UpstreamProtocolOptions::ExplicitHttpConfig(
            ExplicitHttpConfig {
                protocol_config: Some(ProtocolConfig::Http2ProtocolOptions(
                    xds_core::Http2ProtocolOptions::default(),
                )),
            },
        )),
        ..Default::default()
    };

    cluster.typed_extension_protocol_options.insert(
        HTTP_PROTOCOL_OPTIONS_KEY.to_string(),
        any_from_msg(&options),
    );
}

fn upstream_tls_transport_socket() -> xds_core::TransportSocket {
    let context = xds_tls::UpstreamTlsContext::default();
    xds_core::TransportSocket {
        name: TLS_TRANSPORT_SOCKET.to_string(),
        config_type: Some(xds_core::transport_socket::ConfigType::TypedConfig(
            any_from_msg(&context),
        )),
    }
}
