//! Builders from routing-graph nodes to Envoy v3 resources.
//!
//! Everything a proxy sees over the wire is assembled here. Builders are
//! pure functions of their inputs so a resource can be recomputed at any
//! time and compare byte-identical.

pub mod cluster;
pub mod listener;
pub mod secret;

use xds_api::pb::envoy::config::core::v3 as xds_core;
use xds_api::pb::envoy::config::endpoint::v3 as xds_endpoint;
use xds_api::pb::google::protobuf;

/// The ADS config source every dynamic resource points back at.
pub fn config_source() -> xds_core::ConfigSource {
    xds_core::ConfigSource {
        config_source_specifier: Some(xds_core::config_source::ConfigSourceSpecifier::Ads(
            xds_core::AggregatedConfigSource {},
        )),
        resource_api_version: xds_core::ApiVersion::V3 as i32,
        ..Default::default()
    }
}

pub fn socket_address(address: &str, port: u32) -> xds_core::Address {
    xds_core::Address {
        address: Some(xds_core::address::Address::SocketAddress(
            xds_core::SocketAddress {
                address: address.to_string(),
                port_specifier: Some(xds_core::socket_address::PortSpecifier::PortValue(port)),
                ..Default::default()
            },
        )),
    }
}

pub fn lb_endpoint(address: &str, port: u32) -> xds_endpoint::LbEndpoint {
    xds_endpoint::LbEndpoint {
        host_identifier: Some(xds_endpoint::lb_endpoint::HostIdentifier::Endpoint(
            xds_endpoint::Endpoint {
                address: Some(socket_address(address, port)),
                ..Default::default()
            },
        )),
        ..Default::default()
    }
}

/// One locality group of endpoints. `weight` of `None` leaves the group's
/// load-balancing weight unset on the wire.
pub fn locality_endpoints(
    weight: Option<u32>,
    endpoints: Vec<xds_endpoint::LbEndpoint>,
) -> xds_endpoint::LocalityLbEndpoints {
    xds_endpoint::LocalityLbEndpoints {
        lb_endpoints: endpoints,
        load_balancing_weight: weight.map(|value| protobuf::UInt32Value { value }),
        ..Default::default()
    }
}

/// A load assignment owning the given endpoint groups, in order.
pub fn cluster_load_assignment(
    cluster_name: &str,
    endpoints: Vec<xds_endpoint::LocalityLbEndpoints>,
) -> xds_endpoint::ClusterLoadAssignment {
    xds_endpoint::ClusterLoadAssignment {
        cluster_name: cluster_name.to_string(),
        endpoints,
        ..Default::default()
    }
}

pub(crate) fn duration(d: std::time::Duration) -> protobuf::Duration {
    protobuf::Duration {
        seconds: d.as_secs() as i64,
        nanos: d.subsec_nanos() as i32,
    }
}

pub(crate) fn u32_value(value: u32) -> protobuf::UInt32Value {
    protobuf::UInt32Value { value }
}

pub(crate) fn any_from_msg<T: prost::Name>(msg: &T) -> protobuf::Any {
    protobuf::Any::from_msg(msg).expect("generated invalid protobuf")
}
