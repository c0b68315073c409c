//! Stable, length-bounded names for xDS resources.
//!
//! Discovery protocols replace resources by name, so a name has to encode
//! everything that makes the resource distinct: two semantically identical
//! clusters must always derive the same name, and any change to a
//! discovery-relevant field must derive a new one. Names are derived only
//! from semantic configuration, never from traversal order or pointer
//! identity.

use std::fmt::Write;

use xxhash_rust::xxh64::xxh64;

use crate::dag;

/// The longest name we will hand to a proxy. Segments of an over-long name
/// are truncated and suffixed with a shorthash so the result stays unique.
const NAME_LIMIT: usize = 60;

/// Hex chars appended to each truncated segment.
const SHORTHASH_LEN: usize = 6;

/// Hex chars of the policy/data digest embedded in a name.
const DIGEST_LEN: usize = 10;

// Envoy and gRPC both hash with a zero seed; keeping the same convention
// means any tooling recomputing these names gets identical digests.
const SEED: u64 = 0;

fn hex_digest(input: &[u8], len: usize) -> String {
    let digest = format!("{:016x}", xxh64(input, SEED));
    digest[..len].to_string()
}

/// The discovery name for a cluster: `namespace/service/port/digest`, where
/// the digest covers the discovery-relevant policy fields. Identical policy
/// yields an identical name; a changed policy yields a new name and a clean
/// replace on the proxy side.
pub fn cluster_name(cluster: &dag::Cluster) -> String {
    let svc = &cluster.upstream;
    let digest = hex_digest(policy_buf(cluster).as_bytes(), DIGEST_LEN);
    hashname(
        NAME_LIMIT,
        &[
            &svc.namespace,
            &svc.name,
            &svc.port.number.to_string(),
            &digest,
        ],
    )
}

/// The discovery name for a TLS secret: `namespace/name/digest`, where the
/// digest covers the certificate and key bytes.
pub fn secret_name(secret: &dag::Secret) -> String {
    let mut data = Vec::with_capacity(secret.cert.len() + secret.key.len());
    data.extend_from_slice(&secret.cert);
    data.extend_from_slice(&secret.key);
    let digest = hex_digest(&data, DIGEST_LEN);
    hashname(NAME_LIMIT, &[&secret.namespace, &secret.name, &digest])
}

/// The stat name for a cluster. Only used to label local observability
/// output; it is not unique and carries no identity contract, so it is
/// never hashed or truncated.
pub fn stat_name(svc: &dag::WeightedService) -> String {
    format!("{}_{}_{}", svc.namespace, svc.name, svc.port.number)
}

/// The EDS service name a cluster's load assignment is requested under:
/// `namespace/service`, or `namespace/service/portname` for named ports.
pub fn service_name(namespace: &str, name: &str, port_name: &str) -> String {
    if port_name.is_empty() {
        format!("{namespace}/{name}")
    } else {
        format!("{namespace}/{name}/{port_name}")
    }
}

/// Normalize a load-balancer strategy string to the closed set of
/// non-default strategies that affect cluster identity. `RoundRobin`,
/// unset, and unrecognized strategies all normalize to `None`: they share
/// the default behavior, so they must share a name.
pub(crate) fn lb_strategy(raw: Option<&str>) -> Option<&'static str> {
    match raw {
        Some("WeightedLeastRequest") => Some("WeightedLeastRequest"),
        Some("Random") => Some("Random"),
        Some("RequestHash") => Some("RequestHash"),
        Some("Cookie") => Some("Cookie"),
        _ => None,
    }
}

fn policy_buf(cluster: &dag::Cluster) -> String {
    let mut buf = String::new();
    if let Some(strategy) = lb_strategy(cluster.load_balancer_strategy.as_deref()) {
        buf.push_str(strategy);
    }
    if let Some(hc) = &cluster.health_check {
        buf.push_str(&hc.path);
        if let Some(host) = &hc.host {
            buf.push_str(host);
        }
        if let Some(timeout) = hc.timeout {
            let _ = write!(buf, "{}ms", timeout.as_millis());
        }
        if let Some(interval) = hc.interval {
            let _ = write!(buf, "{}ms", interval.as_millis());
        }
        if let Some(threshold) = hc.unhealthy_threshold {
            let _ = write!(buf, "{threshold}");
        }
        if let Some(threshold) = hc.healthy_threshold {
            let _ = write!(buf, "{threshold}");
        }
    }
    if let Some(protocol) = cluster.protocol {
        buf.push_str(protocol.as_str());
    }
    buf
}

/// Join `parts` with `/`, truncating segments to fit under `limit`.
///
/// Segments are truncated from last to first, each to an equal share of the
/// limit, and every truncated segment gets the same shorthash suffix
/// derived from the full untruncated name. Truncation is stable: the same
/// parts always produce the same result.
pub fn hashname(limit: usize, parts: &[&str]) -> String {
    let joined = parts.join("/");
    if joined.len() < limit {
        return joined;
    }

    let suffix = hex_digest(joined.as_bytes(), SHORTHASH_LEN);
    let mut parts: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
    let segment_limit = limit / parts.len();
    for i in (0..parts.len()).rev() {
        parts[i] = truncate(segment_limit, &parts[i], &suffix);
        if parts.join("/").len() < limit {
            break;
        }
    }
    parts.join("/")
}

fn truncate(limit: usize, segment: &str, suffix: &str) -> String {
    if limit >= segment.len() {
        return segment.to_string();
    }
    let keep = limit - (suffix.len() + 1);
    format!("{}-{}", &segment[..keep], suffix)
}
