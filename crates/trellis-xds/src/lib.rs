//! The xDS translation and caching core of the trellis ingress control
//! plane.
//!
//! A validated routing graph ([`dag::Dag`]) comes in; Envoy v3 discovery
//! resources go out, held in per-kind caches ([`cache::Cache`]) under
//! stable, content-derived names ([`names`]). Two independent paths keep
//! the caches current:
//!
//! - A full-graph path: after every graph recomputation, each per-kind
//!   visitor ([`clusters`], [`listeners`], [`secrets`]) walks the graph
//!   once and atomically replaces its cache's snapshot.
//! - An incremental path: the [`endpoints::EndpointsTranslator`] reacts to
//!   backend address-set events, recomputing only the load assignments the
//!   changed service feeds, so endpoint churn never costs a full rebuild.
//!
//! The discovery streaming server drives everything through the
//! [`cache::ResourceCache`] trait: block on [`watch::Changes`], wake, then
//! re-read with `contents` or `query`. Caches never push data.
//!
//! ```
//! use trellis_xds::cache::ResourceCache;
//! use trellis_xds::{clusters, dag};
//!
//! let cluster_cache = clusters::ClusterCache::default();
//!
//! // on every graph change, one traversal rebuilds the whole snapshot
//! clusters::on_change(&cluster_cache, &dag::Dag::default());
//! assert!(cluster_cache.contents().is_empty());
//! ```

pub mod cache;
pub mod dag;
pub mod envoy;
pub mod names;
pub mod watch;

pub mod clusters;
pub mod endpoints;
pub mod listeners;
pub mod secrets;

mod error;
pub use crate::error::{Error, Result};
