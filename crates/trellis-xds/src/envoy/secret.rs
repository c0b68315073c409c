//! SDS secret resources.

use xds_api::pb::envoy::config::core::v3 as xds_core;
use xds_api::pb::envoy::extensions::transport_sockets::tls::v3 as xds_tls;

use crate::dag;
use crate::names;

/// Build the SDS resource for a TLS keypair. The name embeds a digest of
/// the data, so rotating a certificate produces a new resource instead of
/// mutating the old one.
pub fn secret(secret: &dag::Secret) -> xds_tls::Secret {
    xds_tls::Secret {
        name: names::secret_name(secret),
        r#type: Some(xds_tls::secret::Type::TlsCertificate(
            xds_tls::TlsCertificate {
                certificate_chain: Some(inline_bytes(&secret.cert)),
                private_key: Some(inline_bytes(&secret.key)),
                ..Default::default()
            },
        )),
    }
}

fn inline_bytes(data: &[u8]) -> xds_core::DataSource {
    xds_core::DataSource {
        specifier: Some(xds_core::data_source::Specifier::InlineBytes(
            data.to_vec(),
        )),
        watched_directory: None,
    }
}
