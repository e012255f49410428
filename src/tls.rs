//! TLS configuration with a caller-supplied CA bundle.
//!
//! By default both the WebSocket connector and the HTTP client trust the
//! bundled webpki roots. When `ALOR_CA_BUNDLE` points to a PEM file,
//! [`build_tls_config`] builds a [`rustls::ClientConfig`] that trusts only
//! the certificates in that file, and the same config is handed to both
//! transports.

use std::path::Path;
use std::sync::Arc;

use rustls::ClientConfig;
use tracing::info;

use crate::Result;

/// Builds a [`ClientConfig`] whose root store contains only the CA
/// certificates found in the PEM file at `path`.
///
/// # Errors
///
/// Returns [`AlorError::Tls`](crate::AlorError::Tls) if the file cannot be
/// read, contains no parsable certificates, or the protocol versions
/// cannot be configured.
pub fn build_tls_config(path: &Path) -> Result<ClientConfig> {
    let pem = std::fs::read(path).map_err(|e| {
        crate::AlorError::Tls(format!("failed to read CA bundle {}: {e}", path.display()))
    })?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| crate::AlorError::Tls(format!("failed to parse CA PEM: {e}")))?;

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(crate::AlorError::Tls(format!(
            "no usable certificates in {}",
            path.display()
        )));
    }
    info!(added, ignored, path = %path.display(), "Loaded CA bundle");

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| crate::AlorError::Tls(format!("unsupported protocol versions: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}

/// Loads the optional CA bundle configured for the client.
///
/// # Errors
///
/// Propagates [`build_tls_config`] failures.
pub fn load_optional(path: Option<&Path>) -> Result<Option<Arc<ClientConfig>>> {
    path.map(|p| build_tls_config(p).map(Arc::new)).transpose()
}
