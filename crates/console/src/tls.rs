use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

/// Client TLS configuration shared by the control channel and the signaling
/// client: platform roots, plus the turret server's own certificate when a
/// PEM path is given (self-signed deployments).
pub fn client_config(pinned_cert: Option<&str>) -> anyhow::Result<Arc<rustls::ClientConfig>> {
    let mut root_store = rustls::RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("Failed to load a platform certificate: {e}");
    }
    let (added, ignored) = root_store.add_parsable_certificates(native.certs);
    debug!(added, ignored, "Loaded platform root certificates");

    if let Some(cert_path) = pinned_cert {
        match std::fs::read(cert_path) {
            Ok(pem_data) => {
                let certs: Vec<_> = rustls_pemfile::certs(&mut pem_data.as_slice())
                    .filter_map(|r| r.ok())
                    .collect();
                if certs.is_empty() {
                    warn!("No certificates found in {cert_path}, using system roots only");
                }
                for cert in certs {
                    if let Err(e) = root_store.add(cert) {
                        warn!("Failed to add pinned cert to root store: {e}");
                    } else {
                        info!("Pinned server certificate from {cert_path}");
                    }
                }
            }
            Err(e) => {
                warn!("Failed to read TLS cert from {cert_path}: {e}, falling back to system roots");
            }
        }
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Arc::new(config))
}
