//! TLS listener configuration.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use deepwell_core::config::CertificateConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::warn;

/// Build the server-side TLS configuration from the configured
/// certificate/key PEM file pairs.
pub fn server_config(entries: &[CertificateConfig]) -> io::Result<rustls::ServerConfig> {
    let Some(entry) = entries.first() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no TLS certificate configured",
        ));
    };
    if entries.len() > 1 {
        warn!("multiple certificate entries configured; only the first is used");
    }

    let certs = load_certs(&entry.cert_file)?;
    let key = load_key(&entry.key_file)?;
    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(io::Error::other)
}

fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader).collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no certificates found in {}", path.display()),
        ));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no private key found in {}", path.display()),
        )
    })
}
