//! TLS setup for the listener and the upstream HTTP clients

use crate::infrastructure::forge::{UpstreamHttp, USER_AGENT};
use rustls::ServerConfig;
use rustls_pemfile::certs;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tls setup failed: {reason}")]
    Setup { reason: String },

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })
}

/// Load a rustls server config from PEM encoded certificate and key files.
///
/// The key may live in the certificate file; the caller passes the same path
/// for both in that case.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig, TlsError> {
    let mut cert_reader = open(cert_path)?;
    let mut cert_chain = Vec::new();
    for cert in certs(&mut cert_reader) {
        cert_chain.push(cert.map_err(|e| TlsError::Setup {
            reason: format!("failed to parse certificate: {e}"),
        })?);
    }
    if cert_chain.is_empty() {
        return Err(TlsError::Setup {
            reason: format!("no certificate found in {}", cert_path.display()),
        });
    }

    let mut key_reader = open(key_path)?;
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| TlsError::Setup {
            reason: format!("failed to parse private key: {e}"),
        })?
        .ok_or_else(|| TlsError::Setup {
            reason: format!("no private key found in {}", key_path.display()),
        })?;

    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| TlsError::Setup {
            reason: format!("failed to create tls config: {e}"),
        })
}

fn client_builder(ca_path: Option<&Path>) -> Result<reqwest::ClientBuilder, TlsError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10));
    if let Some(path) = ca_path {
        let pem = std::fs::read(path).map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let roots = reqwest::Certificate::from_pem_bundle(&pem)?;
        debug!(count = roots.len(), ca = %path.display(), "loaded upstream CA certificates");
        for root in roots {
            builder = builder.add_root_certificate(root);
        }
    }
    Ok(builder)
}

/// Build the shared upstream clients, optionally trusting an extra CA bundle
pub fn build_upstream_http(ca_path: Option<&Path>) -> Result<UpstreamHttp, TlsError> {
    let client = client_builder(ca_path)?.build()?;
    let no_redirect = client_builder(ca_path)?
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    Ok(UpstreamHttp {
        client,
        no_redirect,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cert_file_is_an_io_error() {
        let missing = Path::new("/nonexistent/server.pem");
        let err = load_server_config(missing, missing).unwrap_err();
        assert!(matches!(err, TlsError::Io { .. }));
    }

    #[test]
    fn garbage_pem_has_no_certificates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bogus.pem");
        std::fs::write(&path, "not a certificate").unwrap();
        let err = load_server_config(&path, &path).unwrap_err();
        assert!(matches!(err, TlsError::Setup { .. }));
    }

    #[test]
    fn clients_build_without_a_ca_bundle() {
        assert!(build_upstream_http(None).is_ok());
    }
}
