//! TLS connector — establishes the authenticated persistent connection.
//!
//! Client-certificate authentication against the configured authority:
//! the client cert/key pair is loaded from PEM at startup (unloadable
//! credentials are fatal), the trust root is either a custom CA file or
//! the built-in web PKI roots. After the handshake a one-line JSON
//! attach preamble announces the configured channel path, then records
//! flow as CRLF-terminated JSON lines.

use crate::config::ServerSection;
use crate::uplink::slot::UplinkTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Connection factory used by the supervisor's reconnect loop.
///
/// A trait seam so tests can drive the supervisor with a scripted
/// connector instead of a real network.
#[async_trait]
pub trait UplinkConnect: Send + Sync + 'static {
    /// Attempt to establish one fresh connection.
    async fn connect(&self) -> std::io::Result<Box<dyn UplinkTransport>>;
}

/// Established TLS connection; sends one CRLF-terminated record per call.
pub struct TlsTransport {
    stream: TlsStream<TcpStream>,
}

#[async_trait]
impl UplinkTransport for TlsTransport {
    async fn send(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }
}

/// TLS connector with client-certificate authentication.
pub struct TlsUplinkConnector {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    addr: String,
    attach_preamble: Vec<u8>,
}

impl TlsUplinkConnector {
    /// Build the connector from the server configuration section.
    ///
    /// Errors here (unreadable or malformed certificate/key, bad
    /// endpoint hostname) are fatal startup errors.
    pub fn from_config(server: &ServerSection) -> Result<Self> {
        let certs: Vec<CertificateDer<'static>> =
            CertificateDer::pem_file_iter(&server.cert_file)
                .with_context(|| {
                    format!(
                        "failed to open client certificate {}",
                        server.cert_file.display()
                    )
                })?
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| {
                    format!(
                        "failed to parse client certificate {}",
                        server.cert_file.display()
                    )
                })?;

        let key = PrivateKeyDer::from_pem_file(&server.key_file).with_context(|| {
            format!("failed to load client key {}", server.key_file.display())
        })?;

        let mut roots = RootCertStore::empty();
        match &server.ca_file {
            Some(ca_file) => {
                for cert in CertificateDer::pem_file_iter(ca_file).with_context(|| {
                    format!("failed to open trust root {}", ca_file.display())
                })? {
                    let cert = cert.with_context(|| {
                        format!("failed to parse trust root {}", ca_file.display())
                    })?;
                    roots
                        .add(cert)
                        .with_context(|| format!("rejected trust root {}", ca_file.display()))?;
                }
            }
            None => {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .context("client certificate/key pair rejected")?;

        let host = server.host();
        let server_name = ServerName::try_from(host.clone())
            .with_context(|| format!("invalid server hostname {host}"))?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
            addr: server.connect_addr(),
            attach_preamble: attach_preamble(&server.path),
        })
    }
}

#[async_trait]
impl UplinkConnect for TlsUplinkConnector {
    async fn connect(&self) -> std::io::Result<Box<dyn UplinkTransport>> {
        let tcp = TcpStream::connect(&self.addr).await?;
        let stream = self.connector.connect(self.server_name.clone(), tcp).await?;
        let mut transport = TlsTransport { stream };
        // Announce the configured channel path before the first record.
        transport.send(&self.attach_preamble).await?;
        Ok(Box::new(transport))
    }
}

/// One-line JSON frame announcing the channel path on a new connection.
fn attach_preamble(path: &str) -> Vec<u8> {
    let mut line = serde_json::to_vec(&serde_json::json!({ "attach": path }))
        .unwrap_or_else(|_| b"{\"attach\":\"/\"}".to_vec());
    line.extend_from_slice(b"\r\n");
    line
}
