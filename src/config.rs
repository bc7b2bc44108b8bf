//! Tracker configuration loaded once at startup from a TOML file.
//!
//! The configuration is an immutable value: `main` loads it, derives the
//! pieces each component needs, and hands them out at construction time.
//! An unreadable or unparsable file is a fatal startup error — the
//! process refuses to start tracking without it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default TLS port when the endpoint omits one.
const DEFAULT_UPLINK_PORT: u16 = 443;

/// Root configuration for one tracker deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    pub client: ClientSection,
    pub server: ServerSection,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub storage: StorageSection,
    /// Only needed for the one-shot `setup` subcommand.
    #[serde(default)]
    pub bootstrap: Option<BootstrapSection>,
}

/// Client identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    /// Identifier reported in every telemetry record.
    pub id: String,
}

/// Collector endpoint and the credentials used to authenticate to it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Collector endpoint, `host[:port]`. IPv6 literals use the bracket
    /// form (`[::1]:9010`); a `scheme://` prefix from older configs is
    /// tolerated and stripped.
    pub endpoint: String,
    /// Channel path announced to the collector after connecting.
    #[serde(default = "default_path")]
    pub path: String,
    /// Client certificate chain (PEM).
    pub cert_file: PathBuf,
    /// Client private key (PEM).
    pub key_file: PathBuf,
    /// Custom trust root (PEM). When unset the built-in web PKI roots
    /// are used.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
}

impl ServerSection {
    /// Endpoint with any scheme prefix and path component stripped.
    fn authority(&self) -> &str {
        let rest = match self.endpoint.find("://") {
            Some(idx) => &self.endpoint[idx + 3..],
            None => &self.endpoint,
        };
        rest.split('/').next().unwrap_or(rest)
    }

    /// Split the authority into host and optional port. Bracketed IPv6
    /// literals lose their brackets; a bare IPv6 literal (more than one
    /// colon, no brackets) is all host.
    fn split_authority(&self) -> (&str, Option<&str>) {
        let authority = self.authority();
        if let Some(rest) = authority.strip_prefix('[') {
            if let Some((host, tail)) = rest.split_once(']') {
                let port = tail.strip_prefix(':').filter(|p| is_port(p));
                return (host, port);
            }
        }
        match authority.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') && is_port(port) => (host, Some(port)),
            _ => (authority, None),
        }
    }

    /// Hostname used for SNI and certificate validation.
    pub fn host(&self) -> String {
        self.split_authority().0.to_string()
    }

    /// `host:port` address the TCP connection targets. IPv6 hosts get
    /// re-bracketed for the socket address form.
    pub fn connect_addr(&self) -> String {
        let (host, port) = self.split_authority();
        let bracketed = host.contains(':');
        match (bracketed, port) {
            (false, Some(port)) => format!("{host}:{port}"),
            (false, None) => format!("{host}:{DEFAULT_UPLINK_PORT}"),
            (true, Some(port)) => format!("[{host}]:{port}"),
            (true, None) => format!("[{host}]:{DEFAULT_UPLINK_PORT}"),
        }
    }
}

fn is_port(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn default_path() -> String {
    "/tracker".to_string()
}

/// Where position fixes come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// gpsd address (`host:port`).
    pub gpsd_addr: String,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            gpsd_addr: "127.0.0.1:2947".to_string(),
        }
    }
}

/// Local persisted state paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Snapshot file holding only the most recent record.
    pub snapshot_file: PathBuf,
    /// Directory for spooled records awaiting resend.
    pub spool_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            snapshot_file: PathBuf::from("positions/last.json"),
            spool_dir: PathBuf::from("spool"),
        }
    }
}

/// One-shot provisioning parameters (`setup` subcommand).
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapSection {
    /// Provisioning endpoint the bootstrap code is exchanged against.
    pub url: String,
    /// Single-use bootstrap code issued by the operator.
    pub code: String,
    /// Contact email registered with the collector.
    pub email: String,
}

impl TrackerConfig {
    /// Load and parse the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}
