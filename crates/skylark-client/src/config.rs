//! Client configuration types
//!
//! Connection target, TLS settings, and query submission mode. A
//! [`ClientConfig`] is immutable once the client is constructed; changing
//! settings means building a new client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a SQL statement is submitted to the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    /// Encode the SQL text verbatim as a ticket and fetch it with one `DoGet`
    #[default]
    DirectTicket,
    /// Plan with `GetFlightInfo` first, then fetch every returned endpoint
    PlannedQuery,
}

/// TLS settings for the client channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Enable TLS on the channel
    pub enabled: bool,
    /// PEM CA certificate trusted in addition to the system roots
    pub ca_cert_path: Option<String>,
    /// Override the domain used for SNI and certificate validation
    pub domain_override: Option<String>,
    /// Skip server certificate verification. Stays off unless explicitly
    /// requested; only meant for self-signed test servers.
    pub danger_accept_invalid_certs: bool,
}

/// Configuration for a FlightSQL client connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// TLS settings
    pub tls: TlsSettings,
    /// Submission mode used by `execute`
    pub mode: QueryMode,
    /// Timeout for establishing the channel
    pub connect_timeout: Option<Duration>,
    /// Deadline for a whole execute call, including stream draining
    pub query_deadline: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 32010,
            tls: TlsSettings::default(),
            mode: QueryMode::default(),
            connect_timeout: Some(Duration::from_secs(5)),
            query_deadline: None,
        }
    }
}

impl ClientConfig {
    /// Create a config for the given host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Create a config for a local server
    pub fn local(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }

    /// Set the submission mode
    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the TLS settings
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }

    /// Set the channel establishment timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the per-query deadline
    pub fn with_query_deadline(mut self, deadline: Duration) -> Self {
        self.query_deadline = Some(deadline);
        self
    }

    /// Get the address string (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the full channel URL
    pub fn url(&self) -> String {
        let scheme = if self.tls.enabled { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Domain presented for SNI and certificate validation
    pub fn tls_domain(&self) -> &str {
        self.tls.domain_override.as_deref().unwrap_or(&self.host)
    }
}
