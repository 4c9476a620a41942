//! Channel construction
//!
//! Verified TLS goes through tonic's `ClientTlsConfig`. Disabling server
//! certificate verification is not expressible there, so the insecure
//! mode performs its own rustls handshake and hands tonic a pre-connected
//! transport through a custom connector.

use std::sync::Arc;

use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig as RustlsConfig, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Uri};
use tower::service_fn;
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::Result;

/// Establish the channel described by `config`.
pub(crate) async fn connect(config: &ClientConfig) -> Result<Channel> {
    if config.tls.enabled && config.tls.danger_accept_invalid_certs {
        connect_unverified(config, &config.host, config.port).await
    } else {
        connect_verified(config, &config.url()).await
    }
}

/// Dial an alternate endpoint location with the client's security settings.
pub(crate) async fn connect_to(config: &ClientConfig, location: &str) -> Result<Channel> {
    let url = normalize_location(location, config.tls.enabled)?;
    if config.tls.enabled && config.tls.danger_accept_invalid_certs {
        let uri: Uri = url.parse().map_err(ClientError::connection)?;
        let host = uri
            .host()
            .ok_or_else(|| ClientError::Connection(format!("location has no host: {location}")))?
            .to_string();
        let port = uri.port_u16().unwrap_or(config.port);
        connect_unverified(config, &host, port).await
    } else {
        connect_verified(config, &url).await
    }
}

/// Map Flight location schemes onto the URL forms tonic accepts.
fn normalize_location(location: &str, tls: bool) -> Result<String> {
    let url = if let Some(rest) = location.strip_prefix("grpc+tls://") {
        format!("https://{rest}")
    } else if let Some(rest) = location.strip_prefix("grpc+tcp://") {
        format!("http://{rest}")
    } else if let Some(rest) = location.strip_prefix("grpc://") {
        let scheme = if tls { "https" } else { "http" };
        format!("{scheme}://{rest}")
    } else if location.starts_with("http://") || location.starts_with("https://") {
        location.to_string()
    } else {
        return Err(ClientError::Connection(format!(
            "unsupported location scheme: {location}"
        )));
    };
    Ok(url)
}

async fn connect_verified(config: &ClientConfig, url: &str) -> Result<Channel> {
    let mut endpoint = Endpoint::from_shared(url.to_string()).map_err(ClientError::connection)?;

    if let Some(timeout) = config.connect_timeout {
        endpoint = endpoint.connect_timeout(timeout);
    }

    if config.tls.enabled {
        let mut tls = ClientTlsConfig::new().with_native_roots();
        if let Some(path) = &config.tls.ca_cert_path {
            let pem = std::fs::read(path).map_err(ClientError::connection)?;
            tls = tls.ca_certificate(Certificate::from_pem(pem));
        }
        if let Some(domain) = &config.tls.domain_override {
            tls = tls.domain_name(domain.clone());
        }
        endpoint = endpoint.tls_config(tls).map_err(ClientError::connection)?;
    }

    endpoint.connect().await.map_err(ClientError::connection)
}

async fn connect_unverified(config: &ClientConfig, host: &str, port: u16) -> Result<Channel> {
    warn!("TLS certificate verification disabled for {host}:{port}");

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls = RustlsConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(ClientError::connection)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(DisabledVerification(provider)))
        .with_no_client_auth();
    // gRPC requires HTTP/2 on the wire.
    tls.alpn_protocols = vec![b"h2".to_vec()];

    let domain = config
        .tls
        .domain_override
        .clone()
        .unwrap_or_else(|| host.to_string());
    let server_name = ServerName::try_from(domain).map_err(ClientError::connection)?;

    let connector = TlsConnector::from(Arc::new(tls));
    let authority = format!("{host}:{port}");
    let connect_timeout = config.connect_timeout;

    // The custom connector below performs the TLS handshake itself, so the
    // endpoint URI must use the `http` scheme: tonic rejects an `https` URI
    // with "Connecting to HTTPS without TLS enabled" unless it owns the TLS
    // config, which by design it does not in the insecure mode.
    let endpoint =
        Endpoint::from_shared(format!("http://{authority}")).map_err(ClientError::connection)?;

    let dial = service_fn(move |_: Uri| {
        let connector = connector.clone();
        let server_name = server_name.clone();
        let authority = authority.clone();
        async move {
            let tcp = match connect_timeout {
                Some(limit) => tokio::time::timeout(limit, TcpStream::connect(&authority))
                    .await
                    .map_err(|_| {
                        std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
                    })??,
                None => TcpStream::connect(&authority).await?,
            };
            let stream = connector.connect(server_name, tcp).await?;
            Ok::<_, std::io::Error>(TokioIo::new(stream))
        }
    });

    endpoint
        .connect_with_connector(dial)
        .await
        .map_err(ClientError::connection)
}

/// Accepts any server certificate. Signatures are still checked so the
/// handshake itself stays well-formed.
#[derive(Debug)]
struct DisabledVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for DisabledVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
