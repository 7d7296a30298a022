use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

use crate::domain::{AsyncStream, ProxyError, Result};

/// Client TLS connector trusting the bundled web PKI roots, or anything at
/// all when `accept_invalid_certs` is set.
pub fn connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Config(format!("TLS setup failed: {}", e)))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier(provider)))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Wraps `stream` in TLS toward `host`.
pub async fn wrap(connector: &TlsConnector, host: &str, stream: Box<dyn AsyncStream>) -> Result<Box<dyn AsyncStream>> {
    let name = ServerName::try_from(host.to_string())
        .map_err(|e| ProxyError::InvalidInput(format!("Invalid TLS server name {}: {}", host, e)))?;
    let tls = connector
        .connect(name, stream)
        .await
        .map_err(|e| ProxyError::Io(format!("TLS handshake with {} failed: {}", host, e)))?;
    Ok(Box::new(tls))
}

#[derive(Debug)]
struct NoVerifier(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerifier {
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
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectors_build() {
        assert!(connector(false).is_ok());
        assert!(connector(true).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_server_name() {
        let tls = connector(false).unwrap();
        let (client, _server) = tokio::io::duplex(64);
        let err = wrap(&tls, "not a host name", Box::new(client)).await.err().unwrap();
        assert!(matches!(err, ProxyError::InvalidInput(_)));
    }
}
