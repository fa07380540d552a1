//! HTTPS connector construction.

use crate::config::{TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;

pub type Connector = HttpsConnector<HttpConnector>;

/// The process-wide provider if one is installed, aws-lc-rs otherwise.
fn provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn tls_error(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> HttpError {
    HttpError::Tls(err.into())
}

/// Connector for `roots`, dialing plain HTTP only when `transport` permits it.
///
/// # Errors
///
/// [`HttpError::Tls`] when the OS store yields no usable roots or the
/// provider rejects the protocol versions.
pub fn connector(
    roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<Connector, HttpError> {
    let builder = match roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider())
            .map_err(tls_error)?,
        TlsRootConfig::Native => HttpsConnectorBuilder::new().with_tls_config(native_config()?),
        TlsRootConfig::InsecureSkipVerify => {
            tracing::warn!("server certificate verification is disabled");
            HttpsConnectorBuilder::new().with_tls_config(skip_verify_config()?)
        }
    };

    Ok(match transport {
        TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().build(),
        TransportSecurity::AllowInsecureHttp => {
            builder.https_or_http().enable_all_versions().build()
        }
    })
}

fn native_config() -> Result<ClientConfig, HttpError> {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        tracing::warn!(error = %err, "skipping unreadable native root");
    }

    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(loaded.certs);
    tracing::debug!(added, ignored, "loaded native roots");
    if added == 0 {
        return Err(tls_error("no usable root certificates in the OS store"));
    }

    Ok(ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .with_root_certificates(store)
        .with_no_client_auth())
}

fn skip_verify_config() -> Result<ClientConfig, HttpError> {
    let provider = provider();
    let verifier = Arc::new(TrustEverything {
        provider: Arc::clone(&provider),
    });
    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth())
}

/// Accepts any certificate chain. Handshake signatures are still checked so
/// the session keys belong to whoever presented the certificate.
#[derive(Debug)]
struct TrustEverything {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for TrustEverything {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        let algorithms = &self.provider.signature_verification_algorithms;
        rustls::crypto::verify_tls12_signature(message, cert, dss, algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        let algorithms = &self.provider.signature_verification_algorithms;
        rustls::crypto::verify_tls13_signature(message, cert, dss, algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_skip_verify_accepts_garbage_certificate() {
        let verifier = TrustEverything {
            provider: provider(),
        };
        let cert = CertificateDer::from(vec![0u8; 16]);
        let name = ServerName::try_from("10.0.0.5").unwrap();
        assert!(
            verifier
                .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
                .is_ok()
        );
        assert!(!verifier.supported_verify_schemes().is_empty());
    }

    #[test]
    fn test_connectors_build() {
        connector(TlsRootConfig::WebPki, TransportSecurity::TlsOnly).unwrap();
        connector(
            TlsRootConfig::InsecureSkipVerify,
            TransportSecurity::AllowInsecureHttp,
        )
        .unwrap();
    }
}
