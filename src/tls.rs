use std::pin::Pin;

use openssl::ssl::{SslConnector, SslRef};
use openssl::x509::X509Ref;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_openssl::SslStream;
use tracing::{debug, warn};

use crate::config::ValidatorConfig;
use crate::crl::{
    CertificateChain, CrlCacheService, CrlValidationError, CrlValidator, DecodeError,
    is_crl_validation_enabled,
};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("TLS configuration error: {0}")]
    Configuration(#[from] openssl::error::ErrorStack),

    #[error("TLS handshake failed: {0}")]
    Handshake(openssl::ssl::Error),

    #[error("peer did not present a certificate chain")]
    MissingPeerChain,

    #[error("failed to decode peer certificate chain: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] CrlValidationError),
}

/// A client-side TLS connector that runs CRL validation against the peer
/// chain immediately after the handshake. The stream is only handed back
/// once the verdict is known, so no application data can flow over a
/// connection that is about to be rejected.
#[derive(Clone)]
pub struct CrlConnector {
    connector: SslConnector,
    validator: CrlValidator,
    config: ValidatorConfig,
}

impl CrlConnector {
    pub fn new(
        connector: SslConnector,
        service: CrlCacheService,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            connector,
            validator: CrlValidator::new(service),
            config,
        }
    }

    /// Performs the TLS handshake over `stream` and validates the peer
    /// chain. On a disqualified chain the connection is shut down and the
    /// validation error surfaces to the caller.
    pub async fn connect<S>(&self, domain: &str, stream: S) -> Result<SslStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let ssl = self.connector.configure()?.into_ssl(domain)?;
        let mut stream = SslStream::new(ssl, stream)?;
        Pin::new(&mut stream)
            .connect()
            .await
            .map_err(TlsError::Handshake)?;

        if !is_crl_validation_enabled(&self.config) {
            return Ok(stream);
        }

        let result = self.validate_peer(stream.ssl()).await;
        match result {
            Ok(()) => Ok(stream),
            Err(error) => {
                warn!(%domain, %error, "destroying TLS connection after failed CRL validation");
                let _ = stream.shutdown().await;
                Err(error)
            }
        }
    }

    async fn validate_peer(&self, ssl: &SslRef) -> Result<(), TlsError> {
        let chain = peer_chain_der(ssl)?;
        debug!(certificates = chain.len(), "validating peer chain revocation status");
        let chain = CertificateChain::from_der_chain(&chain)?;
        self.validator.validate_chain(&chain, &self.config).await?;
        Ok(())
    }
}

/// The verified chain includes the trust-store root; fall back to the chain
/// the peer presented when verification kept no copy.
fn peer_chain_der(ssl: &SslRef) -> Result<Vec<Vec<u8>>, TlsError> {
    let chain = ssl
        .verified_chain()
        .or_else(|| ssl.peer_cert_chain())
        .ok_or(TlsError::MissingPeerChain)?;
    if chain.is_empty() {
        return Err(TlsError::MissingPeerChain);
    }
    chain
        .iter()
        .map(|cert: &X509Ref| cert.to_der().map_err(TlsError::from))
        .collect()
}
