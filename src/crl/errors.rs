use thiserror::Error;

/// A disqualifying condition found while checking one certificate of the
/// peer chain. Every variant names the offending certificate so callers can
/// render a diagnostic without re-walking the chain.
#[derive(Debug, Error)]
pub enum CrlValidationError {
    #[error(
        "certificate {certificate} does not have a CRL HTTP URL; \
         allow_certificates_without_crl_url permits such certificates"
    )]
    NoCrlUrl { certificate: String },

    #[error("failed to obtain CRL {url} for certificate {certificate}: {source}")]
    FetchFailed {
        certificate: String,
        url: String,
        #[source]
        source: FetchError,
    },

    #[error(
        "CRL {url} carries an issuingDistributionPoint extension that does not cover \
         the distribution point it was fetched from"
    )]
    IssuingDistributionPointMismatch { certificate: String, url: String },

    #[error("CRL {url} is signed with unsupported algorithm {oid}")]
    UnsupportedSignatureAlgorithm {
        certificate: String,
        url: String,
        oid: String,
    },

    #[error("{feature} support is not implemented")]
    NotImplemented {
        certificate: String,
        feature: String,
    },

    #[error("CRL {url} signature is invalid; expected a signature by the issuer of {certificate}")]
    SignatureInvalid { certificate: String, url: String },

    #[error("CRL {url} issuer is invalid; expected {expected} but got {actual}")]
    IssuerMismatch {
        certificate: String,
        url: String,
        expected: String,
        actual: String,
    },

    #[error("CRL {url} nextUpdate has passed")]
    CrlExpired { certificate: String, url: String },

    #[error("certificate {certificate} is revoked in CRL {url}")]
    CertificateRevoked { certificate: String, url: String },
}

impl CrlValidationError {
    /// Debug name of the certificate this error was raised for.
    pub fn certificate(&self) -> &str {
        match self {
            Self::NoCrlUrl { certificate }
            | Self::FetchFailed { certificate, .. }
            | Self::IssuingDistributionPointMismatch { certificate, .. }
            | Self::UnsupportedSignatureAlgorithm { certificate, .. }
            | Self::NotImplemented { certificate, .. }
            | Self::SignatureInvalid { certificate, .. }
            | Self::IssuerMismatch { certificate, .. }
            | Self::CrlExpired { certificate, .. }
            | Self::CertificateRevoked { certificate, .. } => certificate,
        }
    }

    /// A confirmed revocation is never downgraded to an advisory warning.
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::CertificateRevoked { .. })
    }
}

/// Failure to produce a decoded CRL for a URL. Cloneable so a single network
/// outcome can fan out to every caller coalesced onto the same fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("CRL endpoint returned HTTP status {0}")]
    Status(u16),

    #[error("CRL download timed out after {0} ms")]
    Timeout(u64),

    #[error("downloaded CRL failed to decode: {0}")]
    Decode(String),

    #[error("coalesced CRL fetch was abandoned before completing")]
    Canceled,
}

/// Failure to decode a DER structure at the trust boundary.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse X.509 certificate: {0}")]
    Certificate(String),

    #[error("failed to parse CRL: {0}")]
    RevocationList(String),

    #[error("timestamp in DER structure is out of range")]
    Timestamp,
}

/// Errors raised while verifying a CRL signature, distinct from an invalid
/// signature (which is an ordinary `false`).
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("unsupported CRL signature algorithm {0}")]
    UnsupportedAlgorithm(String),

    #[error("RSASSA-PSS CRL signatures are not supported")]
    RsaPssUnsupported,

    #[error(transparent)]
    Crypto(#[from] openssl::error::ErrorStack),
}
