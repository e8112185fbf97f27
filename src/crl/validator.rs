use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, warn};

use super::errors::{CrlValidationError, SignatureError};
use super::fetch::{CrlCacheService, FetchOptions};
use super::model::{CertificateChain, ChainCertificate};
use super::utils::{
    certificate_crl_urls, is_certificate_revoked, is_crl_signature_valid,
    is_issuing_distribution_point_valid, is_short_lived_certificate,
};
use crate::config::{CheckMode, ValidatorConfig};

/// Whether the driver should install the revocation hook at all.
pub fn is_crl_validation_enabled(config: &ValidatorConfig) -> bool {
    config.check_mode != CheckMode::Disabled
}

/// Walks a peer certificate chain and checks each certificate against its
/// issuer's CRL, obtained through the shared cache service.
#[derive(Clone)]
pub struct CrlValidator {
    service: CrlCacheService,
}

impl CrlValidator {
    pub fn new(service: CrlCacheService) -> Self {
        Self { service }
    }

    /// Validates the chain, leaf to root, under the given policy.
    ///
    /// Under `Enabled` the first disqualifying condition aborts the walk.
    /// Under `Advisory` disqualifications are logged and the chain passes,
    /// except for a confirmed revocation which always fails.
    pub async fn validate_chain(
        &self,
        chain: &CertificateChain,
        config: &ValidatorConfig,
    ) -> Result<(), CrlValidationError> {
        if config.check_mode == CheckMode::Disabled {
            return Ok(());
        }

        let options = FetchOptions::from(config);
        let mut visited: HashSet<(String, Vec<u8>)> = HashSet::new();
        let mut advisories = 0usize;

        for (index, certificate) in chain.certificates().iter().enumerate() {
            // Issuer DN plus serial identifies a certificate; a repeat means
            // the chain loops back on itself
            if !visited.insert((certificate.issuer.clone(), certificate.serial.clone())) {
                debug!(
                    certificate = %certificate.debug_name(),
                    "certificate already visited, stopping chain walk"
                );
                break;
            }

            let Some(issuer) = chain.issuer_of(index) else {
                debug!(
                    certificate = %certificate.debug_name(),
                    "terminal certificate vouches for itself, not subject to a CRL check"
                );
                break;
            };

            match self.check_certificate(certificate, issuer, config, options).await {
                Ok(()) => {}
                Err(error) if error.is_revoked() || config.check_mode == CheckMode::Enabled => {
                    return Err(error);
                }
                Err(error) => {
                    warn!(%error, "CRL check failed, connection allowed in advisory mode");
                    advisories += 1;
                }
            }
        }

        if advisories > 0 {
            debug!(advisories, "chain passed with advisory CRL warnings");
        }
        Ok(())
    }

    async fn check_certificate(
        &self,
        certificate: &ChainCertificate,
        issuer: &ChainCertificate,
        config: &ValidatorConfig,
        options: FetchOptions,
    ) -> Result<(), CrlValidationError> {
        let name = certificate.debug_name();
        debug!(certificate = %name, "starting CRL validation");

        if is_short_lived_certificate(certificate) {
            debug!(certificate = %name, "certificate is short-lived, exempt from revocation checks");
            return Ok(());
        }

        let Some(urls) = certificate_crl_urls(certificate) else {
            if config.allow_certificates_without_crl_url {
                debug!(certificate = %name, "certificate has no CRL URL, skipping");
                return Ok(());
            }
            return Err(CrlValidationError::NoCrlUrl { certificate: name });
        };

        // The extension may name several points; the first reachable URL is
        // authoritative, mirrors are not consulted
        let url = urls[0].clone();

        debug!(certificate = %name, %url, "fetching CRL");
        let crl = self
            .service
            .get_crl(&url, options)
            .await
            .map_err(|source| CrlValidationError::FetchFailed {
                certificate: name.clone(),
                url: url.clone(),
                source,
            })?;

        debug!(certificate = %name, %url, "validating issuingDistributionPoint extension");
        if !is_issuing_distribution_point_valid(&crl, &url) {
            return Err(CrlValidationError::IssuingDistributionPointMismatch {
                certificate: name,
                url,
            });
        }

        debug!(certificate = %name, %url, "validating CRL signature");
        match is_crl_signature_valid(&crl, &issuer.spki_der) {
            Ok(true) => {}
            Ok(false) => {
                return Err(CrlValidationError::SignatureInvalid { certificate: name, url });
            }
            Err(SignatureError::UnsupportedAlgorithm(oid)) => {
                return Err(CrlValidationError::UnsupportedSignatureAlgorithm {
                    certificate: name,
                    url,
                    oid,
                });
            }
            Err(SignatureError::RsaPssUnsupported) => {
                return Err(CrlValidationError::NotImplemented {
                    certificate: name,
                    feature: "RSASSA-PSS CRL signature verification".to_string(),
                });
            }
            Err(SignatureError::Crypto(error)) => {
                warn!(certificate = %name, %url, %error, "CRL signature verification errored");
                return Err(CrlValidationError::SignatureInvalid { certificate: name, url });
            }
        }

        debug!(certificate = %name, %url, "validating CRL issuer");
        if crl.issuer != certificate.issuer {
            return Err(CrlValidationError::IssuerMismatch {
                certificate: name,
                url,
                expected: certificate.issuer.clone(),
                actual: crl.issuer.clone(),
            });
        }

        debug!(certificate = %name, %url, "validating CRL nextUpdate");
        if let Some(next_update) = crl.next_update {
            if next_update <= Utc::now() {
                return Err(CrlValidationError::CrlExpired { certificate: name, url });
            }
        }

        debug!(certificate = %name, %url, "checking revocation list membership");
        if is_certificate_revoked(certificate, &crl) {
            return Err(CrlValidationError::CertificateRevoked { certificate: name, url });
        }

        debug!(certificate = %name, "certificate passed CRL validation");
        Ok(())
    }
}
