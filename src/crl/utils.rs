use chrono::{DateTime, TimeZone, Utc};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Verifier;
use tracing::debug;

use super::errors::SignatureError;
use super::model::{ChainCertificate, GeneralNameValue, RevocationList};

const SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
const SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
const SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";
const RSASSA_PSS: &str = "1.2.840.113549.1.1.10";
const ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
const ECDSA_WITH_SHA384: &str = "1.2.840.10045.4.3.3";
const ECDSA_WITH_SHA512: &str = "1.2.840.10045.4.3.4";

/// One HTTP URL per usable distribution point, in extension order. `None`
/// when the certificate has no cRLDistributionPoints extension or no entry
/// carries an HTTP URI.
pub fn certificate_crl_urls(certificate: &ChainCertificate) -> Option<Vec<String>> {
    let Some(points) = certificate.crl_distribution_points.as_ref() else {
        debug!(
            certificate = %certificate.debug_name(),
            "certificate has no cRLDistributionPoints extension"
        );
        return None;
    };

    let mut urls = Vec::new();
    for entry in points {
        let Some(names) = entry.full_name.as_ref() else {
            debug!("skipping distribution point entry without a fullName");
            continue;
        };
        for name in names {
            match name {
                // RFC 5280 allows several HTTP URIs per point; only the
                // first is used, mirrors are not treated as redundancy
                GeneralNameValue::Uri(uri) if uri.starts_with("http") => {
                    urls.push(uri.clone());
                    break;
                }
                _ => debug!("skipping distribution point name without an HTTP URI"),
            }
        }
    }

    if urls.is_empty() { None } else { Some(urls) }
}

// https://cabforum.org/working-groups/server/baseline-requirements/requirements/
// See the Short-lived Subscriber Certificate section
pub fn is_short_lived_certificate(certificate: &ChainCertificate) -> bool {
    // The allowed period shrinks from 10 to 7 days on March 15, 2026; one
    // minute of slack absorbs the inclusive notBefore/notAfter boundaries
    let maximum_validity_period = if certificate.not_before < short_lived_pivot() {
        chrono::Duration::days(10) + chrono::Duration::minutes(1)
    } else {
        chrono::Duration::days(7) + chrono::Duration::minutes(1)
    };

    certificate.not_after - certificate.not_before <= maximum_validity_period
}

fn short_lived_pivot() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap()
}

/// Verifies the CRL signature over its signed body with the issuer's public
/// key. An unrecognized signature algorithm is an error, never a silent
/// pass; RSASSA-PSS is rejected explicitly rather than guessed at.
pub fn is_crl_signature_valid(
    crl: &RevocationList,
    issuer_spki_der: &[u8],
) -> Result<bool, SignatureError> {
    let digest = signature_digest(&crl.signature_algorithm)?;
    let public_key = PKey::public_key_from_der(issuer_spki_der)?;
    let mut verifier = Verifier::new(digest, &public_key)?;
    verifier.update(&crl.tbs_raw)?;
    Ok(verifier.verify(&crl.signature)?)
}

fn signature_digest(oid: &str) -> Result<MessageDigest, SignatureError> {
    match oid {
        SHA256_WITH_RSA | ECDSA_WITH_SHA256 => Ok(MessageDigest::sha256()),
        SHA384_WITH_RSA | ECDSA_WITH_SHA384 => Ok(MessageDigest::sha384()),
        SHA512_WITH_RSA | ECDSA_WITH_SHA512 => Ok(MessageDigest::sha512()),
        RSASSA_PSS => Err(SignatureError::RsaPssUnsupported),
        other => Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// True iff the certificate's serial number equals, by value, a serial in
/// the CRL's revoked list.
pub fn is_certificate_revoked(certificate: &ChainCertificate, crl: &RevocationList) -> bool {
    crl.revoked.contains_key(&certificate.serial)
}

/// A CRL without an issuingDistributionPoint extension is unconstrained.
/// When the extension is present, the CRL only vouches for the distribution
/// point it was fetched from.
pub fn is_issuing_distribution_point_valid(crl: &RevocationList, expected_url: &str) -> bool {
    match crl.issuing_distribution_point_uris.as_ref() {
        Some(uris) => uris.iter().any(|uri| uri == expected_url),
        None => true,
    }
}
