use std::collections::HashMap;

use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

use super::errors::DecodeError;

/// One certificate of a peer chain, decoded once at the trust boundary so
/// downstream logic operates on guaranteed-present fields.
#[derive(Debug, Clone)]
pub struct ChainCertificate {
    /// Original DER bytes.
    pub raw: Vec<u8>,
    pub subject: String,
    pub issuer: String,
    /// Big-endian serial number with leading zeros stripped, so equality is
    /// value equality regardless of DER padding.
    pub serial: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// SubjectPublicKeyInfo DER, used to verify CRLs this certificate issued.
    pub spki_der: Vec<u8>,
    /// Decoded cRLDistributionPoints extension, `None` when absent.
    pub crl_distribution_points: Option<Vec<DistributionPointEntry>>,
}

/// A single DistributionPoint entry of the cRLDistributionPoints extension.
#[derive(Debug, Clone)]
pub struct DistributionPointEntry {
    /// General names of the `fullName` variant; `None` when the entry has no
    /// distributionPoint or names it relative to the CRL issuer.
    pub full_name: Option<Vec<GeneralNameValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneralNameValue {
    Uri(String),
    Dns(String),
    Other,
}

impl From<&GeneralName<'_>> for GeneralNameValue {
    fn from(name: &GeneralName<'_>) -> Self {
        match name {
            GeneralName::URI(uri) => Self::Uri((*uri).to_string()),
            GeneralName::DNSName(dns) => Self::Dns((*dns).to_string()),
            _ => Self::Other,
        }
    }
}

impl ChainCertificate {
    pub fn from_der(der: &[u8]) -> Result<Self, DecodeError> {
        let (_, cert) = parse_x509_certificate(der)
            .map_err(|e| DecodeError::Certificate(e.to_string()))?;

        let mut crl_distribution_points = None;
        for ext in cert.extensions() {
            if let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() {
                let entries = points
                    .points
                    .iter()
                    .map(|point| DistributionPointEntry {
                        full_name: match point.distribution_point.as_ref() {
                            Some(DistributionPointName::FullName(names)) => {
                                Some(names.iter().map(GeneralNameValue::from).collect())
                            }
                            _ => None,
                        },
                    })
                    .collect();
                crl_distribution_points = Some(entries);
            }
        }

        Ok(Self {
            raw: der.to_vec(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.serial.to_bytes_be(),
            not_before: asn1_time_to_datetime(&cert.validity().not_before)?,
            not_after: asn1_time_to_datetime(&cert.validity().not_after)?,
            spki_der: cert.tbs_certificate.subject_pki.raw.to_vec(),
            crl_distribution_points,
        })
    }

    /// Human-readable identification used in logs and errors.
    pub fn debug_name(&self) -> String {
        format!("{} (serial {})", self.subject, hex::encode(&self.serial))
    }
}

/// An ordered peer certificate chain, leaf first. The issuer of element `i`
/// is element `i + 1`; the terminal element vouches for itself.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    certificates: Vec<ChainCertificate>,
}

impl CertificateChain {
    /// Decodes a DER chain as presented by the TLS layer, leaf first.
    ///
    /// # Panics
    /// Panics when the chain is empty; the TLS layer guarantees at least the
    /// peer's own certificate.
    pub fn from_der_chain(chain: &[impl AsRef<[u8]>]) -> Result<Self, DecodeError> {
        assert!(!chain.is_empty(), "certificate chain must not be empty");
        let certificates = chain
            .iter()
            .map(|der| ChainCertificate::from_der(der.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { certificates })
    }

    pub fn from_certificates(certificates: Vec<ChainCertificate>) -> Self {
        assert!(!certificates.is_empty(), "certificate chain must not be empty");
        Self { certificates }
    }

    pub fn certificates(&self) -> &[ChainCertificate] {
        &self.certificates
    }

    pub fn leaf(&self) -> &ChainCertificate {
        &self.certificates[0]
    }

    /// The issuing certificate of element `index`, `None` for the terminal
    /// element (which is its own issuer).
    pub fn issuer_of(&self, index: usize) -> Option<&ChainCertificate> {
        self.certificates.get(index + 1)
    }
}

/// A decoded CRL. `tbs_raw` keeps the exact DER of the signed body so
/// signature verification never has to re-encode.
#[derive(Debug, Clone)]
pub struct RevocationList {
    pub raw: Vec<u8>,
    pub tbs_raw: Vec<u8>,
    /// Dotted OID of the outer signature algorithm.
    pub signature_algorithm: String,
    pub signature: Vec<u8>,
    pub issuer: String,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    /// Revoked serial number (value-normalized) to revocation date.
    pub revoked: HashMap<Vec<u8>, DateTime<Utc>>,
    /// URIs of the issuingDistributionPoint extension, `None` when absent.
    pub issuing_distribution_point_uris: Option<Vec<String>>,
}

impl RevocationList {
    pub fn from_der(der: &[u8]) -> Result<Self, DecodeError> {
        let (_, crl) =
            parse_x509_crl(der).map_err(|e| DecodeError::RevocationList(e.to_string()))?;

        let mut revoked = HashMap::new();
        for entry in crl.iter_revoked_certificates() {
            revoked.insert(
                entry.user_certificate.to_bytes_be(),
                asn1_time_to_datetime(&entry.revocation_date)?,
            );
        }

        let mut issuing_distribution_point_uris = None;
        for ext in crl.extensions() {
            if let ParsedExtension::IssuingDistributionPoint(idp) = ext.parsed_extension() {
                let uris = match idp.distribution_point.as_ref() {
                    Some(DistributionPointName::FullName(names)) => names
                        .iter()
                        .filter_map(|name| match name {
                            GeneralName::URI(uri) => Some((*uri).to_string()),
                            _ => None,
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                issuing_distribution_point_uris = Some(uris);
            }
        }

        let next_update = match crl.next_update() {
            Some(time) => Some(asn1_time_to_datetime(&time)?),
            None => None,
        };

        Ok(Self {
            raw: der.to_vec(),
            tbs_raw: crl.tbs_cert_list.as_ref().to_vec(),
            signature_algorithm: crl.signature_algorithm.algorithm.to_id_string(),
            signature: crl.signature_value.data.to_vec(),
            issuer: crl.issuer().to_string(),
            this_update: asn1_time_to_datetime(&crl.last_update())?,
            next_update,
            revoked,
            issuing_distribution_point_uris,
        })
    }
}

fn asn1_time_to_datetime(time: &ASN1Time) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::from_timestamp(time.timestamp(), 0).ok_or(DecodeError::Timestamp)
}
