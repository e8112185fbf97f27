#![allow(dead_code)]

use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, CertifiedIssuer,
    CrlDistributionPoint, CrlIssuingDistributionPoint, DnType, IsCa, KeyIdMethod, KeyPair,
    KeyUsagePurpose, RevocationReason, RevokedCertParams, SerialNumber,
};
use time::OffsetDateTime;

use crl_validator::crl::{CertificateChain, ChainCertificate};

pub const LEAF_CRL_URL: &str = "http://crl.example.com/intermediate.crl";
pub const INTERMEDIATE_CRL_URL: &str = "http://crl.example.com/root.crl";

pub const LEAF_SERIAL: &[u8] = &[
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C,
];
pub const INTERMEDIATE_SERIAL: &[u8] = &[
    0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C,
];

/// Shape of the generated chain.
pub struct PkiOptions {
    pub leaf_crl_url: Option<&'static str>,
    pub intermediate_crl_url: Option<&'static str>,
    /// Overrides the leaf validity period (defaults to rcgen's long-lived
    /// default, which is never short-lived).
    pub leaf_validity: Option<(OffsetDateTime, OffsetDateTime)>,
}

impl Default for PkiOptions {
    fn default() -> Self {
        Self {
            leaf_crl_url: Some(LEAF_CRL_URL),
            intermediate_crl_url: Some(INTERMEDIATE_CRL_URL),
            leaf_validity: None,
        }
    }
}

/// A three-certificate PKI (root, intermediate, leaf) with real keys, so
/// CRLs minted by `crl_der` carry verifiable signatures.
pub struct TestPki {
    pub root: CertifiedIssuer<'static, KeyPair>,
    pub intermediate: CertifiedIssuer<'static, KeyPair>,
    pub leaf_der: Vec<u8>,
    /// PKCS#8 PEM of the leaf's private key, for tests that stand up a TLS
    /// server presenting this chain.
    pub leaf_key_pem: String,
}

impl TestPki {
    /// Chain as the TLS layer would present it: leaf, intermediate, root.
    pub fn chain(&self) -> CertificateChain {
        CertificateChain::from_der_chain(&[
            self.leaf_der.clone(),
            self.intermediate.der().as_ref().to_vec(),
            self.root.der().as_ref().to_vec(),
        ])
        .expect("test chain decodes")
    }

    pub fn leaf_certificate(&self) -> ChainCertificate {
        ChainCertificate::from_der(&self.leaf_der).expect("leaf decodes")
    }

    pub fn intermediate_certificate(&self) -> ChainCertificate {
        ChainCertificate::from_der(self.intermediate.der().as_ref())
            .expect("intermediate decodes")
    }

    pub fn intermediate_spki(&self) -> Vec<u8> {
        self.intermediate_certificate().spki_der
    }
}

pub fn test_pki(options: PkiOptions) -> TestPki {
    crl_validator::telemetry::init_tracing();

    let alg = &rcgen::PKCS_ECDSA_P256_SHA256;
    let ca_key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
    ];

    let root_key = KeyPair::generate_for(alg).expect("root key");
    let mut root_params = CertificateParams::new(Vec::<String>::new()).expect("root params");
    root_params
        .distinguished_name
        .push(DnType::CommonName, "Test Root CA");
    root_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    root_params.key_usages = ca_key_usages.clone();
    let root = CertifiedIssuer::self_signed(root_params, root_key).expect("root");

    let int_key = KeyPair::generate_for(alg).expect("intermediate key");
    let mut int_params = CertificateParams::new(Vec::<String>::new()).expect("intermediate params");
    int_params
        .distinguished_name
        .push(DnType::CommonName, "Test Intermediate CA");
    int_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    int_params.key_usages = ca_key_usages;
    int_params.serial_number = Some(SerialNumber::from_slice(INTERMEDIATE_SERIAL));
    if let Some(url) = options.intermediate_crl_url {
        int_params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: vec![url.to_string()],
        }];
    }
    let intermediate = CertifiedIssuer::signed_by(int_params, int_key, &root).expect("intermediate");

    let leaf_key = KeyPair::generate_for(alg).expect("leaf key");
    let mut leaf_params =
        CertificateParams::new(vec!["db.example.com".to_string()]).expect("leaf params");
    leaf_params
        .distinguished_name
        .push(DnType::CommonName, "db.example.com");
    leaf_params.serial_number = Some(SerialNumber::from_slice(LEAF_SERIAL));
    if let Some(url) = options.leaf_crl_url {
        leaf_params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: vec![url.to_string()],
        }];
    }
    if let Some((not_before, not_after)) = options.leaf_validity {
        leaf_params.not_before = not_before;
        leaf_params.not_after = not_after;
    }
    let leaf = leaf_params.signed_by(&leaf_key, &intermediate).expect("leaf");

    TestPki {
        root,
        intermediate,
        leaf_der: leaf.der().as_ref().to_vec(),
        leaf_key_pem: leaf_key.serialize_pem(),
    }
}

/// Mints a signed CRL. `revoked_serial` lists that serial as revoked;
/// `idp_url` attaches an issuingDistributionPoint naming that URL.
pub fn crl_der(
    issuer: &CertifiedIssuer<'static, KeyPair>,
    revoked_serial: Option<&[u8]>,
    idp_url: Option<&str>,
) -> Vec<u8> {
    crl_der_with_validity(
        issuer,
        revoked_serial,
        idp_url,
        OffsetDateTime::now_utc() + time::Duration::days(5),
    )
}

pub fn crl_der_with_validity(
    issuer: &CertifiedIssuer<'static, KeyPair>,
    revoked_serial: Option<&[u8]>,
    idp_url: Option<&str>,
    next_update: OffsetDateTime,
) -> Vec<u8> {
    let now = OffsetDateTime::now_utc();
    let params = CertificateRevocationListParams {
        this_update: now - time::Duration::days(1),
        next_update,
        crl_number: SerialNumber::from(1234u64),
        issuing_distribution_point: idp_url.map(|url| CrlIssuingDistributionPoint {
            distribution_point: CrlDistributionPoint {
                uris: vec![url.to_string()],
            },
            scope: None,
        }),
        revoked_certs: revoked_serial
            .map(|serial| {
                vec![RevokedCertParams {
                    serial_number: SerialNumber::from_slice(serial),
                    revocation_time: now - time::Duration::days(1),
                    reason_code: Some(RevocationReason::KeyCompromise),
                    invalidity_date: None,
                }]
            })
            .unwrap_or_default(),
        key_identifier_method: KeyIdMethod::Sha256,
    };

    params
        .signed_by(issuer)
        .expect("CRL signs")
        .der()
        .as_ref()
        .to_vec()
}
