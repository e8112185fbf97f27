mod disk_cache;
mod errors;
mod fetch;
mod memory_cache;
mod model;
mod utils;
mod validator;

pub use disk_cache::DiskCache;
pub use errors::{CrlValidationError, DecodeError, FetchError, SignatureError};
pub use fetch::{CrlCacheService, CrlTransport, FetchOptions, FetchOutcome, HttpTransport};
pub use memory_cache::MemoryCache;
pub use model::{
    CertificateChain, ChainCertificate, DistributionPointEntry, GeneralNameValue, RevocationList,
};
pub use utils::{
    certificate_crl_urls, is_certificate_revoked, is_crl_signature_valid,
    is_issuing_distribution_point_valid, is_short_lived_certificate,
};
pub use validator::{CrlValidator, is_crl_validation_enabled};

use std::time::Duration;

/// How often the cache sweepers run.
pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Cached files are kept well past CRL expiry so recently served CRLs remain
/// available for post-incident inspection.
pub(crate) const DISK_CACHE_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
