use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, warn};

use super::DISK_CACHE_RETENTION;
use super::model::RevocationList;

/// Filesystem-backed CRL store, shared across processes on the same host.
/// Best-effort only: every failure is logged and treated as a cache miss or
/// no-op, never propagated.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    max_validity: Duration,
}

impl DiskCache {
    pub fn new(dir: PathBuf, max_validity: Duration) -> Self {
        Self { dir, max_validity }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(urlencoding::encode(url).as_ref())
    }

    /// Persists raw DER bytes under the percent-encoded URL.
    pub async fn write(&self, url: &str, raw: &[u8]) {
        if let Err(error) = self.try_write(url, raw).await {
            warn!(%url, %error, "failed to write CRL to disk cache");
        }
    }

    async fn try_write(&self, url: &str, raw: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700)).await?;
        }

        let path = self.path_for(url);
        fs::write(&path, raw).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        debug!(%url, path = %path.display(), "wrote CRL to disk cache");
        Ok(())
    }

    /// Reads and decodes a cached CRL. Absent, stale, expired, and corrupt
    /// files all report a miss; validity is re-derived from the content, the
    /// file mtime only bounds the time since download.
    pub async fn read(&self, url: &str) -> Option<Arc<RevocationList>> {
        let path = self.path_for(url);

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(%url, "CRL not present in disk cache");
                return None;
            }
            Err(error) => {
                debug!(%url, %error, "failed to stat cached CRL");
                return None;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .unwrap_or_default();
        if age > self.max_validity {
            debug!(%url, "cached CRL is older than the cache validity window");
            return None;
        }

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(error) => {
                debug!(%url, %error, "failed to read cached CRL");
                return None;
            }
        };

        let crl = match RevocationList::from_der(&raw) {
            Ok(crl) => crl,
            Err(error) => {
                debug!(%url, %error, "cached CRL failed to decode, treating as a miss");
                return None;
            }
        };

        if let Some(next_update) = crl.next_update {
            if next_update <= Utc::now() {
                debug!(%url, "cached CRL nextUpdate has passed");
                return None;
            }
        }

        debug!(%url, "returning CRL from disk cache");
        Some(Arc::new(crl))
    }

    /// Deletes files whose mtime is older than the retention window,
    /// regardless of CRL validity. Files are intentionally kept past expiry
    /// so recently-served CRLs remain available for inspection.
    pub async fn sweep(&self) {
        self.sweep_older_than(DISK_CACHE_RETENTION).await;
    }

    async fn sweep_older_than(&self, retention: Duration) {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return,
            Err(error) => {
                warn!(%error, "failed to enumerate CRL disk cache");
                return;
            }
        };

        let now = SystemTime::now();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "failed to enumerate CRL disk cache");
                    break;
                }
            };

            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let stale = metadata
                .modified()
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .is_some_and(|age| age > retention);
            if stale {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => debug!(path = %entry.path().display(), "removed stale cached CRL"),
                    Err(error) => {
                        warn!(path = %entry.path().display(), %error, "failed to remove stale cached CRL");
                    }
                }
            }
        }
    }
}
