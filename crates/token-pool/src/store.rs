//! Persistent region documents
//!
//! One JSON document per region at `{dir}/{region}.json`, holding the state
//! counters, the staging pool and the live pool. Every write goes through a
//! temp file + rename, so a document on disk is always either the old or the
//! new version. Keeping the three collections in one document is what makes
//! promotion atomic.
//!
//! Nothing is cached: every call re-reads the document, so each scheduler
//! tick sees the latest state (including `success_count` bumps made by
//! consumers). A tokio Mutex serializes read-modify-write cycles within the
//! process, and an advisory lock on `{dir}/.store.lock` serializes them
//! against other processes sharing the directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Region;
use fs2::FileExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::promotion;
use crate::state::{Lease, RegionDocument, RegionState};

const LOCK_FILE: &str = ".store.lock";

/// Retry interval while another process holds the directory lock.
const LOCK_POLL: Duration = Duration::from_millis(5);

/// Exclusive advisory lock on the store directory. Closing the file on drop
/// releases it.
struct DirLock {
    _file: std::fs::File,
}

/// File-backed store for all regions.
pub struct FileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open the store rooted at `dir`, creating the directory and seeding a
    /// fresh document for every region that has none.
    ///
    /// Fails if the directory cannot be created or an existing document
    /// cannot be parsed. Callers treat this as fatal.
    pub async fn open(dir: impl Into<PathBuf>, regions: &[Region]) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Store(format!("creating store dir {}: {e}", dir.display())))?;

        let store = Self {
            dir,
            lock: Mutex::new(()),
        };

        let _dir_lock = store.lock_dir().await?;
        for region in regions {
            let path = store.path_for(*region);
            if path.exists() {
                // Surface corrupt documents at startup rather than on the first tick
                store.read(*region).await?;
            } else {
                write_atomic(&path, &RegionDocument::new(*region)).await?;
                info!(%region, path = %path.display(), "seeded region state");
            }
        }

        info!(dir = %store.dir.display(), regions = regions.len(), "store opened");
        Ok(store)
    }

    fn path_for(&self, region: Region) -> PathBuf {
        self.dir.join(format!("{}.json", region.slug()))
    }

    /// Take the cross-process lock on the store directory.
    ///
    /// Polls a non-blocking `flock` so a contended lock never parks a runtime
    /// thread. Caller must hold `self.lock`.
    async fn lock_dir(&self) -> Result<DirLock> {
        let path = self.dir.join(LOCK_FILE);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| Error::Store(format!("opening {}: {e}", path.display())))?
            .into_std()
            .await;

        let contended = fs2::lock_contended_error().raw_os_error();
        let mut waited = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(DirLock { _file: file }),
                Err(e) if e.raw_os_error() == contended => {
                    if !waited {
                        debug!(path = %path.display(), "store locked by another process, waiting");
                        waited = true;
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => {
                    return Err(Error::Store(format!("locking {}: {e}", path.display())));
                }
            }
        }
    }

    /// Read the full document for `region`.
    pub async fn load(&self, region: Region) -> Result<RegionDocument> {
        let _guard = self.lock.lock().await;
        self.read(region).await
    }

    pub async fn load_state(&self, region: Region) -> Result<RegionState> {
        Ok(self.load(region).await?.state)
    }

    pub async fn live_len(&self, region: Region) -> Result<usize> {
        Ok(self.load(region).await?.live.len())
    }

    /// Apply `f` to the document under the store lock and persist the result.
    pub async fn mutate<T>(
        &self,
        region: Region,
        f: impl FnOnce(&mut RegionDocument) -> T,
    ) -> Result<T> {
        let _guard = self.lock.lock().await;
        let _dir_lock = self.lock_dir().await?;
        let mut doc = self.read(region).await?;
        let out = f(&mut doc);
        write_atomic(&self.path_for(region), &doc).await?;
        Ok(out)
    }

    /// Apply `f` to the state counters and return the updated state.
    pub async fn update_state(
        &self,
        region: Region,
        f: impl FnOnce(&mut RegionState),
    ) -> Result<RegionState> {
        self.mutate(region, |doc| {
            f(&mut doc.state);
            doc.state.clone()
        })
        .await
    }

    pub async fn clear_staging(&self, region: Region) -> Result<()> {
        self.mutate(region, |doc| doc.staging.clear()).await
    }

    /// Promote fresh staged tokens to the live pool.
    ///
    /// Returns the new live pool size, or `None` when no staged token is
    /// inside `window`. In the `None` case the document is not rewritten.
    pub async fn promote(
        &self,
        region: Region,
        now: u64,
        window: Duration,
    ) -> Result<Option<usize>> {
        let _guard = self.lock.lock().await;
        let _dir_lock = self.lock_dir().await?;
        let mut doc = self.read(region).await?;
        let promoted = promotion::apply(&mut doc, now, window);
        if promoted.is_some() {
            write_atomic(&self.path_for(region), &doc).await?;
        }
        Ok(promoted)
    }

    /// Count one successful token use reported by a consumer.
    pub async fn record_success(&self, region: Region) -> Result<u64> {
        let state = self
            .update_state(region, |s| {
                s.success_count = s.success_count.saturating_add(1)
            })
            .await?;
        Ok(state.success_count)
    }

    /// Compare-and-set claim on a region's refresh pass.
    ///
    /// Succeeds when no lease is held or the held lease has expired. The
    /// holder itself is refused too, so two passes from one process cannot
    /// overlap. Leases live in the document, so a claim left behind by a
    /// crashed process blocks the region only until it expires.
    ///
    /// The compare-and-set runs under the directory lock, so it is atomic
    /// across processes sharing the store.
    pub async fn try_acquire_lease(
        &self,
        region: Region,
        owner: &str,
        now: u64,
        ttl: Duration,
    ) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let _dir_lock = self.lock_dir().await?;
        let mut doc = self.read(region).await?;
        if let Some(lease) = &doc.state.lease {
            if lease.expires_at > now {
                debug!(%region, holder = %lease.owner, "lease held");
                return Ok(false);
            }
        }

        doc.state.lease = Some(Lease {
            owner: owner.to_string(),
            expires_at: now.saturating_add(ttl.as_millis() as u64),
        });
        write_atomic(&self.path_for(region), &doc).await?;
        Ok(true)
    }

    /// Drop `owner`'s lease. A lease held by someone else is left alone.
    pub async fn release_lease(&self, region: Region, owner: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let _dir_lock = self.lock_dir().await?;
        let mut doc = self.read(region).await?;
        if doc.state.lease.as_ref().is_some_and(|l| l.owner == owner) {
            doc.state.lease = None;
            write_atomic(&self.path_for(region), &doc).await?;
        }
        Ok(())
    }

    /// Read a document. Caller must hold `self.lock`.
    async fn read(&self, region: Region) -> Result<RegionDocument> {
        let path = self.path_for(region);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RegionDocument::new(region));
            }
            Err(e) => {
                return Err(Error::Store(format!("reading {}: {e}", path.display())));
            }
        };
        serde_json::from_str(&contents)
            .map_err(|e| Error::Store(format!("parsing {}: {e}", path.display())))
    }
}

/// Write a document atomically via temp file + rename, mode 0600 on unix.
async fn write_atomic(path: &Path, doc: &RegionDocument) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)
        .map_err(|e| Error::Store(format!("serializing {}: {e}", doc.region)))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Store("document path has no parent directory".into()))?;
    let tmp_path = dir.join(format!(".{}.tmp.{}", doc.region.slug(), std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Store(format!("writing temp document: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Store(format!("setting document permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Store(format!("renaming temp document: {e}")))?;

    debug!(path = %path.display(), "persisted region document");
    Ok(())
}
