//! Directory watcher (C11): polls a configured directory for stable,
//! non-ignored files and enqueues them through the [`Processor`].
//!
//! Unlike the teacher's event-driven `folder_watcher` (built on `notify` to
//! react to completed NZB downloads), this watcher polls: it is watching
//! for files that are *still being written* by some other process (a
//! download client, a copy job) and must prove a file has stopped changing
//! before handing it to the posting pipeline. A stability gate replaces the
//! event stream.

use crate::config::WatcherConfig;
use crate::error::{Error, Result};
use crate::processor::Processor;
use crate::types::Priority;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sentinel prefix marking a folder pseudo-entry, mirroring
/// [`crate::processor`]'s `FOLDER_PREFIX`.
const FOLDER_PREFIX: &str = "FOLDER:";

/// Minimum time a file's `mtime` must be in the past to be considered stable.
const STABILITY_AGE: Duration = Duration::from_secs(2);

/// How long a cache entry survives without being re-observed.
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct CacheEntry {
    size: u64,
    last_seen: Instant,
}

/// Polls `watch_dir` at `check_interval`, enqueuing stable files (or, in
/// `single_nzb_per_folder` mode, stable folders) that the queue doesn't
/// already know about.
pub struct Watcher {
    config: WatcherConfig,
    processor: Arc<Processor>,
    ignore: GlobSet,
    cache: HashMap<PathBuf, CacheEntry>,
}

impl Watcher {
    /// Build a watcher bound to `processor`, compiling `ignore_patterns`
    /// into a [`GlobSet`] up front so a malformed pattern fails fast.
    pub fn new(config: WatcherConfig, processor: Arc<Processor>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| Error::ConfigInvalid {
                message: format!("invalid watcher ignore pattern {pattern:?}: {e}"),
                key: Some("watcher.ignore_patterns".into()),
            })?;
            builder.add(glob);
        }
        let ignore = builder.build().map_err(|e| Error::ConfigInvalid {
            message: format!("failed to compile watcher ignore patterns: {e}"),
            key: Some("watcher.ignore_patterns".into()),
        })?;

        Ok(Self {
            config,
            processor,
            ignore,
            cache: HashMap::new(),
        })
    }

    /// Run the poll loop until `cancel` fires. Each tick calls
    /// [`Watcher::scan_once`]; a scan that errors (e.g. the watch directory
    /// was removed) is logged and the loop keeps ticking rather than exiting.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        info!(dir = %self.config.watch_dir.display(), "directory watcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.scan_once().await {
                        warn!(error = %e, "watcher scan failed");
                    }
                }
            }
        }
        info!("directory watcher stopped");
    }

    /// One poll iteration: age the stability cache, honor the schedule
    /// window, then dispatch to folder-mode or per-file scanning.
    pub async fn scan_once(&mut self) -> Result<()> {
        self.age_out_cache();

        if let Some(schedule) = &self.config.ignore_schedule {
            let now = chrono::Local::now().time();
            if !schedule.contains(now) {
                debug!("outside watch schedule window, skipping scan");
                return Ok(());
            }
        }

        if self.config.single_nzb_per_folder {
            self.scan_folders().await
        } else {
            self.scan_files().await
        }
    }

    fn age_out_cache(&mut self) {
        let now = Instant::now();
        self.cache
            .retain(|_, entry| now.duration_since(entry.last_seen) < CACHE_TTL);
    }

    async fn scan_files(&mut self) -> Result<()> {
        let mut seen_ids: HashSet<FileIdentity> = HashSet::new();
        let mut entries = tokio::fs::read_dir(&self.config.watch_dir)
            .await
            .map_err(Error::Io)?;

        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
            let is_symlink = entry
                .file_type()
                .await
                .map(|t| t.is_symlink())
                .unwrap_or(false);
            if is_symlink && !self.config.follow_symlinks {
                continue;
            }
            candidates.push(entry.path());
        }

        for path in candidates {
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            if self.config.follow_symlinks {
                let id = FileIdentity::of(&metadata);
                if !seen_ids.insert(id) {
                    continue;
                }
            }
            if self.should_ignore(&path) {
                continue;
            }
            if let Some(candidate) = self.check_stability(&path, &metadata) {
                self.enqueue_file(path, candidate.size).await;
            }
        }
        Ok(())
    }

    async fn scan_folders(&mut self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.config.watch_dir)
            .await
            .map_err(Error::Io)?;

        let mut folders = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
            let is_symlink = entry
                .file_type()
                .await
                .map(|t| t.is_symlink())
                .unwrap_or(false);
            if is_symlink && !self.config.follow_symlinks {
                continue;
            }
            let Ok(metadata) = tokio::fs::metadata(entry.path()).await else {
                continue;
            };
            if metadata.is_dir() {
                folders.push(entry.path());
            }
        }

        for dir in folders {
            let Some((total_size, newest_mtime)) = fold_contents(&dir) else {
                continue;
            };
            if total_size == 0 {
                continue;
            }
            if self.should_ignore(&dir) {
                continue;
            }
            if !self.is_aged(newest_mtime) {
                self.remember(dir.clone(), total_size);
                continue;
            }
            let stable = self
                .cache
                .get(&dir)
                .is_some_and(|entry| entry.size == total_size);
            self.remember(dir.clone(), total_size);
            if !stable {
                continue;
            }

            let pseudo_path = PathBuf::from(format!("{FOLDER_PREFIX}{}", dir.display()));
            if self.processor.is_path_being_processed(&pseudo_path).await {
                continue;
            }
            match self
                .processor
                .add_file(pseudo_path.clone(), total_size, Priority::Normal)
                .await
            {
                Ok(id) => info!(job_id = %id, folder = %dir.display(), "watcher enqueued folder"),
                Err(e) => warn!(folder = %dir.display(), error = %e, "watcher failed to enqueue folder"),
            }
        }
        Ok(())
    }

    fn should_ignore(&self, path: &Path) -> bool {
        if self.ignore.is_match(path) {
            return true;
        }
        if let Some(name) = path.file_name() {
            if self.ignore.is_match(Path::new(name)) {
                return true;
            }
        }
        false
    }

    fn is_aged(&self, mtime: SystemTime) -> bool {
        SystemTime::now()
            .duration_since(mtime)
            .map(|age| age >= STABILITY_AGE)
            .unwrap_or(false)
    }

    fn remember(&mut self, path: PathBuf, size: u64) {
        self.cache.insert(
            path,
            CacheEntry {
                size,
                last_seen: Instant::now(),
            },
        );
    }

    /// Stability gate for a single file: `mtime` old enough, openable for
    /// read, and its size unchanged from the previous scan. Returns the
    /// observed size when stable so the caller can enqueue without a second
    /// metadata read.
    fn check_stability(&mut self, path: &Path, metadata: &std::fs::Metadata) -> Option<Stable> {
        let size = metadata.len();
        let floor = self.config.min_file_size.max(self.config.size_threshold);
        if size < floor {
            return None;
        }

        let mtime = metadata.modified().ok()?;
        if !self.is_aged(mtime) {
            self.remember(path.to_path_buf(), size);
            return None;
        }

        if std::fs::File::open(path).is_err() {
            return None;
        }

        let previously_stable = self
            .cache
            .get(path)
            .is_some_and(|entry| entry.size == size);
        self.remember(path.to_path_buf(), size);

        if previously_stable {
            Some(Stable { size })
        } else {
            None
        }
    }

    async fn enqueue_file(&self, path: PathBuf, size: u64) {
        if self.processor.is_path_being_processed(&path).await {
            return;
        }
        match self
            .processor
            .add_file(path.clone(), size, Priority::Normal)
            .await
        {
            Ok(id) => info!(job_id = %id, path = %path.display(), "watcher enqueued file"),
            Err(e) => warn!(path = %path.display(), error = %e, "watcher failed to enqueue file"),
        }
    }
}

struct Stable {
    size: u64,
}

/// Non-recursive scan of a folder's regular files: total size and the
/// newest `mtime` among them, used as the folder's stability signal.
fn fold_contents(dir: &Path) -> Option<(u64, SystemTime)> {
    let mut total = 0u64;
    let mut newest = SystemTime::UNIX_EPOCH;
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        total += metadata.len();
        if let Ok(mtime) = metadata.modified() {
            if mtime > newest {
                newest = mtime;
            }
        }
    }
    Some((total, newest))
}

/// Cross-platform file identity for symlink de-duplication: on Unix, the
/// `(dev, ino)` pair the kernel guarantees is unique per live inode;
/// elsewhere, falls back to the canonicalized path (best-effort — there is
/// no portable inode equivalent).
#[derive(Clone, PartialEq, Eq, Hash)]
enum FileIdentity {
    #[cfg(unix)]
    Inode(u64, u64),
    #[allow(dead_code)]
    Path(PathBuf),
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        FileIdentity::Inode(metadata.dev(), metadata.ino())
    }

    #[cfg(not(unix))]
    fn of(_metadata: &std::fs::Metadata) -> Self {
        FileIdentity::Path(PathBuf::new())
    }
}
