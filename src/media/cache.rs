//! Content-addressed conversion cache.
//!
//! Maps a [`ConversionKey`] to a finished file in the cache directory and
//! makes sure each key is produced at most once at a time. The first caller
//! to miss registers an in-flight production; later callers for the same key
//! await that production instead of starting their own.
//!
//! Productions run on their own task. A caller that gives up (timeout,
//! dropped request) only stops waiting; the production still finishes and
//! its artifact is stored for everyone else.
//!
//! Finished artifacts are written to a `.part` temp file inside the cache
//! directory and renamed into place, so readers never observe a partial file.

use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::{CacheError, MediaError};
use crate::media::key::{ConversionKey, TargetCodec};

/// Suffix of in-progress artifacts.
const PART_SUFFIX: &str = ".part";

/// Output of a producer: either the bytes themselves or a file holding them.
#[derive(Debug)]
pub enum Produced {
    Bytes(Bytes),
    File(PathBuf),
}

/// A completed cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    pub kind: TargetCodec,
}

/// Snapshot of cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Artifacts on disk.
    pub files: usize,
    /// Total artifact bytes on disk.
    pub bytes: u64,
    /// Productions currently running.
    pub in_flight: usize,
}

type Flight = Shared<BoxFuture<'static, Result<PathBuf, CacheError>>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, Flight>,
}

struct Inner {
    dir: PathBuf,
    state: Mutex<CacheState>,
}

/// Single-flight, disk-backed conversion cache.
#[derive(Clone)]
pub struct ConversionCache {
    inner: Arc<Inner>,
}

impl ConversionCache {
    /// Open (creating if needed) the cache rooted at `dir`.
    ///
    /// Leftover `.part` files from an interrupted run are removed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, MediaError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let cache = Self {
            inner: Arc::new(Inner {
                dir,
                state: Mutex::new(CacheState::default()),
            }),
        };

        let removed = cache.sweep().await?;
        if removed > 0 {
            tracing::info!(removed, "Removed orphaned partial artifacts");
        }
        tracing::debug!(dir = %cache.dir().display(), "Conversion cache opened");

        Ok(cache)
    }

    /// The directory owned by this cache.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Where the artifact for `key` lives (or will live).
    pub fn path_for(&self, key: &ConversionKey) -> PathBuf {
        self.inner.dir.join(key.file_name())
    }

    /// Return the artifact path for `key`, producing it if needed.
    ///
    /// `producer` is only polled when this call is the one that starts the
    /// production; on a hit or when joining an in-flight production it is
    /// dropped unused. A failed production is reported to every waiter and
    /// leaves no entry, so a later call can retry.
    pub async fn convert<F>(&self, key: &ConversionKey, producer: F) -> Result<PathBuf, CacheError>
    where
        F: Future<Output = Result<Produced, MediaError>> + Send + 'static,
    {
        let key_str = key.to_string();

        let flight = {
            let mut state = self.inner.lock_state();

            if let Some(entry) = self.inner.completed(&mut state, key) {
                tracing::debug!(key = %key_str, "Conversion cache hit");
                return Ok(entry.path);
            }

            match state.in_flight.get(&key_str) {
                Some(flight) => {
                    tracing::debug!(key = %key_str, "Joining in-flight conversion");
                    flight.clone()
                }
                None => {
                    tracing::debug!(key = %key_str, "Starting conversion");
                    let flight = self.start(key.clone(), producer);
                    state.in_flight.insert(key_str, flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    /// Completed entry for `key`, if any.
    pub fn lookup(&self, key: &ConversionKey) -> Option<CacheEntry> {
        let mut state = self.inner.lock_state();
        self.inner.completed(&mut state, key)
    }

    /// Remove the completed artifact for `key`.
    ///
    /// An in-flight production for the same key is left alone and will still
    /// store its result. Returns whether anything was removed.
    pub fn invalidate(&self, key: &ConversionKey) -> Result<bool, CacheError> {
        let key_str = key.to_string();
        let mut state = self.inner.lock_state();
        let had_entry = state.entries.remove(&key_str).is_some();

        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                tracing::debug!(key = %key_str, "Invalidated cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(had_entry),
            Err(e) => Err(CacheError::CacheIo {
                key: key_str,
                reason: e.to_string(),
            }),
        }
    }

    /// Number of productions currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.lock_state().in_flight.len()
    }

    /// Scan the cache directory for usage figures.
    pub async fn stats(&self) -> Result<CacheStats, MediaError> {
        let mut stats = CacheStats {
            in_flight: self.in_flight(),
            ..CacheStats::default()
        };

        let mut dir = tokio::fs::read_dir(self.dir()).await?;
        while let Some(entry) = dir.next_entry().await? {
            if is_hidden(&entry.file_name()) {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() {
                stats.files += 1;
                stats.bytes += meta.len();
            }
        }

        Ok(stats)
    }

    /// Delete orphaned `.part` files. Returns how many were removed.
    ///
    /// Only safe while no production is running in any process sharing the
    /// directory, so it runs on open and from the CLI.
    pub async fn sweep(&self) -> Result<usize, MediaError> {
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(self.dir()).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(PART_SUFFIX) {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Spawn the production task and wrap it in a shareable future.
    fn start<F>(&self, key: ConversionKey, producer: F) -> Flight
    where
        F: Future<Output = Result<Produced, MediaError>> + Send + 'static,
    {
        let key_str = key.to_string();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(Arc::clone(&self.inner).produce(key, producer));

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    inner.lock_state().in_flight.remove(&key_str);
                    Err(CacheError::ProductionFailed {
                        key: key_str,
                        reason: format!("production task aborted: {}", e),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Completed entry for `key`. Falls back to the directory so artifacts
    /// from a previous run are reused, and forgets entries whose file was
    /// removed externally.
    fn completed(&self, state: &mut CacheState, key: &ConversionKey) -> Option<CacheEntry> {
        let key_str = key.to_string();

        if let Some(entry) = state.entries.get(&key_str) {
            if entry.path.is_file() {
                return Some(entry.clone());
            }
            tracing::debug!(key = %key_str, "Cached artifact disappeared, forgetting entry");
            state.entries.remove(&key_str);
        }

        let path = self.dir.join(key.file_name());
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                let entry = CacheEntry {
                    key: key_str.clone(),
                    path,
                    created_at: meta
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now()),
                    size: meta.len(),
                    kind: key.target().clone(),
                };
                state.entries.insert(key_str, entry.clone());
                Some(entry)
            }
            _ => None,
        }
    }

    async fn produce<F>(self: Arc<Self>, key: ConversionKey, producer: F) -> Result<PathBuf, CacheError>
    where
        F: Future<Output = Result<Produced, MediaError>> + Send + 'static,
    {
        let key_str = key.to_string();
        let started = Instant::now();

        let produced = match AssertUnwindSafe(producer).catch_unwind().await {
            Ok(Ok(produced)) => Ok(produced),
            Ok(Err(e)) => Err(CacheError::ProductionFailed {
                key: key_str.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(CacheError::ProductionFailed {
                key: key_str.clone(),
                reason: "producer panicked".to_string(),
            }),
        };

        let result = match produced {
            Ok(produced) => {
                let inner = Arc::clone(&self);
                let commit_key = key.clone();
                tokio::task::spawn_blocking(move || inner.commit(&commit_key, produced))
                    .await
                    .unwrap_or_else(|e| {
                        Err(CacheError::CacheIo {
                            key: key_str.clone(),
                            reason: format!("commit task failed: {}", e),
                        })
                    })
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(path) => tracing::info!(
                key = %key_str,
                path = %path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Conversion stored"
            ),
            Err(e) => {
                self.lock_state().in_flight.remove(&key_str);
                tracing::warn!(key = %key_str, error = %e, "Conversion failed");
            }
        }

        result
    }

    /// Write the produced output to a temp file and rename it into place.
    ///
    /// The rename, the entry insert and the in-flight removal happen under
    /// one lock so `invalidate` and new callers see either the old or the
    /// new state, never a mix.
    fn commit(&self, key: &ConversionKey, produced: Produced) -> Result<PathBuf, CacheError> {
        let key_str = key.to_string();
        let io_err = |e: std::io::Error| CacheError::CacheIo {
            key: key_str.clone(),
            reason: e.to_string(),
        };

        let mut part = tempfile::Builder::new()
            .prefix(".")
            .suffix(PART_SUFFIX)
            .tempfile_in(&self.dir)
            .map_err(io_err)?;

        match produced {
            Produced::Bytes(data) => part.write_all(&data).map_err(io_err)?,
            Produced::File(path) => {
                let mut source =
                    std::fs::File::open(&path).map_err(|e| CacheError::ProductionFailed {
                        key: key_str.clone(),
                        reason: format!("cannot open produced file {}: {}", path.display(), e),
                    })?;
                std::io::copy(&mut source, part.as_file_mut()).map_err(io_err)?;
            }
        }

        part.as_file().sync_all().map_err(io_err)?;
        let size = part.as_file().metadata().map_err(io_err)?.len();
        if size == 0 {
            return Err(CacheError::ProductionFailed {
                key: key_str.clone(),
                reason: MediaError::EmptyOutput.to_string(),
            });
        }

        let final_path = self.dir.join(key.file_name());
        let mut state = self.lock_state();
        part.persist(&final_path).map_err(|e| io_err(e.error))?;
        state.entries.insert(
            key_str.clone(),
            CacheEntry {
                key: key_str.clone(),
                path: final_path.clone(),
                created_at: Utc::now(),
                size,
                kind: key.target().clone(),
            },
        );
        state.in_flight.remove(&key_str);

        Ok(final_path)
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::sync::oneshot;

    use super::*;

    async fn open_cache() -> (TempDir, ConversionCache) {
        let dir = TempDir::new().unwrap();
        let cache = ConversionCache::open(dir.path()).await.unwrap();
        (dir, cache)
    }

    fn counting_producer(
        calls: &Arc<AtomicUsize>,
        data: &'static [u8],
        delay: Duration,
    ) -> impl Future<Output = Result<Produced, MediaError>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(Produced::Bytes(Bytes::from_static(data)))
        }
    }

    fn failing_producer(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl Future<Output = Result<Produced, MediaError>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Err(MediaError::ProcessingFailed {
                reason: "decoder rejected input".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_second_call_is_a_hit() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "ab12:ogg".parse().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .convert(&key, counting_producer(&calls, b"OggS", Duration::ZERO))
            .await
            .unwrap();
        let second = cache
            .convert(&key, counting_producer(&calls, b"OggS", Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&first).unwrap(), b"OggS");
        assert_eq!(first, cache.path_for(&key));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_production() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "cafe:gif".parse().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                let producer = counting_producer(&calls, b"GIF89a", Duration::from_millis(50));
                tokio::spawn(async move { cache.convert(&key, producer).await })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let paths: Vec<PathBuf> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(paths.iter().all(|p| p == &paths[0]));
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_allows_retry() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "dead:silk".parse().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let err = cache
            .convert(&key, failing_producer(&calls, Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::ProductionFailed { .. }));
        assert!(cache.lookup(&key).is_none());
        assert_eq!(cache.in_flight(), 0);

        let path = cache
            .convert(&key, counting_producer(&calls, b"#!SILK_V3", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"#!SILK_V3");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_waiters_receive_the_failure() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "beef:ogg".parse().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let results = futures::future::join_all((0..4).map(|_| {
            cache.convert(&key, failing_producer(&calls, Duration::from_millis(30)))
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap_err().key(), Some("beef:ogg"));
        }
        assert!(!cache.path_for(&key).exists());
    }

    #[tokio::test]
    async fn test_no_partial_artifact_visible_during_production() {
        let (dir, cache) = open_cache().await;
        let key: ConversionKey = "f00d:png".parse().unwrap();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let producer = async move {
            let _ = release_rx.await;
            Ok(Produced::Bytes(Bytes::from(vec![7u8; 64 * 1024])))
        };

        let pending = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.convert(&key, producer).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.in_flight(), 1);
        assert!(cache.lookup(&key).is_none());
        assert!(!cache.path_for(&key).exists());
        let visible: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(visible.is_empty());

        release_tx.send(()).unwrap();
        let path = pending.await.unwrap().unwrap();
        assert_eq!(std::fs::metadata(path).unwrap().len(), 64 * 1024);
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_cancel_production() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "a1b2:gif".parse().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            cache.convert(&key, counting_producer(&calls, b"GIF89a", Duration::from_millis(80))),
        )
        .await;
        assert!(timed_out.is_err());

        let path = cache
            .convert(&key, counting_producer(&calls, b"other", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"GIF89a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reproduction() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "1234:png".parse().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let path = cache
            .convert(&key, counting_producer(&calls, b"png-1", Duration::ZERO))
            .await
            .unwrap();
        assert!(cache.invalidate(&key).unwrap());
        assert!(!path.exists());
        assert!(!cache.invalidate(&key).unwrap());

        let path = cache
            .convert(&key, counting_producer(&calls, b"png-2", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"png-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_leaves_in_flight_production_alone() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "5678:ogg".parse().unwrap();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let pending = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .convert(&key, async move {
                        let _ = release_rx.await;
                        Ok(Produced::Bytes(Bytes::from_static(b"OggS")))
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cache.invalidate(&key).unwrap());
        assert_eq!(cache.in_flight(), 1);

        release_tx.send(()).unwrap();
        let path = pending.await.unwrap().unwrap();
        assert!(path.exists());
        assert!(cache.lookup(&key).is_some());
    }

    #[tokio::test]
    async fn test_empty_output_is_a_failure() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "0000:gif".parse().unwrap();

        let err = cache
            .convert(&key, async { Ok(Produced::Bytes(Bytes::new())) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty output"));
        assert!(!cache.path_for(&key).exists());
        assert_eq!(cache.stats().await.unwrap().files, 0);
    }

    #[tokio::test]
    async fn test_panicking_producer_is_contained() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "9999:png".parse().unwrap();

        let err = cache
            .convert(&key, async {
                if true {
                    panic!("codec crashed");
                }
                Ok(Produced::Bytes(Bytes::new()))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("panicked"));
        assert_eq!(cache.in_flight(), 0);

        let path = cache
            .convert(&key, async { Ok(Produced::Bytes(Bytes::from_static(b"ok"))) })
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_output_is_copied_in() {
        let (_dir, cache) = open_cache().await;
        let scratch = TempDir::new().unwrap();
        let produced = scratch.path().join("out.gif");
        std::fs::write(&produced, b"GIF89a-frames").unwrap();
        let key: ConversionKey = "abcd:gif".parse().unwrap();

        let path = cache
            .convert(&key, async move { Ok(Produced::File(produced)) })
            .await
            .unwrap();
        assert_eq!(path.parent().unwrap(), cache.dir());
        assert_eq!(std::fs::read(path).unwrap(), b"GIF89a-frames");
    }

    #[tokio::test]
    async fn test_artifacts_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let key: ConversionKey = "7777:ogg".parse().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let cache = ConversionCache::open(dir.path()).await.unwrap();
            cache
                .convert(&key, counting_producer(&calls, b"OggS", Duration::ZERO))
                .await
                .unwrap();
        }

        let cache = ConversionCache::open(dir.path()).await.unwrap();
        let entry = cache.lookup(&key).unwrap();
        assert_eq!(entry.size, 4);
        assert_eq!(entry.kind, TargetCodec::Ogg);
        cache
            .convert(&key, counting_producer(&calls, b"OggS", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_sweeps_partial_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".orphan.part"), b"half").unwrap();
        std::fs::write(dir.path().join("keep.ogg"), b"OggS").unwrap();

        let cache = ConversionCache::open(dir.path()).await.unwrap();
        assert!(!dir.path().join(".orphan.part").exists());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.bytes, 4);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_externally_removed_artifact_is_reproduced() {
        let (_dir, cache) = open_cache().await;
        let key: ConversionKey = "4242:png".parse().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let path = cache
            .convert(&key, counting_producer(&calls, b"png", Duration::ZERO))
            .await
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        cache
            .convert(&key, counting_producer(&calls, b"png", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
