//! On-disk HLS segment store.
//!
//! One directory holds the current playlist (`stream.m3u8`) and its rolling
//! window of `.ts` segments. The store owns the cleanup policy: [`SegmentStore::purge`]
//! removes every playlist/segment file (including ffmpeg's `.tmp` variants)
//! and leaves anything else alone.
//!
//! Reads are not synchronized with purges. A player fetching a segment while
//! the directory is being cleared simply gets a NotFound and refetches the
//! playlist.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Playlist filename written by the transcoder.
pub const PLAYLIST_NAME: &str = "stream.m3u8";

/// Extensions owned by the store.
const MANAGED_EXTENSIONS: &[&str] = &["m3u8", "ts"];

/// What a file in the store is, for content-type purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Playlist,
    Segment,
    Other,
}

impl SegmentKind {
    pub fn from_name(name: &str) -> Self {
        match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("m3u8") => SegmentKind::Playlist,
            Some(ext) if ext.eq_ignore_ascii_case("ts") => SegmentKind::Segment,
            _ => SegmentKind::Other,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            SegmentKind::Playlist => "application/vnd.apple.mpegurl",
            SegmentKind::Segment => "video/mp2t",
            SegmentKind::Other => "application/octet-stream",
        }
    }
}

/// Outcome of a best-effort purge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Files deleted.
    pub removed: usize,
    /// Files that could not be deleted (logged, retried by the next purge).
    pub failed: usize,
}

/// An opened file ready to be streamed to a client.
#[derive(Debug)]
pub struct SegmentFile {
    pub file: tokio::fs::File,
    pub len: u64,
    pub kind: SegmentKind,
}

#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
}

impl SegmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the store directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.dir.join(PLAYLIST_NAME)
    }

    /// ffmpeg `-hls_segment_filename` pattern for one session.
    pub fn segment_pattern(&self, session_prefix: &str) -> PathBuf {
        self.dir.join(format!("stream_{}_%d.ts", session_prefix))
    }

    /// Whether `name` is a playlist or segment file this store cleans up.
    pub fn is_managed(name: &str) -> bool {
        let name = name.strip_suffix(".tmp").unwrap_or(name);
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| MANAGED_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
            .unwrap_or(false)
    }

    /// Delete every playlist and segment file in the store.
    ///
    /// Failures on individual files are logged and counted but never abort
    /// the rest of the purge. The directory may be repopulated by a writer
    /// that is still alive, so callers that need emptiness must settle and
    /// re-check (see [`SegmentStore::purge_until_clean`]).
    pub async fn purge(&self) -> PurgeReport {
        let store = self.clone();
        match tokio::task::spawn_blocking(move || store.purge_blocking()).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Segment purge task failed: {}", e);
                PurgeReport {
                    removed: 0,
                    failed: 1,
                }
            }
        }
    }

    /// [`SegmentStore::purge`] for contexts that cannot await, such as `Drop`.
    pub fn purge_blocking(&self) -> PurgeReport {
        self.purge_with(|path| std::fs::remove_file(path))
    }

    fn purge_with<F>(&self, mut remove: F) -> PurgeReport
    where
        F: FnMut(&Path) -> std::io::Result<()>,
    {
        let mut report = PurgeReport::default();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                tracing::warn!("Failed to list segment store {:?}: {}", self.dir, e);
                report.failed += 1;
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Failed to read segment store entry: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            let name = entry.file_name();
            if !Self::is_managed(&name.to_string_lossy()) {
                continue;
            }

            if matches!(entry.file_type(), Ok(ft) if ft.is_dir()) {
                continue;
            }

            let path = entry.path();
            match remove(&path) {
                Ok(()) => report.removed += 1,
                // Rolled over by the transcoder between listing and removal
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to remove {:?}: {}", path, e);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            tracing::debug!(
                removed = report.removed,
                failed = report.failed,
                "Purged segment store"
            );
        }

        report
    }

    /// Whether the store currently holds no playlist or segment files.
    ///
    /// A listing that fails part way counts as not clean.
    pub async fn is_clean(&self) -> bool {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => return e.kind() == std::io::ErrorKind::NotFound,
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => return true,
                Err(e) => {
                    tracing::warn!("Failed to read segment store entry: {}", e);
                    return false;
                }
            };
            if !Self::is_managed(&entry.file_name().to_string_lossy()) {
                continue;
            }
            match entry.file_type().await {
                Ok(ft) if ft.is_dir() => continue,
                _ => return false,
            }
        }
    }

    /// Purge, wait `settle`, and confirm the directory stayed empty,
    /// repeating up to `attempts` rounds.
    ///
    /// Returns the accumulated report and whether the store ended up clean.
    pub async fn purge_until_clean(&self, settle: Duration, attempts: u32) -> (PurgeReport, bool) {
        let mut total = PurgeReport::default();

        for attempt in 1..=attempts.max(1) {
            let report = self.purge().await;
            total.removed += report.removed;
            total.failed += report.failed;

            tokio::time::sleep(settle).await;

            if self.is_clean().await {
                return (total, true);
            }
            tracing::warn!(attempt, "Segment store not empty after settling, purging again");
        }

        (total, false)
    }

    /// Map a requested filename onto a path inside the store.
    ///
    /// Only a single plain path component is accepted; anything that could
    /// step outside the directory is reported as not found.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(file)), None) if !name.contains('\\') => {
                Ok(self.dir.join(file))
            }
            _ => Err(Error::not_found(name)),
        }
    }

    /// Open a file from the store for streaming.
    pub async fn open(&self, name: &str) -> Result<SegmentFile> {
        let path = self.resolve(name)?;

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(name))
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(Error::not_found(name));
        }

        Ok(SegmentFile {
            file,
            len: metadata.len(),
            kind: SegmentKind::from_name(name),
        })
    }
}
