//! Recovery of the image a workflow run produced.
//!
//! `comfy run --wait` only reports that the run finished, not which file
//! it wrote. [`OutputWatcher`] polls the shared output directory for it.
//! Two filters keep the match specific to one job:
//!
//! - entries already present before the run (a [`DirSnapshot`]) are
//!   ignored, so stale files from earlier activity never match;
//! - when the workflow's save node carries a per-job filename prefix, only
//!   names starting with that prefix match.
//!
//! Among the remaining files the most recently created one wins.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use imagegate_core::error::CoreError;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default number of polls before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 20;

/// Names present in the output directory at some instant.
#[derive(Debug, Clone, Default)]
pub struct DirSnapshot {
    names: HashSet<OsString>,
}

impl DirSnapshot {
    pub fn contains(&self, name: &OsString) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Polls an output directory for a job's artifact.
#[derive(Debug, Clone)]
pub struct OutputWatcher {
    dir: PathBuf,
    interval: Duration,
    attempts: u32,
}

impl OutputWatcher {
    pub fn new(dir: PathBuf, interval: Duration, attempts: u32) -> Self {
        Self {
            dir,
            interval,
            attempts,
        }
    }

    /// Record the entries currently in the output directory.
    ///
    /// A missing directory yields an empty snapshot; ComfyUI creates it on
    /// first save.
    pub async fn snapshot(&self) -> Result<DirSnapshot, CoreError> {
        let mut names = HashSet::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DirSnapshot::default()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            names.insert(entry.file_name());
        }
        Ok(DirSnapshot { names })
    }

    /// Poll until a new matching file appears.
    ///
    /// Each attempt sleeps one interval and then lists the directory. On a
    /// match it waits one more interval so the writer can finish, then
    /// returns the path. Fails with [`CoreError::GenerationTimeout`] when
    /// the attempt budget runs out.
    pub async fn wait_for_output(
        &self,
        before: &DirSnapshot,
        prefix: Option<&str>,
    ) -> Result<PathBuf, CoreError> {
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.interval).await;

            if let Some(path) = self.newest_match(before, prefix).await? {
                tracing::info!(path = %path.display(), attempt, "Detected new output file");
                tokio::time::sleep(self.interval).await;
                return Ok(path);
            }
            tracing::debug!(attempt, attempts = self.attempts, "No output file yet");
        }

        let waited_ms = (self.interval * self.attempts).as_millis() as u64;
        tracing::warn!(dir = %self.dir.display(), waited_ms, "No output file appeared");
        Err(CoreError::GenerationTimeout { waited_ms })
    }

    /// The most recently created file not in `before` and matching `prefix`.
    async fn newest_match(
        &self,
        before: &DirSnapshot,
        prefix: Option<&str>,
    ) -> Result<Option<PathBuf>, CoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if before.contains(&name) {
                continue;
            }
            if let Some(prefix) = prefix {
                if !name.to_string_lossy().starts_with(prefix) {
                    continue;
                }
            }
            // The entry may vanish between listing and stat.
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            if newest.as_ref().map_or(true, |(t, _)| created >= *t) {
                newest = Some((created, entry.path()));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
