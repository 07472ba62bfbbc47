//! Detecting new output files written by a service.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::WatchError;

/// File name patterns an artifact must match.
///
/// Supports `*.ext` (case-insensitive extension) and exact file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPatterns {
    patterns: Vec<String>,
}

impl ArtifactPatterns {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Common image formats written by ComfyUI.
    pub fn images() -> Self {
        Self::new(["*.png", "*.jpg", "*.jpeg", "*.webp"])
    }

    /// Whether `path` matches any pattern.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        self.patterns.iter().any(|pattern| match pattern.strip_prefix("*.") {
            Some(ext) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext)),
            None => pattern == name,
        })
    }
}

impl Default for ArtifactPatterns {
    fn default() -> Self {
        Self::images()
    }
}

/// Matching files in a directory at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSnapshot {
    paths: HashSet<PathBuf>,
}

impl ArtifactSnapshot {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }
}

/// List the matching files in `dir`. A missing directory yields an empty snapshot.
pub async fn snapshot(
    dir: &Path,
    patterns: &ArtifactPatterns,
) -> Result<ArtifactSnapshot, WatchError> {
    let mut paths = HashSet::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ArtifactSnapshot { paths })
        }
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if patterns.matches(&path) && entry.file_type().await?.is_file() {
            paths.insert(path);
        }
    }

    Ok(ArtifactSnapshot { paths })
}

/// Wait for a file matching `patterns` that is not in `baseline` to appear in `dir`.
///
/// When several new files exist the most recently created one is returned;
/// equal timestamps are broken by the lexicographically greatest path.
/// Cancelling `cancel` ends the wait immediately with [`WatchError::Cancelled`].
pub async fn watch_for_new_artifact(
    dir: &Path,
    patterns: &ArtifactPatterns,
    baseline: &ArtifactSnapshot,
    deadline: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<PathBuf, WatchError> {
    let started = Instant::now();
    let expires = started + deadline;

    info!("Watching {} for a new artifact", dir.display());

    loop {
        if cancel.is_cancelled() {
            return Err(WatchError::Cancelled);
        }

        let current = snapshot(dir, patterns).await?;
        let fresh: Vec<PathBuf> = current
            .paths
            .into_iter()
            .filter(|p| !baseline.contains(p))
            .collect();

        if let Some(newest) = newest(fresh).await {
            info!("New artifact: {}", newest.display());
            return Ok(newest);
        }

        let now = Instant::now();
        if now >= expires {
            return Err(WatchError::ArtifactTimeout {
                dir: dir.display().to_string(),
                waited: started.elapsed(),
            });
        }

        debug!("No new artifact yet in {}", dir.display());
        tokio::select! {
            _ = cancel.cancelled() => return Err(WatchError::Cancelled),
            _ = tokio::time::sleep(poll_interval.min(expires - now)) => {}
        }
    }
}

async fn newest(paths: Vec<PathBuf>) -> Option<PathBuf> {
    let mut stamped = Vec::with_capacity(paths.len());

    for path in paths {
        // The file may vanish between listing and stat.
        let Ok(meta) = tokio::fs::metadata(&path).await else {
            continue;
        };
        let stamp = meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        stamped.push((stamp, path));
    }

    pick_newest(stamped)
}

/// Latest timestamp wins, then the greatest path.
fn pick_newest(stamped: Vec<(SystemTime, PathBuf)>) -> Option<PathBuf> {
    stamped.into_iter().max().map(|(_, path)| path)
}
