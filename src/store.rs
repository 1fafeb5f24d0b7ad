//! Transient per-session working files.
//!
//! Every stage writes to a uniquely named file derived from the session id
//! and a stage tag, never overwriting an earlier stage's file, so falling
//! back to a previous artifact is always possible. Exclusivity across
//! concurrent sessions comes purely from the id-namespaced filenames.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

/// Filename prefix for every transient artifact this process creates.
const FILE_PREFIX: &str = "reelcast";

/// Prefixes recognized by the orphan sweep, including ones written by
/// earlier releases.
const ORPHAN_PREFIXES: &[&str] = &["reelcast-", "ig-upload-"];

/// Manages creation, naming, and guaranteed deletion of session artifacts.
#[derive(Debug, Clone)]
pub struct TransientStore {
    root: PathBuf,
}

impl TransientStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create transient dir {:?}", root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for one stage's artifact, namespaced by session id.
    pub fn path_for(&self, session_id: Uuid, stage_tag: &str) -> PathBuf {
        self.root
            .join(format!("{}-{}-{}.mp4", FILE_PREFIX, session_id, stage_tag))
    }

    /// Delete every file whose name contains `session_id`.
    ///
    /// Already-deleted files count as success. Returns the number of files
    /// actually removed.
    pub fn purge_session(&self, session_id: Uuid) -> usize {
        let needle = session_id.to_string();
        let mut removed = 0;

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = ?self.root, error = %e, "could not list transient dir for purge");
                return 0;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().contains(&needle) {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    removed += 1;
                    debug!(file = ?entry.path(), "purged session artifact");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(file = ?entry.path(), error = %e, "failed to purge session artifact");
                }
            }
        }

        removed
    }

    /// Delete stray transient files older than `older_than`.
    ///
    /// Recovers disk space from sessions that crashed before cleanup. Best
    /// effort only, invoked opportunistically during normal cleanup.
    pub fn purge_orphans(&self, older_than: Duration) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = ?self.root, error = %e, "could not list transient dir for orphan sweep");
                return 0;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !ORPHAN_PREFIXES.iter().any(|p| name.starts_with(p)) {
                continue;
            }

            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or_else(|_| SystemTime::now());
            if modified >= cutoff {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    removed += 1;
                    debug!(file = ?entry.path(), "purged orphaned artifact");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(file = ?entry.path(), error = %e, "failed to purge orphan");
                }
            }
        }

        removed
    }
}
