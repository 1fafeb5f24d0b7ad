//! Credential persistence.
//!
//! Accounts live in a line-oriented `KEY=<JSON>` file shared with other
//! tooling, one logical record per platform. It is the one mutable resource
//! shared across processes, so updates are serialized through an exclusive
//! lock file holding the owner PID: acquire the lock, back up the target,
//! write a temp file, atomically rename it into place, release the lock.
//! A lock whose owning process no longer exists is treated as stale and
//! reclaimed.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

const INSTAGRAM_KEY: &str = "INSTAGRAM_ACCOUNTS";
const YOUTUBE_KEY: &str = "YOUTUBE_ACCOUNTS";

const LOCK_WAIT: Duration = Duration::from_secs(10);
const LOCK_POLL: Duration = Duration::from_millis(100);

const MAX_NAME_LEN: usize = 100;
const MAX_TOKEN_LEN: usize = 500;

/// One Instagram-like publishing target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstagramAccount {
    pub name: String,
    pub id: String,
    pub token: String,
}

/// One YouTube-like publishing target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeAccount {
    pub name: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// All configured publishing targets.
#[derive(Debug, Clone, Default)]
pub struct Accounts {
    pub instagram: Vec<InstagramAccount>,
    pub youtube: Vec<YouTubeAccount>,
}

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse both platform records from the file. Missing file or missing
    /// keys yield empty account lists.
    pub fn load(&self) -> Result<Accounts> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Accounts::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read credentials file {:?}", self.path))
            }
        };

        let mut accounts = Accounts::default();
        for line in content.lines() {
            if let Some(json) = line.strip_prefix(&format!("{}=", INSTAGRAM_KEY)) {
                accounts.instagram = serde_json::from_str(json)
                    .with_context(|| format!("invalid {} record", INSTAGRAM_KEY))?;
            } else if let Some(json) = line.strip_prefix(&format!("{}=", YOUTUBE_KEY)) {
                accounts.youtube = serde_json::from_str(json)
                    .with_context(|| format!("invalid {} record", YOUTUBE_KEY))?;
            }
        }
        Ok(accounts)
    }

    /// Replace the Instagram record.
    pub fn save_instagram(&self, accounts: &[InstagramAccount]) -> Result<()> {
        let sanitized: Vec<InstagramAccount> = accounts
            .iter()
            .map(|a| InstagramAccount {
                name: truncate(&a.name, MAX_NAME_LEN),
                id: truncate(&a.id, MAX_NAME_LEN),
                token: truncate(&a.token, MAX_TOKEN_LEN),
            })
            .collect();
        self.update_record(INSTAGRAM_KEY, &serde_json::to_string(&sanitized)?)
    }

    /// Replace the YouTube record.
    pub fn save_youtube(&self, accounts: &[YouTubeAccount]) -> Result<()> {
        let sanitized: Vec<YouTubeAccount> = accounts
            .iter()
            .map(|a| YouTubeAccount {
                name: truncate(&a.name, MAX_NAME_LEN),
                access_token: truncate(&a.access_token, MAX_TOKEN_LEN),
                refresh_token: truncate(&a.refresh_token, MAX_TOKEN_LEN),
            })
            .collect();
        self.update_record(YOUTUBE_KEY, &serde_json::to_string(&sanitized)?)
    }

    fn update_record(&self, key: &str, json: &str) -> Result<()> {
        let _lock = FileLock::acquire(&self.lock_path())?;

        let existing = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read credentials file {:?}", self.path))
            }
        };

        let prefix = format!("{}=", key);
        let mut replaced = false;
        let mut lines: Vec<String> = existing
            .lines()
            .map(|line| {
                if line.starts_with(&prefix) {
                    replaced = true;
                    format!("{}{}", prefix, json)
                } else {
                    line.to_string()
                }
            })
            .collect();
        if !replaced {
            lines.push(format!("{}{}", prefix, json));
        }
        let mut new_content = lines.join("\n");
        new_content.push('\n');

        // Backup, temp write, atomic rename. Restore the backup if the
        // rename fails.
        let backup = self.path.with_extension("bak");
        let temp = self.path.with_extension("tmp");
        let had_original = self.path.exists();
        if had_original {
            std::fs::copy(&self.path, &backup)
                .with_context(|| format!("failed to back up {:?}", self.path))?;
        }

        std::fs::write(&temp, &new_content)
            .with_context(|| format!("failed to write temp credentials file {:?}", temp))?;

        if let Err(e) = std::fs::rename(&temp, &self.path) {
            let _ = std::fs::remove_file(&temp);
            if had_original {
                if let Err(restore) = std::fs::copy(&backup, &self.path) {
                    warn!(error = %restore, "failed to restore credentials backup");
                }
            }
            return Err(e)
                .with_context(|| format!("failed to replace credentials file {:?}", self.path));
        }

        if had_original {
            let _ = std::fs::remove_file(&backup);
        }
        debug!(key, "credentials record updated");
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Exclusive lock file holding the owner PID, released on drop.
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self> {
        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut file) => {
                    use std::io::Write;
                    write!(file, "{}", std::process::id())
                        .with_context(|| format!("failed to write lock file {:?}", path))?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(path) {
                        warn!(lock = ?path, "reclaiming stale credentials lock");
                        let _ = std::fs::remove_file(path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        bail!("timed out waiting for credentials lock {:?}", path);
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to create lock file {:?}", path));
                }
            }
        }
    }

    /// A lock is stale when its owner PID can no longer be found.
    fn is_stale(path: &Path) -> bool {
        let pid = match std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
        {
            Some(pid) => pid,
            // Unreadable or malformed lock, assume stale.
            None => return true,
        };

        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).is_none()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
