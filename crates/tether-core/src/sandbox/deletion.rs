//! Two-phase deletion.
//!
//! A delete request only inspects the target and records a
//! [`PendingDeletion`]. Nothing is removed until a human confirms it. Confirm
//! checks the target again, and a failed attempt leaves the entry in place so
//! it can be retried or cancelled.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::paths::normalize_path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingDeletion {
    pub id: String,
    pub path: PathBuf,
    pub recursive: bool,
    pub reason: String,
    pub is_directory: bool,
    /// Total bytes of regular files at request time.
    pub size: u64,
    pub file_count: u64,
    pub created_at: DateTime<Utc>,
    pub session_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeletionError {
    #[error("deletion request '{0}' not found")]
    NotFound(String),
    #[error("path does not exist: {0}")]
    PathMissing(PathBuf),
    #[error("refusing to delete {path}: {reason}")]
    Refused { path: PathBuf, reason: String },
    #[error("{0} is a non-empty directory; set recursive to delete it")]
    NotEmpty(PathBuf),
    #[error("failed to delete {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

struct Snapshot {
    is_directory: bool,
    size: u64,
    file_count: u64,
}

/// Walk the target once and total it up. Symlinks are not followed.
fn snapshot(path: &Path, recursive: bool) -> Result<Snapshot, DeletionError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DeletionError::PathMissing(path.to_path_buf()))
        }
        Err(source) => {
            return Err(DeletionError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_dir() {
        return Ok(Snapshot {
            is_directory: false,
            size: metadata.len(),
            file_count: 1,
        });
    }

    let mut size = 0;
    let mut file_count = 0;
    let mut has_children = false;
    for entry in WalkDir::new(path).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", path.display(), e);
                continue;
            }
        };
        has_children = true;
        if !entry.file_type().is_dir() {
            file_count += 1;
            size += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }

    if has_children && !recursive {
        return Err(DeletionError::NotEmpty(path.to_path_buf()));
    }

    Ok(Snapshot {
        is_directory: true,
        size,
        file_count,
    })
}

fn refuse_root_like(path: &Path) -> Result<(), DeletionError> {
    let normalized = normalize_path(&path.to_string_lossy());
    let is_drive_root = normalized.len() == 3 && normalized.ends_with(":/");
    let is_home = dirs::home_dir()
        .map(|home| normalize_path(&home.to_string_lossy()) == normalized)
        .unwrap_or(false);

    let reason = if normalized == "/" || is_drive_root {
        "filesystem root"
    } else if is_home {
        "home directory"
    } else {
        return Ok(());
    };
    Err(DeletionError::Refused {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct DeletionManager {
    pending: Mutex<HashMap<String, PendingDeletion>>,
    next_id: AtomicU64,
}

impl DeletionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deletion request. Fails, recording nothing, if the path is
    /// missing, protected, or a non-empty directory without `recursive`.
    pub async fn request(
        &self,
        session_id: &str,
        path: &Path,
        recursive: bool,
        reason: &str,
    ) -> Result<PendingDeletion, DeletionError> {
        refuse_root_like(path)?;

        let target = path.to_path_buf();
        let snap = tokio::task::spawn_blocking(move || snapshot(&target, recursive))
            .await
            .map_err(|e| DeletionError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })??;

        let id = format!("del-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let pending = PendingDeletion {
            id: id.clone(),
            path: path.to_path_buf(),
            recursive,
            reason: reason.to_string(),
            is_directory: snap.is_directory,
            size: snap.size,
            file_count: snap.file_count,
            created_at: Utc::now(),
            session_id: session_id.to_string(),
        };
        info!(
            "Deletion {} requested: {} ({} files, {} bytes)",
            id,
            path.display(),
            pending.file_count,
            pending.size
        );
        lock(&self.pending).insert(id, pending.clone());
        Ok(pending)
    }

    /// Execute a pending deletion. The entry is removed only on success.
    pub async fn confirm(&self, id: &str) -> Result<PendingDeletion, DeletionError> {
        // Taken out while the I/O runs so a concurrent confirm sees NotFound
        let pending = lock(&self.pending)
            .remove(id)
            .ok_or_else(|| DeletionError::NotFound(id.to_string()))?;

        let target = pending.clone();
        let result = tokio::task::spawn_blocking(move || execute(&target))
            .await
            .map_err(|e| DeletionError::Io {
                path: pending.path.clone(),
                source: std::io::Error::other(e),
            })
            .and_then(|r| r);

        match result {
            Ok(()) => {
                info!("Deletion {} executed: {}", pending.id, pending.path.display());
                Ok(pending)
            }
            Err(e) => {
                warn!("Deletion {} failed: {}", pending.id, e);
                lock(&self.pending).insert(pending.id.clone(), pending);
                Err(e)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<PendingDeletion> {
        lock(&self.pending).get(id).cloned()
    }

    pub fn cancel(&self, id: &str) -> Result<PendingDeletion, DeletionError> {
        let pending = lock(&self.pending)
            .remove(id)
            .ok_or_else(|| DeletionError::NotFound(id.to_string()))?;
        info!("Deletion {} cancelled", pending.id);
        Ok(pending)
    }

    pub fn list(&self, session_id: &str) -> Vec<PendingDeletion> {
        let mut list: Vec<PendingDeletion> = lock(&self.pending)
            .values()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }

    pub fn clear_session(&self, session_id: &str) {
        lock(&self.pending).retain(|_, p| p.session_id != session_id);
    }
}

fn execute(pending: &PendingDeletion) -> Result<(), DeletionError> {
    let path = &pending.path;
    refuse_root_like(path)?;
    let current = snapshot(path, pending.recursive)?;

    let io_err = |source| DeletionError::Io {
        path: path.clone(),
        source,
    };
    if !current.is_directory {
        std::fs::remove_file(path).map_err(io_err)
    } else if pending.recursive {
        std::fs::remove_dir_all(path).map_err(io_err)
    } else {
        std::fs::remove_dir(path).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_request_does_not_touch_the_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();

        let manager = DeletionManager::new();
        let pending = manager.request("s1", &file, false, "cleanup").await.unwrap();
        assert_eq!(pending.size, 5);
        assert_eq!(pending.file_count, 1);
        assert!(!pending.is_directory);
        assert!(file.exists());

        manager.confirm(&pending.id).await.unwrap();
        assert!(!file.exists());
        assert!(manager.list("s1").is_empty());
    }

    #[tokio::test]
    async fn test_missing_path_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let manager = DeletionManager::new();
        let err = manager
            .request("s1", &dir.path().join("x"), false, "gone")
            .await
            .unwrap_err();
        assert!(matches!(err, DeletionError::PathMissing(_)));
        assert!(manager.list("s1").is_empty());
    }

    #[tokio::test]
    async fn test_non_empty_directory_needs_recursive() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("tree");
        std::fs::create_dir_all(target.join("nested")).unwrap();
        std::fs::write(target.join("nested/b.txt"), "bb").unwrap();
        std::fs::write(target.join("c.txt"), "c").unwrap();

        let manager = DeletionManager::new();
        let err = manager.request("s1", &target, false, "x").await.unwrap_err();
        assert!(matches!(err, DeletionError::NotEmpty(_)));

        let pending = manager.request("s1", &target, true, "x").await.unwrap();
        assert!(pending.is_directory);
        assert_eq!(pending.file_count, 2);
        assert_eq!(pending.size, 3);
        manager.confirm(&pending.id).await.unwrap();
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_cancel_then_confirm_is_not_found() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("keep.txt");
        std::fs::write(&file, "x").unwrap();

        let manager = DeletionManager::new();
        let pending = manager.request("s1", &file, false, "x").await.unwrap();
        manager.cancel(&pending.id).unwrap();
        let err = manager.confirm(&pending.id).await.unwrap_err();
        assert!(matches!(err, DeletionError::NotFound(_)));
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_failed_confirm_keeps_entry() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("moved.txt");
        std::fs::write(&file, "x").unwrap();

        let manager = DeletionManager::new();
        let pending = manager.request("s1", &file, false, "x").await.unwrap();
        std::fs::remove_file(&file).unwrap();

        let err = manager.confirm(&pending.id).await.unwrap_err();
        assert!(matches!(err, DeletionError::PathMissing(_)));
        assert_eq!(manager.list("s1").len(), 1);
        assert!(manager.cancel(&pending.id).is_ok());
    }

    #[tokio::test]
    async fn test_refuses_root() {
        let manager = DeletionManager::new();
        let err = manager.request("s1", Path::new("/"), true, "x").await.unwrap_err();
        assert!(matches!(err, DeletionError::Refused { .. }));
    }
}
