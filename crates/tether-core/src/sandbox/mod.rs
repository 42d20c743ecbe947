//! Capability gate.
//!
//! Every path-touching tool asks the gate before doing anything. The answer
//! is one of allowed, denied, or requires-approval; the last one records a
//! [`PendingPermission`] that a human resolves out of band with
//! [`CapabilityGate::approve`] or [`CapabilityGate::deny`]. Decisions are kept
//! per session and only in memory.
//!
//! Order of evaluation:
//! 1. hardcoded blocked locations (never overridable)
//! 2. the session's denied prefixes
//! 3. the session's approved prefixes
//! 4. sensitive locations, which need approval
//! 5. everything else is allowed

pub mod deletion;
pub mod paths;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::session::SessionStore;
pub use paths::{has_prefix, normalize_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    List,
    Search,
    Execute,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::List => "list",
            Self::Search => "search",
            Self::Execute => "execute",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Allowed,
    Denied { reason: String },
    RequiresApproval { pending_id: String },
}

/// Answer of [`CapabilityGate::check`]. Nothing is recorded, so a path that
/// needs approval carries the reason instead of a pending id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied { reason: String },
    NeedsApproval { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingPermission {
    pub id: String,
    /// Normalized path the decision will apply to.
    pub path: String,
    pub operation: Operation,
    pub reason: String,
    pub session_id: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GateError {
    #[error("permission request '{0}' not found")]
    NotFound(String),
}

struct PathRule {
    pattern: Regex,
    label: &'static str,
}

impl PathRule {
    fn new(pattern: &str, label: &'static str) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(pattern) => Some(Self { pattern, label }),
            Err(e) => {
                tracing::error!("Invalid sandbox pattern {}: {}", pattern, e);
                None
            }
        }
    }
}

fn blocked_rules() -> Vec<PathRule> {
    [
        (r"^/etc/(shadow|gshadow|sudoers)(\.d)?(/|$)", "system credential store"),
        (r"^/(proc|sys|dev|boot)(/|$)", "kernel or device filesystem"),
        (r"^/system(/|$)", "operating system files"),
        (r"^[a-z]:/windows(/|$)", "operating system files"),
        (r"/\.ssh/id_[^/]*$", "SSH private key"),
        (r"/\.gnupg/private-keys", "GPG private key"),
    ]
    .into_iter()
    .filter_map(|(pattern, label)| PathRule::new(pattern, label))
    .collect()
}

const USER_DATA_DIRS: &str =
    "documents|desktop|downloads|pictures|movies|music|library|appdata";
const CREDENTIAL_DIRS: &str = r"\.ssh|\.aws|\.gnupg|\.config|\.kube|\.docker|\.azure|\.netrc";

fn sensitive_rules() -> Vec<PathRule> {
    let user_data = format!(r"^(/home|/users|[a-z]:/users)/[^/]+/({})(/|$)", USER_DATA_DIRS);
    let credentials = format!(r"^(/home|/users|/root|[a-z]:/users)/([^/]+/)?({})(/|$)", CREDENTIAL_DIRS);
    [
        (user_data.as_str(), "user data directory"),
        (credentials.as_str(), "credential directory"),
        (r"^/(etc|usr|bin|sbin|opt|library|applications)(/|$)", "system directory"),
        (r"^/var/(log|lib|db|root|spool|mail)(/|$)", "system directory"),
        (r"^[a-z]:/(program files|program files \(x86\)|programdata)(/|$)", "system directory"),
    ]
    .into_iter()
    .filter_map(|(pattern, label)| PathRule::new(pattern, label))
    .collect()
}

/// Prefixes under the current user's home that need approval.
fn home_sensitive_prefixes() -> Vec<String> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    let home = normalize_path(&home.to_string_lossy());
    USER_DATA_DIRS
        .split('|')
        .chain(CREDENTIAL_DIRS.split('|').map(|d| d.trim_start_matches('\\')))
        .map(|dir| format!("{}/{}", home, dir))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct CapabilityGate {
    sessions: Arc<SessionStore>,
    blocked: Vec<PathRule>,
    sensitive: Vec<PathRule>,
    /// Normalized extra prefixes: the user's own home dirs plus configured ones.
    sensitive_prefixes: Vec<String>,
    pending: Mutex<HashMap<String, PendingPermission>>,
    next_id: AtomicU64,
}

impl CapabilityGate {
    pub fn new(sessions: Arc<SessionStore>, extra_sensitive_paths: &[String]) -> Self {
        let mut sensitive_prefixes = home_sensitive_prefixes();
        sensitive_prefixes.extend(extra_sensitive_paths.iter().map(|p| normalize_path(p)));

        Self {
            sessions,
            blocked: blocked_rules(),
            sensitive: sensitive_rules(),
            sensitive_prefixes,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Decide whether `operation` on `path` may proceed for this session.
    /// A path that needs approval gets a pending request.
    pub fn classify(&self, session_id: &str, path: &str, operation: Operation) -> Classification {
        match self.check(session_id, path, operation) {
            Access::Allowed => Classification::Allowed,
            Access::Denied { reason } => Classification::Denied { reason },
            Access::NeedsApproval { reason } => {
                let pending_id =
                    self.register_pending(session_id, normalize_path(path), operation, reason);
                Classification::RequiresApproval { pending_id }
            }
        }
    }

    /// Same evaluation as [`classify`](Self::classify) without recording anything.
    pub fn check(&self, session_id: &str, path: &str, operation: Operation) -> Access {
        let normalized = normalize_path(path);

        if let Some(rule) = self.blocked.iter().find(|r| r.pattern.is_match(&normalized)) {
            debug!("Blocked {} on {} ({})", operation, normalized, rule.label);
            return Access::Denied {
                reason: format!("{} is a protected location ({})", path, rule.label),
            };
        }

        let session = self.sessions.get_or_create(session_id);
        {
            let decisions = session.decisions();
            if let Some(prefix) = decisions.denied_prefix_of(&normalized) {
                return Access::Denied {
                    reason: format!("access to {} was denied by the user", prefix),
                };
            }
            if decisions.is_approved(&normalized) {
                return Access::Allowed;
            }
        }

        match self.sensitivity(&normalized) {
            Some(label) => Access::NeedsApproval {
                reason: format!("{} access to a {}", operation, label),
            },
            None => Access::Allowed,
        }
    }

    /// First entry below `root` that is not allowed. Symlinks are not followed.
    pub fn first_restricted(
        &self,
        session_id: &str,
        root: &Path,
        operation: Operation,
    ) -> Option<(PathBuf, Access)> {
        WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .find_map(|entry| {
                let access = self.check(session_id, &entry.path().to_string_lossy(), operation);
                match access {
                    Access::Allowed => None,
                    access => Some((entry.into_path(), access)),
                }
            })
    }

    fn sensitivity(&self, normalized: &str) -> Option<&'static str> {
        if let Some(rule) = self.sensitive.iter().find(|r| r.pattern.is_match(normalized)) {
            return Some(rule.label);
        }
        self.sensitive_prefixes
            .iter()
            .any(|prefix| has_prefix(normalized, prefix))
            .then_some("protected location")
    }

    /// Create a pending request, reusing an open one for the same path and operation.
    fn register_pending(
        &self,
        session_id: &str,
        path: String,
        operation: Operation,
        reason: String,
    ) -> String {
        let mut pending = lock(&self.pending);
        if let Some(existing) = pending
            .values()
            .find(|p| p.session_id == session_id && p.path == path && p.operation == operation)
        {
            return existing.id.clone();
        }

        let id = format!("perm-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        info!("Permission {} requested: {} {} ({})", id, operation, path, reason);
        pending.insert(
            id.clone(),
            PendingPermission {
                id: id.clone(),
                path,
                operation,
                reason,
                session_id: session_id.to_string(),
                requested_at: Utc::now(),
            },
        );
        id
    }

    /// Grant the pending request. The path (and everything under it) becomes
    /// allowed for that session only.
    pub fn approve(&self, pending_id: &str) -> Result<PendingPermission, GateError> {
        let permission = self.take_pending(pending_id)?;
        let session = self.sessions.get_or_create(&permission.session_id);
        session.decisions().approve(&permission.path);
        info!("Permission {} approved: {}", permission.id, permission.path);
        Ok(permission)
    }

    /// Refuse the pending request. The path (and everything under it) is
    /// denied for that session until the session is cleared.
    pub fn deny(&self, pending_id: &str) -> Result<PendingPermission, GateError> {
        let permission = self.take_pending(pending_id)?;
        let session = self.sessions.get_or_create(&permission.session_id);
        session.decisions().deny(&permission.path);
        info!("Permission {} denied: {}", permission.id, permission.path);
        Ok(permission)
    }

    fn take_pending(&self, pending_id: &str) -> Result<PendingPermission, GateError> {
        lock(&self.pending)
            .remove(pending_id)
            .ok_or_else(|| GateError::NotFound(pending_id.to_string()))
    }

    pub fn pending(&self, pending_id: &str) -> Option<PendingPermission> {
        lock(&self.pending).get(pending_id).cloned()
    }

    /// Open requests for a session, oldest first.
    pub fn list_pending(&self, session_id: &str) -> Vec<PendingPermission> {
        let mut list: Vec<PendingPermission> = lock(&self.pending)
            .values()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then(a.id.cmp(&b.id)));
        list
    }

    /// Drop every open request belonging to a session.
    pub fn clear_session(&self, session_id: &str) {
        lock(&self.pending).retain(|_, p| p.session_id != session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> CapabilityGate {
        CapabilityGate::new(Arc::new(SessionStore::new()), &["/srv/secret".to_string()])
    }

    fn pending_id(classification: Classification) -> String {
        match classification {
            Classification::RequiresApproval { pending_id } => pending_id,
            other => panic!("expected approval request, got {:?}", other),
        }
    }

    #[test]
    fn test_blocked_paths_are_always_denied() {
        let gate = gate();
        for path in ["/etc/shadow", "/proc/1/mem", "/home/u/.ssh/id_ed25519", r"C:\Windows\System32"] {
            assert!(
                matches!(gate.classify("s1", path, Operation::Read), Classification::Denied { .. }),
                "{} should be blocked",
                path
            );
        }
    }

    #[test]
    fn test_ordinary_paths_are_allowed() {
        let gate = gate();
        assert_eq!(gate.classify("s1", "/tmp/work/a.txt", Operation::Write), Classification::Allowed);
        assert!(gate.list_pending("s1").is_empty());
    }

    #[test]
    fn test_approval_is_session_scoped() {
        let gate = gate();
        let path = "/home/u/Documents/x.txt";

        let id = pending_id(gate.classify("s1", path, Operation::Write));
        let pending = gate.list_pending("s1");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, "/home/u/documents/x.txt");

        gate.approve(&id).unwrap();
        assert_eq!(gate.classify("s1", path, Operation::Write), Classification::Allowed);
        assert!(matches!(
            gate.classify("s2", path, Operation::Write),
            Classification::RequiresApproval { .. }
        ));
    }

    #[test]
    fn test_approve_and_deny_are_single_use() {
        let gate = gate();
        let id = pending_id(gate.classify("s1", "/etc/hosts", Operation::Read));
        assert!(gate.approve(&id).is_ok());
        assert_eq!(gate.approve(&id), Err(GateError::NotFound(id.clone())));
        assert_eq!(gate.deny(&id), Err(GateError::NotFound(id.clone())));
        assert_eq!(gate.classify("s1", "/etc/hosts", Operation::Read), Classification::Allowed);
    }

    #[test]
    fn test_repeated_requests_share_one_pending_entry() {
        let gate = gate();
        let a = pending_id(gate.classify("s1", "/srv/secret/data", Operation::Read));
        let b = pending_id(gate.classify("s1", "/SRV/secret/./data", Operation::Read));
        assert_eq!(a, b);
        let c = pending_id(gate.classify("s1", "/srv/secret/data", Operation::Write));
        assert_ne!(a, c);
        assert_eq!(gate.list_pending("s1").len(), 2);
    }

    #[test]
    fn test_denied_prefix_wins_over_later_approvals() {
        let gate = gate();
        let denied = pending_id(gate.classify("s1", "/home/u/Desktop", Operation::List));
        gate.deny(&denied).unwrap();

        let other = pending_id(gate.classify("s1", "/home/u/Pictures/a.png", Operation::Read));
        gate.approve(&other).unwrap();

        for path in ["/home/u/Desktop", "/home/u/desktop/notes.txt", "/home/u/Desktop2"] {
            assert!(
                matches!(gate.classify("s1", path, Operation::Read), Classification::Denied { .. }),
                "{} should stay denied",
                path
            );
        }
        assert_eq!(
            gate.classify("s1", "/home/u/Pictures/a.png", Operation::Read),
            Classification::Allowed
        );
    }

    #[test]
    fn test_check_records_nothing() {
        let gate = gate();
        assert!(matches!(
            gate.check("s1", "/srv/secret/data", Operation::Read),
            Access::NeedsApproval { .. }
        ));
        assert!(matches!(
            gate.check("s1", "/etc/shadow", Operation::Read),
            Access::Denied { .. }
        ));
        assert_eq!(gate.check("s1", "/tmp/x", Operation::Read), Access::Allowed);
        assert!(gate.list_pending("s1").is_empty());
    }

    #[test]
    fn test_first_restricted_finds_nested_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/.ssh")).unwrap();
        std::fs::write(dir.path().join("a/.ssh/id_rsa"), "key").unwrap();
        std::fs::write(dir.path().join("a/notes.txt"), "n").unwrap();
        std::fs::create_dir_all(dir.path().join("clean")).unwrap();
        std::fs::write(dir.path().join("clean/b.txt"), "b").unwrap();

        let gate = gate();
        let (path, access) = gate
            .first_restricted("s1", dir.path(), Operation::Delete)
            .unwrap();
        assert!(path.ends_with("a/.ssh/id_rsa"));
        assert!(matches!(access, Access::Denied { .. }));
        assert!(gate
            .first_restricted("s1", &dir.path().join("clean"), Operation::Delete)
            .is_none());
        assert!(gate.list_pending("s1").is_empty());
    }

    #[test]
    fn test_clear_session_drops_pending() {
        let gate = gate();
        pending_id(gate.classify("s1", "/usr/local/bin/tool", Operation::Execute));
        pending_id(gate.classify("s2", "/usr/local/bin/tool", Operation::Execute));
        gate.clear_session("s1");
        assert!(gate.list_pending("s1").is_empty());
        assert_eq!(gate.list_pending("s2").len(), 1);
    }
}
