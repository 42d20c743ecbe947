//! Per-conversation state: history plus the sandbox decisions made so far.
//! Nothing here is persisted.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::history::ConversationHistory;
use crate::sandbox::has_prefix;

/// Approved and denied path prefixes for one session (normalized form).
#[derive(Debug, Default, Clone)]
pub struct PathDecisions {
    approved: BTreeSet<String>,
    denied: BTreeSet<String>,
}

impl PathDecisions {
    pub fn approve(&mut self, prefix: &str) {
        self.denied.remove(prefix);
        self.approved.insert(prefix.to_string());
    }

    pub fn deny(&mut self, prefix: &str) {
        self.approved.remove(prefix);
        self.denied.insert(prefix.to_string());
    }

    pub fn is_approved(&self, path: &str) -> bool {
        self.approved.iter().any(|p| has_prefix(path, p))
    }

    pub fn denied_prefix_of(&self, path: &str) -> Option<&str> {
        self.denied
            .iter()
            .find(|p| has_prefix(path, p))
            .map(String::as_str)
    }

    pub fn approved(&self) -> impl Iterator<Item = &str> {
        self.approved.iter().map(String::as_str)
    }

    pub fn denied(&self) -> impl Iterator<Item = &str> {
        self.denied.iter().map(String::as_str)
    }
}

pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    history: tokio::sync::Mutex<ConversationHistory>,
    decisions: Mutex<PathDecisions>,
}

impl Session {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            created_at: Utc::now(),
            history: tokio::sync::Mutex::new(ConversationHistory::new()),
            decisions: Mutex::new(PathDecisions::default()),
        }
    }

    /// The history lock is held for a whole run, which serializes runs
    /// on the same conversation.
    pub fn history(&self) -> &tokio::sync::Mutex<ConversationHistory> {
        &self.history
    }

    pub fn decisions(&self) -> MutexGuard<'_, PathDecisions> {
        self.decisions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.get(id) {
            return session;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!("Creating session {}", id);
                Arc::new(Session::new(id))
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decisions_flip_between_sets() {
        let mut decisions = PathDecisions::default();
        decisions.deny("/home/u/documents");
        assert_eq!(
            decisions.denied_prefix_of("/home/u/documents/a"),
            Some("/home/u/documents")
        );
        decisions.approve("/home/u/documents");
        assert!(decisions.denied_prefix_of("/home/u/documents/a").is_none());
        assert!(decisions.is_approved("/home/u/documents/a"));
    }

    #[test]
    fn test_store_reuses_sessions() {
        let store = SessionStore::new();
        let a = store.get_or_create("c1");
        let b = store.get_or_create("c1");
        assert!(Arc::ptr_eq(&a, &b));
        store.get_or_create("c0");
        assert_eq!(store.list_ids(), vec!["c0", "c1"]);
        assert!(store.remove("c1").is_some());
        assert!(store.get("c1").is_none());
    }
}
