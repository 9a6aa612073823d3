//! The persistence contract and its in-memory implementation.
//!
//! The scan controller and the session edit flow both take an explicit
//! `Arc<dyn SessionStore>` rather than reaching for an ambient database
//! handle, so tests and embedders can substitute [`MemoryStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::watch;

use crate::models::Session;

/// Keyed by session id, last-write-wins. Mutation failures are reported,
/// never fatal to the caller's workflow.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Session>>;

    /// Insert-or-replace the full session record.
    async fn upsert(&self, session: &Session) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// All sessions, most recently updated first.
    async fn list(&self) -> Result<Vec<Session>>;

    /// Live stream of session-list snapshots, refreshed after every
    /// committed mutation.
    fn watch_all(&self) -> watch::Receiver<Vec<Session>>;
}

/// In-memory store for tests and embedding. Counts upsert attempts so
/// at-most-once write behavior can be asserted, and can be told to fail
/// writes to exercise the non-fatal persistence path.
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, Session>>,
    snapshot_tx: watch::Sender<Vec<Session>>,
    upserts: AtomicUsize,
    fail_upserts: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Vec::new());
        Self {
            sessions: Mutex::new(HashMap::new()),
            snapshot_tx,
            upserts: AtomicUsize::new(0),
            fail_upserts: AtomicBool::new(false),
        }
    }

    /// Number of upserts issued, including failed ones.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish_snapshot(&self, sessions: &HashMap<String, Session>) {
        let _ = self.snapshot_tx.send(sorted_snapshot(sessions));
    }
}

fn sorted_snapshot(sessions: &HashMap<String, Session>) -> Vec<Session> {
    let mut list: Vec<Session> = sessions.values().cloned().collect();
    list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
    list
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions().get(id).cloned())
    }

    async fn upsert(&self, session: &Session) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            bail!("simulated storage failure");
        }

        let mut sessions = self.sessions();
        sessions.insert(session.id.clone(), session.clone());
        self.publish_snapshot(&sessions);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions();
        sessions.remove(id);
        self.publish_snapshot(&sessions);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Session>> {
        Ok(sorted_snapshot(&self.sessions()))
    }

    fn watch_all(&self) -> watch::Receiver<Vec<Session>> {
        self.snapshot_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str, expected: &[&str]) -> Session {
        Session::new(name, expected.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn round_trips_sessions() {
        let store = MemoryStore::new();
        let a = session("first", &["A"]);

        store.upsert(&a).await.unwrap();
        assert_eq!(store.get(&a.id).await.unwrap().unwrap().name, "first");

        store.delete(&a.id).await.unwrap();
        assert!(store.get(&a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = MemoryStore::new();
        let mut a = session("first", &["A", "B"]);
        store.upsert(&a).await.unwrap();

        a.name = "renamed".to_string();
        store.upsert(&a).await.unwrap();

        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "renamed");
    }

    #[tokio::test]
    async fn watch_sees_every_committed_mutation() {
        let store = MemoryStore::new();
        let mut watcher = store.watch_all();
        assert!(watcher.borrow().is_empty());

        let a = session("first", &["A"]);
        store.upsert(&a).await.unwrap();
        watcher.changed().await.unwrap();
        assert_eq!(watcher.borrow_and_update().len(), 1);

        store.delete(&a.id).await.unwrap();
        watcher.changed().await.unwrap();
        assert!(watcher.borrow_and_update().is_empty());
    }

    #[tokio::test]
    async fn failed_upserts_do_not_mutate() {
        let store = MemoryStore::new();
        let a = session("first", &["A"]);
        store.set_fail_upserts(true);

        assert!(store.upsert(&a).await.is_err());
        assert!(store.get(&a.id).await.unwrap().is_none());
        assert_eq!(store.upsert_count(), 1);
    }
}
