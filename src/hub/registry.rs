//! Set of live sessions, owned exclusively by the router task.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::envelope::SessionId;
use super::Frame;

/// Router-side state of one registered session.
///
/// Dropping the entry drops the only sender of the outbound queue, which is
/// how a session's queue gets closed.
pub(crate) struct SessionEntry {
    pub sender: mpsc::Sender<Frame>,
    pub subscriptions: HashSet<String>,
    pub registered_at: DateTime<Utc>,
}

impl SessionEntry {
    pub fn new(sender: mpsc::Sender<Frame>) -> Self {
        Self {
            sender,
            subscriptions: HashSet::new(),
            registered_at: Utc::now(),
        }
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.contains(topic)
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    sessions: HashMap<SessionId, SessionEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Returns false if the id was already present, in
    /// which case the existing entry is kept.
    pub fn add(&mut self, id: SessionId, entry: SessionEntry) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.sessions.insert(id, entry);
        true
    }

    /// Remove a session, handing back its entry. Absent ids are a no-op.
    pub fn remove(&mut self, id: &SessionId) -> Option<SessionEntry> {
        self.sessions.remove(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut SessionEntry> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Iterate over sessions for fan-out. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (&SessionId, &SessionEntry)> {
        self.sessions.iter()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    /// Remove every session, closing all outbound queues
    pub fn clear(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> (SessionEntry, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(4);
        (SessionEntry::new(tx), rx)
    }

    #[test]
    fn test_add_and_remove() {
        let mut registry = Registry::new();
        let id = SessionId::from("a");
        let (e, _rx) = entry();

        assert!(registry.add(id.clone(), e));
        assert!(registry.contains(&id));
        assert_eq!(registry.ids(), vec![id.clone()]);

        assert!(registry.remove(&id).is_some());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let mut registry = Registry::new();
        let id = SessionId::from("a");
        let (e, _rx) = entry();
        registry.add(id.clone(), e);

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_duplicate_add_keeps_first() {
        let mut registry = Registry::new();
        let id = SessionId::from("a");
        let (first, _rx1) = entry();
        let (second, _rx2) = entry();

        assert!(registry.add(id.clone(), first));
        assert!(!registry.add(id.clone(), second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_closes_queue() {
        let mut registry = Registry::new();
        let id = SessionId::from("a");
        let (e, mut rx) = entry();
        registry.add(id.clone(), e);

        drop(registry.remove(&id));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_closes_all_queues() {
        let mut registry = Registry::new();
        let (a, mut rx_a) = entry();
        let (b, mut rx_b) = entry();
        registry.add(SessionId::from("a"), a);
        registry.add(SessionId::from("b"), b);

        assert_eq!(registry.clear(), 2);
        assert!(rx_a.recv().await.is_none());
        assert!(rx_b.recv().await.is_none());
    }
}
