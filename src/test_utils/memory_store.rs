use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::oneshot;

use crate::errors::Result;
use crate::registry::NamingStore;
use crate::registry::SessionEvent;
use crate::registry::StoreEvent;
use crate::registry::StoreWatcher;
use crate::RegistryError;

#[derive(Debug, Clone)]
struct NodeEntry {
    data: Vec<u8>,
    ephemeral: bool,
}

/// In-memory hierarchical store mirroring the semantics the registry relies
/// on: parent checks on create, one-shot watches, ephemeral reclamation and
/// watch invalidation on session loss.
pub struct MemoryStore {
    nodes: Mutex<HashMap<String, NodeEntry>>,
    child_watchers: Mutex<HashMap<String, Vec<oneshot::Sender<StoreEvent>>>>,
    data_watchers: Mutex<HashMap<String, Vec<oneshot::Sender<StoreEvent>>>>,
    session_tx: broadcast::Sender<SessionEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (session_tx, _) = broadcast::channel(16);
        Self {
            nodes: Mutex::new(HashMap::new()),
            child_watchers: Mutex::new(HashMap::new()),
            data_watchers: Mutex::new(HashMap::new()),
            session_tx,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates session loss: ephemeral nodes are reclaimed, every armed
    /// watch resolves to `NotWatching`, and a `Disconnected` event is
    /// broadcast.
    pub fn break_session(&self) {
        self.nodes
            .lock()
            .expect("nodes lock poisoned")
            .retain(|_, entry| !entry.ephemeral);
        for (_, senders) in self.child_watchers.lock().expect("watchers lock poisoned").drain() {
            for sender in senders {
                let _ = sender.send(StoreEvent::NotWatching);
            }
        }
        for (_, senders) in self.data_watchers.lock().expect("watchers lock poisoned").drain() {
            for sender in senders {
                let _ = sender.send(StoreEvent::NotWatching);
            }
        }
        let _ = self.session_tx.send(SessionEvent::Disconnected);
    }

    /// Simulates a fresh session after [`break_session`](Self::break_session).
    pub fn restore_session(&self) {
        let _ = self.session_tx.send(SessionEvent::Connected);
    }

    /// Direct node write for test setup, without parent checks.
    pub fn put_node(
        &self,
        path: &str,
        data: &[u8],
    ) {
        self.nodes.lock().expect("nodes lock poisoned").insert(
            path.to_string(),
            NodeEntry {
                data: data.to_vec(),
                ephemeral: false,
            },
        );
    }

    pub fn node_exists(
        &self,
        path: &str,
    ) -> bool {
        self.nodes.lock().expect("nodes lock poisoned").contains_key(path)
    }

    pub fn node_data(
        &self,
        path: &str,
    ) -> Option<Vec<u8>> {
        self.nodes
            .lock()
            .expect("nodes lock poisoned")
            .get(path)
            .map(|entry| entry.data.clone())
    }

    fn parent_of(path: &str) -> Option<&str> {
        match path.rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => Some(parent),
            _ => None,
        }
    }

    fn parent_missing(
        nodes: &HashMap<String, NodeEntry>,
        path: &str,
    ) -> bool {
        match Self::parent_of(path) {
            Some(parent) => !nodes.contains_key(parent),
            None => false,
        }
    }

    fn fire_child_watchers(
        &self,
        path: &str,
        event: StoreEvent,
    ) {
        if let Some(senders) = self
            .child_watchers
            .lock()
            .expect("watchers lock poisoned")
            .remove(path)
        {
            for sender in senders {
                let _ = sender.send(event);
            }
        }
    }

    fn fire_data_watchers(
        &self,
        path: &str,
        event: StoreEvent,
    ) {
        if let Some(senders) = self
            .data_watchers
            .lock()
            .expect("watchers lock poisoned")
            .remove(path)
        {
            for sender in senders {
                let _ = sender.send(event);
            }
        }
    }

    fn insert_node(
        &self,
        path: &str,
        data: &[u8],
        ephemeral: bool,
        ensure: bool,
    ) -> Result<()> {
        {
            let mut nodes = self.nodes.lock().expect("nodes lock poisoned");
            if nodes.contains_key(path) {
                if ensure {
                    return Ok(());
                }
                return Err(RegistryError::Store(format!("node exists: {path}")).into());
            }
            if Self::parent_missing(&nodes, path) {
                return Err(RegistryError::NodeNotFound(
                    Self::parent_of(path).unwrap_or_default().to_string(),
                )
                .into());
            }
            nodes.insert(
                path.to_string(),
                NodeEntry {
                    data: data.to_vec(),
                    ephemeral,
                },
            );
        }
        if let Some(parent) = Self::parent_of(path) {
            self.fire_child_watchers(parent, StoreEvent::ChildrenChanged);
        }
        self.fire_data_watchers(path, StoreEvent::Created);
        Ok(())
    }

    fn list_children(
        &self,
        path: &str,
    ) -> Vec<String> {
        let prefix = format!("{path}/");
        let nodes = self.nodes.lock().expect("nodes lock poisoned");
        let mut children: Vec<String> = nodes
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect();
        children.sort();
        children
    }
}

#[async_trait]
impl NamingStore for MemoryStore {
    async fn exists(
        &self,
        path: &str,
    ) -> Result<bool> {
        Ok(self.node_exists(path))
    }

    async fn create_ephemeral(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()> {
        self.insert_node(path, data, true, false)
    }

    async fn create_persistent(
        &self,
        path: &str,
    ) -> Result<()> {
        self.insert_node(path, &[], false, true)
    }

    async fn delete(
        &self,
        path: &str,
    ) -> Result<()> {
        let removed = self.nodes.lock().expect("nodes lock poisoned").remove(path);
        if removed.is_none() {
            return Err(RegistryError::NodeNotFound(path.to_string()).into());
        }
        if let Some(parent) = Self::parent_of(path) {
            self.fire_child_watchers(parent, StoreEvent::ChildrenChanged);
        }
        self.fire_data_watchers(path, StoreEvent::Deleted);
        Ok(())
    }

    async fn get_data(
        &self,
        path: &str,
    ) -> Result<Vec<u8>> {
        self.node_data(path)
            .ok_or_else(|| RegistryError::NodeNotFound(path.to_string()).into())
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()> {
        {
            let mut nodes = self.nodes.lock().expect("nodes lock poisoned");
            let entry = nodes
                .get_mut(path)
                .ok_or_else(|| crate::Error::from(RegistryError::NodeNotFound(path.to_string())))?;
            entry.data = data.to_vec();
        }
        self.fire_data_watchers(path, StoreEvent::DataChanged);
        Ok(())
    }

    async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        if !self.node_exists(path) {
            return Err(RegistryError::NodeNotFound(path.to_string()).into());
        }
        Ok(self.list_children(path))
    }

    async fn watch_children(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, StoreWatcher)> {
        if !self.node_exists(path) {
            return Err(RegistryError::NodeNotFound(path.to_string()).into());
        }
        let children = self.list_children(path);
        let (tx, rx) = oneshot::channel();
        self.child_watchers
            .lock()
            .expect("watchers lock poisoned")
            .entry(path.to_string())
            .or_default()
            .push(tx);
        let watcher = StoreWatcher::new(async move { rx.await.unwrap_or(StoreEvent::NotWatching) });
        Ok((children, watcher))
    }

    async fn watch_data(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, StoreWatcher)> {
        let data = self
            .node_data(path)
            .ok_or_else(|| crate::Error::from(RegistryError::NodeNotFound(path.to_string())))?;
        let (tx, rx) = oneshot::channel();
        self.data_watchers
            .lock()
            .expect("watchers lock poisoned")
            .entry(path.to_string())
            .or_default()
            .push(tx);
        let watcher = StoreWatcher::new(async move { rx.await.unwrap_or(StoreEvent::NotWatching) });
        Ok((data, watcher))
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }
}
