use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;

/// One discovered server address inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotNodeInfo {
    pub addr: String,
}

/// Point-in-time view of a subscribed service's server nodes, written on
/// every children change and on one-shot discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceNode {
    pub group: String,
    pub path: String,
    pub nodes: Vec<SnapshotNodeInfo>,
}

/// Where snapshots go. Persistence is the sink's business; the registry only
/// hands over the current view.
pub trait SnapshotSink: Send + Sync {
    fn save(
        &self,
        registry_id: &str,
        node_key: &str,
        node: ServiceNode,
    );
}

/// Keeps the latest snapshot per `(registry, node-key)` pair in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotSink {
    entries: DashMap<String, ServiceNode>,
}

impl MemorySnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        registry_id: &str,
        node_key: &str,
    ) -> Option<ServiceNode> {
        self.entries
            .get(&entry_key(registry_id, node_key))
            .map(|e| e.value().clone())
    }
}

impl SnapshotSink for MemorySnapshotSink {
    fn save(
        &self,
        registry_id: &str,
        node_key: &str,
        node: ServiceNode,
    ) {
        self.entries.insert(entry_key(registry_id, node_key), node);
    }
}

fn entry_key(
    registry_id: &str,
    node_key: &str,
) -> String {
    format!("{registry_id}|{node_key}")
}
