use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;
use zookeeper_client as zk;

use super::store::NamingStore;
use super::store::SessionEvent;
use super::store::StoreEvent;
use super::store::StoreWatcher;
use crate::errors::Result;
use crate::RegistryError;

const SESSION_EVENT_CAPACITY: usize = 16;

/// ZooKeeper-backed [`NamingStore`].
///
/// Holds one client connection. Session transitions from the client's state
/// watcher are forwarded into a broadcast channel so the registry's session
/// manager can react without owning the connection.
pub struct ZkStore {
    client: zk::Client,
    session_tx: broadcast::Sender<SessionEvent>,
}

impl ZkStore {
    /// Connects to a comma-separated `host:port` cluster list with the given
    /// session timeout.
    pub async fn connect(
        cluster: &str,
        session_timeout: Duration,
    ) -> Result<Self> {
        let client = zk::Client::connector()
            .session_timeout(session_timeout)
            .connect(cluster)
            .await
            .map_err(|e| RegistryError::Connect(e.to_string()))?;

        let (session_tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let mut state_watcher = client.state_watcher();
        let forward_tx = session_tx.clone();
        tokio::spawn(async move {
            loop {
                let state = state_watcher.changed().await;
                debug!("zookeeper session state: {state:?}");
                let event = match state {
                    zk::SessionState::SyncConnected | zk::SessionState::ConnectedReadOnly => {
                        SessionEvent::Connected
                    }
                    zk::SessionState::Disconnected => SessionEvent::Disconnected,
                    zk::SessionState::Expired | zk::SessionState::Closed => {
                        let _ = forward_tx.send(SessionEvent::Disconnected);
                        return;
                    }
                    _ => continue,
                };
                if forward_tx.send(event).is_err() {
                    return;
                }
            }
        });

        Ok(Self { client, session_tx })
    }
}

fn store_err(
    path: &str,
    err: zk::Error,
) -> crate::Error {
    match err {
        zk::Error::NoNode => RegistryError::NodeNotFound(path.to_string()).into(),
        other => RegistryError::Store(other.to_string()).into(),
    }
}

fn map_event(event: zk::WatchedEvent) -> StoreEvent {
    match event.event_type {
        zk::EventType::NodeChildrenChanged => StoreEvent::ChildrenChanged,
        zk::EventType::NodeDataChanged => StoreEvent::DataChanged,
        zk::EventType::NodeCreated => StoreEvent::Created,
        zk::EventType::NodeDeleted => StoreEvent::Deleted,
        _ => StoreEvent::NotWatching,
    }
}

#[async_trait]
impl NamingStore for ZkStore {
    async fn exists(
        &self,
        path: &str,
    ) -> Result<bool> {
        let stat = self.client.check_stat(path).await.map_err(|e| store_err(path, e))?;
        Ok(stat.is_some())
    }

    async fn create_ephemeral(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()> {
        self.client
            .create(path, data, &zk::CreateMode::Ephemeral.with_acls(zk::Acls::anyone_all()))
            .await
            .map_err(|e| store_err(path, e))?;
        Ok(())
    }

    async fn create_persistent(
        &self,
        path: &str,
    ) -> Result<()> {
        let options = zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all());
        match self.client.create(path, &[], &options).await {
            Ok(_) | Err(zk::Error::NodeExists) => Ok(()),
            Err(e) => Err(store_err(path, e)),
        }
    }

    async fn delete(
        &self,
        path: &str,
    ) -> Result<()> {
        self.client.delete(path, None).await.map_err(|e| store_err(path, e))
    }

    async fn get_data(
        &self,
        path: &str,
    ) -> Result<Vec<u8>> {
        let (data, _stat) = self.client.get_data(path).await.map_err(|e| store_err(path, e))?;
        Ok(data)
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()> {
        self.client
            .set_data(path, data, None)
            .await
            .map_err(|e| store_err(path, e))?;
        Ok(())
    }

    async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        self.client.list_children(path).await.map_err(|e| store_err(path, e))
    }

    async fn watch_children(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, StoreWatcher)> {
        let (children, watcher) = self
            .client
            .list_and_watch_children(path)
            .await
            .map_err(|e| store_err(path, e))?;
        let fut = async move { map_event(watcher.changed().await) };
        Ok((children, StoreWatcher::new(fut)))
    }

    async fn watch_data(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, StoreWatcher)> {
        let (data, _stat, watcher) = self
            .client
            .get_and_watch_data(path)
            .await
            .map_err(|e| store_err(path, e))?;
        let fut = async move { map_event(watcher.changed().await) };
        Ok((data, StoreWatcher::new(fut)))
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }
}
