//! Naming-store seam.
//!
//! Every ZooKeeper interaction the registry performs goes through
//! [`NamingStore`], so the registry's state machines can be exercised
//! against an in-memory store while production runs against
//! [`ZkStore`](super::ZkStore). Watches are one-shot, like the underlying
//! store's: consuming an event disarms the watch and the observer re-arms by
//! issuing a fresh watch call.

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::broadcast;

use crate::errors::Result;

/// Connection-level session transitions, fanned out to the registry's
/// session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Disconnected,
    Connected,
}

/// What a one-shot watch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    ChildrenChanged,
    DataChanged,
    Created,
    Deleted,
    /// The store gave up the watch, typically during session churn
    NotWatching,
}

/// One-shot watch handle. Resolves exactly once; a dropped producer resolves
/// to [`StoreEvent::NotWatching`].
pub struct StoreWatcher {
    inner: BoxFuture<'static, StoreEvent>,
}

impl StoreWatcher {
    pub fn new(fut: impl Future<Output = StoreEvent> + Send + 'static) -> Self {
        Self { inner: fut.boxed() }
    }

    pub async fn changed(self) -> StoreEvent {
        self.inner.await
    }
}

/// Hierarchical naming store used by the registry.
///
/// Error contract: `NodeNotFound` is reserved for missing paths (callers
/// walk parents up on it); every other failure maps to
/// [`RegistryError::Store`](crate::RegistryError::Store).
#[async_trait]
pub trait NamingStore: Send + Sync {
    async fn exists(
        &self,
        path: &str,
    ) -> Result<bool>;

    /// Creates an ephemeral leaf node bound to the current session.
    async fn create_ephemeral(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()>;

    /// Ensures a persistent node exists. Creating an already-present node is
    /// not an error; a missing parent is `NodeNotFound`.
    async fn create_persistent(
        &self,
        path: &str,
    ) -> Result<()>;

    async fn delete(
        &self,
        path: &str,
    ) -> Result<()>;

    async fn get_data(
        &self,
        path: &str,
    ) -> Result<Vec<u8>>;

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()>;

    async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<String>>;

    /// Lists children and arms a one-shot children watch on the path.
    async fn watch_children(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, StoreWatcher)>;

    /// Reads data and arms a one-shot data watch on the path.
    async fn watch_data(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, StoreWatcher)>;

    /// Subscribes to session transitions of the underlying connection.
    fn session_events(&self) -> broadcast::Receiver<SessionEvent>;
}
