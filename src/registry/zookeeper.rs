//! ZooKeeper-backed service registry.
//!
//! Architecture: two independent state machines behind disjoint locks plus a
//! session manager task.
//!
//! ```text
//! Session manager (one task per registry):
//!   store session events -> availability flag -> recover_service / recover_subscribe
//!
//! Registration state (registration lock):
//!   register/unregister/available/unavailable -> ephemeral node transitions
//!
//! Subscription state (subscription lock):
//!   subscribe/unsubscribe -> per-path watcher tasks -> listener notifications
//! ```
//!
//! Watcher tasks hold no locks while waiting. They select between the
//! store's one-shot watch and a per-path switch channel; a switch message
//! cancels the watcher, which removes its own switch entry on the way out.
//! Store failures never propagate to callers: the operation logs and becomes
//! a no-op, and session recovery replays the intended state later.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::node_info::decode_node_info;
use super::paths;
use super::snapshot::ServiceNode;
use super::snapshot::SnapshotNodeInfo;
use super::snapshot::SnapshotSink;
use super::store::NamingStore;
use super::store::SessionEvent;
use super::store::StoreEvent;
use super::store::StoreWatcher;
use super::zk_store::ZkStore;
use crate::constants::*;
use crate::errors::Result;
use crate::rpc::CommandNotifyListener;
use crate::rpc::CommandType;
use crate::rpc::NotifyListener;
use crate::rpc::Url;
use crate::utils::net::local_ip;

/// Service registry contract consumed by servers (register/available) and
/// clients (subscribe/discover). All operations are best-effort: store
/// failures are logged and absorbed, and the registry converges again
/// through session recovery.
#[async_trait]
pub trait Registry: Send + Sync {
    fn name(&self) -> &'static str;

    fn url(&self) -> Url;

    fn set_url(
        &self,
        url: Url,
    );

    fn is_available(&self) -> bool;

    /// Snapshot persistence is the sink's business; nothing to start here.
    fn start_snapshot(&self) {}

    async fn register(
        &self,
        url: &Url,
    );

    async fn unregister(
        &self,
        url: &Url,
    );

    /// Advertises the given URL as serving, or every registered URL when
    /// `None`.
    async fn available(
        &self,
        url: Option<&Url>,
    );

    /// Withdraws the given URL from serving, or every registered URL when
    /// `None`.
    async fn unavailable(
        &self,
        url: Option<&Url>,
    );

    async fn registered_services(&self) -> Vec<Url>;

    async fn subscribe(
        &self,
        url: &Url,
        listener: Arc<dyn NotifyListener>,
    );

    async fn unsubscribe(
        &self,
        url: &Url,
        listener: &dyn NotifyListener,
    );

    /// One-shot discovery of the current server nodes. Leaves no watcher
    /// behind.
    async fn discover(
        &self,
        url: &Url,
    ) -> Vec<Url>;

    async fn subscribe_command(
        &self,
        url: &Url,
        listener: Arc<dyn CommandNotifyListener>,
    );

    async fn unsubscribe_command(
        &self,
        url: &Url,
        listener: &dyn CommandNotifyListener,
    );

    /// Reads the current command payload, or `""` on any error.
    async fn discover_command(
        &self,
        url: &Url,
    ) -> String;

    /// Stops the session manager. Live watchers drain through their own
    /// cancellation paths. Idempotent.
    fn destroy(&self);
}

#[derive(Default)]
struct RegisterState {
    /// identity -> URL of every registered service
    registered: HashMap<String, Url>,
    /// identity -> URL of services currently advertised as serving
    available: HashMap<String, Url>,
}

type ServiceListeners = HashMap<String, (Arc<dyn NotifyListener>, Url)>;
type CommandListeners = HashMap<String, (Arc<dyn CommandNotifyListener>, Url)>;

#[derive(Default)]
struct SubscribeState {
    /// service path -> listener identity -> (listener, subscription URL)
    services: HashMap<String, ServiceListeners>,
    /// command path -> listener identity -> (listener, subscription URL)
    commands: HashMap<String, CommandListeners>,
    /// path -> cancellation channel of the watcher owning that path
    switches: HashMap<String, mpsc::Sender<bool>>,
}

struct Inner {
    url: RwLock<Url>,
    store: Arc<dyn NamingStore>,
    snapshots: Arc<dyn SnapshotSink>,
    available: AtomicBool,
    register: Mutex<RegisterState>,
    subscribe: Mutex<SubscribeState>,
    shutdown_tx: watch::Sender<bool>,
}

pub struct ZkRegistry {
    inner: Arc<Inner>,
}

impl ZkRegistry {
    /// Connects to the ZooKeeper cluster named by the registry URL's address
    /// field (comma-separated list) with the URL's `sessionTimeout` seconds
    /// (default 1000).
    pub async fn connect(
        url: Url,
        snapshots: Arc<dyn SnapshotSink>,
    ) -> Result<Self> {
        let session_timeout = Duration::from_secs(
            url.positive_int_param(SESSION_TIMEOUT_KEY, DEFAULT_SESSION_TIMEOUT_SECS),
        );
        let store = Arc::new(ZkStore::connect(&url.address(), session_timeout).await?);
        Ok(Self::with_store(url, store, snapshots))
    }

    /// Builds a registry over an already-connected store. The store is
    /// assumed healthy, so the registry starts out available.
    pub fn with_store(
        url: Url,
        store: Arc<dyn NamingStore>,
        snapshots: Arc<dyn SnapshotSink>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            url: RwLock::new(url),
            store,
            snapshots,
            available: AtomicBool::new(true),
            register: Mutex::new(RegisterState::default()),
            subscribe: Mutex::new(SubscribeState::default()),
            shutdown_tx,
        });

        let session_events = inner.store.session_events();
        let session_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let fut = session_loop(session_inner, session_events, shutdown_rx);
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                error!("session manager panicked: {}", panic_message(&panic));
            }
        });

        Self { inner }
    }
}

impl Drop for ZkRegistry {
    fn drop(&mut self) {
        let _ = self.inner.shutdown_tx.send(true);
    }
}

#[cfg(test)]
impl ZkRegistry {
    /// A switch entry exists for the path (for testing)
    pub(crate) async fn has_switch(
        &self,
        path: &str,
    ) -> bool {
        self.inner.subscribe.lock().await.switches.contains_key(path)
    }

    /// A watcher task currently owns the path's switch (for testing)
    pub(crate) async fn watcher_running(
        &self,
        path: &str,
    ) -> bool {
        let state = self.inner.subscribe.lock().await;
        matches!(state.switches.get(path), Some(tx) if !tx.is_closed())
    }

    /// Number of listeners subscribed under the service path (for testing)
    pub(crate) async fn listener_count(
        &self,
        path: &str,
    ) -> usize {
        let state = self.inner.subscribe.lock().await;
        state.services.get(path).map(HashMap::len).unwrap_or(0)
    }
}

#[async_trait]
impl Registry for ZkRegistry {
    fn name(&self) -> &'static str {
        "zookeeper"
    }

    fn url(&self) -> Url {
        self.inner.registry_url()
    }

    fn set_url(
        &self,
        url: Url,
    ) {
        *self.inner.url.write().expect("registry url lock poisoned") = url;
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn register(
        &self,
        url: &Url,
    ) {
        if !self.inner.is_available() {
            return;
        }
        let mut state = self.inner.register.lock().await;
        if state.registered.contains_key(&url.identity()) {
            return;
        }
        info!("register service. url:{}", url.identity());
        self.inner.do_register(url).await;
        state.registered.insert(url.identity(), url.clone());
    }

    async fn unregister(
        &self,
        url: &Url,
    ) {
        if !self.inner.is_available() {
            return;
        }
        let mut state = self.inner.register.lock().await;
        if state.registered.remove(&url.identity()).is_none() {
            return;
        }
        info!("unregister service. url:{}", url.identity());
        self.inner.remove_node(url, NODE_TYPE_SERVER).await;
        self.inner.remove_node(url, NODE_TYPE_UNAVAILABLE_SERVER).await;
        state.available.remove(&url.identity());
    }

    async fn available(
        &self,
        url: Option<&Url>,
    ) {
        if !self.inner.is_available() {
            return;
        }
        let mut state = self.inner.register.lock().await;
        let targets: Vec<Url> = match url {
            None => {
                info!("available all registered services");
                state.registered.values().cloned().collect()
            }
            Some(u) => {
                info!("available service. url:{}", u.identity());
                vec![u.clone()]
            }
        };
        for target in targets {
            self.inner.remove_node(&target, NODE_TYPE_UNAVAILABLE_SERVER).await;
            self.inner.create_node(&target, NODE_TYPE_SERVER).await;
            state.available.insert(target.identity(), target);
        }
    }

    async fn unavailable(
        &self,
        url: Option<&Url>,
    ) {
        if !self.inner.is_available() {
            return;
        }
        let mut state = self.inner.register.lock().await;
        let targets: Vec<Url> = match url {
            None => {
                info!("unavailable all registered services");
                state.registered.values().cloned().collect()
            }
            Some(u) => {
                info!("unavailable service. url:{}", u.identity());
                vec![u.clone()]
            }
        };
        for target in targets {
            self.inner.remove_node(&target, NODE_TYPE_SERVER).await;
            self.inner.create_node(&target, NODE_TYPE_UNAVAILABLE_SERVER).await;
            state.available.remove(&target.identity());
        }
    }

    async fn registered_services(&self) -> Vec<Url> {
        let state = self.inner.register.lock().await;
        state.registered.values().cloned().collect()
    }

    async fn subscribe(
        &self,
        url: &Url,
        listener: Arc<dyn NotifyListener>,
    ) {
        if !self.inner.is_available() {
            return;
        }
        let mut state = self.inner.subscribe.lock().await;
        let service_path = paths::node_type_path(url, NODE_TYPE_SERVER);
        if let Some(listeners) = state.services.get_mut(&service_path) {
            info!(
                "subscribe service joins existing watch. path:{}, listener:{}",
                service_path,
                listener.identity()
            );
            listeners.insert(listener.identity(), (listener, url.clone()));
            return;
        }
        let mut listeners: ServiceListeners = HashMap::new();
        listeners.insert(listener.identity(), (listener, url.clone()));
        state.services.insert(service_path, listeners);
        info!("subscribe service. url:{}", url.identity());
        self.inner.do_subscribe(&mut state, url).await;
    }

    async fn unsubscribe(
        &self,
        url: &Url,
        listener: &dyn NotifyListener,
    ) {
        if !self.inner.is_available() {
            return;
        }
        let mut guard = self.inner.subscribe.lock().await;
        let state = &mut *guard;
        let service_path = paths::node_type_path(url, NODE_TYPE_SERVER);
        if let Some(listeners) = state.services.get_mut(&service_path) {
            info!("unsubscribe service. url:{}", url.identity());
            listeners.remove(&listener.identity());
            if listeners.is_empty() {
                if let Some(switch_tx) = state.switches.get(&service_path) {
                    let _ = switch_tx.send(false).await;
                }
                state.services.remove(&service_path);
            }
        }
    }

    async fn discover(
        &self,
        url: &Url,
    ) -> Vec<Url> {
        if !self.inner.is_available() {
            return Vec::new();
        }
        let _guard = self.inner.subscribe.lock().await;
        let node_path = paths::node_type_path(url, NODE_TYPE_SERVER);
        match self.inner.store.children(&node_path).await {
            Ok(children) => {
                self.inner.save_snapshot(&children, url);
                self.inner.children_to_urls(url, &node_path, &children).await
            }
            Err(e) => {
                error!("discover service failed. url:{}, err:{}", url.identity(), e);
                Vec::new()
            }
        }
    }

    async fn subscribe_command(
        &self,
        url: &Url,
        listener: Arc<dyn CommandNotifyListener>,
    ) {
        if !self.inner.is_available() {
            return;
        }
        let mut state = self.inner.subscribe.lock().await;
        let command_path = command_path_of(url);
        if let Some(listeners) = state.commands.get_mut(&command_path) {
            info!(
                "subscribe command joins existing watch. path:{}, listener:{}",
                command_path,
                listener.identity()
            );
            listeners.insert(listener.identity(), (listener, url.clone()));
            return;
        }
        let mut listeners: CommandListeners = HashMap::new();
        listeners.insert(listener.identity(), (listener, url.clone()));
        state.commands.insert(command_path.clone(), listeners);
        info!("subscribe command. path:{}, url:{}", command_path, url.identity());
        self.inner.do_subscribe_command(&mut state, url).await;
    }

    async fn unsubscribe_command(
        &self,
        url: &Url,
        listener: &dyn CommandNotifyListener,
    ) {
        if !self.inner.is_available() {
            return;
        }
        let mut guard = self.inner.subscribe.lock().await;
        let state = &mut *guard;
        let command_path = command_path_of(url);
        if let Some(listeners) = state.commands.get_mut(&command_path) {
            info!("unsubscribe command. url:{}", url.identity());
            listeners.remove(&listener.identity());
            if listeners.is_empty() {
                if let Some(switch_tx) = state.switches.get(&command_path) {
                    let _ = switch_tx.send(false).await;
                }
                state.commands.remove(&command_path);
            }
        }
    }

    async fn discover_command(
        &self,
        url: &Url,
    ) -> String {
        if !self.inner.is_available() {
            return String::new();
        }
        let command_path = command_path_of(url);
        match self.inner.store.exists(&command_path).await {
            Ok(true) => {}
            Ok(false) => {
                error!("discover command on missing path:{}", command_path);
                return String::new();
            }
            Err(e) => {
                error!("check command path failed. path:{}, err:{}", command_path, e);
                return String::new();
            }
        }
        match self.inner.store.get_data(&command_path).await {
            Ok(data) => {
                info!("discover command. path:{}", command_path);
                decode_node_info(&data)
            }
            Err(e) => {
                error!("discover command failed. url:{}, err:{}", url.identity(), e);
                String::new()
            }
        }
    }

    fn destroy(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }
}

impl Inner {
    fn registry_url(&self) -> Url {
        self.url.read().expect("registry url lock poisoned").clone()
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn set_available(
        &self,
        available: bool,
    ) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Replays registrations after a fresh session: re-register everything,
    /// then re-advertise whatever was available.
    async fn recover_service(&self) {
        let state = self.register.lock().await;
        for url in state.registered.values() {
            self.do_register(url).await;
        }
        if !state.registered.is_empty() {
            info!("recovered {} registered services", state.registered.len());
        }
        for url in state.available.values() {
            self.remove_node(url, NODE_TYPE_UNAVAILABLE_SERVER).await;
            self.create_node(url, NODE_TYPE_SERVER).await;
        }
        if !state.available.is_empty() {
            info!("recovered {} available services", state.available.len());
        }
    }

    /// Replays subscriptions after a fresh session. Paths whose watcher is
    /// still alive are skipped inside `do_subscribe`.
    async fn recover_subscribe(self: &Arc<Self>) {
        let mut state = self.subscribe.lock().await;
        let service_urls: Vec<Url> = state
            .services
            .values()
            .flat_map(|listeners| listeners.values().map(|(_, url)| url.clone()))
            .collect();
        for url in &service_urls {
            self.do_subscribe(&mut state, url).await;
        }
        if !service_urls.is_empty() {
            info!("recovered service subscriptions");
        }
        let command_urls: Vec<Url> = state
            .commands
            .values()
            .flat_map(|listeners| listeners.values().map(|(_, url)| url.clone()))
            .collect();
        for url in &command_urls {
            self.do_subscribe_command(&mut state, url).await;
        }
        if !command_urls.is_empty() {
            info!("recovered command subscriptions");
        }
    }

    async fn do_register(
        &self,
        url: &Url,
    ) {
        if url.group.is_empty() || url.path.is_empty() || url.host.is_empty() {
            error!("register service with incomplete url:{}", url.identity());
        }
        if url.is_agent() {
            self.create_node(url, NODE_TYPE_AGENT).await;
        } else {
            self.remove_node(url, NODE_TYPE_SERVER).await;
            self.create_node(url, NODE_TYPE_UNAVAILABLE_SERVER).await;
        }
    }

    async fn do_subscribe(
        self: &Arc<Self>,
        state: &mut SubscribeState,
        url: &Url,
    ) {
        let service_path = paths::node_type_path(url, NODE_TYPE_SERVER);
        match self.store.exists(&service_path).await {
            Ok(true) => {}
            Ok(false) => {
                error!("subscribe service path missing. path:{}", service_path);
                return;
            }
            Err(e) => {
                error!("check service path failed. path:{}, err:{}", service_path, e);
                return;
            }
        }

        // Advertise this consumer: a subscriber always registers as referer,
        // falling back to the local IP when it carries no host of its own.
        let mut consumer = url.clone();
        consumer.put_param(NODE_TYPE_KEY, NODE_TYPE_REFERER);
        if consumer.host.is_empty() {
            consumer.host = local_ip();
        }
        self.create_node(&consumer, NODE_TYPE_CLIENT).await;

        if matches!(state.switches.get(&service_path), Some(tx) if !tx.is_closed()) {
            debug!("service watcher already running. path:{}", service_path);
            return;
        }
        let (_, watcher) = match self.store.watch_children(&service_path).await {
            Ok(armed) => armed,
            Err(e) => {
                error!("watch server nodes failed. path:{}, err:{}", service_path, e);
                return;
            }
        };
        let (switch_tx, switch_rx) = mpsc::channel(1);
        state.switches.insert(service_path.clone(), switch_tx);
        info!("start watching server nodes. path:{}", service_path);

        let task = Arc::clone(self);
        let subscription_url = url.clone();
        tokio::spawn(async move {
            let fut = task.service_watch_loop(service_path, subscription_url, watcher, switch_rx);
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                error!("service watcher panicked: {}", panic_message(&panic));
            }
        });
    }

    /// Per-path service watcher. Re-arms the children watch on every change,
    /// snapshots, and notifies the current listener set. Exits on a store
    /// `NotWatching` event or on cancellation through the switch channel.
    async fn service_watch_loop(
        self: Arc<Self>,
        service_path: String,
        url: Url,
        watcher: StoreWatcher,
        mut switch_rx: mpsc::Receiver<bool>,
    ) {
        let mut active = Some(watcher);
        loop {
            match active.take() {
                Some(armed) => {
                    tokio::select! {
                        event = armed.changed() => {
                            match event {
                                StoreEvent::ChildrenChanged => {
                                    active = self.handle_children_changed(&service_path, &url).await;
                                }
                                StoreEvent::NotWatching => {
                                    info!("store stopped watching server nodes. path:{}", service_path);
                                    return;
                                }
                                other => {
                                    debug!("ignore watch event {:?}. path:{}", other, service_path);
                                    active = self.rearm_children_watch(&service_path).await;
                                }
                            }
                        },
                        _ = switch_rx.recv() => {
                            self.finish_watch(&service_path).await;
                            return;
                        }
                    }
                }
                // The store watch is gone; only cancellation ends the task.
                None => {
                    switch_rx.recv().await;
                    self.finish_watch(&service_path).await;
                    return;
                }
            }
        }
    }

    /// Re-reads children (re-arming the watch), snapshots, and notifies the
    /// current listener set. Returns the re-armed watch, if any.
    async fn handle_children_changed(
        &self,
        service_path: &str,
        url: &Url,
    ) -> Option<StoreWatcher> {
        let (children, next) = match self.store.watch_children(service_path).await {
            Ok(armed) => armed,
            Err(e) => {
                error!("rewatch server nodes failed. path:{}, err:{}", service_path, e);
                return None;
            }
        };
        self.save_snapshot(&children, url);
        if children.is_empty() {
            return Some(next);
        }

        let listeners: Vec<Arc<dyn NotifyListener>> = {
            let state = self.subscribe.lock().await;
            state
                .services
                .get(service_path)
                .map(|m| m.values().map(|(l, _)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };
        if listeners.is_empty() {
            return Some(next);
        }

        let urls = self.children_to_urls(url, service_path, &children).await;
        let registry_url = self.registry_url();
        debug!("notify server nodes. path:{}, nodes:{:?}", service_path, children);
        for listener in listeners {
            listener.notify(&registry_url, urls.clone());
        }
        Some(next)
    }

    async fn rearm_children_watch(
        &self,
        service_path: &str,
    ) -> Option<StoreWatcher> {
        match self.store.watch_children(service_path).await {
            Ok((_, next)) => Some(next),
            Err(e) => {
                error!("rewatch server nodes failed. path:{}, err:{}", service_path, e);
                None
            }
        }
    }

    async fn do_subscribe_command(
        self: &Arc<Self>,
        state: &mut SubscribeState,
        url: &Url,
    ) {
        let command_path = command_path_of(url);
        match self.store.exists(&command_path).await {
            Ok(true) => {}
            Ok(false) => self.ensure_persistent(&command_path, false).await,
            Err(e) => {
                error!("check command path failed. path:{}, err:{}", command_path, e);
                return;
            }
        }

        if matches!(state.switches.get(&command_path), Some(tx) if !tx.is_closed()) {
            debug!("command watcher already running. path:{}", command_path);
            return;
        }
        let (_, watcher) = match self.store.watch_data(&command_path).await {
            Ok(armed) => armed,
            Err(e) => {
                error!("watch command failed. path:{}, err:{}", command_path, e);
                return;
            }
        };
        let (switch_tx, switch_rx) = mpsc::channel(1);
        state.switches.insert(command_path.clone(), switch_tx);
        info!("start watching command. path:{}", command_path);

        let task = Arc::clone(self);
        let subscription_url = url.clone();
        tokio::spawn(async move {
            let fut = task.command_watch_loop(command_path, subscription_url, watcher, switch_rx);
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                error!("command watcher panicked: {}", panic_message(&panic));
            }
        });
    }

    /// Per-path command watcher. Decodes the payload on every data change
    /// and delivers it to the current command-listener set.
    async fn command_watch_loop(
        self: Arc<Self>,
        command_path: String,
        url: Url,
        watcher: StoreWatcher,
        mut switch_rx: mpsc::Receiver<bool>,
    ) {
        let mut active = Some(watcher);
        loop {
            match active.take() {
                Some(armed) => {
                    tokio::select! {
                        event = armed.changed() => {
                            match event {
                                StoreEvent::DataChanged => {
                                    active = self.handle_command_changed(&command_path, &url).await;
                                }
                                StoreEvent::NotWatching => {
                                    info!("store stopped watching command. path:{}", command_path);
                                    return;
                                }
                                other => {
                                    debug!("ignore watch event {:?}. path:{}", other, command_path);
                                    active = self.rearm_data_watch(&command_path).await;
                                }
                            }
                        },
                        _ = switch_rx.recv() => {
                            self.finish_watch(&command_path).await;
                            return;
                        }
                    }
                }
                None => {
                    switch_rx.recv().await;
                    self.finish_watch(&command_path).await;
                    return;
                }
            }
        }
    }

    /// Re-reads the command payload (re-arming the watch) and delivers it to
    /// the current command-listener set. Returns the re-armed watch, if any.
    async fn handle_command_changed(
        &self,
        command_path: &str,
        url: &Url,
    ) -> Option<StoreWatcher> {
        let (data, next) = match self.store.watch_data(command_path).await {
            Ok(armed) => armed,
            Err(e) => {
                error!("rewatch command failed. path:{}, err:{}", command_path, e);
                return None;
            }
        };
        if data.is_empty() {
            return Some(next);
        }

        let listeners: Vec<Arc<dyn CommandNotifyListener>> = {
            let state = self.subscribe.lock().await;
            state
                .commands
                .get(command_path)
                .map(|m| m.values().map(|(l, _)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };
        if listeners.is_empty() {
            return Some(next);
        }

        let command = decode_node_info(&data);
        debug!("command changed. path:{}, command:{}", command_path, command);
        for listener in listeners {
            listener.notify_command(url, CommandType::Service, command.clone());
        }
        Some(next)
    }

    async fn rearm_data_watch(
        &self,
        command_path: &str,
    ) -> Option<StoreWatcher> {
        match self.store.watch_data(command_path).await {
            Ok((_, next)) => Some(next),
            Err(e) => {
                error!("rewatch command failed. path:{}, err:{}", command_path, e);
                None
            }
        }
    }

    /// Cancellation epilogue: the watcher removes its own switch entry.
    async fn finish_watch(
        &self,
        path: &str,
    ) {
        let mut state = self.subscribe.lock().await;
        state.switches.remove(path);
        info!("watcher cancelled. path:{}", path);
    }

    /// Converts child node names into URLs. A child with payload parses via
    /// the node-info codec; an empty payload synthesizes a URL from the
    /// subscription URL and the child's `host[:port]` name. Entries with
    /// neither host nor port are dropped.
    async fn children_to_urls(
        &self,
        url: &Url,
        parent_path: &str,
        children: &[String],
    ) -> Vec<Url> {
        let mut urls = Vec::with_capacity(children.len());
        for child in children {
            let child_path = format!("{parent_path}/{child}");
            let data = match self.store.get_data(&child_path).await {
                Ok(data) => data,
                Err(e) => {
                    error!("read node data failed. path:{}, err:{}", child_path, e);
                    continue;
                }
            };
            let info = decode_node_info(&data);
            let node_url = if !info.is_empty() {
                match Url::from_ext_info(&info) {
                    Some(parsed) => parsed,
                    None => {
                        error!("malformed node payload. path:{}", child_path);
                        continue;
                    }
                }
            } else {
                let mut synthesized = url.clone();
                match child.split_once(':') {
                    Some((host, port)) => {
                        synthesized.host = host.to_string();
                        synthesized.port = port.parse().unwrap_or(0);
                    }
                    None => {
                        synthesized.host = child.clone();
                        synthesized.port = 80;
                    }
                }
                synthesized
            };
            if node_url.port != 0 || !node_url.host.is_empty() {
                urls.push(node_url);
            }
        }
        urls
    }

    fn save_snapshot(
        &self,
        children: &[String],
        url: &Url,
    ) {
        let node = ServiceNode {
            group: url.group.clone(),
            path: url.path.clone(),
            nodes: children
                .iter()
                .map(|addr| SnapshotNodeInfo { addr: addr.clone() })
                .collect(),
        };
        self.snapshots
            .save(&self.registry_url().identity(), &paths::node_key(url), node);
    }

    async fn remove_node(
        &self,
        url: &Url,
        node_type: &str,
    ) {
        let node_path = if node_type == NODE_TYPE_AGENT {
            paths::agent_node_path(url)
        } else {
            paths::node_path(url, node_type)
        };
        match self.store.exists(&node_path).await {
            Ok(true) => {
                if let Err(e) = self.store.delete(&node_path).await {
                    error!("remove node failed. path:{}, err:{}", node_path, e);
                }
            }
            Ok(false) => {}
            Err(e) => error!("check node failed. path:{}, err:{}", node_path, e),
        }
    }

    /// Ephemeral node creation transaction: remove any stale node, ensure
    /// the persistent type path, create the leaf with the URL's ext-info as
    /// payload.
    async fn create_node(
        &self,
        url: &Url,
        node_type: &str,
    ) {
        let (type_path, node_path) = if node_type == NODE_TYPE_AGENT {
            (paths::agent_node_type_path(url), paths::agent_node_path(url))
        } else {
            (paths::node_type_path(url, node_type), paths::node_path(url, node_type))
        };
        self.remove_node(url, node_type).await;
        match self.store.exists(&type_path).await {
            Ok(true) => {}
            Ok(false) => self.ensure_persistent(&type_path, true).await,
            Err(e) => {
                error!("check type path failed. path:{}, err:{}", type_path, e);
                return;
            }
        }
        if let Err(e) = self
            .store
            .create_ephemeral(&node_path, url.to_ext_info().as_bytes())
            .await
        {
            error!("create node failed. path:{}, err:{}", node_path, e);
        }
    }

    /// Ensures a persistent path, walking parents up on missing-node errors
    /// when `create_parents` is set.
    async fn ensure_persistent(
        &self,
        path: &str,
        create_parents: bool,
    ) {
        let mut pending = vec![path.to_string()];
        while let Some(current) = pending.last().cloned() {
            match self.store.create_persistent(&current).await {
                Ok(()) => {
                    pending.pop();
                }
                Err(e) if e.is_node_not_found() && create_parents => match current.rsplit_once('/') {
                    Some((parent, _)) if !parent.is_empty() => pending.push(parent.to_string()),
                    _ => {
                        error!("create persistent failed. path:{}, err:{}", current, e);
                        return;
                    }
                },
                Err(e) => {
                    error!("create persistent failed. path:{}, err:{}", current, e);
                    return;
                }
            }
        }
    }
}

/// Session manager: flips availability on disconnect, and on a fresh session
/// replays registrations and subscriptions.
async fn session_loop(
    inner: Arc<Inner>,
    mut events: broadcast::Receiver<SessionEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("registry session manager stopped");
                    return;
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Disconnected) => inner.set_available(false),
                Ok(SessionEvent::Connected) => {
                    if !inner.is_available() {
                        inner.set_available(true);
                        info!("new session established, replaying registry state");
                        inner.recover_service().await;
                        inner.recover_subscribe().await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!("session event stream lagged by {}", missed);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("session event stream closed");
                    return;
                }
            }
        }
    }
}

fn command_path_of(url: &Url) -> String {
    if url.is_agent() {
        paths::agent_command_path(url)
    } else {
        paths::command_path(url)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
