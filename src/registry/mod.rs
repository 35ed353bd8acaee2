//! ZooKeeper-backed service registry.
//!
//! [`ZkRegistry`] implements the [`Registry`] contract over a pluggable
//! [`NamingStore`]. Production uses [`ZkStore`]; tests exercise the same
//! state machines against an in-memory store.

mod node_info;
mod paths;
mod snapshot;
mod store;
mod zk_store;
mod zookeeper;

pub use snapshot::*;
pub use store::*;
pub use zk_store::*;
pub use zookeeper::*;

#[cfg(test)]
mod paths_test;
