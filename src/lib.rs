//! # motan-agent
//!
//! Core building blocks of a Motan-style RPC agent:
//!
//! - **Service registry**: a ZooKeeper-backed registry that publishes service
//!   instances, advertises consumers, and watches server nodes and
//!   out-of-band command nodes on behalf of clients and servers. Registered
//!   services and live subscriptions survive session loss through automatic
//!   replay once a fresh session is established.
//! - **HTTP provider**: translates inbound RPC calls into outbound HTTP
//!   requests, either by rewriting call arguments into a form-encoded request
//!   or by proxying raw request bytes to a configured upstream.
//!
//! ## Quick start
//! ```no_run
//! use std::sync::Arc;
//!
//! use motan_agent::registry::{MemorySnapshotSink, Registry, ZkRegistry};
//! use motan_agent::rpc::Url;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry_url = Url::new("zookeeper", "127.0.0.1", 2181);
//!     registry_url.group = "demo".to_string();
//!
//!     let registry = ZkRegistry::connect(registry_url, Arc::new(MemorySnapshotSink::new()))
//!         .await
//!         .expect("connect to zookeeper");
//!
//!     let mut service = Url::new("motan", "10.0.0.1", 8002);
//!     service.group = "demo".to_string();
//!     service.path = "com.example.Echo".to_string();
//!     registry.register(&service).await;
//!     registry.available(Some(&service)).await;
//! }
//! ```

pub mod config;
pub mod provider;
pub mod registry;
pub mod rpc;

mod constants;
mod errors;
mod utils;

pub use constants::*;
pub use errors::*;


//-----------------------------------------------------------
// Test utils
#[cfg(test)]
#[doc(hidden)]
pub mod test_utils;
