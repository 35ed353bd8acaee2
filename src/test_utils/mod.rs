//! Shared test fixtures.
//!
//! - [`MemoryStore`]: in-memory [`NamingStore`](crate::registry::NamingStore)
//!   with deterministic watch delivery and session-loss replay, so registry
//!   state machines run without a live ZooKeeper.
//! - Recording listeners capturing every notification for assertions.
//! - [`spawn_upstream`]: a real-socket HTTP upstream that captures inbound
//!   requests and answers a canned response.

mod http_upstream;
mod listeners;
mod memory_store;

pub use http_upstream::*;
pub use listeners::*;
pub use memory_store::*;

use std::time::Duration;

/// Installs the tracing subscriber for test output. Safe to call from every
/// test; only the first call wins.
pub fn enable_logger() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds or a bounded wait elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    true
}
