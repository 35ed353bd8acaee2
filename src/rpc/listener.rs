#[cfg(test)]
use mockall::automock;

use super::Url;

/// Kind of an out-of-band command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Service,
    Agent,
}

/// Receives server-node change notifications for a subscribed service.
///
/// Listeners are keyed by identity inside the registry; subscribing the same
/// identity twice under one service path replaces the earlier entry.
/// Implementations must not block: notifications are delivered inline from
/// the watcher task.
#[cfg_attr(test, automock)]
pub trait NotifyListener: Send + Sync {
    fn identity(&self) -> String;

    fn notify(
        &self,
        registry_url: &Url,
        urls: Vec<Url>,
    );
}

/// Receives command payload changes for a subscribed command path.
#[cfg_attr(test, automock)]
pub trait CommandNotifyListener: Send + Sync {
    fn identity(&self) -> String;

    fn notify_command(
        &self,
        registry_url: &Url,
        kind: CommandType,
        command: String,
    );
}
