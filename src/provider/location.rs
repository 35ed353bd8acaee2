#[cfg(test)]
use mockall::automock;

/// Maps a motan method onto an upstream service and a rewritten request
/// path. The agent's location table implements this; the provider only
/// consults it in transparent proxy mode.
#[cfg_attr(test, automock)]
pub trait LocationMatcher: Send + Sync {
    /// Returns `(upstream, rewritten_path)` for the method, or `None` when
    /// no location matches.
    fn pick(
        &self,
        method: &str,
        proxy: bool,
    ) -> Option<(String, String)>;
}
