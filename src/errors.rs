//! Agent Error Hierarchy
//!
//! Defines error types for the two subsystems, categorized by the surface
//! they belong to: registry/store failures are swallowed and logged at the
//! call site, provider failures are turned into response exceptions.

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Naming-store and subscription failures inside the registry
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// HTTP bridging failures surfaced to callers as response exceptions
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Connection to the naming store could not be established
    #[error("store connect failed: {0}")]
    Connect(String),

    /// The requested node does not exist
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Any other store-level failure, carried as the store's message
    #[error("store error: {0}")]
    Store(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// URL template with more than one placeholder
    #[error("Get err URL_FORMAT: {0}")]
    UrlFormat(String),

    /// Transparent proxy call without a matching upstream location
    #[error("service not found")]
    ServiceNotFound,

    /// The inbound body could not be materialized for the selected call mode
    #[error("deserialize request failed: {0}")]
    Deserialize(String),

    /// Raw header block in proxy mode is not a valid HTTP request head
    #[error("malformed request head: {0}")]
    HeaderParse(String),

    /// Dial, send or response-parse failure on the outbound HTTP call
    #[error("http transport error: {0}")]
    Transport(String),
}

impl Error {
    /// True when the error is the store's missing-node condition. The
    /// registry walks parent paths up on this.
    pub(crate) fn is_node_not_found(&self) -> bool {
        matches!(self, Error::Registry(RegistryError::NodeNotFound(_)))
    }
}
