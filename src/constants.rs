// -
// Store path layout

/// Root namespace for every registry entry
pub const REGISTRY_NAMESPACE: &str = "/motan";
pub(crate) const COMMAND_SUFFIX: &str = "/command";
pub(crate) const NODE_SUFFIX: &str = "/node";

/// Role a registration plays under its service path
pub const NODE_TYPE_SERVER: &str = "server";
pub const NODE_TYPE_UNAVAILABLE_SERVER: &str = "unavailableServer";
pub const NODE_TYPE_CLIENT: &str = "client";
pub const NODE_TYPE_AGENT: &str = "agent";
pub const NODE_TYPE_REFERER: &str = "referer";

// -
// URL parameter keys

pub const NODE_TYPE_KEY: &str = "nodeType";
pub const APPLICATION_KEY: &str = "application";
pub const SESSION_TIMEOUT_KEY: &str = "sessionTimeout";
pub const URL_CONF_KEY: &str = "conf-id";
pub const URL_FORMAT_KEY: &str = "URL_FORMAT";
pub const HTTP_REQUEST_METHOD_KEY: &str = "HTTP_REQUEST_METHOD";
pub const PROXY_ADDRESS_KEY: &str = "proxyAddress";
pub const PROXY_SCHEMA_KEY: &str = "proxySchema";
pub const MAX_CONNECTIONS_KEY: &str = "maxConnections";
pub const REQUEST_TIMEOUT_KEY: &str = "requestTimeout";

// -
// Request attachment keys

pub const HTTP_PROXY_ATTACHMENT: &str = "HTTP_PROXY";
/// Overrides the resolved http method for a single call
pub const HTTP_METHOD_ATTACHMENT: &str = "HTTP_Method";
pub const REMOTE_IP_ATTACHMENT: &str = "remoteIP";
pub const HOST_ATTACHMENT: &str = "host";

// -
// http-service configuration section

pub const HTTP_SERVICE_SECTION: &str = "http-service";
/// Fallback method key used when a motan method has no specific conf
pub const DEFAULT_METHOD_CONF_KEY: &str = "http_default_motan_method";
pub const DEFAULT_HTTP_METHOD: &str = "GET";

// -
// Header rewriting

pub(crate) const MOTAN_HEADER_PREFIX: &str = "M_";
pub(crate) const MOTAN_HEADER_REPLACEMENT: &str = "MOTAN-";
pub(crate) const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

// -
// Defaults

pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_MAX_CONNECTIONS: u64 = 1024;
pub(crate) const DEFAULT_PROXY_SCHEMA: &str = "http";

// -
// Legacy object-stream framing of node payloads

pub(crate) const STREAM_MAGIC: u16 = 0xACED;
pub(crate) const SHORT_STRING_TAG: u8 = 0x74;
pub(crate) const LONG_STRING_TAG: u8 = 0x7C;
