use std::collections::HashMap;

use url::form_urlencoded;

use crate::constants::APPLICATION_KEY;
use crate::constants::NODE_TYPE_AGENT;
use crate::constants::NODE_TYPE_KEY;

/// Identifies a service endpoint: protocol, address, service path, logical
/// group and an open parameter map.
///
/// The identity string `protocol://host:port/path?group=group` is the stable
/// key used by the registry's state tables. The ext-info form extends the
/// identity with the parameter map and is what gets stored as node payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub group: String,
    pub parameters: HashMap<String, String>,
}

impl Url {
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Stable identity key for state tables and snapshot naming.
    pub fn identity(&self) -> String {
        format!(
            "{}://{}:{}/{}?group={}",
            self.protocol, self.host, self.port, self.path, self.group
        )
    }

    /// `host:port`, or the host verbatim when it already carries a
    /// comma-separated address list (registry URLs).
    pub fn address(&self) -> String {
        if self.host.contains(',') {
            return self.host.clone();
        }
        format!("{}:{}", self.host, self.port)
    }

    pub fn param(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn param_or(
        &self,
        key: &str,
        default: &str,
    ) -> String {
        self.parameters.get(key).cloned().unwrap_or_else(|| default.to_string())
    }

    pub fn put_param(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.parameters.insert(key.into(), value.into());
    }

    /// Parses the parameter as a positive integer, falling back to `default`
    /// when absent, malformed or non-positive.
    pub fn positive_int_param(
        &self,
        key: &str,
        default: u64,
    ) -> u64 {
        match self.parameters.get(key).and_then(|v| v.parse::<u64>().ok()) {
            Some(v) if v > 0 => v,
            _ => default,
        }
    }

    /// True when this URL registers as an agent-scoped node.
    pub fn is_agent(&self) -> bool {
        self.param(NODE_TYPE_KEY) == Some(NODE_TYPE_AGENT)
    }

    pub fn application(&self) -> String {
        self.param_or(APPLICATION_KEY, "")
    }

    /// Reversible serialization: the identity followed by `&key=value` pairs
    /// with form-urlencoded values. Used as ephemeral node payload.
    pub fn to_ext_info(&self) -> String {
        let mut out = self.identity();
        let mut keys: Vec<&String> = self.parameters.keys().collect();
        keys.sort();
        for key in keys {
            out.push('&');
            out.push_str(key);
            out.push('=');
            out.extend(form_urlencoded::byte_serialize(self.parameters[key].as_bytes()));
        }
        out
    }

    /// Inverse of [`to_ext_info`](Self::to_ext_info). Returns `None` on
    /// malformed input; node payloads that fail to parse are dropped by the
    /// caller.
    pub fn from_ext_info(ext_info: &str) -> Option<Self> {
        let (protocol, rest) = ext_info.split_once("://")?;
        let (addr_and_path, query) = rest.split_once('?')?;
        let (addr, path) = addr_and_path.split_once('/')?;
        let (host, port_str) = addr.rsplit_once(':')?;
        let port = port_str.parse::<u16>().ok()?;

        let mut group = String::new();
        let mut parameters = HashMap::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key == "group" {
                group = value.into_owned();
            } else {
                parameters.insert(key.into_owned(), value.into_owned());
            }
        }

        Some(Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            group,
            parameters,
        })
    }
}
