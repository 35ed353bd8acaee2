//! Store path layout.
//!
//! ```text
//! /motan/<group>/<service>/<node-type>/<host:port>   service nodes
//! /motan/<group>/command                             service commands
//! /motan/agent/<application>/node/<host:port>        agent nodes
//! /motan/agent/<application>/command                 agent commands
//! ```

use crate::constants::COMMAND_SUFFIX;
use crate::constants::NODE_SUFFIX;
use crate::constants::NODE_TYPE_AGENT;
use crate::constants::REGISTRY_NAMESPACE;
use crate::rpc::Url;

pub(crate) fn group_path(url: &Url) -> String {
    format!("{REGISTRY_NAMESPACE}/{}", url.group)
}

pub(crate) fn service_path(url: &Url) -> String {
    format!("{}/{}", group_path(url), url.path)
}

pub(crate) fn command_path(url: &Url) -> String {
    format!("{}{COMMAND_SUFFIX}", group_path(url))
}

pub(crate) fn node_type_path(
    url: &Url,
    node_type: &str,
) -> String {
    format!("{}/{node_type}", service_path(url))
}

pub(crate) fn node_path(
    url: &Url,
    node_type: &str,
) -> String {
    format!("{}/{}", node_type_path(url, node_type), url.address())
}

pub(crate) fn agent_path(url: &Url) -> String {
    format!("{REGISTRY_NAMESPACE}/{NODE_TYPE_AGENT}/{}", url.application())
}

pub(crate) fn agent_node_type_path(url: &Url) -> String {
    format!("{}{NODE_SUFFIX}", agent_path(url))
}

pub(crate) fn agent_node_path(url: &Url) -> String {
    format!("{}/{}", agent_node_type_path(url), url.address())
}

pub(crate) fn agent_command_path(url: &Url) -> String {
    format!("{}{COMMAND_SUFFIX}", agent_path(url))
}

/// Snapshot key for a subscribed service.
pub(crate) fn node_key(url: &Url) -> String {
    format!("{}_{}", url.group, url.path)
}
