use super::paths::*;
use crate::constants::APPLICATION_KEY;
use crate::constants::NODE_TYPE_SERVER;
use crate::constants::NODE_TYPE_UNAVAILABLE_SERVER;
use crate::rpc::Url;

fn test_url() -> Url {
    let mut url = Url::new("zookeeper", "127.0.0.1", 1234);
    url.group = "zkTestGroup".to_string();
    url.path = "zkTestPath".to_string();
    url.put_param(APPLICATION_KEY, "zkTestApp");
    url
}

#[test]
fn test_service_node_paths() {
    let url = test_url();
    assert_eq!(
        node_path(&url, NODE_TYPE_SERVER),
        "/motan/zkTestGroup/zkTestPath/server/127.0.0.1:1234"
    );
    assert_eq!(
        node_path(&url, NODE_TYPE_UNAVAILABLE_SERVER),
        "/motan/zkTestGroup/zkTestPath/unavailableServer/127.0.0.1:1234"
    );
    assert_eq!(
        node_type_path(&url, NODE_TYPE_SERVER),
        "/motan/zkTestGroup/zkTestPath/server"
    );
}

#[test]
fn test_command_path() {
    assert_eq!(command_path(&test_url()), "/motan/zkTestGroup/command");
}

#[test]
fn test_agent_paths() {
    let url = test_url();
    assert_eq!(agent_node_path(&url), "/motan/agent/zkTestApp/node/127.0.0.1:1234");
    assert_eq!(agent_command_path(&url), "/motan/agent/zkTestApp/command");
}

#[test]
fn test_node_key() {
    assert_eq!(node_key(&test_url()), "zkTestGroup_zkTestPath");
}
