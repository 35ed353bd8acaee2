use super::net::local_ip;

#[test]
fn test_local_ip_is_never_empty() {
    let ip = local_ip();
    assert!(!ip.is_empty());
    assert!(ip.parse::<std::net::IpAddr>().is_ok());
}
