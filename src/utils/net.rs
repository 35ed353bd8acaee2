use std::net::UdpSocket;

/// Best-effort local IP discovery through a UDP connect probe. No packet is
/// sent; the socket just resolves the outbound interface address.
pub(crate) fn local_ip() -> String {
    let probed = UdpSocket::bind("0.0.0.0:0").and_then(|socket| {
        socket.connect("8.8.8.8:80")?;
        socket.local_addr()
    });
    match probed {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => "127.0.0.1".to_string(),
    }
}
