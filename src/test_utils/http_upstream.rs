use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// One inbound request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// Request line plus headers, up to the blank line
    pub head: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// Case-insensitive header lookup over the captured head.
    pub fn header(
        &self,
        name: &str,
    ) -> Option<String> {
        let wanted = name.to_ascii_lowercase();
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim().to_ascii_lowercase() == wanted {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
    }
}

/// Binds a real listener on a system-assigned port and serves every
/// connection with a canned `200 OK` response, pushing each captured request
/// into the returned channel.
pub async fn spawn_upstream(
    response_body: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream listener");
    let addr = listener.local_addr().expect("upstream local addr");
    let (captured_tx, captured_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            let captured_tx = captured_tx.clone();
            tokio::spawn(async move {
                let mut raw = Vec::new();
                let mut buf = [0u8; 1024];
                let head_end = loop {
                    match stream.read(&mut buf).await {
                        Ok(0) => return,
                        Ok(n) => {
                            raw.extend_from_slice(&buf[..n]);
                            if let Some(pos) = find_head_end(&raw) {
                                break pos;
                            }
                        }
                        Err(_) => return,
                    }
                };

                let head = String::from_utf8_lossy(&raw[..head_end]).into_owned();
                let content_length = head
                    .lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        if key.trim().eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);

                let mut body = raw[head_end + 4..].to_vec();
                while body.len() < content_length {
                    match stream.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => body.extend_from_slice(&buf[..n]),
                        Err(_) => return,
                    }
                }

                let _ = captured_tx.send(CapturedRequest { head, body });

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Upstream: hit\r\nConnection: close\r\n\r\n{}",
                    response_body.len(),
                    response_body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (addr, captured_rx)
}

fn find_head_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}
