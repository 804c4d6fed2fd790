//! Shared lifecycle for both proxy roles: CONNECT tunneling and the
//! synthesized error response both handlers fall back to.

use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use stego_core::headers::HeaderMap;
use stego_core::message::build_response;

use crate::connection::Connection;

/// How long the CONNECT pump waits for either side to become read-ready
/// before checking for idle timeout again.
pub const READINESS_QUANTUM: Duration = Duration::from_secs(10);
/// No activity on either side for this long ends the tunnel.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds a short `502 Bad Gateway` response with `Connection: close`, the
/// proxy's error page for any failure while establishing or relaying a
/// chain.
pub fn bad_gateway(reason: &str) -> Vec<u8> {
    let body = b"Bad Gateway";
    let mut headers = HeaderMap::new();
    headers.append("Proxy-agent", "stego-proxy");
    headers.append("Content-Length", body.len().to_string());
    headers.append("Connection", "close");
    debug!(reason, "synthesizing 502 Bad Gateway");
    build_response("HTTP/1.1", 502, "Bad Gateway", &headers, body)
}

/// Runs the bidirectional byte pump between `left` (the browser-facing
/// connection) and `right` (the dialed tunnel target) until either side
/// signals EOF, a socket error occurs, or `IDLE_TIMEOUT` elapses with no
/// activity on either side. Bytes are never parsed or stego-wrapped here —
/// CONNECT mode is a dumb pipe.
pub async fn pump_connect(left: &mut Connection, right: &mut Connection) {
    let mut last_activity = Instant::now();

    loop {
        if last_activity.elapsed() >= IDLE_TIMEOUT {
            debug!("CONNECT tunnel idle for {:?}, closing", IDLE_TIMEOUT);
            break;
        }

        let step = timeout(READINESS_QUANTUM, async {
            tokio::select! {
                r = left.recv() => (Side::Left, r),
                r = right.recv() => (Side::Right, r),
            }
        })
        .await;

        let (side, result) = match step {
            Ok(step) => step,
            // Readiness quantum elapsed with nothing to read on either side;
            // loop again and re-check idleness against the 30s deadline.
            Err(_) => continue,
        };

        match result {
            Ok(Some(data)) => {
                last_activity = Instant::now();
                let forwarded = match side {
                    Side::Left => forward(right, &data).await,
                    Side::Right => forward(left, &data).await,
                };
                if forwarded.is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!(side = ?side, "CONNECT peer closed, ending tunnel");
                break;
            }
            Err(e) => {
                warn!(side = ?side, error = %e, "CONNECT tunnel transport error");
                break;
            }
        }
    }

    left.close().await;
    right.close().await;
    info!("CONNECT tunnel closed");
}

#[derive(Debug)]
enum Side {
    Left,
    Right,
}

async fn forward(dest: &mut Connection, data: &[u8]) -> Result<(), ()> {
    dest.send_all(data).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Role;
    use stego_core::message::parse_response;
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client_res, server_res) =
            tokio::join!(tokio::net::TcpStream::connect(addr), async { listener.accept().await });
        let client = Connection::new(Role::Client, client_res.unwrap());
        let (server_socket, _) = server_res.unwrap();
        let server = Connection::new(Role::Server, server_socket);
        (client, server)
    }

    #[test]
    fn bad_gateway_carries_a_close_header_and_reason() {
        let wire = bad_gateway("dial failed");
        let text = String::from_utf8(wire.clone()).unwrap();
        assert!(text.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
        let response = parse_response(&wire).unwrap();
        assert_eq!(response.status, 502);
        assert_eq!(response.headers.get("connection"), Some("close"));
        assert_eq!(response.body, b"Bad Gateway");
    }

    #[tokio::test]
    async fn pump_connect_relays_bytes_in_both_directions() {
        let (mut browser, mut browser_peer) = pair().await;
        let (mut origin, mut origin_peer) = pair().await;

        let pump = tokio::spawn(async move {
            pump_connect(&mut browser_peer, &mut origin_peer).await;
        });

        browser.send_all(b"request-bytes").await.unwrap();
        let seen_by_origin = origin.recv().await.unwrap().unwrap();
        assert_eq!(seen_by_origin, b"request-bytes");

        origin.send_all(b"response-bytes").await.unwrap();
        let seen_by_browser = browser.recv().await.unwrap().unwrap();
        assert_eq!(seen_by_browser, b"response-bytes");

        browser.close().await;
        origin.close().await;
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn pump_connect_ends_when_either_side_closes() {
        let (browser, mut browser_peer) = pair().await;
        let (mut origin, mut origin_peer) = pair().await;
        drop(browser);

        let pump = tokio::spawn(async move {
            pump_connect(&mut browser_peer, &mut origin_peer).await;
        });

        assert!(pump.await.is_ok());
        assert!(origin.recv().await.unwrap().is_none());
    }
}
